//! Configuration constants and run options for the loader
//!
//! Timeouts are centralized here; per-run behavior switches live in
//! [`LoadOptions`].

use derive_builder::Builder;
use std::time::Duration;

// ============================================================================
// Connection Configuration
// ============================================================================

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(45);

/// Timeout for a single insert, or for one per-file transaction
///
/// Set to 3 minutes because a per-file transaction over a large array can
/// hold many statements, and tables with indexes take longer to validate.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(180); // 3 minutes

// ============================================================================
// Traversal Configuration
// ============================================================================

/// Extension a file must carry to be treated as JSON input
pub const JSON_EXTENSION: &str = "json";

/// Options that change how a run treats its inputs
#[derive(Debug, Clone, Builder)]
pub struct LoadOptions {
    /// Skip files without a `.json` extension (with a warning) instead of
    /// parsing them anyway
    #[builder(default = "true")]
    pub strict_extension_check: bool,

    /// Write all documents of one file inside a single transaction
    #[builder(default = "false")]
    pub transaction_per_file: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            strict_extension_check: true,
            transaction_per_file: false,
        }
    }
}
