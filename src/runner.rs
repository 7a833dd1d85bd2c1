//! High-level runner API for the JSON loader.
//!
//! This module wraps mapping-file parsing, load id selection and the
//! [`Loader`] into one call. It is the entry point used by the CLI.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::LoadOptions;
use crate::loader::Loader;
use crate::mapping::load_mapping_file;
use crate::telemetry::ProgressStats;

/// Arguments for running a load
#[derive(Debug, Clone)]
pub struct LoadArgs {
    pub mapping_file: PathBuf,
    /// Provenance tag for every record; a random UUID when `None`
    pub load_id: Option<String>,
    pub options: LoadOptions,
}

/// Result of a completed load
#[derive(Debug)]
pub struct LoadResult {
    pub load_id: String,
    pub mappings: usize,
    pub files_processed: usize,
    pub documents_written: u64,
    pub sessions_opened: usize,
    pub duration: Duration,
    pub stats: ProgressStats,
}

/// Run a load described by a mapping file
///
/// # Example
///
/// ```no_run
/// use json_db_loader::config::LoadOptions;
/// use json_db_loader::runner::{LoadArgs, run_load};
///
/// # async fn example() -> anyhow::Result<()> {
/// let args = LoadArgs {
///     mapping_file: "mappings.json".into(),
///     load_id: Some("nightly-2024-06-01".to_string()),
///     options: LoadOptions::default(),
/// };
///
/// let result = run_load(args).await?;
/// println!("Processed {} files", result.files_processed);
/// # Ok(())
/// # }
/// ```
pub async fn run_load(args: LoadArgs) -> Result<LoadResult> {
    let start = Instant::now();

    let mappings = load_mapping_file(&args.mapping_file)
        .await
        .with_context(|| format!("Failed to load mappings from {}", args.mapping_file.display()))?;

    let load_id = args
        .load_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let loader = Loader::new(args.options);
    let report = loader
        .load(&mappings, &load_id)
        .await
        .with_context(|| format!("Load {} failed", load_id))?;

    Ok(LoadResult {
        load_id,
        mappings: mappings.len(),
        files_processed: report.files_processed,
        documents_written: report.documents_written,
        sessions_opened: report.sessions_opened,
        duration: start.elapsed(),
        stats: report.stats,
    })
}
