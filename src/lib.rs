// Public API
pub mod config;
pub mod db;
pub mod error;
pub mod expr;
pub mod loader;
pub mod mapping;
pub mod record;
pub mod runner;

// Internal modules
mod telemetry;

pub use error::{ExprError, LoadError, SessionError};
pub use loader::{LoadReport, Loader};
pub use mapping::Mapping;
pub use telemetry::ProgressStats;
