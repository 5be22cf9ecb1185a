//! Data loading error types.
//!
//! Every failure mode has a named variant. Data-quality conditions inside
//! the analyses (zero revenue, missing dates, empty groups) are not errors
//! and never reach this type.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk '{path}': {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("CSV parse error in {origin} at line {line}: {source}")]
    Parse {
        origin: String,
        line: usize,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid {field} in {origin} at line {line}: {reason}")]
    InvalidValue {
        origin: String,
        line: usize,
        field: &'static str,
        reason: String,
    },

    #[error("No sales fact files found under '{0}'")]
    NoInput(PathBuf),
}

/// Result type alias for loading operations.
pub type LoadResult<T> = Result<T, LoadError>;
