// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building, feeding or reading a cohort engine
#[derive(Debug, Error)]
pub enum CohortError {
    #[error("invalid cohort definition: {0}")]
    Configuration(String),
    #[error("malformed time bucket '{key}': {reason}")]
    Format { key: String, reason: String },
    #[error("failed to process row ({reason}): {row}")]
    RowProcessing { row: String, reason: String },
    #[error("{feature} unavailable: {reason}")]
    MissingDependency { feature: &'static str, reason: String },
    #[error(transparent)]
    SourceUnavailable(#[from] SourceError),
    #[error("engine is not initialized, call init_data() before processing rows")]
    NotInitialized,
    #[error("no aggregated data for {0}, run a pass or load it from disk first")]
    NotAggregated(String),
    #[error("corrupt matrix file {}: {reason}", path.display())]
    CorruptMatrix { path: PathBuf, reason: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Distinguishes a source nobody configured from one that was configured but could not be read
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no {what} configured")]
    NotConfigured { what: &'static str },
    #[error("{what} at {} is unreachable: {source}", path.display())]
    Unreachable {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CohortError {
    pub(crate) fn format(key: &str, reason: impl Into<String>) -> Self {
        CohortError::Format { key: key.to_string(), reason: reason.into() }
    }
}
