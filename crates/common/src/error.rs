//! Unified error type for the demand-risk monitor.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Input dataset is empty")]
    EmptyInput,

    #[error("Invalid demand series: {0}")]
    InvalidSeries(String),

    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Not yet available: {0}")]
    NotYetAvailable(String),

    #[error("Cursor moved during run (expected {expected}, found {found})")]
    CursorConflict { expected: String, found: String },

    #[error("Invalid artifact key: {0}")]
    InvalidKey(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for a missing artifact, which callers often treat as a valid state.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
