//! Error types for the state cache.

use thiserror::Error;

/// Result type alias for state cache operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors returned by the state cache. None of them are retried.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Cache miss: key {0} not found")]
    NotFound(String),

    #[error("Not enough cache space: required {required} bytes, available {available} bytes")]
    CapacityExceeded { required: u64, available: u64 },

    #[error("Invalid state: {0}")]
    Invalid(String),

    #[error("No keys provided for merge")]
    EmptyMerge,

    #[error("Resource {0} not found")]
    ResourceNotFound(String),

    #[error("Output {0} not found")]
    OutputNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StateError {
    /// Whether the error means the key is absent or expired.
    pub fn is_miss(&self) -> bool {
        matches!(self, StateError::NotFound(_))
    }
}
