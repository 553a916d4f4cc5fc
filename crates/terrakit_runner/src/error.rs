//! Error types for the runner module.

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur while launching or supervising a child process.
///
/// A non-zero exit status is not an error at this layer; callers inspect
/// [`ExecutionResult::exit_code`](crate::ExecutionResult) themselves.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Program not found: {0}")]
    ProgramNotFound(String),

    #[error("Failed to spawn {program}: {message}")]
    SpawnFailed { program: String, message: String },

    #[error("Process execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Process timeout after {0} seconds")]
    Timeout(u64),

    #[error("Process cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
