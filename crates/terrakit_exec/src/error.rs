//! Error types for the executor.

use thiserror::Error;

use terrakit_runner::RunnerError;
use terrakit_state::StateError;

use crate::hooks::HookPhase;

/// Result type alias for executor operations.
pub type ExecResult<T> = Result<T, ExecError>;

/// Errors that can occur while building or running an operation.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("`{command}` failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("command failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        source: Box<ExecError>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error("Failed to detect terraform version: {0}")]
    VersionDetection(String),

    #[error("Unsupported terraform version: {0}")]
    UnsupportedVersion(String),

    #[error("Failed to parse {what} output: {message}")]
    Parse { what: &'static str, message: String },

    #[error("Runner error: {0}")]
    Runner(RunnerError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<RunnerError> for ExecError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Cancelled => ExecError::Cancelled,
            other => ExecError::Runner(other),
        }
    }
}

impl ExecError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecError::Cancelled)
    }

    /// Exit code of the failing tool invocation, looking through retry wrapping.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecError::CommandFailed { exit_code, .. } => Some(*exit_code),
            ExecError::RetriesExhausted { source, .. } => source.exit_code(),
            _ => None,
        }
    }
}

/// A hook failure that stopped the pipeline.
#[derive(Error, Debug)]
pub enum HookError {
    #[error("{phase} hook '{name}' failed: {reason}")]
    Failed {
        name: String,
        phase: HookPhase,
        reason: String,
    },

    #[error("{phase} hook '{name}' failed after retry: {reason}")]
    FailedAfterRetry {
        name: String,
        phase: HookPhase,
        reason: String,
    },
}

impl HookError {
    pub fn hook_name(&self) -> &str {
        match self {
            HookError::Failed { name, .. } | HookError::FailedAfterRetry { name, .. } => name,
        }
    }
}
