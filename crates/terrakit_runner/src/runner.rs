//! Command runner trait and types.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::{CommandSpec, RunConfig};
use crate::error::RunnerResult;

/// Result of a process execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Identifier for this invocation, used to correlate log lines
    pub invocation_id: String,
    /// Exit code from the process (-1 when killed by a signal)
    pub exit_code: i32,
    /// Captured stdout (empty when stdout capture was disabled)
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Wall time in milliseconds
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout and stderr joined by a newline, skipping an empty side.
    pub fn combined_output(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (true, _) => self.stderr.clone(),
            (false, true) => self.stdout.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }

    /// Last non-empty stderr line, useful for short error messages.
    pub fn last_error_line(&self) -> Option<&str> {
        self.stderr.lines().rev().find(|l| !l.trim().is_empty())
    }
}

/// One line of process output.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub stream: LogStream,
    pub message: String,
}

impl LogLine {
    pub fn new(stream: LogStream, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream,
            message: message.into(),
        }
    }
}

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// Receives output lines while a process runs.
pub type LogHandler = Arc<dyn Fn(LogLine) + Send + Sync>;

/// Command execution port.
///
/// Implementations launch `spec` and wait for it to exit. A non-zero exit
/// status is reported through [`ExecutionResult::exit_code`], not as an
/// error. Cancelling `cancel` must terminate the child and return
/// [`RunnerError::Cancelled`](crate::RunnerError::Cancelled).
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion.
    async fn run(
        &self,
        spec: &CommandSpec,
        config: &RunConfig,
        cancel: &CancellationToken,
    ) -> RunnerResult<ExecutionResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(stdout: &str, stderr: &str) -> ExecutionResult {
        ExecutionResult {
            invocation_id: "test".to_string(),
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            duration_ms: 0,
        }
    }

    #[test]
    fn test_combined_output() {
        assert_eq!(result("out", "").combined_output(), "out");
        assert_eq!(result("", "err").combined_output(), "err");
        assert_eq!(result("out", "err").combined_output(), "out\nerr");
    }

    #[test]
    fn test_last_error_line_skips_blank_lines() {
        let r = result("", "Error: first\nError: second\n\n");
        assert_eq!(r.last_error_line(), Some("Error: second"));
    }
}
