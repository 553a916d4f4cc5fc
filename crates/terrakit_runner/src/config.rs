//! Command and run configuration types.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::runner::LogHandler;

/// A single external command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program to execute (resolved through `PATH` when not absolute)
    pub program: String,
    /// Argument vector, excluding the program itself
    pub args: Vec<String>,
    /// Working directory for the child process
    pub working_dir: Option<PathBuf>,
    /// Environment overlay applied on top of the inherited environment
    pub env: BTreeMap<String, String>,
    /// Whether the parent environment is inherited
    pub inherit_env: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            inherit_env: true,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            self.env.insert(key.into(), value.into());
        }
        self
    }

    /// Start the child with an empty environment plus the overlay.
    pub fn clear_env(mut self) -> Self {
        self.inherit_env = false;
        self
    }

    /// Render the command line for logging.
    pub fn display_command(&self) -> String {
        let mut cmd = self.program.clone();
        for arg in &self.args {
            if arg.is_empty() || arg.contains(' ') || arg.contains('"') {
                cmd.push_str(&format!(" '{}'", arg));
            } else {
                cmd.push(' ');
                cmd.push_str(arg);
            }
        }
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_command())
    }
}

/// How a run treats the child's output streams and lifetime.
#[derive(Clone)]
pub struct RunConfig {
    /// Timeout in seconds (0 = no timeout)
    pub timeout_seconds: u64,
    /// Whether stdout is buffered into the execution result
    pub capture_stdout: bool,
    /// Whether output lines are forwarded to the sink as they arrive
    pub stream_logs: bool,
    /// Destination for streamed lines; falls back to the process streams
    pub sink: Option<LogHandler>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 0,
            capture_stdout: true,
            stream_logs: false,
            sink: None,
        }
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("timeout_seconds", &self.timeout_seconds)
            .field("capture_stdout", &self.capture_stdout)
            .field("stream_logs", &self.stream_logs)
            .field("sink", &self.sink.as_ref().map(|_| "<handler>"))
            .finish()
    }
}

impl RunConfig {
    /// Capture stdout without forwarding anything.
    pub fn captured() -> Self {
        Self::default()
    }

    /// Forward output to the sink without buffering stdout.
    pub fn streamed() -> Self {
        Self {
            capture_stdout: false,
            stream_logs: true,
            ..Self::default()
        }
    }

    /// Buffer stdout and forward it to the sink at the same time.
    pub fn mirrored() -> Self {
        Self {
            capture_stdout: true,
            stream_logs: true,
            ..Self::default()
        }
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn sink(mut self, sink: LogHandler) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_sink(mut self, sink: Option<LogHandler>) -> Self {
        self.sink = sink;
        self
    }
}
