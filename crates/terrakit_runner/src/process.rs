//! Process-based command runner.
//!
//! Launches commands as tokio child processes, collecting stdout/stderr on
//! background tasks and forwarding lines to a sink while they arrive.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{CommandSpec, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult, LogHandler, LogLine, LogStream};

/// Process runner options.
#[derive(Debug, Clone)]
pub struct ProcessRunnerOptions {
    /// CI mode (timestamped, stream-tagged console lines)
    pub ci_mode: bool,
}

impl Default for ProcessRunnerOptions {
    fn default() -> Self {
        Self {
            ci_mode: std::env::var("CI").is_ok(),
        }
    }
}

impl ProcessRunnerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ci_mode(mut self, enabled: bool) -> Self {
        self.ci_mode = enabled;
        self
    }
}

/// Runs commands as local child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    options: ProcessRunnerOptions,
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
    TimedOut,
}

impl ProcessRunner {
    pub fn new(options: ProcessRunnerOptions) -> Self {
        Self { options }
    }

    fn build_command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        if !spec.inherit_env {
            cmd.env_clear();
        }
        cmd.envs(&spec.env);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    /// Console handler used when streaming is requested without a sink.
    fn console_handler(ci_mode: bool) -> LogHandler {
        Arc::new(move |line: LogLine| {
            if ci_mode {
                println!(
                    "[{}] [{}] {}",
                    line.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                    line.stream,
                    line.message
                );
            } else {
                match line.stream {
                    LogStream::Stdout => println!("{}", line.message),
                    LogStream::Stderr => eprintln!("{}", line.message),
                }
            }
        })
    }

    fn forwarder(&self, config: &RunConfig) -> Option<LogHandler> {
        if !config.stream_logs {
            return None;
        }
        Some(
            config
                .sink
                .clone()
                .unwrap_or_else(|| Self::console_handler(self.options.ci_mode)),
        )
    }
}

async fn collect_stream<R>(
    reader: R,
    stream: LogStream,
    capture: bool,
    forward: Option<LogHandler>,
) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut output = String::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(%stream, error = %e, "Failed to read process output");
                break;
            }
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        // Tool output is not guaranteed to be UTF-8.
        let line = String::from_utf8_lossy(&buf).into_owned();
        if let Some(handler) = &forward {
            handler(LogLine::new(stream, line.clone()));
        }
        if capture {
            output.push_str(&line);
            output.push('\n');
        }
    }
    output
}

async fn deadline(seconds: u64) {
    if seconds == 0 {
        std::future::pending::<()>().await;
    } else {
        tokio::time::sleep(Duration::from_secs(seconds)).await;
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        config: &RunConfig,
        cancel: &CancellationToken,
    ) -> RunnerResult<ExecutionResult> {
        if cancel.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }

        debug!("Executing: {}", spec);

        let mut child = Self::build_command(spec).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RunnerError::ProgramNotFound(spec.program.clone())
            } else {
                RunnerError::SpawnFailed {
                    program: spec.program.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::ExecutionFailed("stdout pipe unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::ExecutionFailed("stderr pipe unavailable".to_string()))?;

        let forward = self.forwarder(config);
        let stdout_task = tokio::spawn(collect_stream(
            stdout,
            LogStream::Stdout,
            config.capture_stdout,
            forward.clone(),
        ));
        let stderr_task = tokio::spawn(collect_stream(stderr, LogStream::Stderr, true, forward));

        let started_at = Utc::now();
        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = cancel.cancelled() => Outcome::Cancelled,
            _ = deadline(config.timeout_seconds) => Outcome::TimedOut,
        };

        let status = match outcome {
            Outcome::Exited(status) => status.map_err(|e| {
                RunnerError::ExecutionFailed(format!("Failed to wait for process: {}", e))
            })?,
            Outcome::Cancelled => {
                info!("Cancelling {}", spec.program);
                let _ = child.kill().await;
                return Err(RunnerError::Cancelled);
            }
            Outcome::TimedOut => {
                error!(
                    "{} exceeded timeout of {}s, killing",
                    spec.program, config.timeout_seconds
                );
                let _ = child.kill().await;
                return Err(RunnerError::Timeout(config.timeout_seconds));
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        let exit_code = status.code().unwrap_or(-1);

        debug!(
            "{} exited with code {} after {}ms",
            spec.program, exit_code, duration_ms
        );

        Ok(ExecutionResult {
            invocation_id: uuid::Uuid::new_v4().to_string(),
            exit_code,
            stdout,
            stderr,
            started_at,
            finished_at,
            duration_ms,
        })
    }
}
