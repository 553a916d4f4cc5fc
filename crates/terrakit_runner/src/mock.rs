//! Scripted command runner so executor behavior can be tested without a
//! real provisioning binary.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::{CommandSpec, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult, LogLine, LogStream};

/// Canned outcome of one invocation.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    /// Real time the mock waits before answering (honors cancellation)
    pub delay_ms: u64,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 100,
            delay_ms: 0,
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 100,
            delay_ms: 0,
        }
    }

    /// A response with an arbitrary exit code and stdout.
    pub fn exit(exit_code: i32, stdout: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 100,
            delay_ms: 0,
        }
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }

    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub stream_logs: bool,
    pub capture_stdout: bool,
}

impl CapturedCall {
    /// First argument, which is the subcommand for most tools.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(|s| s.as_str())
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

/// Scripted [`CommandRunner`].
///
/// Responses are looked up by key: a call matches a key when its first
/// argument or its program equals the key. Keyed responses are consumed in
/// order and the last one repeats. Calls without a keyed match fall back to
/// the default response list, which cycles.
#[derive(Clone, Default)]
pub struct MockRunner {
    keyed: Arc<RwLock<BTreeMap<String, VecDeque<MockResponse>>>>,
    responses: Arc<RwLock<Vec<MockResponse>>>,
    response_index: Arc<AtomicUsize>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    simulate_failure: Arc<RwLock<Option<String>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for calls matching `key`.
    pub fn on(self, key: impl Into<String>, response: MockResponse) -> Self {
        self.keyed
            .write()
            .entry(key.into())
            .or_default()
            .push_back(response);
        self
    }

    /// Add a default response for calls with no keyed match.
    pub fn add_response(self, response: MockResponse) -> Self {
        self.responses.write().push(response);
        self
    }

    /// Set multiple default responses.
    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        *self.responses.write() = responses;
        self
    }

    /// Make every call fail to launch.
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(message.into());
        self
    }

    /// Forget recorded invocations, keeping the scripted responses.
    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Calls whose first argument or program equals `key`.
    pub fn calls_for(&self, key: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.program == key || c.subcommand() == Some(key))
            .cloned()
            .collect()
    }

    /// Check if any call matched `key`.
    pub fn was_called(&self, key: &str) -> bool {
        !self.calls_for(key).is_empty()
    }

    fn record_call(&self, spec: &CommandSpec, config: &RunConfig) {
        self.captured_calls.write().push(CapturedCall {
            program: spec.program.clone(),
            args: spec.args.clone(),
            env: spec.env.clone(),
            working_dir: spec.working_dir.clone(),
            stream_logs: config.stream_logs,
            capture_stdout: config.capture_stdout,
        });
    }

    fn keyed_response(&self, key: &str) -> Option<MockResponse> {
        let mut keyed = self.keyed.write();
        let queue = keyed.get_mut(key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    fn next_response(&self, spec: &CommandSpec) -> MockResponse {
        if let Some(sub) = spec.args.first() {
            if let Some(response) = self.keyed_response(sub) {
                return response;
            }
        }
        if let Some(response) = self.keyed_response(&spec.program) {
            return response;
        }

        let responses = self.responses.read();
        if responses.is_empty() {
            return MockResponse::success("");
        }
        let index = self.response_index.fetch_add(1, Ordering::SeqCst);
        responses[index % responses.len()].clone()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        config: &RunConfig,
        cancel: &CancellationToken,
    ) -> RunnerResult<ExecutionResult> {
        self.record_call(spec, config);

        if let Some(msg) = self.simulate_failure.read().clone() {
            return Err(RunnerError::ExecutionFailed(msg));
        }

        let response = self.next_response(spec);

        if response.delay_ms > 0 {
            tokio::select! {
                _ = cancel.cancelled() => return Err(RunnerError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(response.delay_ms)) => {}
            }
        } else if cancel.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }

        if config.stream_logs {
            if let Some(sink) = &config.sink {
                for line in response.stdout.lines() {
                    sink(LogLine::new(LogStream::Stdout, line));
                }
                for line in response.stderr.lines() {
                    sink(LogLine::new(LogStream::Stderr, line));
                }
            }
        }

        let started_at = Utc::now();
        let finished_at = started_at + chrono::Duration::milliseconds(response.duration_ms as i64);

        Ok(ExecutionResult {
            invocation_id: format!("mock-{}", uuid::Uuid::new_v4()),
            exit_code: response.exit_code,
            stdout: if config.capture_stdout {
                response.stdout
            } else {
                String::new()
            },
            stderr: response.stderr,
            started_at,
            finished_at,
            duration_ms: response.duration_ms,
        })
    }
}
