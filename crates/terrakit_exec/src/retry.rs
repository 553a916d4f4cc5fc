//! Retry with exponential backoff for transient tool failures.
//!
//! Failures are classified by substring match against the error text, which
//! for a failed invocation includes the tool's stderr. Sleeps go through a
//! [`Sleeper`] so backoff can be observed without waiting.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{ExecError, ExecResult};

/// Error text that marks a failure as transient.
pub const DEFAULT_RETRYABLE_ERRORS: &[&str] = &[
    "Error acquiring the state lock",
    "Error locking state",
    "resource temporarily unavailable",
    "timeout while waiting for state lock",
];

/// Retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_factor: f64,
    pub retryable_errors: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_factor: 2.0,
            retryable_errors: DEFAULT_RETRYABLE_ERRORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl RetryConfig {
    /// Run every operation exactly once.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Attempts actually made when every attempt fails with a retryable error.
    pub fn attempts(&self) -> u32 {
        if self.enabled {
            self.max_attempts.max(1)
        } else {
            1
        }
    }

    pub fn is_retryable(&self, err: &ExecError) -> bool {
        if err.is_cancelled() {
            return false;
        }
        let text = err.to_string();
        self.retryable_errors
            .iter()
            .any(|pattern| !pattern.is_empty() && text.contains(pattern.as_str()))
    }

    /// Sleep before attempt `attempt + 1`, where `attempt` is 1-based:
    /// `min(initial * factor^(attempt-1), max)`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = if self.backoff_factor.is_finite() && self.backoff_factor > 0.0 {
            self.backoff_factor
        } else {
            1.0
        };
        let secs = self.initial_backoff.as_secs_f64() * factor.powi(exp);
        let max = self.max_backoff.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            self.max_backoff
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// Serializable retry settings, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub enabled: bool,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_factor: f64,
    pub retryable_errors: Vec<String>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

impl From<RetryConfig> for RetrySettings {
    fn from(config: RetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts,
            initial_backoff_ms: config.initial_backoff.as_millis() as u64,
            max_backoff_ms: config.max_backoff.as_millis() as u64,
            backoff_factor: config.backoff_factor,
            retryable_errors: config.retryable_errors,
        }
    }
}

impl From<RetrySettings> for RetryConfig {
    fn from(settings: RetrySettings) -> Self {
        Self {
            enabled: settings.enabled,
            max_attempts: settings.max_attempts,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            backoff_factor: settings.backoff_factor,
            retryable_errors: settings.retryable_errors,
        }
    }
}

/// Something that can wait.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run `operation` under `config`.
///
/// The closure receives the 1-based attempt number. Cancellation is checked
/// before each attempt and during every backoff sleep, and always wins over
/// retry exhaustion.
pub async fn run_with_retry<T, F, Fut>(
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    cancel: &CancellationToken,
    mut operation: F,
) -> ExecResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ExecResult<T>>,
{
    let max_attempts = config.attempts();
    let mut attempt = 1;

    loop {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }

        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !config.enabled || !config.is_retryable(&err) {
            return Err(err);
        }
        if attempt >= max_attempts {
            return Err(ExecError::RetriesExhausted {
                attempts: attempt,
                source: Box::new(err),
            });
        }

        let backoff = config.backoff_for(attempt);
        warn!(
            attempt,
            max_attempts,
            backoff_ms = backoff.as_millis() as u64,
            error = %err,
            "Retryable failure, backing off"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(ExecError::Cancelled),
            _ = sleeper.sleep(backoff) => {}
        }
        attempt += 1;
    }
}
