//! Hook pipeline.
//!
//! Hooks are external commands run around an operation. Each hook belongs to
//! one phase and carries its own failure policy; hooks of a phase run in
//! registration order through the same [`CommandRunner`] as the tool itself.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use terrakit_runner::{CommandRunner, CommandSpec, LogHandler, RunConfig, RunnerError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{ExecError, ExecResult, HookError};

/// When a hook runs relative to the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookPhase {
    Before,
    After,
    Error,
}

impl HookPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookPhase::Before => "before",
            HookPhase::After => "after",
            HookPhase::Error => "error",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when a hook fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookFailurePolicy {
    /// Log and move on to the next hook.
    Continue,
    /// Stop the pipeline and fail the operation.
    #[default]
    Abort,
    /// Run the hook once more, then behave like `Abort`.
    RetryOnce,
}

/// An external command run around an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hook {
    pub name: String,
    pub phase: HookPhase,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Defaults to the executor's working directory.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub on_failure: HookFailurePolicy,
    /// Seconds before the hook is killed (0 = no timeout).
    #[serde(default)]
    pub timeout_secs: u64,
}

impl Hook {
    pub fn new(name: impl Into<String>, phase: HookPhase, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phase,
            command: command.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            on_failure: HookFailurePolicy::default(),
            timeout_secs: 0,
        }
    }

    pub fn before(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(name, HookPhase::Before, command)
    }

    pub fn after(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(name, HookPhase::After, command)
    }

    pub fn on_error(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(name, HookPhase::Error, command)
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

    pub fn policy(mut self, policy: HookFailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn command_spec(&self, ctx: &HookContext<'_>) -> CommandSpec {
        let dir = self
            .working_dir
            .clone()
            .unwrap_or_else(|| ctx.working_dir.to_path_buf());

        CommandSpec::new(&self.command)
            .args(self.args.iter().cloned())
            .working_dir(dir)
            .envs(ctx.env.iter().map(|(k, v)| (k.clone(), v.clone())))
            .envs(self.env.iter().map(|(k, v)| (k.clone(), v.clone())))
            .env("TERRAKIT_OPERATION", ctx.operation)
            .env("TERRAKIT_HOOK_PHASE", self.phase.as_str())
    }
}

/// Per-call inputs shared by every hook of a phase.
pub struct HookContext<'a> {
    /// Name of the operation the hooks surround, e.g. `plan`.
    pub operation: &'a str,
    pub working_dir: &'a Path,
    /// Executor environment overlay, applied before the hook's own.
    pub env: &'a BTreeMap<String, String>,
    pub sink: Option<LogHandler>,
}

/// Ordered hooks, grouped by phase at run time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookPipeline {
    hooks: Vec<Hook>,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hooks(hooks: Vec<Hook>) -> Self {
        Self { hooks }
    }

    pub fn register(&mut self, hook: Hook) {
        self.hooks.push(hook);
    }

    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn for_phase(&self, phase: HookPhase) -> impl Iterator<Item = &Hook> {
        self.hooks.iter().filter(move |h| h.phase == phase)
    }

    /// Run every hook registered for `phase`.
    ///
    /// Failures in the `error` phase are logged and never returned.
    /// Cancellation stops the pipeline and surfaces as [`ExecError::Cancelled`]
    /// for the `before` and `after` phases.
    pub async fn run_phase(
        &self,
        phase: HookPhase,
        runner: &dyn CommandRunner,
        ctx: &HookContext<'_>,
        cancel: &CancellationToken,
    ) -> ExecResult<()> {
        for hook in self.for_phase(phase) {
            info!(hook = %hook.name, phase = %phase, operation = ctx.operation, "Running hook");

            let outcome = match run_hook(hook, runner, ctx, cancel).await {
                Ok(outcome) => outcome,
                Err(ExecError::Cancelled) if phase == HookPhase::Error => {
                    warn!(hook = %hook.name, "Error hooks interrupted by cancellation");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            let Err(reason) = outcome else {
                continue;
            };

            if phase == HookPhase::Error {
                error!(hook = %hook.name, %reason, "Error hook failed");
                continue;
            }

            match hook.on_failure {
                HookFailurePolicy::Continue => {
                    warn!(hook = %hook.name, phase = %phase, %reason, "Hook failed, continuing");
                }
                HookFailurePolicy::Abort => {
                    return Err(HookError::Failed {
                        name: hook.name.clone(),
                        phase,
                        reason,
                    }
                    .into());
                }
                HookFailurePolicy::RetryOnce => {
                    warn!(hook = %hook.name, phase = %phase, %reason, "Hook failed, retrying once");
                    if let Err(reason) = run_hook(hook, runner, ctx, cancel).await? {
                        return Err(HookError::FailedAfterRetry {
                            name: hook.name.clone(),
                            phase,
                            reason,
                        }
                        .into());
                    }
                }
            }
        }

        Ok(())
    }
}

/// Run one hook. The outer error is cancellation; the inner one is a
/// failure reason the caller's policy decides about.
async fn run_hook(
    hook: &Hook,
    runner: &dyn CommandRunner,
    ctx: &HookContext<'_>,
    cancel: &CancellationToken,
) -> ExecResult<Result<(), String>> {
    let spec = hook.command_spec(ctx);
    let config = RunConfig::streamed()
        .timeout(hook.timeout_secs)
        .with_sink(ctx.sink.clone());

    match runner.run(&spec, &config, cancel).await {
        Ok(result) if result.success() => Ok(Ok(())),
        Ok(result) => {
            let detail = result
                .last_error_line()
                .map(|line| format!(": {}", line))
                .unwrap_or_default();
            Ok(Err(format!("exit code {}{}", result.exit_code, detail)))
        }
        Err(RunnerError::Cancelled) => Err(ExecError::Cancelled),
        Err(e) => Ok(Err(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrakit_runner::{MockResponse, MockRunner};

    fn ctx<'a>(env: &'a BTreeMap<String, String>) -> HookContext<'a> {
        HookContext {
            operation: "apply",
            working_dir: Path::new("/infra"),
            env,
            sink: None,
        }
    }

    #[test]
    fn test_policy_deserializes_kebab_case() {
        let hook: Hook = serde_yaml::from_str(
            "name: notify\nphase: after\ncommand: ./notify.sh\non_failure: retry-once\n",
        )
        .unwrap();
        assert_eq!(hook.on_failure, HookFailurePolicy::RetryOnce);
        assert_eq!(hook.phase, HookPhase::After);
        assert!(hook.args.is_empty());
    }

    #[tokio::test]
    async fn test_hooks_run_in_registration_order_with_overlays() {
        let runner = MockRunner::new();
        let pipeline = HookPipeline::with_hooks(vec![
            Hook::before("first", "lint").arg("--strict").env("LEVEL", "1"),
            Hook::after("ignored", "notify"),
            Hook::before("second", "scan").working_dir("/tmp/scan"),
        ]);
        let mut env = BTreeMap::new();
        env.insert("LEVEL".to_string(), "0".to_string());
        env.insert("TF_IN_AUTOMATION".to_string(), "true".to_string());

        pipeline
            .run_phase(HookPhase::Before, &runner, &ctx(&env), &CancellationToken::new())
            .await
            .unwrap();

        let calls = runner.get_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].program, "lint");
        assert_eq!(calls[0].args, vec!["--strict"]);
        assert_eq!(calls[0].env.get("LEVEL"), Some(&"1".to_string()));
        assert_eq!(calls[0].env.get("TERRAKIT_HOOK_PHASE"), Some(&"before".to_string()));
        assert_eq!(calls[0].working_dir, Some(PathBuf::from("/infra")));
        assert_eq!(calls[1].program, "scan");
        assert_eq!(calls[1].working_dir, Some(PathBuf::from("/tmp/scan")));
    }

    #[tokio::test]
    async fn test_continue_policy_proceeds() {
        let runner = MockRunner::new()
            .on("flaky", MockResponse::failure(1, "boom"))
            .on("next", MockResponse::success(""));
        let pipeline = HookPipeline::with_hooks(vec![
            Hook::before("flaky", "flaky").policy(HookFailurePolicy::Continue),
            Hook::before("next", "next"),
        ]);
        let env = BTreeMap::new();

        pipeline
            .run_phase(HookPhase::Before, &runner, &ctx(&env), &CancellationToken::new())
            .await
            .unwrap();

        assert!(runner.was_called("next"));
    }

    #[tokio::test]
    async fn test_abort_policy_stops_pipeline() {
        let runner = MockRunner::new().on("check", MockResponse::failure(2, "Error: drift"));
        let pipeline = HookPipeline::with_hooks(vec![
            Hook::before("check", "check"),
            Hook::before("never", "never"),
        ]);
        let env = BTreeMap::new();

        let err = pipeline
            .run_phase(HookPhase::Before, &runner, &ctx(&env), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ExecError::Hook(HookError::Failed { name, phase, reason }) => {
                assert_eq!(name, "check");
                assert_eq!(phase, HookPhase::Before);
                assert_eq!(reason, "exit code 2: Error: drift");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!runner.was_called("never"));
    }

    #[tokio::test]
    async fn test_retry_once_recovers() {
        let runner = MockRunner::new()
            .on("sync", MockResponse::failure(1, "busy"))
            .on("sync", MockResponse::success(""));
        let pipeline = HookPipeline::with_hooks(vec![
            Hook::after("sync", "sync").policy(HookFailurePolicy::RetryOnce)
        ]);
        let env = BTreeMap::new();

        pipeline
            .run_phase(HookPhase::After, &runner, &ctx(&env), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(runner.call_count(), 2);
    }

    #[tokio::test]
    async fn test_retry_once_then_abort() {
        let runner = MockRunner::new().on("sync", MockResponse::failure(1, "busy"));
        let pipeline = HookPipeline::with_hooks(vec![
            Hook::after("sync", "sync").policy(HookFailurePolicy::RetryOnce)
        ]);
        let env = BTreeMap::new();

        let err = pipeline
            .run_phase(HookPhase::After, &runner, &ctx(&env), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExecError::Hook(HookError::FailedAfterRetry { .. })
        ));
        assert_eq!(runner.call_count(), 2);
    }

    #[tokio::test]
    async fn test_error_phase_failures_never_escalate() {
        let runner = MockRunner::new().on("cleanup", MockResponse::failure(1, "nope"));
        let pipeline = HookPipeline::with_hooks(vec![
            Hook::on_error("cleanup", "cleanup"),
            Hook::on_error("report", "report"),
        ]);
        let env = BTreeMap::new();

        pipeline
            .run_phase(HookPhase::Error, &runner, &ctx(&env), &CancellationToken::new())
            .await
            .unwrap();

        assert!(runner.was_called("report"));
    }

    #[tokio::test]
    async fn test_launch_failure_is_a_hook_failure() {
        let runner = MockRunner::new().simulate_failure("no such file");
        let pipeline = HookPipeline::with_hooks(vec![Hook::before("missing", "missing")]);
        let env = BTreeMap::new();

        let err = pipeline
            .run_phase(HookPhase::Before, &runner, &ctx(&env), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("before hook 'missing' failed"));
    }
}
