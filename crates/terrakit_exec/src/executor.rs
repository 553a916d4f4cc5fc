//! The executor: drives one operation from typed request to typed result.
//!
//! Each call moves through argument rendering, `before` hooks, the retried
//! invocation, and then `after` or `error` hooks. Output is parsed only for
//! operations whose output callers consume.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use terrakit_runner::{
    CommandRunner, CommandSpec, ExecutionResult, LogHandler, ProcessRunner, RunConfig,
};
use terrakit_state::{State, StateResource};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::args::CommandBuilder;
use crate::error::{ExecError, ExecResult};
use crate::hooks::{Hook, HookContext, HookPhase, HookPipeline};
use crate::options::*;
use crate::results::*;
use crate::retry::{run_with_retry, RetryConfig, Sleeper, TokioSleeper};
use crate::version::{detect_version, ToolVersion};

/// Everything an invocation needs to know about where and how to run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub terraform_path: String,
    pub working_dir: PathBuf,
    /// Caller environment overlay; the automation variables are added on top.
    pub env: BTreeMap<String, String>,
    pub color: bool,
    pub plugin_cache_dir: Option<PathBuf>,
    pub version: ToolVersion,
}

impl ExecutionContext {
    /// Environment passed to the tool and to hooks.
    pub fn env_overlay(&self) -> BTreeMap<String, String> {
        automation_env(&self.env, self.plugin_cache_dir.as_deref())
    }
}

fn automation_env(
    env: &BTreeMap<String, String>,
    plugin_cache_dir: Option<&Path>,
) -> BTreeMap<String, String> {
    let mut env = env.clone();
    env.insert("TF_IN_AUTOMATION".to_string(), "true".to_string());
    env.insert("TF_INPUT".to_string(), "false".to_string());
    if let Some(dir) = plugin_cache_dir {
        env.insert(
            "TF_PLUGIN_CACHE_DIR".to_string(),
            dir.to_string_lossy().into_owned(),
        );
    }
    env
}

/// Output of [`Executor::execute`], one variant per result shape.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    /// A streamed operation finished successfully.
    Completed,
    /// A mutating operation was skipped in dry-run mode.
    DryRun { command: String },
    Plan(PlanResult),
    Validate(ValidateResult),
    Output(OutputResult),
    Show(ShowResult),
    StateList(Vec<String>),
    StateShow(StateResource),
    /// `None` when there is no state yet.
    StatePull(Option<State>),
    Workspace(WorkspaceResult),
    Fmt(FormatResult),
    Graph(String),
    Providers(ProvidersResult),
    Test(TestResult),
}

/// Builder for [`Executor`].
pub struct ExecutorBuilder {
    terraform_path: String,
    working_dir: PathBuf,
    env: BTreeMap<String, String>,
    defaults: Defaults,
    retry: RetryConfig,
    hooks: HookPipeline,
    runner: Option<Arc<dyn CommandRunner>>,
    sleeper: Arc<dyn Sleeper>,
    sink: Option<LogHandler>,
    color: bool,
    dry_run: bool,
    plugin_cache_dir: Option<PathBuf>,
    timeout_secs: u64,
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self {
            terraform_path: "terraform".to_string(),
            working_dir: PathBuf::from("."),
            env: BTreeMap::new(),
            defaults: Defaults::default(),
            retry: RetryConfig::default(),
            hooks: HookPipeline::new(),
            runner: None,
            sleeper: Arc::new(TokioSleeper),
            sink: None,
            color: false,
            dry_run: false,
            plugin_cache_dir: None,
            timeout_secs: 0,
        }
    }
}

impl ExecutorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terraform_path(mut self, path: impl Into<String>) -> Self {
        self.terraform_path = path.into();
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, env: BTreeMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    /// Replace all executor-level defaults.
    pub fn defaults(mut self, defaults: Defaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn parallelism(mut self, n: u32) -> Self {
        self.defaults.parallelism = Some(n);
        self
    }

    pub fn var_file(mut self, path: impl Into<String>) -> Self {
        self.defaults.var_files.push(path.into());
        self
    }

    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.vars.insert(key.into(), value.into());
        self
    }

    pub fn target(mut self, address: impl Into<String>) -> Self {
        self.defaults.targets.push(address.into());
        self
    }

    pub fn backend_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.backend_config.insert(key.into(), value.into());
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.defaults.lock_timeout = Some(timeout);
        self
    }

    pub fn auto_approve(mut self, enabled: bool) -> Self {
        self.defaults.auto_approve = enabled;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn hook(mut self, hook: Hook) -> Self {
        self.hooks.register(hook);
        self
    }

    pub fn hooks(mut self, hooks: impl IntoIterator<Item = Hook>) -> Self {
        for hook in hooks {
            self.hooks.register(hook);
        }
        self
    }

    pub fn runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Destination for streamed and mirrored output lines.
    pub fn sink(mut self, sink: LogHandler) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn color(mut self, enabled: bool) -> Self {
        self.color = enabled;
        self
    }

    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub fn plugin_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_cache_dir = Some(dir.into());
        self
    }

    /// Per-invocation timeout in seconds (0 = none).
    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Detect the tool version and build the executor.
    pub async fn build(self) -> ExecResult<Executor> {
        let runner = self
            .runner
            .unwrap_or_else(|| Arc::new(ProcessRunner::default()) as Arc<dyn CommandRunner>);

        let version = detect_version(
            runner.as_ref(),
            &self.terraform_path,
            &self.working_dir,
            &automation_env(&self.env, self.plugin_cache_dir.as_deref()),
            &CancellationToken::new(),
        )
        .await?;

        let context = ExecutionContext {
            terraform_path: self.terraform_path,
            working_dir: self.working_dir,
            env: self.env,
            color: self.color,
            plugin_cache_dir: self.plugin_cache_dir,
            version,
        };

        Ok(Executor {
            context: RwLock::new(context),
            defaults: self.defaults,
            retry: self.retry,
            hooks: self.hooks,
            runner,
            sleeper: self.sleeper,
            sink: self.sink,
            dry_run: self.dry_run,
            timeout_secs: self.timeout_secs,
        })
    }
}

/// Runs provisioning operations in one working directory.
pub struct Executor {
    context: RwLock<ExecutionContext>,
    defaults: Defaults,
    retry: RetryConfig,
    hooks: HookPipeline,
    runner: Arc<dyn CommandRunner>,
    sleeper: Arc<dyn Sleeper>,
    sink: Option<LogHandler>,
    dry_run: bool,
    timeout_secs: u64,
}

macro_rules! parsed_operation {
    ($(#[$meta:meta])* $method:ident($opts:ty) => $request:ident, $variant:ident -> $out:ty) => {
        $(#[$meta])*
        pub async fn $method(
            &self,
            options: $opts,
            cancel: &CancellationToken,
        ) -> ExecResult<$out> {
            match self.execute(OperationRequest::$request(options), cancel).await? {
                OperationOutput::$variant(result) => Ok(result),
                other => Err(unexpected(stringify!($method), &other)),
            }
        }
    };
}

macro_rules! streamed_operation {
    ($(#[$meta:meta])* $method:ident($opts:ty) => $request:ident) => {
        $(#[$meta])*
        pub async fn $method(&self, options: $opts, cancel: &CancellationToken) -> ExecResult<()> {
            self.execute(OperationRequest::$request(options), cancel)
                .await
                .map(|_| ())
        }
    };
}

impl Executor {
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::new()
    }

    pub fn working_dir(&self) -> PathBuf {
        self.context.read().working_dir.clone()
    }

    pub fn set_working_dir(&self, dir: impl Into<PathBuf>) {
        self.context.write().working_dir = dir.into();
    }

    pub fn env(&self) -> BTreeMap<String, String> {
        self.context.read().env.clone()
    }

    pub fn set_env(&self, key: impl Into<String>, value: impl Into<String>) {
        self.context.write().env.insert(key.into(), value.into());
    }

    pub fn remove_env(&self, key: &str) -> Option<String> {
        self.context.write().env.remove(key)
    }

    pub fn version(&self) -> ToolVersion {
        self.context.read().version.clone()
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Render `request` into the full command line without running it.
    pub fn render(&self, request: &OperationRequest) -> ExecResult<CommandSpec> {
        let context = self.context.read().clone();
        self.command_spec(&context, request)
    }

    /// Run any operation and parse its output.
    pub async fn execute(
        &self,
        request: OperationRequest,
        cancel: &CancellationToken,
    ) -> ExecResult<OperationOutput> {
        let context = self.context.read().clone();
        let spec = self.command_spec(&context, &request)?;

        if self.dry_run && request.is_mutating() {
            let command = spec.display_command();
            info!("[DRY-RUN] {}", command);
            return Ok(OperationOutput::DryRun { command });
        }

        info!(operation = request.name(), dir = %context.working_dir.display(), "Executing");
        debug!(command = %spec, "Rendered command");

        let env = spec.env.clone();
        let hook_ctx = HookContext {
            operation: request.name(),
            working_dir: &context.working_dir,
            env: &env,
            sink: self.sink.clone(),
        };

        self.hooks
            .run_phase(HookPhase::Before, self.runner.as_ref(), &hook_ctx, cancel)
            .await?;

        let config = self.run_config(request.output_mode());
        let outcome = {
            let (spec, config, request) = (&spec, &config, &request);
            run_with_retry(&self.retry, self.sleeper.as_ref(), cancel, move |attempt| {
                self.invoke(spec, config, request, attempt, cancel)
            })
            .await
        };

        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                if !err.is_cancelled() {
                    warn!(operation = request.name(), error = %err, "Operation failed");
                    self.hooks
                        .run_phase(HookPhase::Error, self.runner.as_ref(), &hook_ctx, cancel)
                        .await?;
                }
                return Err(err);
            }
        };

        self.hooks
            .run_phase(HookPhase::After, self.runner.as_ref(), &hook_ctx, cancel)
            .await?;

        parse_output(&request, &result)
    }

    fn command_spec(
        &self,
        context: &ExecutionContext,
        request: &OperationRequest,
    ) -> ExecResult<CommandSpec> {
        let args = CommandBuilder::new(&self.defaults, context.color).build(request)?;
        Ok(CommandSpec::new(&context.terraform_path)
            .args(args)
            .working_dir(&context.working_dir)
            .envs(context.env_overlay()))
    }

    fn run_config(&self, mode: OutputMode) -> RunConfig {
        let config = match mode {
            OutputMode::Streamed => RunConfig::streamed(),
            OutputMode::Mirrored => RunConfig::mirrored(),
            OutputMode::Captured => RunConfig::captured(),
        };
        config
            .timeout(self.timeout_secs)
            .with_sink(self.sink.clone())
    }

    async fn invoke(
        &self,
        spec: &CommandSpec,
        config: &RunConfig,
        request: &OperationRequest,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> ExecResult<ExecutionResult> {
        if attempt > 1 {
            debug!(attempt, operation = request.name(), "Retrying");
        }
        let result = self.runner.run(spec, config, cancel).await?;

        if result.success()
            || request.accepted_exit_codes().contains(&result.exit_code)
            || reports_diagnostics(request, &result)
        {
            return Ok(result);
        }

        let stderr = result.stderr.trim();
        Err(ExecError::CommandFailed {
            command: format!("{} {}", tool_name(&spec.program), request.name()),
            exit_code: result.exit_code,
            stderr: if stderr.is_empty() {
                "no error output".to_string()
            } else {
                stderr.to_string()
            },
        })
    }

    streamed_operation! {
        /// Initialize the working directory.
        init(InitOptions) => Init
    }

    parsed_operation! {
        /// Plan changes. With detailed exit codes, exit code 2 is a successful
        /// plan with changes.
        plan(PlanOptions) => Plan, Plan -> PlanResult
    }

    streamed_operation! { apply(ApplyOptions) => Apply }
    streamed_operation! { destroy(DestroyOptions) => Destroy }
    streamed_operation! { refresh(RefreshOptions) => Refresh }

    parsed_operation! { validate(ValidateOptions) => Validate, Validate -> ValidateResult }
    parsed_operation! { output(OutputOptions) => Output, Output -> OutputResult }
    parsed_operation! { show(ShowOptions) => Show, Show -> ShowResult }

    streamed_operation! { import(ImportOptions) => Import }

    parsed_operation! { state_list(StateListOptions) => StateList, StateList -> Vec<String> }
    parsed_operation! { state_show(StateShowOptions) => StateShow, StateShow -> StateResource }

    streamed_operation! { state_mv(StateMvOptions) => StateMv }
    streamed_operation! { state_rm(StateRmOptions) => StateRm }

    /// Read the current state, `None` if nothing has been stored yet.
    pub async fn state_pull(&self, cancel: &CancellationToken) -> ExecResult<Option<State>> {
        match self.execute(OperationRequest::StatePull, cancel).await? {
            OperationOutput::StatePull(state) => Ok(state),
            other => Err(unexpected("state_pull", &other)),
        }
    }

    pub async fn workspace(
        &self,
        options: WorkspaceOptions,
        cancel: &CancellationToken,
    ) -> ExecResult<WorkspaceResult> {
        match self.execute(OperationRequest::Workspace(options), cancel).await? {
            OperationOutput::Workspace(result) => Ok(result),
            OperationOutput::DryRun { .. } => Ok(WorkspaceResult::default()),
            other => Err(unexpected("workspace", &other)),
        }
    }

    /// Format files. With `-check`, exit code 3 yields `success = false`.
    pub async fn fmt(
        &self,
        options: FmtOptions,
        cancel: &CancellationToken,
    ) -> ExecResult<FormatResult> {
        match self.execute(OperationRequest::Fmt(options), cancel).await? {
            OperationOutput::Fmt(result) => Ok(result),
            OperationOutput::DryRun { .. } => Ok(FormatResult {
                success: true,
                ..FormatResult::default()
            }),
            other => Err(unexpected("fmt", &other)),
        }
    }

    parsed_operation! { graph(GraphOptions) => Graph, Graph -> String }
    parsed_operation! { providers(ProvidersOptions) => Providers, Providers -> ProvidersResult }
    parsed_operation! { test(TestOptions) => Test, Test -> TestResult }
}

/// `validate -json` exits non-zero for invalid configuration but still
/// prints a diagnostics document.
fn reports_diagnostics(request: &OperationRequest, result: &ExecutionResult) -> bool {
    matches!(request, OperationRequest::Validate(opts) if opts.json)
        && ValidateResult::from_json(&result.stdout).is_ok()
}

fn tool_name(program: &str) -> &str {
    Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(program)
}

fn unexpected(operation: &'static str, output: &OperationOutput) -> ExecError {
    ExecError::Parse {
        what: operation,
        message: format!("unexpected result {:?}", output),
    }
}

fn parse_output(
    request: &OperationRequest,
    result: &ExecutionResult,
) -> ExecResult<OperationOutput> {
    let stdout = result.stdout.as_str();
    let output = match request {
        OperationRequest::Init(_)
        | OperationRequest::Apply(_)
        | OperationRequest::Destroy(_)
        | OperationRequest::Refresh(_)
        | OperationRequest::Import(_)
        | OperationRequest::StateMv(_)
        | OperationRequest::StateRm(_) => OperationOutput::Completed,

        OperationRequest::Plan(opts) => {
            let mut plan = PlanResult::parse(stdout, &result.stderr);
            if opts.detailed_exit_code {
                plan.has_changes = result.exit_code == 2;
            }
            OperationOutput::Plan(plan)
        }

        OperationRequest::Validate(opts) => OperationOutput::Validate(if opts.json {
            ValidateResult::from_json(stdout)?
        } else {
            ValidateResult::from_text(result.exit_code, &result.combined_output())
        }),

        OperationRequest::Output(opts) => {
            let json = opts.json && !opts.raw;
            OperationOutput::Output(OutputResult::parse(opts.name.as_deref(), json, stdout)?)
        }

        OperationRequest::Show(opts) => OperationOutput::Show(ShowResult::parse(opts.json, stdout)?),

        OperationRequest::StateList(_) => OperationOutput::StateList(parse_state_list(stdout)),

        OperationRequest::StateShow(opts) => {
            OperationOutput::StateShow(parse_state_show(&opts.address, stdout))
        }

        OperationRequest::StatePull => OperationOutput::StatePull(if stdout.trim().is_empty() {
            None
        } else {
            Some(State::from_slice(stdout.as_bytes())?)
        }),

        OperationRequest::Workspace(opts) => OperationOutput::Workspace(match &opts.command {
            WorkspaceCommand::List => WorkspaceResult::parse_list(stdout),
            WorkspaceCommand::Show => WorkspaceResult::parse_show(stdout),
            WorkspaceCommand::New(name) | WorkspaceCommand::Select(name) => WorkspaceResult {
                current: Some(name.clone()),
                workspaces: Vec::new(),
            },
            WorkspaceCommand::Delete(_) => WorkspaceResult::default(),
        }),

        OperationRequest::Fmt(opts) => OperationOutput::Fmt(FormatResult::parse(
            result.success(),
            opts.list,
            opts.diff,
            stdout,
        )),

        OperationRequest::Graph(_) => OperationOutput::Graph(stdout.to_string()),

        OperationRequest::Providers(_) => OperationOutput::Providers(ProvidersResult::parse(stdout)),

        OperationRequest::Test(opts) => {
            OperationOutput::Test(TestResult::parse(result.success(), opts.json, stdout))
        }
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ExecutionContext {
        ExecutionContext {
            terraform_path: "/usr/local/bin/terraform".to_string(),
            working_dir: PathBuf::from("/infra"),
            env: BTreeMap::from([("TF_INPUT".to_string(), "true".to_string())]),
            color: false,
            plugin_cache_dir: Some(PathBuf::from("/cache/plugins")),
            version: ToolVersion::new(semver::Version::new(1, 6, 0)),
        }
    }

    #[test]
    fn test_env_overlay_forces_automation() {
        let env = context().env_overlay();
        assert_eq!(env["TF_IN_AUTOMATION"], "true");
        assert_eq!(env["TF_INPUT"], "false");
        assert_eq!(env["TF_PLUGIN_CACHE_DIR"], "/cache/plugins");
    }

    #[test]
    fn test_tool_name() {
        assert_eq!(tool_name("/usr/local/bin/terraform"), "terraform");
        assert_eq!(tool_name("tofu"), "tofu");
    }

    fn executed(exit_code: i32, stdout: &str) -> ExecutionResult {
        let now = chrono::Utc::now();
        ExecutionResult {
            invocation_id: "test".to_string(),
            exit_code,
            stdout: stdout.to_string(),
            stderr: String::new(),
            started_at: now,
            finished_at: now,
            duration_ms: 0,
        }
    }

    #[test]
    fn test_detailed_exit_code_decides_has_changes() {
        let request = OperationRequest::Plan(PlanOptions::new());
        let output = parse_output(&request, &executed(0, "Plan: 1 to add, 0 to change, 0 to destroy.")).unwrap();
        assert!(matches!(output, OperationOutput::Plan(ref p) if !p.has_changes && p.add_count == 1));

        let output = parse_output(&request, &executed(2, "")).unwrap();
        assert!(matches!(output, OperationOutput::Plan(ref p) if p.has_changes));
    }

    #[test]
    fn test_empty_state_pull_is_none() {
        let output = parse_output(&OperationRequest::StatePull, &executed(0, "\n")).unwrap();
        assert_eq!(output, OperationOutput::StatePull(None));
    }

    #[test]
    fn test_validate_json_failure_is_reported_not_raised() {
        let request = OperationRequest::Validate(ValidateOptions::new());
        let result = executed(1, r#"{"valid":false,"error_count":1,"warning_count":0,"diagnostics":[]}"#);
        assert!(reports_diagnostics(&request, &result));
        assert!(!reports_diagnostics(&request, &executed(1, "Error: not initialized")));
    }
}
