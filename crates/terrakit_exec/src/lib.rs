//! # terrakit_exec
//!
//! Drives the Terraform CLI as a subprocess for terrakit.
//!
//! A typed [`OperationRequest`] is rendered into arguments by the
//! [`CommandBuilder`], wrapped in `before`/`after`/`error` [`Hook`]s, run
//! under the retry engine and parsed into a typed result.
//!
//! ## Features
//!
//! - Deterministic argument rendering with executor-level defaults
//! - Exponential backoff for state-lock contention and similar transient errors
//! - Hook pipeline with continue/abort/retry-once failure policies
//! - Dry-run mode for every mutating operation
//! - Parsers for plan, validate, output, show, state, workspace, fmt,
//!   providers and test output
//!
//! ## Example
//!
//! ```rust,no_run
//! use terrakit_exec::{Executor, PlanOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let executor = Executor::builder()
//!         .working_dir("envs/dev")
//!         .var_file("common.tfvars")
//!         .build()
//!         .await?;
//!
//!     let cancel = CancellationToken::new();
//!     let plan = executor
//!         .plan(PlanOptions::new().var("region", "europe-west1"), &cancel)
//!         .await?;
//!     println!(
//!         "{} to add, {} to change, {} to destroy",
//!         plan.add_count, plan.change_count, plan.destroy_count
//!     );
//!
//!     Ok(())
//! }
//! ```

pub mod args;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod options;
pub mod results;
pub mod retry;
pub mod settings;
pub mod version;

pub use args::{format_duration, CommandBuilder};
pub use error::{ExecError, ExecResult, HookError};
pub use executor::{ExecutionContext, Executor, ExecutorBuilder, OperationOutput};
pub use hooks::{Hook, HookContext, HookFailurePolicy, HookPhase, HookPipeline};
pub use options::{
    ApplyOptions, Defaults, DestroyOptions, FmtOptions, GraphOptions, ImportOptions, InitOptions,
    OperationRequest, OutputMode, OutputOptions, PlanOptions, ProvidersOptions, RefreshOptions,
    ShowOptions, StateListOptions, StateMvOptions, StateRmOptions, StateShowOptions, TestOptions,
    ValidateOptions, WorkspaceCommand, WorkspaceOptions,
};
pub use results::{
    parse_state_list, parse_state_show, ChangeAction, ChangeSummary, Diagnostic, DiagnosticRange,
    FormatResult, OutputChange, OutputResult, OutputValue, PlanResult, Position, ProviderInfo,
    ProvidersResult, ResourceChange, Severity, ShowResult, TestCase, TestResult, TestSummary,
    ValidateResult, WorkspaceResult,
};
pub use retry::{
    run_with_retry, RetryConfig, RetrySettings, Sleeper, TokioSleeper, DEFAULT_RETRYABLE_ERRORS,
};
pub use settings::ExecutorSettings;
pub use version::{ToolVersion, MIN_SUPPORTED_VERSION};
