//! # terrakit_runner
//!
//! Subprocess execution port for terrakit.
//!
//! Everything terrakit launches (the provisioning tool itself and the
//! hooks around it) goes through the [`CommandRunner`] trait, so the
//! executor can be driven by a real process runner in production and by a
//! scripted mock in tests.
//!
//! # Features
//!
//! - **Process Runner**: tokio child processes with line streaming, timeouts
//!   and cancellation through a `CancellationToken`
//! - **Output Sinks**: forward stdout/stderr lines to a handler while still
//!   capturing them
//! - **Mock Runner**: scripted responses and captured calls for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use terrakit_runner::{CommandRunner, CommandSpec, ProcessRunner, RunConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = ProcessRunner::default();
//!     let spec = CommandSpec::new("terraform").args(["version", "-json"]);
//!
//!     let result = runner
//!         .run(&spec, &RunConfig::captured(), &CancellationToken::new())
//!         .await?;
//!     println!("Exit code: {}", result.exit_code);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod mock;
pub mod process;
pub mod runner;

pub use config::{CommandSpec, RunConfig};
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockResponse, MockRunner};
pub use process::{ProcessRunner, ProcessRunnerOptions};
pub use runner::{CommandRunner, ExecutionResult, LogHandler, LogLine, LogStream};
