//! terrakit CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Validation failure
//! - 4: State cache error
//! - 5: Provisioning tool error

use std::process::ExitCode;

use clap::Parser;
use terrakit_exec::ExecError;
use terrakit_state::StateError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;

use commands::{Cli, Commands, StateCommands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const VALIDATION_FAILURE: u8 = 3;
    pub const STATE_ERROR: u8 = 4;
    pub const TOOL_ERROR: u8 = 5;
}

/// Raised by commands whose check ran fine but found problems.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ValidationFailure(pub String);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Plan(args) => commands::plan::execute(&cli.global, args).await,
        Commands::Apply(args) => commands::apply::execute(&cli.global, args).await,
        Commands::Destroy(args) => commands::apply::destroy(&cli.global, args).await,
        Commands::Validate(args) => commands::validate::execute(&cli.global, args).await,
        Commands::Fmt(args) => commands::fmt::execute(&cli.global, args).await,
        Commands::Output(args) => commands::output::execute(&cli.global, args).await,
        Commands::State(command) => match command {
            StateCommands::Pull(args) => commands::state::pull(&cli.global, args).await,
            StateCommands::Diff(args) => commands::state::diff(&cli.global, args),
            StateCommands::Merge(args) => commands::state::merge(&cli.global, args),
            StateCommands::Validate(args) => commands::state::validate(&cli.global, args),
        },
        Commands::Version(args) => commands::version::execute(&cli.global, args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// `RUST_LOG` wins; otherwise terrakit logs at info (debug with `--verbose`,
/// warn with `--quiet`) and everything else at warn.
fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("terrakit={level},warn")));

    // Already initialized when embedded in a test harness.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if e.downcast_ref::<ValidationFailure>().is_some() {
        return ExitCodes::VALIDATION_FAILURE;
    }
    if let Some(err) = e.downcast_ref::<ExecError>() {
        return match err {
            ExecError::InvalidArguments(_) | ExecError::Config(_) => ExitCodes::INVALID_ARGS,
            ExecError::State(_) => ExitCodes::STATE_ERROR,
            ExecError::Cancelled => ExitCodes::GENERAL_ERROR,
            _ => ExitCodes::TOOL_ERROR,
        };
    }
    if e.downcast_ref::<StateError>().is_some() {
        return ExitCodes::STATE_ERROR;
    }
    ExitCodes::GENERAL_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_categorize_error() {
        let invalid = anyhow::Error::from(ExecError::InvalidArguments("bad".into()));
        assert_eq!(categorize_error(&invalid), ExitCodes::INVALID_ARGS);

        let failed = anyhow::Error::from(ExecError::CommandFailed {
            command: "terraform apply".into(),
            exit_code: 1,
            stderr: "boom".into(),
        });
        assert_eq!(categorize_error(&failed), ExitCodes::TOOL_ERROR);

        let missing: anyhow::Result<()> =
            Err(StateError::NotFound("dev".into())).context("loading dev");
        assert_eq!(categorize_error(&missing.unwrap_err()), ExitCodes::STATE_ERROR);

        let findings = anyhow::Error::from(ValidationFailure("2 errors".into()));
        assert_eq!(categorize_error(&findings), ExitCodes::VALIDATION_FAILURE);

        assert_eq!(
            categorize_error(&anyhow::anyhow!("something else")),
            ExitCodes::GENERAL_ERROR
        );
    }
}
