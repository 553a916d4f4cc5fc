//! CLI command definitions.
//!
//! Each subcommand is a thin wrapper over the terrakit libraries: it loads
//! the configuration, builds an executor or opens a cache, runs one
//! operation and prints the result.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use terrakit_exec::Executor;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::CliConfig;

pub mod apply;
pub mod fmt;
pub mod output;
pub mod plan;
pub mod state;
pub mod validate;
pub mod version;

/// terrakit - drive Terraform from automation
#[derive(Parser)]
#[command(name = "terrakit")]
#[command(version, about = "terrakit - drive Terraform from automation")]
#[command(long_about = r#"
terrakit runs Terraform as a subprocess with retries on state-lock
contention, before/after/error hooks and parsed results, and keeps
state snapshots in a bounded local cache.

COMMANDS:
  plan            → Plan changes and summarize them
  apply / destroy → Apply or destroy (honors --dry-run)
  validate        → Validate the configuration
  fmt             → Check or rewrite formatting
  output          → Read root module outputs
  state           → Pull, diff, merge and validate state snapshots
  version         → Show the detected Terraform version

CONFIGURATION:
  --config <file> or TERRAKIT_CONFIG, else ./terrakit.yaml when present.
  Command-line flags override file values.

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Validation failure
  4 - State cache error
  5 - Provisioning tool error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Configuration file
    #[arg(long, global = true, env = "TERRAKIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Terraform binary to run
    #[arg(long, global = true, env = "TERRAKIT_TERRAFORM_PATH")]
    pub terraform_path: Option<String>,

    /// Terraform working directory
    #[arg(short = 'C', long = "dir", global = true, env = "TERRAKIT_DIR")]
    pub dir: Option<PathBuf>,

    /// Print mutating commands instead of running them
    #[arg(long, global = true)]
    pub dry_run: bool,
}

impl GlobalArgs {
    /// Load the configuration file and apply command-line overrides.
    pub fn load_config(&self) -> Result<CliConfig> {
        let cwd = std::env::current_dir()?;
        let mut config = CliConfig::load(self.config.as_deref(), &cwd)?;

        if let Some(path) = &self.terraform_path {
            config.executor.terraform_path = path.clone();
        }
        if let Some(dir) = &self.dir {
            config.executor.working_dir = dir.clone();
        }
        config.executor.dry_run |= self.dry_run;
        Ok(config)
    }

    /// Build an executor from the configuration. Fails when the tool is
    /// missing or too old.
    pub async fn executor(&self) -> Result<Executor> {
        let config = self.load_config()?;
        let executor = config
            .executor
            .into_builder()
            .build()
            .await
            .context("Failed to initialize terraform executor")?;
        Ok(executor)
    }
}

/// Variable and targeting flags shared by plan, apply and destroy.
#[derive(Args, Debug, Clone, Default)]
pub struct VarArgs {
    /// Set a variable, repeatable
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub vars: Vec<(String, String)>,

    /// Load variables from a file, repeatable
    #[arg(long = "var-file", value_name = "FILE")]
    pub var_files: Vec<String>,

    /// Limit the operation to a resource address, repeatable
    #[arg(long = "target", value_name = "ADDRESS")]
    pub targets: Vec<String>,
}

impl VarArgs {
    pub fn vars(&self) -> Option<BTreeMap<String, String>> {
        (!self.vars.is_empty()).then(|| self.vars.iter().cloned().collect())
    }

    pub fn var_files(&self) -> Option<Vec<String>> {
        (!self.var_files.is_empty()).then(|| self.var_files.clone())
    }

    pub fn targets(&self) -> Option<Vec<String>> {
        (!self.targets.is_empty()).then(|| self.targets.clone())
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

/// A token cancelled on Ctrl-C. Cancellation kills the running subprocess
/// and interrupts retry backoff.
pub fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            trigger.cancel();
        }
    });
    token
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plan changes
    Plan(plan::PlanArgs),

    /// Apply changes
    Apply(apply::ApplyArgs),

    /// Destroy managed infrastructure
    Destroy(apply::DestroyArgs),

    /// Validate the configuration
    Validate(validate::ValidateArgs),

    /// Check or rewrite formatting
    Fmt(fmt::FmtArgs),

    /// Read outputs
    Output(output::OutputArgs),

    /// Work with state snapshots
    #[command(subcommand)]
    State(StateCommands),

    /// Show the detected Terraform version
    Version(version::VersionArgs),
}

#[derive(Subcommand)]
pub enum StateCommands {
    /// Pull the current state, optionally into the cache
    Pull(state::PullArgs),

    /// Compare two state files
    Diff(state::DiffArgs),

    /// Merge state files into one
    Merge(state::MergeArgs),

    /// Validate state files
    Validate(state::ValidateArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("region=europe-west1").unwrap(),
            ("region".to_string(), "europe-west1".to_string())
        );
        assert_eq!(
            parse_key_val("tags={a=1}").unwrap(),
            ("tags".to_string(), "{a=1}".to_string())
        );
        assert!(parse_key_val("region").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn test_plan_flags() {
        let cli = Cli::try_parse_from([
            "terrakit",
            "--dry-run",
            "-C",
            "envs/dev",
            "plan",
            "--var",
            "env=dev",
            "--var",
            "region=eu",
            "--target",
            "module.net",
        ])
        .unwrap();

        assert!(cli.global.dry_run);
        assert_eq!(cli.global.dir, Some(PathBuf::from("envs/dev")));
        let Commands::Plan(args) = cli.command else {
            panic!("expected plan");
        };
        let vars = args.vars.vars().unwrap();
        assert_eq!(vars["env"], "dev");
        assert_eq!(vars["region"], "eu");
        assert_eq!(args.vars.targets(), Some(vec!["module.net".to_string()]));
        assert_eq!(args.vars.var_files(), None);
    }

    #[test]
    fn test_state_subcommands() {
        let cli =
            Cli::try_parse_from(["terrakit", "state", "diff", "a.tfstate", "b.tfstate"]).unwrap();
        assert!(matches!(cli.command, Commands::State(StateCommands::Diff(_))));

        assert!(Cli::try_parse_from(["terrakit", "state", "merge", "a.tfstate"]).is_err());
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["terrakit", "-v", "-q", "version"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "terraform_path: /usr/bin/terraform\nworking_dir: envs/prod\n")
            .unwrap();

        let global = GlobalArgs {
            config: Some(path),
            terraform_path: None,
            dir: Some(PathBuf::from("envs/dev")),
            dry_run: true,
        };
        let config = global.load_config().unwrap();
        assert_eq!(config.executor.terraform_path, "/usr/bin/terraform");
        assert_eq!(config.executor.working_dir, PathBuf::from("envs/dev"));
        assert!(config.executor.dry_run);
    }
}
