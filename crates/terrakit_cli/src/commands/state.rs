//! State commands - Pull, diff, merge and validate state snapshots.
//!
//! File-based subcommands load their inputs through the state cache, so
//! inputs are validated and snapshots stay within the configured bounds.
//! Each run works in its own subdirectory of the configured cache directory,
//! so concurrent runs never touch each other's snapshots.

use std::io::Write;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use terrakit_state::{StateCache, StateDiff};
use tracing::{debug, info};

use super::{interrupt_token, GlobalArgs};
use crate::ValidationFailure;

#[derive(Args)]
pub struct PullArgs {
    /// Write the state to this file instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct DiffArgs {
    /// Baseline state file
    pub a: PathBuf,

    /// State file compared against the baseline
    pub b: PathBuf,

    /// Print the difference as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct MergeArgs {
    /// State files to merge; the first one is the base
    #[arg(required = true, num_args = 2..)]
    pub inputs: Vec<PathBuf>,

    /// Merged state file
    #[arg(short, long)]
    pub out: PathBuf,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// State files to validate
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// State cache private to this process. Its directory is removed on drop.
struct RunCache {
    cache: StateCache,
    dir: PathBuf,
}

impl Deref for RunCache {
    type Target = StateCache;

    fn deref(&self) -> &StateCache {
        &self.cache
    }
}

impl Drop for RunCache {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            debug!(dir = %self.dir.display(), error = %e, "Failed to remove run cache directory");
        }
    }
}

fn run_dir(cache_dir: &Path) -> PathBuf {
    cache_dir.join(format!("run-{}", std::process::id()))
}

/// Open a per-process cache under the configured cache directory.
fn open_cache(global: &GlobalArgs) -> Result<RunCache> {
    let mut config = global.load_config()?.cache;
    config.cache_dir = run_dir(&config.cache_dir);
    let dir = config.cache_dir.clone();

    let cache = StateCache::new(config).context("Failed to open state cache")?;
    let cache = RunCache { cache, dir };
    // A crashed run with a recycled pid may have left files here.
    cache.purge_orphans()?;
    Ok(cache)
}

fn key_for(path: &Path) -> String {
    path.display().to_string()
}

pub async fn pull(global: &GlobalArgs, args: PullArgs) -> Result<()> {
    let executor = global.executor().await?;
    let state = executor
        .state_pull(&interrupt_token())
        .await?
        .context("No state has been stored yet")?;
    let json = state.to_pretty_json()?;

    match &args.out {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(
                "Pulled state serial {} ({} resources) to {}",
                state.serial,
                state.resources.len(),
                path.display()
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", json)?;
        }
    }
    Ok(())
}

pub fn diff(global: &GlobalArgs, args: DiffArgs) -> Result<()> {
    let cache = open_cache(global)?;
    let (key_a, key_b) = (key_for(&args.a), key_for(&args.b));
    cache
        .import_file(&key_a, &args.a)
        .with_context(|| format!("Failed to load {}", args.a.display()))?;
    cache
        .import_file(&key_b, &args.b)
        .with_context(|| format!("Failed to load {}", args.b.display()))?;

    let diff = cache.compare(&key_a, &key_b)?;
    cache.clear()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&diff)?);
    } else {
        print_diff(&diff);
    }
    Ok(())
}

fn print_diff(diff: &StateDiff) {
    if diff.is_empty() {
        println!("✅ States are identical");
        return;
    }

    println!("📋 {} → {}", diff.key_a, diff.key_b);
    if diff.version_changed {
        println!("   Format or Terraform version changed");
    }
    if diff.serial_changed {
        println!("   Serial changed");
    }
    for address in &diff.added_resources {
        println!("   + {}", address);
    }
    for address in &diff.removed_resources {
        println!("   - {}", address);
    }
    for address in &diff.changed_resources {
        println!("   ~ {}", address);
    }
    for name in &diff.added_outputs {
        println!("   + output.{}", name);
    }
    for name in &diff.removed_outputs {
        println!("   - output.{}", name);
    }
    for name in &diff.changed_outputs {
        println!("   ~ output.{}", name);
    }
}

pub fn merge(global: &GlobalArgs, args: MergeArgs) -> Result<()> {
    let cache = open_cache(global)?;

    let mut keys = Vec::with_capacity(args.inputs.len());
    for path in &args.inputs {
        let key = key_for(path);
        cache
            .import_file(&key, path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        keys.push(key);
    }

    let target = format!("merge:{}", args.out.display());
    let merged = cache.merge(&keys, &target)?;
    cache
        .export_file(&target, &args.out)
        .with_context(|| format!("Failed to write {}", args.out.display()))?;
    cache.clear()?;

    println!(
        "✅ Merged {} states into {} ({} resources, serial {})",
        keys.len(),
        args.out.display(),
        merged.resources.len(),
        merged.serial
    );
    Ok(())
}

pub fn validate(global: &GlobalArgs, args: ValidateArgs) -> Result<()> {
    let cache = open_cache(global)?;

    let mut failed = 0;
    for path in &args.files {
        let key = key_for(path);
        match cache.import_file(&key, path).and_then(|_| cache.validate(&key)) {
            Ok(()) => println!("   ✅ {}", path.display()),
            Err(e) => {
                failed += 1;
                debug!(path = %path.display(), error = %e, "State validation failed");
                println!("   ❌ {}: {}", path.display(), e);
            }
        }
    }
    cache.clear()?;

    if failed > 0 {
        return Err(ValidationFailure(format!(
            "{} of {} state file(s) are invalid",
            failed,
            args.files.len()
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrakit_state::{State, StateResource};

    fn global_with_cache(dir: &Path) -> GlobalArgs {
        let config = dir.join("terrakit.yaml");
        std::fs::write(
            &config,
            format!("cache:\n  cache_dir: {}\n", dir.join("cache").display()),
        )
        .unwrap();
        GlobalArgs {
            config: Some(config),
            ..GlobalArgs::default()
        }
    }

    fn write_state(dir: &Path, name: &str, state: &State) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, state.to_pretty_json().unwrap()).unwrap();
        path
    }

    fn state_with(resources: &[&str], serial: u64) -> State {
        resources
            .iter()
            .fold(State::new("1.6.2", "lineage-1").with_serial(serial), |s, name| {
                s.with_resource(StateResource::new("google_storage_bucket", *name))
            })
    }

    #[test]
    fn test_merge_writes_combined_state() {
        let dir = tempfile::tempdir().unwrap();
        let global = global_with_cache(dir.path());
        let a = write_state(dir.path(), "a.tfstate", &state_with(&["logs"], 3));
        let b = write_state(dir.path(), "b.tfstate", &state_with(&["assets"], 7));
        let out = dir.path().join("merged.tfstate");

        merge(
            &global,
            MergeArgs {
                inputs: vec![a, b],
                out: out.clone(),
            },
        )
        .unwrap();

        let merged = State::from_slice(&std::fs::read(&out).unwrap()).unwrap();
        assert_eq!(merged.resources.len(), 2);
        assert_eq!(merged.serial, 7);
    }

    #[test]
    fn test_runs_leave_other_cache_directories_alone() {
        let dir = tempfile::tempdir().unwrap();
        let global = global_with_cache(dir.path());
        let other_run = dir.path().join("cache").join("run-other");
        std::fs::create_dir_all(&other_run).unwrap();
        let foreign = other_run.join("0123456789ab-0123456789abcdef-1-0.tfstate");
        std::fs::write(&foreign, b"{}").unwrap();

        let a = write_state(dir.path(), "a.tfstate", &state_with(&["logs"], 1));
        let b = write_state(dir.path(), "b.tfstate", &state_with(&["assets"], 2));
        merge(
            &global,
            MergeArgs {
                inputs: vec![a, b],
                out: dir.path().join("merged.tfstate"),
            },
        )
        .unwrap();

        assert!(foreign.exists());
        assert!(!run_dir(&dir.path().join("cache")).exists());
    }

    #[test]
    fn test_diff_accepts_two_files() {
        let dir = tempfile::tempdir().unwrap();
        let global = global_with_cache(dir.path());
        let a = write_state(dir.path(), "a.tfstate", &state_with(&["logs"], 1));
        let b = write_state(dir.path(), "b.tfstate", &state_with(&["logs", "assets"], 2));

        diff(&global, DiffArgs { a, b, json: true }).unwrap();
    }

    #[test]
    fn test_validate_reports_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let global = global_with_cache(dir.path());
        let good = write_state(dir.path(), "good.tfstate", &state_with(&["logs"], 1));
        let bad = dir.path().join("bad.tfstate");
        std::fs::write(&bad, r#"{"version": 99, "terraform_version": "1.6.2", "lineage": "x"}"#)
            .unwrap();

        validate(&global, ValidateArgs { files: vec![good.clone()] }).unwrap();

        let err = validate(&global, ValidateArgs { files: vec![good, bad] }).unwrap_err();
        assert!(err.downcast_ref::<ValidationFailure>().is_some());
    }
}
