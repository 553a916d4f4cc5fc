//! File-based executor configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ExecError, ExecResult};
use crate::executor::ExecutorBuilder;
use crate::hooks::Hook;
use crate::options::Defaults;
use crate::retry::RetrySettings;

/// Executor settings as stored in YAML.
///
/// ```yaml
/// terraform_path: /usr/local/bin/terraform
/// working_dir: envs/dev
/// parallelism: 20
/// var_files: [common.tfvars]
/// vars:
///   region: europe-west1
/// lock_timeout_secs: 60
/// retry:
///   max_attempts: 5
/// hooks:
///   - name: lint
///     phase: before
///     command: tflint
///     on_failure: continue
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    pub terraform_path: String,
    pub working_dir: PathBuf,
    pub parallelism: Option<u32>,
    pub var_files: Vec<String>,
    pub vars: BTreeMap<String, String>,
    pub targets: Vec<String>,
    pub backend_config: BTreeMap<String, String>,
    pub lock_timeout_secs: Option<u64>,
    pub plugin_cache_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub color: bool,
    pub dry_run: bool,
    pub auto_approve: bool,
    /// Per-invocation timeout in seconds (0 = none).
    pub timeout_secs: u64,
    pub retry: RetrySettings,
    pub hooks: Vec<Hook>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            terraform_path: "terraform".to_string(),
            working_dir: PathBuf::from("."),
            parallelism: None,
            var_files: Vec::new(),
            vars: BTreeMap::new(),
            targets: Vec::new(),
            backend_config: BTreeMap::new(),
            lock_timeout_secs: None,
            plugin_cache_dir: None,
            env: BTreeMap::new(),
            color: false,
            dry_run: false,
            auto_approve: false,
            timeout_secs: 0,
            retry: RetrySettings::default(),
            hooks: Vec::new(),
        }
    }
}

impl ExecutorSettings {
    /// Load settings from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> ExecResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExecError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let settings = Self::from_yaml(&content)?;
        debug!(path = %path.display(), hooks = settings.hooks.len(), "Loaded executor settings");
        Ok(settings)
    }

    pub fn from_yaml(content: &str) -> ExecResult<Self> {
        let settings: Self = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> ExecResult<()> {
        if self.terraform_path.trim().is_empty() {
            return Err(ExecError::Config("terraform_path must not be empty".to_string()));
        }
        if let Some(hook) = self.hooks.iter().find(|h| h.command.trim().is_empty()) {
            return Err(ExecError::Config(format!(
                "hook '{}' has no command",
                hook.name
            )));
        }
        if self.retry.backoff_factor <= 0.0 {
            return Err(ExecError::Config("retry.backoff_factor must be positive".to_string()));
        }
        Ok(())
    }

    pub fn defaults(&self) -> Defaults {
        Defaults {
            parallelism: self.parallelism,
            var_files: self.var_files.clone(),
            vars: self.vars.clone(),
            targets: self.targets.clone(),
            backend_config: self.backend_config.clone(),
            lock_timeout: self.lock_timeout_secs.map(Duration::from_secs),
            auto_approve: self.auto_approve,
            ..Defaults::default()
        }
    }

    /// Turn the settings into a builder; runner, sleeper and sink can still
    /// be set on the result.
    pub fn into_builder(self) -> ExecutorBuilder {
        let mut builder = ExecutorBuilder::new()
            .defaults(self.defaults())
            .terraform_path(self.terraform_path)
            .working_dir(self.working_dir)
            .envs(self.env)
            .color(self.color)
            .dry_run(self.dry_run)
            .timeout(self.timeout_secs)
            .retry(self.retry.into())
            .hooks(self.hooks);
        if let Some(dir) = self.plugin_cache_dir {
            builder = builder.plugin_cache_dir(dir);
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{HookFailurePolicy, HookPhase};
    use crate::retry::RetryConfig;

    #[test]
    fn test_defaults_from_empty_document() {
        let settings = ExecutorSettings::from_yaml("{}").unwrap();
        assert_eq!(settings, ExecutorSettings::default());
        assert_eq!(RetryConfig::from(settings.retry), RetryConfig::default());
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
terraform_path: /opt/terraform
working_dir: envs/dev
parallelism: 4
var_files: [common.tfvars]
vars:
  region: europe-west1
lock_timeout_secs: 90
retry:
  max_attempts: 5
  initial_backoff_ms: 250
hooks:
  - name: lint
    phase: before
    command: tflint
    args: [--recursive]
    on_failure: continue
"#;
        let settings = ExecutorSettings::from_yaml(yaml).unwrap();
        assert_eq!(settings.terraform_path, "/opt/terraform");
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.max_backoff_ms, 30_000);
        assert_eq!(settings.hooks[0].phase, HookPhase::Before);
        assert_eq!(settings.hooks[0].on_failure, HookFailurePolicy::Continue);

        let defaults = settings.defaults();
        assert_eq!(defaults.parallelism, Some(4));
        assert_eq!(defaults.lock_timeout, Some(Duration::from_secs(90)));
        assert_eq!(defaults.vars["region"], "europe-west1");
    }

    #[test]
    fn test_hook_without_command_is_rejected() {
        let yaml = "hooks:\n  - name: empty\n    phase: after\n    command: ''\n";
        assert!(matches!(
            ExecutorSettings::from_yaml(yaml),
            Err(ExecError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terrakit.yaml");
        std::fs::write(&path, "dry_run: true\ncolor: true\n").unwrap();

        let settings = ExecutorSettings::load(&path).unwrap();
        assert!(settings.dry_run);
        assert!(settings.color);

        assert!(ExecutorSettings::load(dir.path().join("missing.yaml")).is_err());
    }
}
