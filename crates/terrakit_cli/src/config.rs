//! CLI configuration file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use terrakit_exec::ExecutorSettings;
use terrakit_state::CacheConfig;
use tracing::debug;

/// File looked up in the current directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "terrakit.yaml";

/// Contents of `terrakit.yaml`: executor settings at the top level plus a
/// `cache` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    #[serde(flatten)]
    pub executor: ExecutorSettings,
    pub cache: CacheConfig,
}

impl CliConfig {
    /// Load `explicit`, or `terrakit.yaml` under `search_dir` when it exists.
    /// With neither, all defaults apply.
    pub fn load(explicit: Option<&Path>, search_dir: &Path) -> Result<Self> {
        let path: Option<PathBuf> = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let candidate = search_dir.join(DEFAULT_CONFIG_FILE);
                candidate.is_file().then_some(candidate)
            }
        };

        let Some(path) = path else {
            debug!("No configuration file, using defaults");
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.executor.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::load(None, dir.path()).unwrap();
        assert_eq!(config.executor, ExecutorSettings::default());
        assert_eq!(config.cache.ttl_secs, 3600);
    }

    #[test]
    fn test_default_file_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            r#"
terraform_path: /opt/bin/terraform
dry_run: true
vars:
  region: europe-west1
cache:
  ttl_secs: 60
  keep_in_memory: false
"#,
        )
        .unwrap();

        let config = CliConfig::load(None, dir.path()).unwrap();
        assert_eq!(config.executor.terraform_path, "/opt/bin/terraform");
        assert!(config.executor.dry_run);
        assert_eq!(config.executor.vars["region"], "europe-west1");
        assert_eq!(config.cache.ttl_secs, 60);
        assert!(!config.cache.keep_in_memory);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(CliConfig::load(Some(&missing), dir.path()).is_err());
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        assert!(CliConfig::from_yaml("terraform_path: ''\n").is_err());
    }
}
