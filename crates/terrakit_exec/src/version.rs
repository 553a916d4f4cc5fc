//! Tool version detection.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;
use serde::Deserialize;
use terrakit_runner::{CommandRunner, CommandSpec, RunConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ExecError, ExecResult};

/// Oldest release whose CLI flags and JSON output the executor relies on.
pub const MIN_SUPPORTED_VERSION: Version = Version::new(0, 12, 0);

static BANNER_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Terraform v(\d+\.\d+\.\d+\S*)").expect("valid regex"));

/// Detected version of the provisioning tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolVersion {
    pub version: Version,
    pub platform: Option<String>,
    pub provider_selections: BTreeMap<String, String>,
    pub outdated: bool,
}

impl ToolVersion {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            platform: None,
            provider_selections: BTreeMap::new(),
            outdated: false,
        }
    }

    /// Parse the output of `version -json`.
    pub fn from_json(output: &str) -> ExecResult<Self> {
        #[derive(Deserialize)]
        struct Raw {
            terraform_version: String,
            #[serde(default)]
            platform: Option<String>,
            #[serde(default)]
            provider_selections: BTreeMap<String, String>,
            #[serde(default)]
            terraform_outdated: bool,
        }

        let raw: Raw = serde_json::from_str(output.trim())?;
        let version = parse_version(&raw.terraform_version)?;
        Ok(Self {
            version,
            platform: raw.platform,
            provider_selections: raw.provider_selections,
            outdated: raw.terraform_outdated,
        })
    }

    /// Parse the free-text banner printed by `version`.
    pub fn from_banner(output: &str) -> ExecResult<Self> {
        let captured = BANNER_VERSION
            .captures(output)
            .and_then(|c| c.get(1))
            .ok_or_else(|| {
                ExecError::VersionDetection("no version found in version banner".to_string())
            })?;
        Ok(Self::new(parse_version(captured.as_str())?))
    }

    pub fn ensure_supported(&self) -> ExecResult<()> {
        if self.version < MIN_SUPPORTED_VERSION {
            return Err(ExecError::UnsupportedVersion(format!(
                "{} is older than {}",
                self.version, MIN_SUPPORTED_VERSION
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.version)
    }
}

fn parse_version(text: &str) -> ExecResult<Version> {
    let trimmed = text.trim().trim_start_matches('v');
    Version::parse(trimmed)
        .map_err(|e| ExecError::VersionDetection(format!("invalid version '{}': {}", trimmed, e)))
}

/// Ask the tool for its version, preferring structured output.
pub async fn detect_version(
    runner: &dyn CommandRunner,
    program: &str,
    working_dir: &Path,
    env: &BTreeMap<String, String>,
    cancel: &CancellationToken,
) -> ExecResult<ToolVersion> {
    let base = CommandSpec::new(program)
        .working_dir(working_dir)
        .envs(env.iter().map(|(k, v)| (k.clone(), v.clone())));
    let config = RunConfig::captured().timeout(30);

    let json = runner
        .run(&base.clone().args(["version", "-json"]), &config, cancel)
        .await?;
    if json.success() {
        match ToolVersion::from_json(&json.stdout) {
            Ok(version) => return finish(version),
            Err(e) => debug!(error = %e, "Structured version output unusable, trying banner"),
        }
    }

    let text = runner.run(&base.arg("version"), &config, cancel).await?;
    if !text.success() {
        return Err(ExecError::VersionDetection(format!(
            "`{} version` exited with code {}: {}",
            program,
            text.exit_code,
            text.last_error_line().unwrap_or("no output")
        )));
    }
    finish(ToolVersion::from_banner(&text.stdout)?)
}

fn finish(version: ToolVersion) -> ExecResult<ToolVersion> {
    version.ensure_supported()?;
    info!(version = %version, "Detected terraform version");
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let output = r#"{
  "terraform_version": "1.6.2",
  "platform": "linux_amd64",
  "provider_selections": {"registry.terraform.io/hashicorp/google": "5.4.0"},
  "terraform_outdated": true
}"#;
        let version = ToolVersion::from_json(output).unwrap();
        assert_eq!(version.version, Version::new(1, 6, 2));
        assert_eq!(version.platform.as_deref(), Some("linux_amd64"));
        assert_eq!(version.provider_selections.len(), 1);
        assert!(version.outdated);
    }

    #[test]
    fn test_from_banner() {
        let banner = "Terraform v1.5.7-beta1\non linux_amd64\n+ provider registry.terraform.io/hashicorp/google v5.4.0\n";
        let version = ToolVersion::from_banner(banner).unwrap();
        assert_eq!(version.version.to_string(), "1.5.7-beta1");
    }

    #[test]
    fn test_banner_without_version() {
        let err = ToolVersion::from_banner("command not understood").unwrap_err();
        assert!(matches!(err, ExecError::VersionDetection(_)));
    }

    #[test]
    fn test_unsupported_version() {
        let version = ToolVersion::from_banner("Terraform v0.11.14").unwrap();
        assert!(matches!(
            version.ensure_supported(),
            Err(ExecError::UnsupportedVersion(_))
        ));
    }
}
