//! `apexscan.yaml` settings.

use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::detect::Thresholds;
use crate::telemetry::TelemetryConfig;

/// Config file names searched for in the working directory.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["apexscan.yaml", ".apexscan.yaml"];

/// Default config written by `apexscan init`.
pub const DEFAULT_TEMPLATE: &str = include_str!("templates/apexscan.yaml");

/// Scanner settings. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Glob patterns for paths to skip when walking a directory.
    #[serde(default)]
    pub excluded_paths: Vec<String>,
}

impl Config {
    /// Parse a config from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse_str(content: &str) -> anyhow::Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load the explicit config, else a discovered one, else defaults.
    ///
    /// Returns the path the config came from, if any.
    pub fn load(explicit: Option<&Path>, dir: &Path) -> anyhow::Result<(Self, Option<PathBuf>)> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => discover(dir),
        };
        match path {
            Some(path) => {
                let config = Self::parse_file(&path)?;
                validate(&config)?;
                Ok((config, Some(path)))
            }
            None => Ok((Self::default(), None)),
        }
    }

    /// Compiled matcher for `excluded_paths`. Invalid patterns are skipped;
    /// [`validate`] reports them.
    pub fn excluded_set(&self) -> GlobSet {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.excluded_paths {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            }
        }
        builder.build().unwrap_or_else(|_| GlobSet::empty())
    }
}

/// Find a config file in `dir`, then in the user config directory.
pub fn discover(dir: &Path) -> Option<PathBuf> {
    DEFAULT_CONFIG_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .or_else(|| user_config_path().filter(|path| path.is_file()))
}

/// `apexscan.yaml` in the platform config directory.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "apexscan")
        .map(|dirs| dirs.config_dir().join(DEFAULT_CONFIG_NAMES[0]))
}

/// Reject settings that cannot work.
pub fn validate(config: &Config) -> anyhow::Result<()> {
    if config.telemetry.timeout_ms == 0 {
        anyhow::bail!("telemetry.timeout_ms must be greater than zero");
    }

    if config.telemetry.api_version.trim().is_empty() {
        anyhow::bail!("telemetry.api_version must not be empty");
    }

    for (name, bands) in [
        ("method", &config.thresholds.method),
        ("query", &config.thresholds.query),
    ] {
        if !bands.is_ordered() {
            anyhow::bail!(
                "thresholds.{}: moderate thresholds must not exceed high thresholds",
                name
            );
        }
        if bands.moderate_avg_cost_ms < 0.0 {
            anyhow::bail!("thresholds.{}: cost thresholds must not be negative", name);
        }
    }

    for pattern in &config.excluded_paths {
        Glob::new(pattern)
            .map_err(|e| anyhow::anyhow!("invalid excluded_paths pattern {:?}: {}", pattern, e))?;
    }

    Ok(())
}
