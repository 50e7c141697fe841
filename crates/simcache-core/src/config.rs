//! YAML configuration shared by the store, planner and CLI.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, SimError};

/// File name looked up inside a store root when no explicit config is given.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Top-level simcache configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Environment capture settings.
    #[serde(default)]
    pub environment: EnvironmentConfig,
    /// Fingerprint canonicalization settings.
    #[serde(default)]
    pub fingerprint: FingerprintConfig,
    /// Sweep execution defaults.
    #[serde(default)]
    pub sweep: SweepConfig,
}

/// Controls which runtime facts enter the environment facet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    /// Environment variables admitted to the allow-list, captured as
    /// `env.<NAME>` when set.
    #[serde(default)]
    pub variables: Vec<String>,
}

/// Canonicalization switches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FingerprintConfig {
    /// Accept NaN and infinite parameter values instead of rejecting them.
    #[serde(default)]
    pub allow_non_finite: bool,
}

/// Sweep execution defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    /// Number of entries computed concurrently.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Stop scheduling new entries after the first failure.
    #[serde(default)]
    pub stop_on_failure: bool,
}

fn default_parallelism() -> usize {
    1
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            stop_on_failure: false,
        }
    }
}

impl CacheConfig {
    /// Loads a configuration file; YAML and JSON are both accepted.
    pub fn load(path: &Path) -> Result<Self, SimError> {
        let contents = fs::read(path).map_err(|err| {
            SimError::Config(
                ErrorInfo::new("config.read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        if contents.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_yaml::from_slice(&contents).map_err(|err| {
            SimError::Config(
                ErrorInfo::new("config.parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }

    /// Loads `path` when it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, SimError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            "environment:\n  variables: [OMP_NUM_THREADS]\nsweep:\n  parallelism: 4\n",
        )
        .unwrap();
        let config = CacheConfig::load(&path).unwrap();
        assert_eq!(config.environment.variables, vec!["OMP_NUM_THREADS"]);
        assert_eq!(config.sweep.parallelism, 4);
        assert!(!config.sweep.stop_on_failure);
        assert!(!config.fingerprint.allow_non_finite);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig::load_or_default(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "sweep:\n  paralelism: 2\n").unwrap();
        assert!(matches!(CacheConfig::load(&path), Err(SimError::Config(_))));
    }
}
