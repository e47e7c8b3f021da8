//! Module for application configuration settings.
//!
//! User configurations may be specified in a configuration file. Without one, the cache runs
//! with the host's path conventions and the probe runs with one pass per core.

use std::path::{Path, PathBuf};

use fscache::CacheOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

fn default_jobs() -> usize {
    std::thread::available_parallelism().map_or(4, std::num::NonZero::get)
}

fn default_repeat() -> usize {
    1
}

fn default_cache() -> CacheOptions {
    CacheOptions::host()
}

/// How `fscache probe` drives the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProbeConfig {
    /// Number of blocking workers issuing lookups.
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// How many times each path is looked up.
    #[serde(default = "default_repeat")]
    pub repeat: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            repeat: default_repeat(),
        }
    }
}

/// Application configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default = "default_cache")]
    pub cache: CacheOptions,

    #[serde(default)]
    pub probe: ProbeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: default_cache(),
            probe: ProbeConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation errors: {0:?}")]
    ValidationErrors(Vec<String>),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Config {
    /// Validate the correctness of the configuration.
    ///
    /// Returns:
    /// - `Ok(())` if the configuration is valid.
    /// - `Err(Vec<String>)` containing a list of validation error messages if the configuration
    ///   is invalid.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = self.cache.validate().err().unwrap_or_default();

        if self.probe.jobs == 0 {
            errors.push("probe.jobs must be at least 1.".to_owned());
        }
        if self.probe.repeat == 0 {
            errors.push("probe.repeat must be at least 1.".to_owned());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Returns config file paths in descending priority order.
    /// On macOS, skips `dirs::config_dir()` (resolves to ~/Library/Application Support/).
    fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(not(target_os = "macos"))]
        if let Some(xdg) = dirs::config_dir() {
            paths.push(xdg.join("fscache").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("fscache").join("config.toml"));
        }

        paths.push(PathBuf::from("/etc/fscache/config.toml"));

        paths
    }

    /// Finds the first existing config file from search paths.
    fn find_config_file() -> Option<PathBuf> {
        Self::config_search_paths().into_iter().find(|p| p.exists())
    }

    /// Loads config from a single TOML file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = ?path, "Loading configuration file.");
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads configuration from the first found config file, or the external path if given.
    pub fn load(external_config_path: Option<&Path>) -> Option<Result<Self, ConfigError>> {
        if let Some(path) = external_config_path {
            return Some(Self::load_from_file(path));
        }

        Self::find_config_file().map(|path| Self::load_from_file(&path))
    }

    /// Loads config, falling back to defaults if none exists.
    /// Errors if a config file exists but is malformed.
    pub fn load_or_default(external_config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(res) = Self::load(external_config_path) else {
            debug!("No configuration file found, using defaults.");
            return Ok(Self::default());
        };
        let config = res?;
        if let Err(validation_errors) = config.validate() {
            return Err(ConfigError::ValidationErrors(validation_errors));
        }
        debug!("Loaded configuration successfully.");
        Ok(config)
    }

    /// The configuration as it would be written to disk.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
