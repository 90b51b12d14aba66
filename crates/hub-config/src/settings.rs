//! Typed hub settings from `configuration.yaml`
//!
//! ```yaml
//! bus:
//!   threads: 4
//!   queue_capacity: 2000
//!   send_timeout: 1s
//! storage:
//!   persist: true
//!   dir: data
//! logger:
//!   level: info
//! ```
//!
//! Every section and field is optional.

use hub_core::parse_duration;
use hub_event_bus::{BusConfig, DEFAULT_QUEUE_CAPACITY};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;

/// Name of the main configuration file inside the config directory
pub const CONFIG_FILE: &str = "configuration.yaml";

/// Message bus settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    /// Worker count; the number of CPUs when unset
    pub threads: Option<usize>,
    pub queue_capacity: usize,
    /// How long `send` waits for queue capacity, e.g. `1s` or `500ms`
    pub send_timeout: String,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            threads: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            send_timeout: "1s".to_string(),
        }
    }
}

/// Rule store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Keep rules in a JSON file so they survive restarts
    pub persist: bool,
    /// Data directory, relative to the config directory; the config directory itself when unset
    pub dir: Option<PathBuf>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            persist: true,
            dir: None,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerSettings {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Complete hub configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub bus: BusSettings,
    pub storage: StorageSettings,
    pub logger: LoggerSettings,
}

impl HubConfig {
    /// Load `configuration.yaml` from `config_dir`; defaults when the file is absent
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref();
        if !config_dir.join(CONFIG_FILE).exists() {
            info!(dir = ?config_dir, "No {} found, using defaults", CONFIG_FILE);
            return Ok(Self::default());
        }

        let yaml = load_yaml(config_dir, CONFIG_FILE)?;
        let config = Self::from_yaml(&yaml)?;
        debug!(?config, "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate an already loaded YAML document
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        if yaml.is_null() {
            return Ok(Self::default());
        }
        if !yaml.is_mapping() {
            return Err(ConfigError::InvalidValue {
                key: "root".to_string(),
                reason: "configuration must be a mapping".to_string(),
            });
        }

        let config: HubConfig =
            serde_yaml::from_value(yaml.clone()).map_err(|e| ConfigError::InvalidValue {
                key: "root".to_string(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> ConfigResult<()> {
        if self.bus.threads == Some(0) {
            return Err(ConfigError::ValidationFailed {
                message: "bus.threads must be at least 1".to_string(),
            });
        }
        if self.bus.queue_capacity == 0 {
            return Err(ConfigError::ValidationFailed {
                message: "bus.queue_capacity must be at least 1".to_string(),
            });
        }
        self.send_timeout()?;
        if self.logger.level.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                message: "logger.level must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// The parsed `bus.send_timeout`
    pub fn send_timeout(&self) -> ConfigResult<Duration> {
        let timeout =
            parse_duration(&self.bus.send_timeout).map_err(|e| ConfigError::InvalidValue {
                key: "bus.send_timeout".to_string(),
                reason: e.to_string(),
            })?;
        if timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "bus.send_timeout".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(timeout)
    }

    /// Bus configuration, with unset values taken from [`BusConfig::default`]
    pub fn bus_config(&self) -> ConfigResult<BusConfig> {
        let defaults = BusConfig::default();
        Ok(BusConfig {
            threads: self.bus.threads.unwrap_or(defaults.threads),
            queue_capacity: self.bus.queue_capacity,
            send_timeout: self.send_timeout()?,
        })
    }

    /// Where persisted rules live, or `None` when persistence is off
    pub fn storage_dir(&self, config_dir: &Path) -> Option<PathBuf> {
        if !self.storage.persist {
            return None;
        }
        Some(match &self.storage.dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => config_dir.join(dir),
            None => config_dir.to_path_buf(),
        })
    }
}
