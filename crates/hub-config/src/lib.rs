//! YAML configuration loading for the automation hub
//!
//! Reads `configuration.yaml` from a config directory, resolving the custom
//! tags:
//!
//! - `!include path` - Include another YAML file
//! - `!env_var NAME [default]` - Environment variable substitution
//!
//! and turns the result into a validated [`HubConfig`].
//!
//! # Example
//!
//! ```ignore
//! use hub_config::HubConfig;
//!
//! let config = HubConfig::load("/etc/hub")?;
//! let bus = MessageBus::new(config.bus_config()?)?;
//! ```

mod error;
mod loader;
mod settings;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};
pub use settings::{BusSettings, HubConfig, LoggerSettings, StorageSettings, CONFIG_FILE};

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::Value;
