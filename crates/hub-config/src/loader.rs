//! YAML loader with custom tag support
//!
//! - `!include path` - replace the node with another YAML file, resolved
//!   relative to the including file
//! - `!env_var NAME [default]` - substitute an environment variable

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// YAML loader that resolves the hub's custom tags
pub struct YamlLoader {
    /// Base directory for resolving relative paths
    config_dir: PathBuf,
    /// Files currently being loaded, to detect circular includes
    include_stack: HashSet<PathBuf>,
}

impl YamlLoader {
    /// Loader resolving relative paths against `config_dir`
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            include_stack: HashSet::new(),
        }
    }

    /// Load and process a YAML file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.resolve_path(path.as_ref());
        debug!("Loading YAML file: {:?}", path);

        if self.include_stack.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;

        self.include_stack.insert(path.clone());
        let result = self.load_string(&content, &path);
        self.include_stack.remove(&path);

        result
    }

    /// Load and process YAML from a string
    pub fn load_string(&mut self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;

        self.process_value(value, source_path)
    }

    fn process_value(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.process_tagged(*tagged, source_path),
            Value::Mapping(map) => {
                let mut result = serde_yaml::Mapping::new();
                for (k, v) in map {
                    let processed_key = self.process_value(k, source_path)?;
                    let processed_value = self.process_value(v, source_path)?;
                    result.insert(processed_key, processed_value);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(seq) => {
                let result: ConfigResult<Vec<Value>> = seq
                    .into_iter()
                    .map(|v| self.process_value(v, source_path))
                    .collect();
                Ok(Value::Sequence(result?))
            }
            _ => Ok(value),
        }
    }

    fn process_tagged(
        &mut self,
        tagged: serde_yaml::value::TaggedValue,
        source_path: &Path,
    ) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        let value = tagged.value;

        trace!("Processing tag '{}' with value {:?}", tag, value);

        match tag.as_str() {
            "!include" => {
                let include_path = self.value_to_path(&value, source_path)?;
                debug!("Including file: {:?}", include_path);
                self.load_file(&include_path)
            }
            "!env_var" => process_env_var(value),
            _ => {
                // Unknown tag: keep it, but still resolve tags inside it
                let processed = self.process_value(value, source_path)?;
                Ok(Value::Tagged(Box::new(serde_yaml::value::TaggedValue {
                    tag: tagged.tag,
                    value: processed,
                })))
            }
        }
    }

    /// Resolve an include target relative to the including file
    fn value_to_path(&self, value: &Value, source_path: &Path) -> ConfigResult<PathBuf> {
        let path_str = match value {
            Value::String(s) => s.clone(),
            _ => {
                return Err(ConfigError::InvalidIncludePath {
                    path: format!("{:?}", value),
                    reason: "path must be a string".to_string(),
                })
            }
        };

        let base_dir = source_path.parent().unwrap_or(&self.config_dir);
        let resolved = if Path::new(&path_str).is_absolute() {
            PathBuf::from(&path_str)
        } else {
            base_dir.join(&path_str)
        };

        Ok(resolved)
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

/// `!env_var NAME [default]`
///
/// The substituted text is read as a YAML scalar, so `"2000"` becomes a
/// number and `"true"` a boolean; anything else stays a string.
fn process_env_var(value: Value) -> ConfigResult<Value> {
    let tagged = match value {
        Value::String(s) => s,
        _ => {
            return Err(ConfigError::InvalidValue {
                key: "!env_var".to_string(),
                reason: "environment variable name must be a string".to_string(),
            })
        }
    };

    let (var_name, default) = match tagged.trim().split_once(char::is_whitespace) {
        Some((name, default)) => (name.to_string(), Some(default.trim().to_string())),
        None => (tagged.trim().to_string(), None),
    };

    let raw = match (std::env::var(&var_name), default) {
        (Ok(value), _) => {
            debug!("Substituted env var: {}", var_name);
            value
        }
        (Err(_), Some(default)) => {
            debug!("Env var {} not set, using default", var_name);
            default
        }
        (Err(_), None) => return Err(ConfigError::EnvVarNotFound { var: var_name }),
    };

    Ok(match serde_yaml::from_str::<Value>(&raw) {
        Ok(scalar @ (Value::Number(_) | Value::Bool(_))) => scalar,
        _ => Value::String(raw),
    })
}

/// Load a YAML file with full tag processing
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(config_dir).load_file(file)
}

/// Load a YAML string with tag processing
pub fn load_yaml_string(
    config_dir: impl Into<PathBuf>,
    content: &str,
    source_name: &str,
) -> ConfigResult<Value> {
    let config_dir = config_dir.into();
    let source_path = config_dir.join(source_name);
    YamlLoader::new(config_dir).load_string(content, &source_path)
}
