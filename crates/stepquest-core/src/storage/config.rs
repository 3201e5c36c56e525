//! TOML-based application configuration.
//!
//! Stores the tunable policy of the step and mission engines:
//! - How often the midnight rollover is checked
//! - Sync interval and delta thresholds
//! - Route filtering and step length
//! - The text generation endpoint
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;

/// Step counter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepsConfig {
    #[serde(default = "default_midnight_check_interval")]
    pub midnight_check_interval_secs: u64,
}

/// Lifetime step sync configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_sync_interval")]
    pub interval_secs: u64,
    /// Smaller unforced deltas are debounced.
    #[serde(default = "default_min_delta")]
    pub min_delta: u64,
    /// Growth since the last sync that triggers an immediate sync.
    #[serde(default = "default_eager_delta")]
    pub eager_delta: u64,
    #[serde(default = "default_day_window")]
    pub day_window: u64,
}

/// Mission configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionConfig {
    #[serde(default = "default_min_route_distance")]
    pub min_route_distance_m: f64,
    #[serde(default = "default_step_length")]
    pub step_length_m: f64,
}

/// Text generation configuration. An empty endpoint means offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub endpoint: String,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub steps: StepsConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub mission: MissionConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

// Default functions
fn default_midnight_check_interval() -> u64 {
    60
}
fn default_sync_interval() -> u64 {
    30
}
fn default_min_delta() -> u64 {
    5
}
fn default_eager_delta() -> u64 {
    50
}
fn default_day_window() -> u64 {
    100_000
}
fn default_min_route_distance() -> f64 {
    5.0
}
fn default_step_length() -> f64 {
    0.762
}
fn default_api_key_env() -> String {
    "STEPQUEST_API_KEY".into()
}
fn default_timeout() -> u64 {
    30
}

impl Default for StepsConfig {
    fn default() -> Self {
        Self {
            midnight_check_interval_secs: default_midnight_check_interval(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sync_interval(),
            min_delta: default_min_delta(),
            eager_delta: default_eager_delta(),
            day_window: default_day_window(),
        }
    }
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            min_route_distance_m: default_min_route_distance(),
            step_length_m: default_step_length(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout(),
        }
    }
}

impl GeneratorConfig {
    pub fn is_offline(&self) -> bool {
        self.endpoint.trim().is_empty()
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) => return Err(unknown()),
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default location of the config file.
    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("config.toml"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from the data directory, writing the defaults on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            let cfg = Self::default();
            cfg.save_to(&path)?;
            Ok(cfg)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let cfg: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Persist to the data directory.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default config");
            Self::default()
        })
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(_) => None,
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key, keeping the field's type.
    ///
    /// The change is validated but not saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Every leaf key with its current value, sorted by key.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Ok(serde_json::Value::Object(sections)) = serde_json::to_value(self) {
            for (section, fields) in sections {
                if let serde_json::Value::Object(fields) = fields {
                    for (field, value) in fields {
                        let value = match value {
                            serde_json::Value::String(s) => s,
                            other => other.to_string(),
                        };
                        out.push((format!("{section}.{field}"), value));
                    }
                }
            }
        }
        out
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |key: &str, value: u64| {
            if value == 0 {
                Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".into(),
                })
            } else {
                Ok(())
            }
        };
        positive("steps.midnight_check_interval_secs", self.steps.midnight_check_interval_secs)?;
        positive("sync.interval_secs", self.sync.interval_secs)?;
        positive("sync.day_window", self.sync.day_window)?;
        positive("generator.timeout_secs", self.generator.timeout_secs)?;

        for (key, value) in [
            ("mission.min_route_distance_m", self.mission.min_route_distance_m),
            ("mission.step_length_m", self.mission.step_length_m),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be a positive number".into(),
                });
            }
        }
        Ok(())
    }
}
