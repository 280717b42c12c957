//! Configuration management for Floodgate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{FloodgateError, Result};

/// Prefix for environment variable overrides, e.g. `FLOODGATE__KEY_PREFIX`.
const ENV_PREFIX: &str = "FLOODGATE";

/// Main configuration for Floodgate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Store backend configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Prepended to every rate limit key before it reaches the store
    #[serde(default)]
    pub key_prefix: Option<String>,

    /// Named limits, e.g. `login` or `password_reset`
    #[serde(default)]
    pub limits: HashMap<String, LimitRule>,
}

/// Which store backend holds the windows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// In-process store; limits are not shared between processes
    #[default]
    Memory,
    /// Redis server shared by every instance
    Redis {
        /// Connection URL, e.g. `redis://127.0.0.1:6379`
        url: String,
    },
}

/// A named limit: `allowed` events per `count` × `unit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitRule {
    /// Events allowed per window, 0 for unlimited
    pub allowed: u64,
    /// The time unit
    pub unit: TimeUnit,
    /// Number of units in one window
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

impl LimitRule {
    /// Length of one window.
    pub fn window(&self) -> Duration {
        self.unit.duration() * self.count
    }
}

/// Time unit for limit windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of one unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

impl FloodgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load configuration from an optional file, then apply `FLOODGATE__*`
    /// environment overrides (`__` separates nested keys).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| FloodgateError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FloodgateConfig::default();
        assert_eq!(config.store, StoreConfig::Memory);
        assert!(config.key_prefix.is_none());
        assert!(config.limits.is_empty());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
store:
  backend: redis
  url: redis://cache.internal:6379
key_prefix: "auth:"
limits:
  login:
    allowed: 5
    unit: second
    count: 10
  password_reset:
    allowed: 3
    unit: hour
"#;
        let config = FloodgateConfig::from_yaml(yaml).unwrap();

        assert_eq!(
            config.store,
            StoreConfig::Redis {
                url: "redis://cache.internal:6379".to_string()
            }
        );
        assert_eq!(config.key_prefix.as_deref(), Some("auth:"));

        let login = &config.limits["login"];
        assert_eq!(login.allowed, 5);
        assert_eq!(login.window(), Duration::from_secs(10));

        let reset = &config.limits["password_reset"];
        assert_eq!(reset.count, 1);
        assert_eq!(reset.window(), Duration::from_secs(3600));
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = FloodgateConfig::from_yaml("{}").unwrap();
        assert_eq!(config.store, StoreConfig::Memory);
    }

    #[test]
    fn test_invalid_yaml() {
        let result = FloodgateConfig::from_yaml("limits:\n  login:\n    allowed: many\n");
        assert!(matches!(result, Err(FloodgateError::Config(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = FloodgateConfig::from_file("/nonexistent/floodgate.yaml");
        assert!(matches!(result, Err(FloodgateError::Io(_))));
    }

    #[test]
    fn test_time_unit_duration() {
        assert_eq!(TimeUnit::Second.duration(), Duration::from_secs(1));
        assert_eq!(TimeUnit::Minute.duration(), Duration::from_secs(60));
        assert_eq!(TimeUnit::Hour.duration(), Duration::from_secs(3600));
        assert_eq!(TimeUnit::Day.duration(), Duration::from_secs(86400));
    }
}
