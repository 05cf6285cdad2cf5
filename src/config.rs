//! Service configuration.
//!
//! The bridge has exactly one tunable: the diagnostic log capacity. The
//! conntrack subscription masks and the engine result table are wire
//! contracts and are deliberately not configurable.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::local_log::DEFAULT_LOCAL_LOG_CAPACITY;

/// Offload bridge service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Capacity of the diagnostic call log (entries; oldest evicted first).
    #[serde(default = "default_local_log_capacity")]
    pub local_log_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            local_log_capacity: DEFAULT_LOCAL_LOG_CAPACITY,
        }
    }
}

impl ServiceConfig {
    /// Validate the service configuration.
    ///
    /// Returns an error if `local_log_capacity` is zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.local_log_capacity == 0 {
            return Err("'local_log_capacity' must be greater than zero".to_string());
        }
        Ok(())
    }
}

// Default value functions for serde
fn default_local_log_capacity() -> usize {
    DEFAULT_LOCAL_LOG_CAPACITY
}

/// Resolve the default config path (~/.config/offload-rs/service.toml).
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("offload-rs").join("service.toml"))
}

/// Load service configuration from an explicit path, or from the default
/// location when `path` is `None`.
pub fn load_service_config(path: Option<&Path>) -> Result<ServiceConfig> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?,
    };
    let content = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
    let config: ServiceConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.local_log_capacity, DEFAULT_LOCAL_LOG_CAPACITY);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = ServiceConfig {
            local_log_capacity: 0,
        };
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("'local_log_capacity'"));
    }

    #[test]
    fn test_parse_toml_with_defaults() {
        let config: ServiceConfig = toml::from_str("").expect("empty config is valid");
        assert_eq!(config.local_log_capacity, DEFAULT_LOCAL_LOG_CAPACITY);

        let config: ServiceConfig =
            toml::from_str("local_log_capacity = 200").expect("explicit capacity");
        assert_eq!(config.local_log_capacity, 200);
    }
}
