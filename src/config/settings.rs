//! Application settings and controller profiles

use crate::core::batch::DEFAULT_BATCH_SIZE;
use crate::core::catalog::DiscoveryConfig;
use crate::core::device::DeviceConfig;
use crate::core::poll::DEFAULT_POLL_INTERVAL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Platform config directory unknown
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// File could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid TOML for this configuration
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Could not serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Named controller profile does not exist
    #[error("Unknown controller profile: {0}")]
    UnknownProfile(String),
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Polling and batching
    pub polling: PollingConfig,
    /// Discovery options
    pub discovery: DiscoveryConfig,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Known controllers
    pub controllers: Vec<ControllerProfile>,
}

impl AppConfig {
    /// Load config from the platform config directory, defaults if absent
    pub fn load() -> Result<Self, ConfigError> {
        let path = super::config_file().ok_or(ConfigError::NoConfigDir)?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from an explicit file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save config to the platform config directory
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = super::config_file().ok_or(ConfigError::NoConfigDir)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        self.save_to(&path)
    }

    /// Save config to an explicit file
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Find a controller profile by name
    pub fn profile(&self, name: &str) -> Result<&ControllerProfile, ConfigError> {
        self.controllers
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
    }

    /// Runtime configuration for a device at `address`
    pub fn device_config(&self, address: &str, device_id: u32) -> DeviceConfig {
        DeviceConfig::new(address, device_id)
            .with_discovery(self.discovery.clone())
            .with_batch_size(self.polling.batch_size)
            .with_poll_interval(self.polling.interval())
    }
}

/// Polling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds between poll cycles
    pub interval_secs: u64,
    /// Points per batched request
    pub batch_size: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl PollingConfig {
    /// Poll interval
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (e.g. `info`, `bacpoll_core=debug`)
    pub level: String,
    /// Emit JSON lines instead of text
    pub json: bool,
    /// Also write a daily log file here
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
        }
    }
}

/// A known controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerProfile {
    /// Profile name
    pub name: String,
    /// Network address
    pub address: String,
    /// Device instance
    pub device_id: u32,
    /// Simulated controller fixture answering for this controller
    pub fixture: Option<PathBuf>,
}

impl ControllerProfile {
    /// Create a new profile
    pub fn new(name: &str, address: &str, device_id: u32) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            device_id,
            fixture: None,
        }
    }

    /// Set the fixture file
    pub fn with_fixture(mut self, path: impl Into<PathBuf>) -> Self {
        self.fixture = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.polling.interval(), Duration::from_secs(10));
        assert_eq!(config.polling.batch_size, 25);
        assert!(!config.discovery.fail_on_unreachable);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_file() {
        let config: AppConfig = toml::from_str(
            r#"
            [polling]
            interval_secs = 30

            [[controllers]]
            name = "ahu"
            address = "2:5"
            device_id = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.polling.interval_secs, 30);
        assert_eq!(config.polling.batch_size, 25);
        let profile = config.profile("ahu").unwrap();
        assert_eq!(profile.device_id, 5);
        assert!(profile.fixture.is_none());
        assert!(matches!(config.profile("rtu"), Err(ConfigError::UnknownProfile(_))));

        let device = config.device_config(&profile.address, profile.device_id);
        assert_eq!(device.default_poll_interval, Duration::from_secs(30));
        assert_eq!(device.batch_size, 25);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.discovery.fail_on_unreachable = true;
        config.logging.json = true;
        config
            .controllers
            .push(ControllerProfile::new("ahu", "2:5", 5).with_fixture("ahu.toml"));
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "polling = 3").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::Parse(_))));
    }
}
