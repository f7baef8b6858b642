//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `devlink.toml` in the working directory (or the file named by
//! `DEVLINK_CONFIG`). Every field has a sensible default so the file is
//! optional. Environment variables take precedence over file values.

use std::time::Duration;

use serde::Deserialize;

use devlink_adapter_virtual::{VirtualDevice, VirtualDeviceConfig, VirtualError};
use devlink_app::services::discovery::{DEFAULT_BROADCAST_TARGET, DEFAULT_SWEEP_INTERVAL};
use devlink_domain::device_config::DEFAULT_TIMEOUT;
use devlink_domain::entry::{Credentials, DeviceEntry};
use devlink_domain::error::LinkError;
use devlink_domain::mac::MacAddress;

const DEFAULT_CONFIG_PATH: &str = "devlink.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub discovery: DiscoveryConfig,
    /// Shared credentials injected for entries that carry none.
    pub credentials: Option<Credentials>,
    /// Entries created on startup unless one already exists for the MAC.
    pub entries: Vec<EntryConfig>,
    /// Devices answering on the simulated network.
    pub virtual_devices: Vec<VirtualDeviceConfig>,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Discovery sweep configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub interval_secs: u64,
    /// Broadcast addresses probed on every sweep.
    pub targets: Vec<String>,
    /// Timeout for probing and connecting to a single device.
    pub connect_timeout_secs: u64,
}

/// A device entry to seed on startup.
#[derive(Debug, Clone, Deserialize)]
pub struct EntryConfig {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    pub mac: String,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub device_config: Option<serde_json::Value>,
}

impl EntryConfig {
    /// Build the domain entry.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Validation`] if the MAC or any other field is
    /// invalid.
    pub fn to_entry(&self) -> Result<DeviceEntry, LinkError> {
        let mac: MacAddress = self.mac.parse()?;
        let mut builder = DeviceEntry::builder().unique_id(mac);
        if let Some(title) = &self.title {
            builder = builder.title(title);
        }
        if let Some(host) = &self.host {
            builder = builder.host(host);
        }
        if let Some(credentials) = &self.credentials {
            builder = builder.credentials(credentials.clone());
        }
        if let Some(blob) = &self.device_config {
            builder = builder.device_config(blob.clone());
        }
        builder.build()
    }
}

impl Config {
    /// Load configuration from the config file (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("DEVLINK_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("DEVLINK_DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = var("DEVLINK_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Some(username) = var("DEVLINK_USERNAME") {
            let password = var("DEVLINK_PASSWORD").unwrap_or_default();
            self.credentials = Some(Credentials::new(username, password));
        }
        if let Some(secs) = var("DEVLINK_DISCOVERY_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.discovery.interval_secs = secs;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.discovery.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "discovery interval must be non-zero".to_string(),
            ));
        }
        if self.discovery.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "connect timeout must be non-zero".to_string(),
            ));
        }
        if self.discovery.targets.is_empty() {
            return Err(ConfigError::Validation(
                "at least one discovery target is required".to_string(),
            ));
        }
        if let Some(credentials) = &self.credentials {
            credentials.validate().map_err(|_| {
                ConfigError::Validation("shared username must not be empty".to_string())
            })?;
        }
        for entry in &self.entries {
            entry.to_entry().map_err(|err| {
                ConfigError::Validation(format!("entry {}: {}", entry.mac, describe(&err)))
            })?;
        }
        Ok(())
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.discovery.interval_secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery.connect_timeout_secs)
    }

    /// Domain entries to seed.
    ///
    /// # Errors
    ///
    /// Returns the first entry that fails validation.
    pub fn seed_entries(&self) -> Result<Vec<DeviceEntry>, LinkError> {
        self.entries.iter().map(EntryConfig::to_entry).collect()
    }

    /// Simulated devices to put on the virtual network.
    ///
    /// # Errors
    ///
    /// Returns the first device whose MAC is invalid.
    pub fn virtual_devices(&self) -> Result<Vec<VirtualDevice>, VirtualError> {
        self.virtual_devices
            .iter()
            .cloned()
            .map(VirtualDevice::try_from)
            .collect()
    }
}

fn describe(err: &LinkError) -> String {
    match err {
        LinkError::Validation(inner) => inner.to_string(),
        other => other.to_string(),
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:devlink.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: [
                "devlinkd=info",
                "devlink_app=info",
                "devlink_adapter_storage_sqlite_sqlx=info",
                "devlink_adapter_virtual=info",
            ]
            .join(","),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_SWEEP_INTERVAL.as_secs(),
            targets: vec![DEFAULT_BROADCAST_TARGET.to_string()],
            connect_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
