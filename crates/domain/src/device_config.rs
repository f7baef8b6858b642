//! Stored device connection config — a versioned schema over the opaque
//! blob kept on [`DeviceEntry`](crate::entry::DeviceEntry).
//!
//! The blob is written by the device library when an entry is created and
//! read back at connect time. A blob that does not match the schema is not
//! fatal: callers log [`DeviceConfigError`] and fall back to defaults.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::entry::Credentials;

/// Schema versions this crate knows how to read.
pub const SUPPORTED_SCHEMA_VERSION: u32 = 1;

/// Connect timeout used when neither the blob nor the caller provides one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How to talk to a device: family, transport encryption, login scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionType {
    pub device_family: String,
    pub encryption_type: EncryptionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_version: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EncryptionType {
    Xor,
    Aes,
    Klap,
}

/// Parsed form of the stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub connection_type: ConnectionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub uses_http: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

fn default_schema_version() -> u32 {
    SUPPORTED_SCHEMA_VERSION
}

/// Why a stored blob could not be used.
#[derive(Debug, thiserror::Error)]
#[error("invalid connection config for {host}: {payload}")]
pub struct DeviceConfigError {
    pub host: String,
    pub payload: String,
    #[source]
    pub kind: DeviceConfigErrorKind,
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceConfigErrorKind {
    #[error("payload does not match the schema")]
    Schema(#[source] serde_json::Error),

    #[error("unsupported schema version {0}")]
    UnsupportedVersion(u32),
}

impl DeviceConfig {
    /// Parse a stored blob. `host` only feeds the error message.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceConfigError`] when the blob does not match the schema
    /// or declares a schema version newer than [`SUPPORTED_SCHEMA_VERSION`].
    pub fn parse(host: &str, blob: &serde_json::Value) -> Result<Self, DeviceConfigError> {
        let fail = |kind| DeviceConfigError {
            host: host.to_string(),
            payload: redacted(blob).to_string(),
            kind,
        };
        let config: Self = serde_json::from_value(blob.clone())
            .map_err(|err| fail(DeviceConfigErrorKind::Schema(err)))?;
        if config.schema_version != SUPPORTED_SCHEMA_VERSION {
            return Err(fail(DeviceConfigErrorKind::UnsupportedVersion(
                config.schema_version,
            )));
        }
        Ok(config)
    }

    /// Serialize back into the blob stored on an entry.
    #[must_use]
    pub fn to_blob(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Copy of `blob` with any stored password masked, for error messages.
fn redacted(blob: &serde_json::Value) -> serde_json::Value {
    let mut blob = blob.clone();
    if let Some(password) = blob
        .get_mut("credentials")
        .and_then(|credentials| credentials.get_mut("password"))
    {
        *password = serde_json::Value::String("<redacted>".to_string());
    }
    blob
}

/// Fully resolved parameters for one connect call.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectConfig {
    pub host: String,
    pub connection_type: Option<ConnectionType>,
    pub credentials: Option<Credentials>,
    pub timeout: Duration,
    pub uses_http: bool,
}

impl ConnectConfig {
    /// Unauthenticated defaults for `host`.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            connection_type: None,
            credentials: None,
            timeout: DEFAULT_TIMEOUT,
            uses_http: false,
        }
    }

    /// Start from a parsed blob, keeping its connection parameters.
    #[must_use]
    pub fn from_device_config(host: impl Into<String>, config: DeviceConfig) -> Self {
        Self {
            host: host.into(),
            connection_type: Some(config.connection_type),
            credentials: config.credentials,
            timeout: config
                .timeout_secs
                .map_or(DEFAULT_TIMEOUT, Duration::from_secs),
            uses_http: config.uses_http,
        }
    }
}

impl fmt::Debug for ConnectConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectConfig")
            .field("host", &self.host)
            .field("connection_type", &self.connection_type)
            .field("authenticated", &self.credentials.is_some())
            .field("timeout", &self.timeout)
            .field("uses_http", &self.uses_http)
            .finish()
    }
}
