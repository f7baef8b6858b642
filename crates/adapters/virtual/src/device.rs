//! Simulated devices and the config they are built from.

use serde::Deserialize;

use devlink_domain::descriptor::{DeviceDescriptor, DeviceKind};
use devlink_domain::device_config::ConnectionType;
use devlink_domain::entry::Credentials;
use devlink_domain::error::{LinkError, ValidationError};
use devlink_domain::mac::MacAddress;

/// Errors raised while building virtual devices.
#[derive(Debug, thiserror::Error)]
pub enum VirtualError {
    #[error("invalid virtual device at {host}")]
    InvalidDevice {
        host: String,
        #[source]
        source: ValidationError,
    },
}

impl From<VirtualError> for LinkError {
    fn from(err: VirtualError) -> Self {
        match err {
            VirtualError::InvalidDevice { source, .. } => LinkError::Validation(source),
        }
    }
}

/// One simulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualDevice {
    pub host: String,
    pub mac: MacAddress,
    pub device_id: String,
    pub alias: String,
    pub model: String,
    pub kind: DeviceKind,
    pub connection_type: Option<ConnectionType>,
    /// When set, connect calls must present exactly these credentials.
    pub credentials: Option<Credentials>,
    pub online: bool,
}

impl VirtualDevice {
    #[must_use]
    pub fn new(host: impl Into<String>, mac: MacAddress, kind: DeviceKind) -> Self {
        let device_id = format!("VIRT{}", mac.rollout_id());
        Self {
            host: host.into(),
            mac,
            device_id,
            alias: format!("Virtual {kind}"),
            model: default_model(kind).to_string(),
            kind,
            connection_type: None,
            credentials: None,
            online: true,
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    #[must_use]
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub fn with_connection_type(mut self, connection_type: ConnectionType) -> Self {
        self.connection_type = Some(connection_type);
        self
    }

    #[must_use]
    pub fn offline(mut self) -> Self {
        self.online = false;
        self
    }

    #[must_use]
    pub fn descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor {
            host: self.host.clone(),
            mac: self.mac,
            device_id: self.device_id.clone(),
            alias: self.alias.clone(),
            model: self.model.clone(),
            kind: self.kind,
            connection_type: self.connection_type.clone(),
        }
    }
}

fn default_model(kind: DeviceKind) -> &'static str {
    match kind {
        DeviceKind::Plug => "VP100",
        DeviceKind::Strip => "VP300",
        DeviceKind::Dimmer => "VS220",
        DeviceKind::Bulb => "VL130",
        DeviceKind::LightStrip => "VL900",
    }
}

/// Serialized form of a [`VirtualDevice`], as found in config files.
#[derive(Debug, Clone, Deserialize)]
pub struct VirtualDeviceConfig {
    pub host: String,
    pub mac: String,
    pub kind: DeviceKind,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default = "default_online")]
    pub online: bool,
}

fn default_online() -> bool {
    true
}

impl TryFrom<VirtualDeviceConfig> for VirtualDevice {
    type Error = VirtualError;

    fn try_from(config: VirtualDeviceConfig) -> Result<Self, Self::Error> {
        let mac = config
            .mac
            .parse::<MacAddress>()
            .map_err(|source| VirtualError::InvalidDevice {
                host: config.host.clone(),
                source,
            })?;
        let mut device = Self::new(config.host, mac, config.kind);
        if let Some(alias) = config.alias {
            device = device.with_alias(alias);
        }
        if let Some(device_id) = config.device_id {
            device = device.with_device_id(device_id);
        }
        if let Some(credentials) = config.credentials {
            device = device.with_credentials(credentials);
        }
        device.online = config.online;
        Ok(device)
    }
}
