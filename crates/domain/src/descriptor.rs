//! Device descriptors — what a device reports about itself when probed or
//! connected — and the unique-id schemes derived from them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device_config::ConnectionType;
use crate::mac::MacAddress;

/// Capability class of a device. Decides the entity domain and how the
/// legacy unique id was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Plug,
    Strip,
    /// Wall switch with dimming. Was supported as a plain switch before
    /// dimming existed, and its entities kept that switch-format id.
    Dimmer,
    Bulb,
    LightStrip,
}

impl DeviceKind {
    /// Entity domain the primary entity of this device registers under.
    #[must_use]
    pub fn entity_domain(self) -> &'static str {
        match self {
            Self::Plug | Self::Strip => "switch",
            Self::Dimmer | Self::Bulb | Self::LightStrip => "light",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Plug => "plug",
            Self::Strip => "strip",
            Self::Dimmer => "dimmer",
            Self::Bulb => "bulb",
            Self::LightStrip => "light_strip",
        };
        f.write_str(name)
    }
}

/// A device as reported by the device protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub host: String,
    pub mac: MacAddress,
    /// Hardware identifier. Child outlets of a strip report
    /// `<parent id>_<child id>`.
    pub device_id: String,
    pub alias: String,
    pub model: String,
    pub kind: DeviceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<ConnectionType>,
}

impl DeviceDescriptor {
    /// Unique id the entity of this device was registered with before the
    /// MAC-based scheme existed.
    ///
    /// Plain switches, plugs and bulbs used their hardware id. Child outlets
    /// used only the child part. Dimmers were registered as switches at the
    /// time, so they carry the same switch-format id even though they are
    /// now exposed as lights.
    #[must_use]
    pub fn legacy_unique_id(&self) -> String {
        match self.device_id.split_once('_') {
            Some((_, child)) if self.kind != DeviceKind::Dimmer => child.to_string(),
            _ => self.device_id.clone(),
        }
    }

    /// Unique id for entities created by the current scheme.
    #[must_use]
    pub fn rollout_unique_id(&self) -> String {
        self.mac.rollout_id()
    }

    /// Entity domain of the primary entity.
    #[must_use]
    pub fn entity_domain(&self) -> &'static str {
        self.kind.entity_domain()
    }
}
