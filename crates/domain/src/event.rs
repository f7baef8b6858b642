//! Event — an immutable record of something that happened.
//!
//! Events are produced when an entry changes state, when a discovery sweep
//! completes or finds a device, when an identity is migrated, and when a
//! reauthentication flow is requested.

use serde::{Deserialize, Serialize};

use crate::id::{EntryId, EventId};
use crate::time::{Timestamp, now};

/// Kind of [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    EntryStateChanged,
    SweepCompleted,
    DeviceDiscovered,
    IdentityMigrated,
    ReauthRequested,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::EntryStateChanged => "entry_state_changed",
            Self::SweepCompleted => "sweep_completed",
            Self::DeviceDiscovered => "device_discovered",
            Self::IdentityMigrated => "identity_migrated",
            Self::ReauthRequested => "reauth_requested",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub event_type: EventType,
    pub entry_id: Option<EntryId>,
    pub data: serde_json::Value,
    pub timestamp: Timestamp,
}

impl Event {
    #[must_use]
    pub fn new(event_type: EventType, entry_id: Option<EntryId>, data: serde_json::Value) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            entry_id,
            data,
            timestamp: now(),
        }
    }
}
