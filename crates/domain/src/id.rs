//! Typed identifiers.
//!
//! Entries, registry records and events are keyed by random UUIDs. The
//! storage adapter persists them as their hyphenated text form, and events
//! carry them as bare JSON strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! uuid_id {
    ($(#[doc = $doc:expr])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0.hyphenated(), f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Identity of a [`DeviceEntry`](crate::entry::DeviceEntry). Stable for
    /// the life of the entry, unlike its host or title.
    EntryId
);

uuid_id!(
    /// Row identity of a [`RegistryRecord`](crate::registry::RegistryRecord).
    /// Not to be confused with its human-readable `entity_id`.
    EntityId
);

uuid_id!(EventId);
