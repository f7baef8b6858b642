//! Device entries — the persisted identity of one physical device — and
//! the lifecycle state the entry manager tracks for each of them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, ValidationError};
use crate::id::EntryId;
use crate::mac::MacAddress;
use crate::time::{Timestamp, now};

/// Username/password pair used to authenticate against a device.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyUsername`] when `username` is empty.
    pub fn validate(&self) -> Result<(), LinkError> {
        if self.username.is_empty() {
            return Err(ValidationError::EmptyUsername.into());
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Persisted configuration for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub id: EntryId,
    pub title: String,
    /// Configured address. When unset the device is located through the
    /// discovery cache.
    pub host: Option<String>,
    pub unique_id: MacAddress,
    pub credentials: Option<Credentials>,
    /// Opaque connection parameters captured when the entry was created.
    /// Validated at connect time, see [`crate::device_config`].
    pub device_config: Option<serde_json::Value>,
    pub created_at: Timestamp,
}

impl DeviceEntry {
    /// Create a builder for constructing a [`DeviceEntry`].
    #[must_use]
    pub fn builder() -> DeviceEntryBuilder {
        DeviceEntryBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Validation`] when:
    /// - `title` is empty ([`ValidationError::EmptyTitle`])
    /// - `host` is set but empty ([`ValidationError::EmptyHost`])
    /// - `credentials` carry an empty username ([`ValidationError::EmptyUsername`])
    pub fn validate(&self) -> Result<(), LinkError> {
        if self.title.is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }
        if self.host.as_deref().is_some_and(str::is_empty) {
            return Err(ValidationError::EmptyHost.into());
        }
        if let Some(credentials) = &self.credentials {
            credentials.validate()?;
        }
        Ok(())
    }
}

/// Step-by-step builder for [`DeviceEntry`].
#[derive(Debug, Default)]
pub struct DeviceEntryBuilder {
    id: Option<EntryId>,
    title: Option<String>,
    host: Option<String>,
    unique_id: Option<MacAddress>,
    credentials: Option<Credentials>,
    device_config: Option<serde_json::Value>,
    created_at: Option<Timestamp>,
}

impl DeviceEntryBuilder {
    #[must_use]
    pub fn id(mut self, id: EntryId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn unique_id(mut self, mac: MacAddress) -> Self {
        self.unique_id = Some(mac);
        self
    }

    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub fn device_config(mut self, blob: serde_json::Value) -> Self {
        self.device_config = Some(blob);
        self
    }

    #[must_use]
    pub fn created_at(mut self, ts: Timestamp) -> Self {
        self.created_at = Some(ts);
        self
    }

    /// Consume the builder, validate, and return a [`DeviceEntry`].
    ///
    /// The title defaults to the canonical MAC when not provided.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Validation`] if `unique_id` is missing or any
    /// invariant checked by [`DeviceEntry::validate`] fails.
    pub fn build(self) -> Result<DeviceEntry, LinkError> {
        let unique_id = self.unique_id.ok_or(ValidationError::MissingUniqueId)?;
        let entry = DeviceEntry {
            id: self.id.unwrap_or_default(),
            title: self.title.unwrap_or_else(|| unique_id.to_string()),
            host: self.host,
            unique_id,
            credentials: self.credentials,
            device_config: self.device_config,
            created_at: self.created_at.unwrap_or_else(now),
        };
        entry.validate()?;
        Ok(entry)
    }
}

/// Observable lifecycle state of an entry. Exactly one per entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    #[default]
    NotLoaded,
    Loaded,
    /// A transient failure happened; a retry is pending.
    SetupRetry,
    /// Credentials were rejected; only reauthentication gets out of here.
    SetupError,
}

impl EntryState {
    /// Whether a fresh setup attempt may start from this state without
    /// reauthentication.
    #[must_use]
    pub fn can_setup(self) -> bool {
        matches!(self, Self::NotLoaded | Self::SetupRetry)
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotLoaded => f.write_str("not_loaded"),
            Self::Loaded => f.write_str("loaded"),
            Self::SetupRetry => f.write_str("setup_retry"),
            Self::SetupError => f.write_str("setup_error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac() -> MacAddress {
        "aa:bb:cc:dd:ee:ff".parse().unwrap()
    }

    #[test]
    fn should_build_entry_with_defaults() {
        let entry = DeviceEntry::builder().unique_id(mac()).build().unwrap();
        assert_eq!(entry.title, "aa:bb:cc:dd:ee:ff");
        assert!(entry.host.is_none());
        assert!(entry.credentials.is_none());
        assert!(entry.device_config.is_none());
    }

    #[test]
    fn should_reject_entry_without_unique_id() {
        let result = DeviceEntry::builder().host("127.0.0.1").build();
        assert!(matches!(
            result,
            Err(LinkError::Validation(ValidationError::MissingUniqueId))
        ));
    }

    #[test]
    fn should_reject_empty_host() {
        let result = DeviceEntry::builder().unique_id(mac()).host("").build();
        assert!(matches!(
            result,
            Err(LinkError::Validation(ValidationError::EmptyHost))
        ));
    }

    #[test]
    fn should_reject_empty_title() {
        let result = DeviceEntry::builder().unique_id(mac()).title("").build();
        assert!(matches!(
            result,
            Err(LinkError::Validation(ValidationError::EmptyTitle))
        ));
    }

    #[test]
    fn should_reject_credentials_without_username() {
        let result = DeviceEntry::builder()
            .unique_id(mac())
            .credentials(Credentials::new("", "secret"))
            .build();
        assert!(matches!(
            result,
            Err(LinkError::Validation(ValidationError::EmptyUsername))
        ));
    }

    #[test]
    fn should_redact_password_in_debug_output() {
        let credentials = Credentials::new("user", "hunter2");
        let debug = format!("{credentials:?}");
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn should_default_state_to_not_loaded() {
        assert_eq!(EntryState::default(), EntryState::NotLoaded);
    }

    #[test]
    fn should_allow_setup_only_from_not_loaded_and_retry() {
        assert!(EntryState::NotLoaded.can_setup());
        assert!(EntryState::SetupRetry.can_setup());
        assert!(!EntryState::Loaded.can_setup());
        assert!(!EntryState::SetupError.can_setup());
    }

    #[test]
    fn should_roundtrip_state_through_serde_json() {
        let json = serde_json::to_string(&EntryState::SetupRetry).unwrap();
        assert_eq!(json, "\"setup_retry\"");
        let parsed: EntryState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, EntryState::SetupRetry);
    }
}
