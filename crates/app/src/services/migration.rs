//! Identity migration — decides which unique id the entity of a freshly
//! connected device lives under.
//!
//! Entities registered before the MAC-based scheme keep their legacy id so
//! that user-visible entity ids (and everything bound to them) survive.
//! Everything else is registered under the canonical rollout id.

use devlink_domain::descriptor::DeviceDescriptor;
use devlink_domain::entry::DeviceEntry;
use devlink_domain::error::LinkError;
use devlink_domain::registry::RegistryRecord;

use crate::ports::{EntityRegistry, NewRegistration};

/// Platform name entities are registered under.
pub const DEFAULT_PLATFORM: &str = "devlink";

/// Which scheme the entity ended up under.
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationOutcome {
    /// A legacy entity already existed and was kept as is.
    LegacyRetained(RegistryRecord),
    /// The entity lives under the canonical id (possibly just created).
    Canonical(RegistryRecord),
}

impl MigrationOutcome {
    #[must_use]
    pub fn record(&self) -> &RegistryRecord {
        match self {
            Self::LegacyRetained(record) | Self::Canonical(record) => record,
        }
    }

    #[must_use]
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::LegacyRetained(_) => "legacy",
            Self::Canonical(_) => "canonical",
        }
    }
}

pub struct IdentityMigrator<R> {
    registry: R,
    platform: String,
}

impl<R: EntityRegistry> IdentityMigrator<R> {
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            platform: DEFAULT_PLATFORM.to_string(),
        }
    }

    #[must_use]
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    #[must_use]
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Reconcile the registry with a connected device. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the entity registry.
    #[tracing::instrument(skip(self, entry, descriptor), fields(entry_id = %entry.id))]
    pub async fn migrate(
        &self,
        entry: &DeviceEntry,
        descriptor: &DeviceDescriptor,
    ) -> Result<MigrationOutcome, LinkError> {
        let domain = descriptor.entity_domain();
        let legacy_id = descriptor.legacy_unique_id();

        if let Some(record) = self
            .registry
            .find_by_unique_id(&self.platform, domain, &legacy_id)
            .await?
        {
            tracing::debug!(
                entity_id = %record.entity_id,
                unique_id = %legacy_id,
                "keeping legacy unique id"
            );
            return Ok(MigrationOutcome::LegacyRetained(record));
        }

        let record = self
            .registry
            .get_or_create(NewRegistration {
                platform: self.platform.clone(),
                domain: domain.to_string(),
                unique_id: entry.unique_id.rollout_id(),
                original_name: Some(descriptor.alias.clone()),
                config_entry_id: Some(entry.id),
            })
            .await?;
        tracing::debug!(
            entity_id = %record.entity_id,
            unique_id = %record.unique_id,
            "entity registered under canonical unique id"
        );
        Ok(MigrationOutcome::Canonical(record))
    }
}
