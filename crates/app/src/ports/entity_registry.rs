//! Entity registry port — the host platform's record of entity identities.

use std::future::Future;
use std::sync::Arc;

use devlink_domain::error::LinkError;
use devlink_domain::id::EntryId;
use devlink_domain::registry::RegistryRecord;

/// Everything needed to register an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRegistration {
    pub platform: String,
    pub domain: String,
    pub unique_id: String,
    pub original_name: Option<String>,
    pub config_entry_id: Option<EntryId>,
}

/// Registry of entities keyed by `(platform, domain, unique_id)`.
pub trait EntityRegistry: Send + Sync {
    /// Return the record registered under the request's key, creating it
    /// (with a freshly generated entity id) when absent. An existing record
    /// is returned unchanged.
    fn get_or_create(
        &self,
        registration: NewRegistration,
    ) -> impl Future<Output = Result<RegistryRecord, LinkError>> + Send;

    /// Look up a record without creating one.
    fn find_by_unique_id(
        &self,
        platform: &str,
        domain: &str,
        unique_id: &str,
    ) -> impl Future<Output = Result<Option<RegistryRecord>, LinkError>> + Send;
}

impl<T: EntityRegistry> EntityRegistry for Arc<T> {
    fn get_or_create(
        &self,
        registration: NewRegistration,
    ) -> impl Future<Output = Result<RegistryRecord, LinkError>> + Send {
        (**self).get_or_create(registration)
    }

    fn find_by_unique_id(
        &self,
        platform: &str,
        domain: &str,
        unique_id: &str,
    ) -> impl Future<Output = Result<Option<RegistryRecord>, LinkError>> + Send {
        (**self).find_by_unique_id(platform, domain, unique_id)
    }
}
