//! Entry store port — persistence for [`DeviceEntry`] records.

use std::future::Future;
use std::sync::Arc;

use devlink_domain::entry::DeviceEntry;
use devlink_domain::error::LinkError;
use devlink_domain::id::EntryId;
use devlink_domain::mac::MacAddress;

/// Repository for persisted device entries.
pub trait EntryStore: Send + Sync {
    fn create(&self, entry: DeviceEntry)
    -> impl Future<Output = Result<DeviceEntry, LinkError>> + Send;

    fn get_by_id(
        &self,
        id: EntryId,
    ) -> impl Future<Output = Result<Option<DeviceEntry>, LinkError>> + Send;

    /// Find the entry created for the device with this MAC.
    fn find_by_unique_id(
        &self,
        mac: MacAddress,
    ) -> impl Future<Output = Result<Option<DeviceEntry>, LinkError>> + Send;

    fn get_all(&self) -> impl Future<Output = Result<Vec<DeviceEntry>, LinkError>> + Send;

    fn update(&self, entry: DeviceEntry)
    -> impl Future<Output = Result<DeviceEntry, LinkError>> + Send;

    fn delete(&self, id: EntryId) -> impl Future<Output = Result<(), LinkError>> + Send;
}

impl<T: EntryStore> EntryStore for Arc<T> {
    fn create(
        &self,
        entry: DeviceEntry,
    ) -> impl Future<Output = Result<DeviceEntry, LinkError>> + Send {
        (**self).create(entry)
    }

    fn get_by_id(
        &self,
        id: EntryId,
    ) -> impl Future<Output = Result<Option<DeviceEntry>, LinkError>> + Send {
        (**self).get_by_id(id)
    }

    fn find_by_unique_id(
        &self,
        mac: MacAddress,
    ) -> impl Future<Output = Result<Option<DeviceEntry>, LinkError>> + Send {
        (**self).find_by_unique_id(mac)
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<DeviceEntry>, LinkError>> + Send {
        (**self).get_all()
    }

    fn update(
        &self,
        entry: DeviceEntry,
    ) -> impl Future<Output = Result<DeviceEntry, LinkError>> + Send {
        (**self).update(entry)
    }

    fn delete(&self, id: EntryId) -> impl Future<Output = Result<(), LinkError>> + Send {
        (**self).delete(id)
    }
}
