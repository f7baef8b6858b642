//! Link context — the process-wide state shared by discovery and bootstrap.
//!
//! Holds the discovery cache and the shared credentials. It is created once
//! by the composition root, passed explicitly (as `Arc<LinkContext>`) to the
//! components that need it, and cleared with [`LinkContext::teardown`] on
//! shutdown.
//!
//! Locks here are never held across an `.await`.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use devlink_domain::descriptor::DeviceDescriptor;
use devlink_domain::device_config::DEFAULT_TIMEOUT;
use devlink_domain::entry::Credentials;
use devlink_domain::mac::MacAddress;

/// Devices found by discovery sweeps, keyed by host address.
///
/// Written only by the discovery scheduler; read by everyone else.
#[derive(Debug, Default)]
pub struct DiscoveryCache {
    devices: RwLock<HashMap<String, DeviceDescriptor>>,
}

impl DiscoveryCache {
    #[must_use]
    pub fn get(&self, host: &str) -> Option<DeviceDescriptor> {
        self.read(|devices| devices.get(host).cloned())
    }

    /// Find the device with this MAC, wherever it was last seen.
    #[must_use]
    pub fn find_by_mac(&self, mac: MacAddress) -> Option<DeviceDescriptor> {
        self.read(|devices| devices.values().find(|d| d.mac == mac).cloned())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read(HashMap::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<DeviceDescriptor> {
        self.read(|devices| devices.values().cloned().collect())
    }

    /// Merge sweep results by device identity, last write wins. A device
    /// reported at a new host drops its previous host key.
    pub(crate) fn merge(&self, found: impl IntoIterator<Item = DeviceDescriptor>) {
        let mut devices = self
            .devices
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for descriptor in found {
            devices.retain(|host, known| known.mac != descriptor.mac || *host == descriptor.host);
            devices.insert(descriptor.host.clone(), descriptor);
        }
    }

    pub(crate) fn clear(&self) {
        self.devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn read<T>(&self, f: impl FnOnce(&HashMap<String, DeviceDescriptor>) -> T) -> T {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        f(&devices)
    }
}

/// Process-wide state threaded through discovery and bootstrap calls.
#[derive(Debug)]
pub struct LinkContext {
    cache: DiscoveryCache,
    shared_credentials: RwLock<Option<Credentials>>,
    connect_timeout: Duration,
}

impl Default for LinkContext {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl LinkContext {
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            cache: DiscoveryCache::default(),
            shared_credentials: RwLock::new(None),
            connect_timeout,
        }
    }

    /// Install credentials used for every entry that brings none of its own.
    #[must_use]
    pub fn with_shared_credentials(self, credentials: Credentials) -> Self {
        self.set_shared_credentials(Some(credentials));
        self
    }

    pub fn set_shared_credentials(&self, credentials: Option<Credentials>) {
        *self
            .shared_credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner) = credentials;
    }

    #[must_use]
    pub fn shared_credentials(&self) -> Option<Credentials> {
        self.shared_credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn cache(&self) -> &DiscoveryCache {
        &self.cache
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Forget discovered devices and shared credentials.
    pub fn teardown(&self) {
        self.cache.clear();
        self.set_shared_credentials(None);
        tracing::debug!("link context cleared");
    }
}
