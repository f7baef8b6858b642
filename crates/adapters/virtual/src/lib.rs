//! # devlink-adapter-virtual
//!
//! Simulated [`DeviceProtocol`] for demos and end-to-end tests.
//!
//! Devices live in memory, keyed by host. Discovery answers with every
//! online device the target covers:
//!
//! | Target | Answers |
//! |--------|---------|
//! | `255.255.255.255` | every online device |
//! | `a.b.c.255` | online devices in `a.b.c.0/24` |
//! | any other address | the online device at that address |
//!
//! Connect checks the credentials a device requires and hands out
//! [`VirtualSession`]s whose count can be inspected, so tests can assert
//! that no session outlives its entry.
//!
//! ## Dependency rule
//!
//! Depends on `devlink-app` (port traits) and `devlink-domain` only.

mod device;

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use devlink_app::ports::{DeviceProtocol, DeviceSession};
use devlink_domain::descriptor::DeviceDescriptor;
use devlink_domain::device_config::ConnectConfig;
use devlink_domain::error::ProtocolError;

pub use device::{VirtualDevice, VirtualDeviceConfig, VirtualError};

const LIMITED_BROADCAST: &str = "255.255.255.255";

/// A connection to a [`VirtualDevice`].
#[derive(Debug)]
pub struct VirtualSession {
    descriptor: DeviceDescriptor,
    open: Arc<AtomicUsize>,
}

impl DeviceSession for VirtualSession {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn close(self) -> impl Future<Output = ()> + Send {
        self.open.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(host = %self.descriptor.host, "virtual session closed");
        async {}
    }
}

/// In-memory device network.
#[derive(Debug, Default)]
pub struct VirtualProtocol {
    devices: RwLock<HashMap<String, VirtualDevice>>,
    failure: Mutex<Option<ProtocolError>>,
    connects: Mutex<Vec<ConnectConfig>>,
    discover_calls: AtomicUsize,
    open: Arc<AtomicUsize>,
    latency: Duration,
}

impl VirtualProtocol {
    #[must_use]
    pub fn new(devices: impl IntoIterator<Item = VirtualDevice>) -> Self {
        let protocol = Self::default();
        for device in devices {
            protocol.insert(device);
        }
        protocol
    }

    /// Delay every connect by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Add or replace the device at its host.
    pub fn insert(&self, device: VirtualDevice) {
        self.write_devices()
            .insert(device.host.clone(), device);
    }

    pub fn remove(&self, host: &str) -> Option<VirtualDevice> {
        self.write_devices().remove(host)
    }

    /// Bring the device at `host` on or off the network. Returns `false`
    /// when there is no such device.
    pub fn set_online(&self, host: &str, online: bool) -> bool {
        match self.write_devices().get_mut(host) {
            Some(device) => {
                device.online = online;
                true
            }
            None => false,
        }
    }

    /// Make every connect fail with `error` until cleared with `None`.
    pub fn inject_failure(&self, error: Option<ProtocolError>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// Every connect request received so far, in order.
    #[must_use]
    pub fn connect_log(&self) -> Vec<ConnectConfig> {
        self.connects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }

    /// Sessions handed out and not yet closed.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    fn online_at(&self, host: &str) -> Option<VirtualDevice> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .filter(|device| device.online)
            .cloned()
    }

    fn write_devices(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, VirtualDevice>> {
        self.devices.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_connect(&self, config: &ConnectConfig) -> Result<VirtualSession, ProtocolError> {
        if let Some(err) = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(err);
        }
        let device = self
            .online_at(&config.host)
            .ok_or_else(|| ProtocolError::Unreachable {
                host: config.host.clone(),
            })?;
        if let Some(required) = &device.credentials {
            if config.credentials.as_ref() != Some(required) {
                return Err(ProtocolError::Authentication {
                    host: config.host.clone(),
                });
            }
        }
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(VirtualSession {
            descriptor: device.descriptor(),
            open: Arc::clone(&self.open),
        })
    }
}

fn covers(target: &str, host: &str) -> bool {
    if target == LIMITED_BROADCAST {
        return true;
    }
    match target.strip_suffix(".255") {
        Some(prefix) => host
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.')),
        None => target == host,
    }
}

impl DeviceProtocol for VirtualProtocol {
    type Session = VirtualSession;

    fn discover(
        &self,
        target: &str,
    ) -> impl Future<Output = Result<Vec<DeviceDescriptor>, ProtocolError>> + Send {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        let found: Vec<DeviceDescriptor> = self
            .devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|device| device.online && covers(target, &device.host))
            .map(VirtualDevice::descriptor)
            .collect();
        tracing::debug!(%target, found = found.len(), "virtual discovery");
        async { Ok(found) }
    }

    fn discover_single(
        &self,
        host: &str,
    ) -> impl Future<Output = Result<DeviceDescriptor, ProtocolError>> + Send {
        let result = self
            .online_at(host)
            .map(|device| device.descriptor())
            .ok_or_else(|| ProtocolError::Unreachable {
                host: host.to_string(),
            });
        async { result }
    }

    fn connect(
        &self,
        config: ConnectConfig,
    ) -> impl Future<Output = Result<Self::Session, ProtocolError>> + Send {
        async move {
            self.connects
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(config.clone());
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.try_connect(&config)
        }
    }
}
