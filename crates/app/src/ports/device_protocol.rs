//! Device protocol port — the device-control library as seen by devlink.
//!
//! Implementations talk to real (or simulated) devices. They must report
//! authentication failures as [`ProtocolError::Authentication`] and every
//! other failure through the remaining variants; the bootstrapper relies on
//! that split to pick between a reauthentication flow and a retry.

use std::future::Future;
use std::sync::Arc;

use devlink_domain::descriptor::DeviceDescriptor;
use devlink_domain::device_config::ConnectConfig;
use devlink_domain::error::ProtocolError;

/// A live connection to one device.
///
/// Owned exclusively by whoever opened it; [`close`](Self::close) must be
/// called before it is dropped so the device can release its side.
pub trait DeviceSession: Send + Sync + 'static {
    /// What the device reported about itself once connected.
    fn descriptor(&self) -> &DeviceDescriptor;

    /// Tear the connection down.
    fn close(self) -> impl Future<Output = ()> + Send
    where
        Self: Sized;
}

/// Discovery and connection primitives of a device family.
pub trait DeviceProtocol: Send + Sync {
    type Session: DeviceSession;

    /// Broadcast a discovery probe to `target` and collect every answer.
    fn discover(
        &self,
        target: &str,
    ) -> impl Future<Output = Result<Vec<DeviceDescriptor>, ProtocolError>> + Send;

    /// Probe exactly one device at `host`.
    fn discover_single(
        &self,
        host: &str,
    ) -> impl Future<Output = Result<DeviceDescriptor, ProtocolError>> + Send;

    /// Open a session with fully resolved parameters.
    fn connect(
        &self,
        config: ConnectConfig,
    ) -> impl Future<Output = Result<Self::Session, ProtocolError>> + Send;
}

impl<T: DeviceProtocol> DeviceProtocol for Arc<T> {
    type Session = T::Session;

    fn discover(
        &self,
        target: &str,
    ) -> impl Future<Output = Result<Vec<DeviceDescriptor>, ProtocolError>> + Send {
        (**self).discover(target)
    }

    fn discover_single(
        &self,
        host: &str,
    ) -> impl Future<Output = Result<DeviceDescriptor, ProtocolError>> + Send {
        (**self).discover_single(host)
    }

    fn connect(
        &self,
        config: ConnectConfig,
    ) -> impl Future<Output = Result<Self::Session, ProtocolError>> + Send {
        (**self).connect(config)
    }
}
