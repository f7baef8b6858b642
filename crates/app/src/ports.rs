//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod device_protocol;
pub mod entity_registry;
pub mod entry_store;
pub mod event_bus;
pub mod reauth;
pub mod retry;

pub use device_protocol::{DeviceProtocol, DeviceSession};
pub use entity_registry::{EntityRegistry, NewRegistration};
pub use entry_store::EntryStore;
pub use event_bus::EventPublisher;
pub use reauth::ReauthFlowHost;
pub use retry::RetryPolicy;
