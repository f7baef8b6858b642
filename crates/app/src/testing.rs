//! In-memory fakes for the ports, shared by the service tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use devlink_domain::descriptor::{DeviceDescriptor, DeviceKind};
use devlink_domain::device_config::ConnectConfig;
use devlink_domain::entry::DeviceEntry;
use devlink_domain::error::{LinkError, ProtocolError};
use devlink_domain::event::{Event, EventType};
use devlink_domain::id::{EntityId, EntryId};
use devlink_domain::mac::MacAddress;
use devlink_domain::registry::{RegistryRecord, generate_entity_id};
use devlink_domain::time::now;

use crate::ports::{
    DeviceProtocol, DeviceSession, EntityRegistry, EntryStore, EventPublisher, NewRegistration,
};

/// Log lines written while a [`capture_logs`] guard is alive.
#[derive(Clone, Default)]
pub(crate) struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Route `WARN` and above on the current thread into a buffer until the
/// guard is dropped.
pub(crate) fn capture_logs() -> (tracing::subscriber::DefaultGuard, LogBuffer) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    (tracing::subscriber::set_default(subscriber), buffer)
}

pub(crate) fn descriptor(host: &str, mac: &str, kind: DeviceKind) -> DeviceDescriptor {
    DeviceDescriptor {
        host: host.to_string(),
        mac: mac.parse().unwrap(),
        device_id: "8006ABCDEF0123".to_string(),
        alias: "Test Device".to_string(),
        model: "HS100".to_string(),
        kind,
        connection_type: None,
    }
}

pub(crate) struct FakeSession {
    descriptor: DeviceDescriptor,
    open: Arc<AtomicUsize>,
}

impl DeviceSession for FakeSession {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn close(self) -> impl Future<Output = ()> + Send {
        self.open.fetch_sub(1, Ordering::SeqCst);
        async {}
    }
}

/// Devices keyed by host. Connect failures and a hold gate can be injected.
#[derive(Default)]
pub(crate) struct FakeProtocol {
    devices: Mutex<HashMap<String, DeviceDescriptor>>,
    connect_error: Mutex<Option<ProtocolError>>,
    connects: Mutex<Vec<ConnectConfig>>,
    discover_calls: AtomicUsize,
    open: Arc<AtomicUsize>,
    hold: AtomicBool,
    pub(crate) entered: Notify,
    pub(crate) release: Notify,
}

impl FakeProtocol {
    pub(crate) fn with_device(self, descriptor: DeviceDescriptor) -> Self {
        self.add_device(descriptor);
        self
    }

    pub(crate) fn add_device(&self, descriptor: DeviceDescriptor) {
        self.devices
            .lock()
            .unwrap()
            .insert(descriptor.host.clone(), descriptor);
    }

    pub(crate) fn remove_device(&self, host: &str) {
        self.devices.lock().unwrap().remove(host);
    }

    pub(crate) fn fail_connect(&self, error: Option<ProtocolError>) {
        *self.connect_error.lock().unwrap() = error;
    }

    /// Make the next connects wait for [`Self::release`].
    pub(crate) fn hold_connect(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    pub(crate) fn connects(&self) -> Vec<ConnectConfig> {
        self.connects.lock().unwrap().clone()
    }

    pub(crate) fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn open_sessions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

impl DeviceProtocol for FakeProtocol {
    type Session = FakeSession;

    fn discover(
        &self,
        _target: &str,
    ) -> impl Future<Output = Result<Vec<DeviceDescriptor>, ProtocolError>> + Send {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        let found: Vec<_> = self.devices.lock().unwrap().values().cloned().collect();
        async { Ok(found) }
    }

    fn discover_single(
        &self,
        host: &str,
    ) -> impl Future<Output = Result<DeviceDescriptor, ProtocolError>> + Send {
        let found = self.devices.lock().unwrap().get(host).cloned();
        let host = host.to_string();
        async move { found.ok_or(ProtocolError::Unreachable { host }) }
    }

    fn connect(
        &self,
        config: ConnectConfig,
    ) -> impl Future<Output = Result<Self::Session, ProtocolError>> + Send {
        async move {
            self.connects.lock().unwrap().push(config.clone());
            if self.hold.load(Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            if let Some(err) = self.connect_error.lock().unwrap().clone() {
                return Err(err);
            }
            let descriptor = self
                .devices
                .lock()
                .unwrap()
                .get(&config.host)
                .cloned()
                .ok_or(ProtocolError::Unreachable {
                    host: config.host.clone(),
                })?;
            self.open.fetch_add(1, Ordering::SeqCst);
            Ok(FakeSession {
                descriptor,
                open: Arc::clone(&self.open),
            })
        }
    }
}

#[derive(Default)]
pub(crate) struct InMemoryRegistry {
    records: Mutex<Vec<RegistryRecord>>,
}

impl InMemoryRegistry {
    pub(crate) fn seed(&self, platform: &str, domain: &str, unique_id: &str, entity_id: &str) {
        self.records.lock().unwrap().push(RegistryRecord {
            id: EntityId::new(),
            entity_id: entity_id.to_string(),
            platform: platform.to_string(),
            domain: domain.to_string(),
            unique_id: unique_id.to_string(),
            original_name: None,
            config_entry_id: None,
            created_at: now(),
        });
    }

    pub(crate) fn records(&self) -> Vec<RegistryRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl EntityRegistry for InMemoryRegistry {
    fn get_or_create(
        &self,
        registration: NewRegistration,
    ) -> impl Future<Output = Result<RegistryRecord, LinkError>> + Send {
        let mut records = self.records.lock().unwrap();
        let existing = records
            .iter()
            .find(|r| {
                r.platform == registration.platform
                    && r.domain == registration.domain
                    && r.unique_id == registration.unique_id
            })
            .cloned();
        let record = existing.unwrap_or_else(|| {
            let entity_id = generate_entity_id(
                &registration.domain,
                registration.original_name.as_deref(),
                &registration.unique_id,
                |candidate| records.iter().any(|r| r.entity_id == candidate),
            );
            let record = RegistryRecord {
                id: EntityId::new(),
                entity_id,
                platform: registration.platform,
                domain: registration.domain,
                unique_id: registration.unique_id,
                original_name: registration.original_name,
                config_entry_id: registration.config_entry_id,
                created_at: now(),
            };
            records.push(record.clone());
            record
        });
        async { Ok(record) }
    }

    fn find_by_unique_id(
        &self,
        platform: &str,
        domain: &str,
        unique_id: &str,
    ) -> impl Future<Output = Result<Option<RegistryRecord>, LinkError>> + Send {
        let found = self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.platform == platform && r.domain == domain && r.unique_id == unique_id)
            .cloned();
        async { Ok(found) }
    }
}

#[derive(Default)]
pub(crate) struct InMemoryEntryStore {
    entries: Mutex<HashMap<EntryId, DeviceEntry>>,
}

impl EntryStore for InMemoryEntryStore {
    fn create(
        &self,
        entry: DeviceEntry,
    ) -> impl Future<Output = Result<DeviceEntry, LinkError>> + Send {
        self.entries.lock().unwrap().insert(entry.id, entry.clone());
        async { Ok(entry) }
    }

    fn get_by_id(
        &self,
        id: EntryId,
    ) -> impl Future<Output = Result<Option<DeviceEntry>, LinkError>> + Send {
        let found = self.entries.lock().unwrap().get(&id).cloned();
        async { Ok(found) }
    }

    fn find_by_unique_id(
        &self,
        mac: MacAddress,
    ) -> impl Future<Output = Result<Option<DeviceEntry>, LinkError>> + Send {
        let found = self
            .entries
            .lock()
            .unwrap()
            .values()
            .find(|e| e.unique_id == mac)
            .cloned();
        async { Ok(found) }
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<DeviceEntry>, LinkError>> + Send {
        let all: Vec<_> = self.entries.lock().unwrap().values().cloned().collect();
        async { Ok(all) }
    }

    fn update(
        &self,
        entry: DeviceEntry,
    ) -> impl Future<Output = Result<DeviceEntry, LinkError>> + Send {
        self.entries.lock().unwrap().insert(entry.id, entry.clone());
        async { Ok(entry) }
    }

    fn delete(&self, id: EntryId) -> impl Future<Output = Result<(), LinkError>> + Send {
        self.entries.lock().unwrap().remove(&id);
        async { Ok(()) }
    }
}

#[derive(Default)]
pub(crate) struct RecordingPublisher {
    events: Mutex<Vec<Event>>,
}

impl RecordingPublisher {
    pub(crate) fn of_type(&self, event_type: EventType) -> Vec<Event> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), LinkError>> + Send {
        self.events.lock().unwrap().push(event);
        async { Ok(()) }
    }
}
