//! Entry manager — the lifecycle state machine of device entries.
//!
//! ```text
//! NOT_LOADED --success-----------> LOADED
//! NOT_LOADED --auth failure------> SETUP_ERROR   (one reauth flow requested)
//! NOT_LOADED --transient failure-> SETUP_RETRY   (retry scheduled)
//! SETUP_RETRY --retry success----> LOADED
//! LOADED | SETUP_RETRY --unload--> NOT_LOADED
//! SETUP_ERROR --reauthenticate---> LOADED | SETUP_ERROR | SETUP_RETRY
//! ```
//!
//! Each entry owns a slot with a `watch` channel for its state and an async
//! mutex held for the whole of a setup attempt. A second setup, an unload,
//! or a reauthentication of the same entry waits for the attempt in flight,
//! so a session is never opened for an entry that was already unloaded.
//!
//! Retries are timer tasks that post the entry id back to a worker spawned
//! by [`EntryManager::start`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use devlink_domain::entry::{Credentials, DeviceEntry, EntryState};
use devlink_domain::error::{
    AttemptOutcome, InvalidTransition, LinkError, NotFoundError, ValidationError,
};
use devlink_domain::event::{Event, EventType};
use devlink_domain::id::EntryId;

use crate::context::LinkContext;
use crate::ports::{
    DeviceProtocol, DeviceSession, EntityRegistry, EntryStore, EventPublisher, ReauthFlowHost,
    RetryPolicy,
};
use crate::services::backoff::ExponentialBackoff;
use crate::services::bootstrap::ConnectionBootstrapper;
use crate::services::migration::IdentityMigrator;

struct SlotRuntime<S> {
    session: Option<S>,
    tries: u32,
    retry: Option<JoinHandle<()>>,
    retry_seq: u64,
}

impl<S> Default for SlotRuntime<S> {
    fn default() -> Self {
        Self {
            session: None,
            tries: 0,
            retry: None,
            retry_seq: 0,
        }
    }
}

impl<S> SlotRuntime<S> {
    fn cancel_retry(&mut self) {
        if let Some(retry) = self.retry.take() {
            retry.abort();
        }
    }
}

struct EntrySlot<S> {
    state: watch::Sender<EntryState>,
    runtime: tokio::sync::Mutex<SlotRuntime<S>>,
}

impl<S> EntrySlot<S> {
    fn new() -> Self {
        Self {
            state: watch::Sender::new(EntryState::NotLoaded),
            runtime: tokio::sync::Mutex::new(SlotRuntime::default()),
        }
    }

    fn current(&self) -> EntryState {
        *self.state.borrow()
    }
}

type Slots<S> = HashMap<EntryId, Arc<EntrySlot<S>>>;
type RetryTicket = (EntryId, u64);

/// Drives every entry through its lifecycle.
pub struct EntryManager<P: DeviceProtocol, R, S, F, E> {
    bootstrapper: ConnectionBootstrapper<P>,
    migrator: IdentityMigrator<R>,
    store: S,
    flows: F,
    publisher: E,
    context: Arc<LinkContext>,
    retry_policy: Arc<dyn RetryPolicy>,
    slots: Mutex<Slots<P::Session>>,
    retry_tx: mpsc::UnboundedSender<RetryTicket>,
    retry_rx: Mutex<Option<mpsc::UnboundedReceiver<RetryTicket>>>,
}

impl<P, R, S, F, E> EntryManager<P, R, S, F, E>
where
    P: DeviceProtocol,
    R: EntityRegistry,
    S: EntryStore,
    F: ReauthFlowHost,
    E: EventPublisher,
{
    pub fn new(
        protocol: P,
        registry: R,
        store: S,
        flows: F,
        publisher: E,
        context: Arc<LinkContext>,
    ) -> Self {
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        Self {
            bootstrapper: ConnectionBootstrapper::new(protocol),
            migrator: IdentityMigrator::new(registry),
            store,
            flows,
            publisher,
            context,
            retry_policy: Arc::new(ExponentialBackoff::default()),
            slots: Mutex::new(HashMap::new()),
            retry_tx,
            retry_rx: Mutex::new(Some(retry_rx)),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry_policy = Arc::new(policy);
        self
    }

    /// Platform name the identity migrator registers entities under.
    #[must_use]
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.migrator = self.migrator.with_platform(platform);
        self
    }

    #[must_use]
    pub fn context(&self) -> &Arc<LinkContext> {
        &self.context
    }

    /// Persist `entry` (unless already stored) and start tracking it in
    /// `NOT_LOADED`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Validation`] if invariants fail or another entry
    /// already claims the same MAC, or a storage error from the entry store.
    #[tracing::instrument(skip(self, entry), fields(entry_id = %entry.id, mac = %entry.unique_id))]
    pub async fn add_entry(&self, entry: DeviceEntry) -> Result<DeviceEntry, LinkError> {
        entry.validate()?;
        if let Some(existing) = self.store.find_by_unique_id(entry.unique_id).await? {
            if existing.id != entry.id {
                return Err(ValidationError::DuplicateUniqueId(entry.unique_id).into());
            }
            self.track(existing.id);
            return Ok(existing);
        }
        let entry = self.store.create(entry).await?;
        self.track(entry.id);
        tracing::info!(title = %entry.title, "entry added");
        Ok(entry)
    }

    /// Set up every stored entry that is ready for it.
    ///
    /// Failures of individual entries are logged and do not stop the others.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the entries cannot be listed.
    pub async fn setup_all(&self) -> Result<Vec<(EntryId, EntryState)>, LinkError> {
        let entries = self.store.get_all().await?;
        let mut states = Vec::with_capacity(entries.len());
        for entry in entries {
            let slot = self.track(entry.id);
            let state = if slot.current().can_setup() {
                match self.setup(entry.id).await {
                    Ok(state) => state,
                    Err(err) => {
                        tracing::warn!(entry_id = %entry.id, error = %err, "entry setup failed");
                        slot.current()
                    }
                }
            } else {
                slot.current()
            };
            states.push((entry.id, state));
        }
        Ok(states)
    }

    /// Run one setup attempt and return the state it ended in.
    ///
    /// # Errors
    ///
    /// - [`LinkError::NotFound`] if the entry does not exist.
    /// - [`LinkError::InvalidTransition`] if the entry is `LOADED` or
    ///   `SETUP_ERROR`.
    #[tracing::instrument(skip(self))]
    pub async fn setup(&self, entry_id: EntryId) -> Result<EntryState, LinkError> {
        let slot = self.resolve_slot(entry_id).await?;
        let mut runtime = slot.runtime.lock().await;
        let state = slot.current();
        if !state.can_setup() {
            return Err(InvalidTransition {
                operation: "set up",
                state,
            }
            .into());
        }
        runtime.cancel_retry();
        self.attempt(entry_id, &slot, &mut runtime).await
    }

    /// Tear an entry down to `NOT_LOADED`, closing its session and
    /// cancelling any pending retry. Waits for an attempt in flight.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::NotFound`] if the entry is not tracked.
    #[tracing::instrument(skip(self))]
    pub async fn unload(&self, entry_id: EntryId) -> Result<(), LinkError> {
        let slot = self.tracked(entry_id).ok_or_else(|| not_found(entry_id))?;
        let mut runtime = slot.runtime.lock().await;
        runtime.cancel_retry();
        runtime.tries = 0;
        if let Some(session) = runtime.session.take() {
            session.close().await;
        }
        self.transition(entry_id, &slot, EntryState::NotLoaded, None).await;
        Ok(())
    }

    /// Unload then set up again.
    ///
    /// # Errors
    ///
    /// See [`Self::unload`] and [`Self::setup`].
    pub async fn reload(&self, entry_id: EntryId) -> Result<EntryState, LinkError> {
        self.unload(entry_id).await?;
        self.setup(entry_id).await
    }

    /// Store new credentials on the entry, close its reauth flow, and try
    /// again from whatever state it is in.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Validation`] for empty credentials,
    /// [`LinkError::NotFound`] if the entry does not exist, or a storage
    /// error from the entry store or the flow host.
    #[tracing::instrument(skip(self, credentials))]
    pub async fn reauthenticate(
        &self,
        entry_id: EntryId,
        credentials: Credentials,
    ) -> Result<EntryState, LinkError> {
        credentials.validate()?;
        let slot = self.resolve_slot(entry_id).await?;
        let mut runtime = slot.runtime.lock().await;

        let mut entry = self.load_entry(entry_id).await?;
        entry.credentials = Some(credentials);
        self.store.update(entry).await?;
        self.flows.resolve_reauth(entry_id).await?;

        runtime.cancel_retry();
        runtime.tries = 0;
        if let Some(session) = runtime.session.take() {
            session.close().await;
        }
        self.attempt(entry_id, &slot, &mut runtime).await
    }

    /// Unload and forget an entry.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the entry store or the flow host.
    #[tracing::instrument(skip(self))]
    pub async fn remove_entry(&self, entry_id: EntryId) -> Result<(), LinkError> {
        if self.tracked(entry_id).is_some() {
            self.unload(entry_id).await?;
        }
        self.flows.resolve_reauth(entry_id).await?;
        self.store.delete(entry_id).await?;
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&entry_id);
        tracing::info!("entry removed");
        Ok(())
    }

    /// Current state, `None` if the entry is not tracked.
    #[must_use]
    pub fn state(&self, entry_id: EntryId) -> Option<EntryState> {
        self.tracked(entry_id).map(|slot| slot.current())
    }

    /// Watch state changes of an entry.
    #[must_use]
    pub fn subscribe(&self, entry_id: EntryId) -> Option<watch::Receiver<EntryState>> {
        self.tracked(entry_id).map(|slot| slot.state.subscribe())
    }

    /// Unload every tracked entry.
    pub async fn shutdown(&self) {
        let ids: Vec<EntryId> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        for id in ids {
            if let Err(err) = self.unload(id).await {
                tracing::warn!(entry_id = %id, error = %err, "unload failed during shutdown");
            }
        }
        tracing::info!("entry manager stopped");
    }

    async fn attempt(
        &self,
        entry_id: EntryId,
        slot: &EntrySlot<P::Session>,
        runtime: &mut SlotRuntime<P::Session>,
    ) -> Result<EntryState, LinkError> {
        let entry = self.load_entry(entry_id).await?;

        let connected = match self.bootstrapper.bootstrap(&entry, &self.context).await {
            Ok(connected) => connected,
            Err(err) if err.outcome() == AttemptOutcome::AuthFailure => {
                tracing::warn!(error = %err, reason = err.reason(), "credentials rejected");
                self.transition(entry_id, slot, EntryState::SetupError, Some(err.reason())).await;
                self.request_reauth(entry_id).await;
                return Ok(EntryState::SetupError);
            }
            Err(err) => {
                tracing::warn!(error = %err, reason = err.reason(), "setup failed, will retry");
                return Ok(self
                    .schedule_retry(entry_id, slot, runtime, err.reason())
                    .await);
            }
        };

        let descriptor = connected.session.descriptor().clone();
        match self.migrator.migrate(&entry, &descriptor).await {
            Ok(outcome) => {
                self.publish(Event::new(
                    EventType::IdentityMigrated,
                    Some(entry_id),
                    serde_json::json!({
                        "entity_id": outcome.record().entity_id,
                        "unique_id": outcome.record().unique_id,
                        "scheme": outcome.scheme(),
                    }),
                ))
                .await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "entity registry unavailable, will retry");
                connected.session.close().await;
                return Ok(self
                    .schedule_retry(entry_id, slot, runtime, "registry")
                    .await);
            }
        }

        runtime.session = Some(connected.session);
        runtime.tries = 0;
        if let Err(err) = self.flows.resolve_reauth(entry_id).await {
            tracing::warn!(error = %err, "could not resolve reauthentication flow");
        }
        self.transition(entry_id, slot, EntryState::Loaded, None).await;
        tracing::info!(host = %connected.host, mac = %connected.mac, "entry loaded");
        Ok(EntryState::Loaded)
    }

    async fn schedule_retry(
        &self,
        entry_id: EntryId,
        slot: &EntrySlot<P::Session>,
        runtime: &mut SlotRuntime<P::Session>,
        reason: &'static str,
    ) -> EntryState {
        runtime.cancel_retry();
        runtime.tries = runtime.tries.saturating_add(1);
        runtime.retry_seq = runtime.retry_seq.wrapping_add(1);
        let delay = self.retry_policy.delay(runtime.tries);
        let ticket = (entry_id, runtime.retry_seq);
        let tx = self.retry_tx.clone();
        runtime.retry = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The manager is gone when nobody receives.
            let _ = tx.send(ticket);
        }));

        self.transition(entry_id, slot, EntryState::SetupRetry, Some(reason)).await;
        tracing::info!(attempt = runtime.tries, retry_in = ?delay, reason, "retry scheduled");
        EntryState::SetupRetry
    }

    async fn request_reauth(&self, entry_id: EntryId) {
        match self.flows.request_reauth(entry_id).await {
            Ok(true) => {
                self.publish(Event::new(
                    EventType::ReauthRequested,
                    Some(entry_id),
                    serde_json::json!({}),
                ))
                .await;
            }
            Ok(false) => tracing::debug!("reauthentication already pending"),
            Err(err) => tracing::warn!(error = %err, "could not request reauthentication"),
        }
    }

    async fn run_retry(&self, (entry_id, seq): RetryTicket) {
        let Some(slot) = self.tracked(entry_id) else {
            return;
        };
        let mut runtime = slot.runtime.lock().await;
        if runtime.retry_seq != seq || slot.current() != EntryState::SetupRetry {
            tracing::debug!(%entry_id, "stale retry dropped");
            return;
        }
        runtime.retry = None;
        tracing::debug!(%entry_id, attempt = runtime.tries, "retrying setup");
        if let Err(err) = self.attempt(entry_id, &slot, &mut runtime).await {
            tracing::warn!(%entry_id, error = %err, "retry failed");
        }
    }

    async fn transition(
        &self,
        entry_id: EntryId,
        slot: &EntrySlot<P::Session>,
        to: EntryState,
        reason: Option<&'static str>,
    ) {
        let from = slot.state.send_replace(to);
        if from == to {
            return;
        }
        tracing::info!(%entry_id, %from, %to, reason, "entry state changed");
        self.publish(Event::new(
            EventType::EntryStateChanged,
            Some(entry_id),
            serde_json::json!({
                "from": from,
                "to": to,
                "reason": reason,
            }),
        ))
        .await;
    }

    async fn publish(&self, event: Event) {
        if let Err(err) = self.publisher.publish(event).await {
            tracing::warn!(error = %err, "failed to publish event");
        }
    }

    async fn load_entry(&self, entry_id: EntryId) -> Result<DeviceEntry, LinkError> {
        self.store
            .get_by_id(entry_id)
            .await?
            .ok_or_else(|| not_found(entry_id))
    }

    async fn resolve_slot(
        &self,
        entry_id: EntryId,
    ) -> Result<Arc<EntrySlot<P::Session>>, LinkError> {
        if let Some(slot) = self.tracked(entry_id) {
            return Ok(slot);
        }
        let entry = self.load_entry(entry_id).await?;
        Ok(self.track(entry.id))
    }

    fn tracked(&self, entry_id: EntryId) -> Option<Arc<EntrySlot<P::Session>>> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&entry_id)
            .cloned()
    }

    fn track(&self, entry_id: EntryId) -> Arc<EntrySlot<P::Session>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            slots
                .entry(entry_id)
                .or_insert_with(|| Arc::new(EntrySlot::new())),
        )
    }
}

impl<P, R, S, F, E> EntryManager<P, R, S, F, E>
where
    P: DeviceProtocol + 'static,
    R: EntityRegistry + 'static,
    S: EntryStore + 'static,
    F: ReauthFlowHost + 'static,
    E: EventPublisher + 'static,
{
    /// Spawn the worker that runs due retries. Returns `None` when it is
    /// already running.
    ///
    /// The worker holds a weak reference and stops once the manager is
    /// dropped.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut rx = self
            .retry_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        let manager: Weak<Self> = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            while let Some(ticket) = rx.recv().await {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                tokio::spawn(async move { manager.run_retry(ticket).await });
            }
            tracing::debug!("retry worker stopped");
        }))
    }
}

fn not_found(entry_id: EntryId) -> LinkError {
    NotFoundError {
        entity: "DeviceEntry",
        id: entry_id.to_string(),
    }
    .into()
}
