//! Discovery scheduler — periodic broadcast sweeps feeding the discovery
//! cache.
//!
//! A sweep runs once when the scheduler starts, once more when the host
//! signals it is fully started, then on every interval tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use devlink_domain::descriptor::DeviceDescriptor;
use devlink_domain::error::LinkError;
use devlink_domain::event::{Event, EventType};

use crate::context::LinkContext;
use crate::ports::{DeviceProtocol, EventPublisher};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_BROADCAST_TARGET: &str = "255.255.255.255";

pub struct DiscoveryScheduler<P, E> {
    protocol: P,
    publisher: E,
    context: Arc<LinkContext>,
    targets: Vec<String>,
    interval: Duration,
}

impl<P, E> DiscoveryScheduler<P, E>
where
    P: DeviceProtocol,
    E: EventPublisher,
{
    pub fn new(protocol: P, publisher: E, context: Arc<LinkContext>) -> Self {
        Self {
            protocol,
            publisher,
            context,
            targets: vec![DEFAULT_BROADCAST_TARGET.to_string()],
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Broadcast addresses probed on every sweep. An empty list keeps the
    /// current targets.
    #[must_use]
    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        if !targets.is_empty() {
            self.targets = targets;
        }
        self
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probe every target once and merge the answers into the cache.
    ///
    /// A failing target is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if publishing a discovery event fails.
    #[tracing::instrument(skip(self))]
    pub async fn trigger_sweep(&self) -> Result<Vec<DeviceDescriptor>, LinkError> {
        let mut found = Vec::new();
        for target in &self.targets {
            match self.protocol.discover(target).await {
                Ok(devices) => found.extend(devices),
                Err(err) => tracing::warn!(%target, %err, "discovery target failed"),
            }
        }

        self.context.cache().merge(found.iter().cloned());

        for device in &found {
            self.publisher
                .publish(Event::new(
                    EventType::DeviceDiscovered,
                    None,
                    serde_json::json!({
                        "host": device.host,
                        "mac": device.mac,
                        "model": device.model,
                        "alias": device.alias,
                    }),
                ))
                .await?;
        }
        self.publisher
            .publish(Event::new(
                EventType::SweepCompleted,
                None,
                serde_json::json!({
                    "targets": self.targets.len(),
                    "found": found.len(),
                }),
            ))
            .await?;

        tracing::debug!(
            found = found.len(),
            cached = self.context.cache().len(),
            "sweep completed"
        );
        Ok(found)
    }

    async fn run_sweep(&self, trigger: &'static str) {
        if let Err(err) = self.trigger_sweep().await {
            tracing::warn!(trigger, error = %err, "discovery sweep failed");
        }
    }
}

impl<P, E> DiscoveryScheduler<P, E>
where
    P: DeviceProtocol + 'static,
    E: EventPublisher + 'static,
{
    /// Spawn the sweep loop. `started` fires once the host is fully up.
    ///
    /// Abort the returned handle to stop sweeping.
    pub fn start(self: Arc<Self>, mut started: oneshot::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                targets = ?self.targets,
                interval_secs = self.interval.as_secs(),
                "discovery scheduler started"
            );
            self.run_sweep("startup").await;

            let mut started_done = false;
            let mut ticker =
                tokio::time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    result = &mut started, if !started_done => {
                        started_done = true;
                        if result.is_ok() {
                            self.run_sweep("started").await;
                        }
                    }
                    _ = ticker.tick() => {
                        self.run_sweep("interval").await;
                    }
                }
            }
        })
    }
}
