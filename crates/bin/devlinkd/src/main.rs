//! # devlinkd — device link daemon
//!
//! Composition root that wires all adapters together and runs the
//! discovery scheduler and the entry manager until interrupted.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Initialize tracing
//! - Initialize the `SQLite` connection pool and run migrations
//! - Build the device protocol, the shared link context, and the event bus
//! - Construct application services, injecting adapters via port traits
//! - Seed configured entries, set them all up, then signal "fully started"
//! - Handle graceful shutdown (SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use devlink_adapter_storage_sqlite_sqlx::Config as DbConfig;
use devlink_adapter_virtual::VirtualProtocol;
use devlink_app::context::LinkContext;
use devlink_app::event_bus::InProcessEventBus;
use devlink_app::services::discovery::DiscoveryScheduler;
use devlink_app::services::entry_manager::EntryManager;
use devlink_app::services::reauth_flows::InProcessReauthFlows;
use devlink_domain::error::{LinkError, ValidationError};

use crate::config::Config;

const EVENT_BUS_CAPACITY: usize = 256;

fn init_tracing(filter: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(filter).context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Log every published event until the bus closes.
fn spawn_event_logger(bus: &InProcessEventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => tracing::debug!(
                    event_type = %event.event_type,
                    entry_id = ?event.entry_id,
                    data = %event.data,
                    "event"
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    init_tracing(&config.logging.filter)?;

    // Database
    let db = DbConfig {
        database_url: config.database.url.clone(),
    }
    .build()
    .await
    .context("failed to open database")?;

    // Shared state
    let mut context = LinkContext::new(config.connect_timeout());
    if let Some(credentials) = config.credentials.clone() {
        context = context.with_shared_credentials(credentials);
    }
    let context = Arc::new(context);

    // Device network
    let protocol = Arc::new(VirtualProtocol::new(config.virtual_devices()?));

    // Event bus
    let event_bus = InProcessEventBus::new(EVENT_BUS_CAPACITY);
    let event_logger = spawn_event_logger(&event_bus);

    // Services
    let scheduler = Arc::new(
        DiscoveryScheduler::new(Arc::clone(&protocol), event_bus.clone(), Arc::clone(&context))
            .with_targets(config.discovery.targets.clone())
            .with_interval(config.sweep_interval()),
    );
    let flows = Arc::new(InProcessReauthFlows::default());
    let manager = Arc::new(EntryManager::new(
        Arc::clone(&protocol),
        db.entity_registry(),
        db.entry_store(),
        Arc::clone(&flows),
        event_bus,
        Arc::clone(&context),
    ));

    let (started_tx, started_rx) = oneshot::channel();
    let sweeper = Arc::clone(&scheduler).start(started_rx);
    let retry_worker = manager.start();

    for entry in config.seed_entries()? {
        match manager.add_entry(entry).await {
            Ok(entry) => tracing::debug!(entry_id = %entry.id, "entry seeded"),
            Err(LinkError::Validation(ValidationError::DuplicateUniqueId(mac))) => {
                tracing::debug!(%mac, "entry already present, skipping seed");
            }
            Err(err) => return Err(err).context("failed to seed entry"),
        }
    }

    let states = manager.setup_all().await?;
    for (entry_id, state) in &states {
        tracing::info!(%entry_id, %state, "entry state after startup");
    }
    for (entry_id, opened_at) in flows.pending() {
        tracing::warn!(%entry_id, %opened_at, "entry waiting for reauthentication");
    }

    // Receiver gone means the scheduler already stopped.
    let _ = started_tx.send(());
    tracing::info!(entries = states.len(), "devlinkd started");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");

    sweeper.abort();
    if let Some(worker) = retry_worker {
        worker.abort();
    }
    manager.shutdown().await;
    context.teardown();
    event_logger.abort();

    Ok(())
}
