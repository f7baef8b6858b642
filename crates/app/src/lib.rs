//! # devlink-app
//!
//! Application layer — use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `DeviceProtocol` / `DeviceSession` — discover, probe, and connect to devices
//!   - `EntityRegistry` — look up and register entity identities
//!   - `EntryStore` — persisted device entries
//!   - `ReauthFlowHost` — user-facing reauthentication flows
//!   - `RetryPolicy` — backoff between setup retries
//!   - `EventPublisher` — publish domain events
//! - Define **driving/inbound** use-cases:
//!   - `DiscoveryScheduler` — startup, "fully started", and periodic sweeps
//!   - `ConnectionBootstrapper` — turn a stored entry into a live session
//!   - `EntryManager` — the entry lifecycle state machine
//!   - `IdentityMigrator` — legacy vs. canonical unique-id reconciliation
//! - Provide **in-process infrastructure** that doesn't need IO (event bus,
//!   reauth flow tracking, exponential backoff, the link context)
//!
//! ## Dependency rule
//! Depends on `devlink-domain` only (plus `tokio` for tasks, timers, and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod context;
pub mod event_bus;
pub mod ports;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;
