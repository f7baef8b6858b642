//! Application services — use-case implementations.
//!
//! Each service struct accepts port trait implementations via generic parameters
//! (constructor injection), keeping this layer decoupled from concrete adapters.

pub mod backoff;
pub mod bootstrap;
pub mod discovery;
pub mod entry_manager;
pub mod migration;
pub mod reauth_flows;
