//! # devlink-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the `EntryStore` and `EntityRegistry` ports defined in `devlink-app::ports`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows
//!
//! ## Dependency rule
//! Depends on `devlink-app` (for port traits) and `devlink-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

mod entity_registry;
mod entry_store;
mod error;
mod pool;

pub use entity_registry::SqliteEntityRegistry;
pub use entry_store::SqliteEntryStore;
pub use error::StorageError;
pub use pool::{Config, Database};
