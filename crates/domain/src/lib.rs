//! # devlink-domain
//!
//! Pure domain model for the devlink device link manager.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **MAC identities** and the canonical / rollout unique-id forms
//! - Define **Device entries** (persisted identity for one physical device)
//! - Define the versioned **device config** schema and its parse-or-default rule
//! - Define **device descriptors** and legacy unique-id derivation
//! - Define **entry states**, registry records, and **events**
//! - Define the bootstrap **error taxonomy**
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod descriptor;
pub mod device_config;
pub mod entry;
pub mod event;
pub mod mac;
pub mod registry;
