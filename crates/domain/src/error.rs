//! Error types shared across the workspace.
//!
//! [`LinkError`] is the base error crossing port boundaries. Each layer
//! defines its own typed errors and converts via `#[from]`.
//!
//! The bootstrap taxonomy is separate: [`BootstrapError`] is the only thing
//! that leaves the connection bootstrapper, and its [`AttemptOutcome`] is the
//! only thing the lifecycle state machine looks at.

use crate::entry::EntryState;
use crate::mac::MacAddress;

/// Base error type for devlink operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    #[error("invalid transition")]
    InvalidTransition(#[from] InvalidTransition),

    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Domain invariant violations.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("unique id is required")]
    MissingUniqueId,

    #[error("host must not be empty when set")]
    EmptyHost,

    #[error("username must not be empty")]
    EmptyUsername,

    #[error("invalid MAC address {0:?}")]
    InvalidMac(String),

    #[error("an entry for {0} already exists")]
    DuplicateUniqueId(MacAddress),
}

/// A lookup that found nothing.
#[derive(Debug, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// A lifecycle operation that is not allowed from the entry's current state.
#[derive(Debug, thiserror::Error)]
#[error("cannot {operation} an entry in state {state}")]
pub struct InvalidTransition {
    pub operation: &'static str,
    pub state: EntryState,
}

/// Failure reported by a device protocol implementation.
///
/// Authentication is kept distinct from everything else: it is the only
/// failure that needs the user to act.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("authentication rejected by {host}")]
    Authentication { host: String },

    #[error("timed out talking to {host}")]
    Timeout { host: String },

    #[error("{host} is unreachable")]
    Unreachable { host: String },

    #[error("device error from {host}: {message}")]
    Device { host: String, message: String },
}

/// Coarse result of one bootstrap attempt, as seen by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    AuthFailure,
    TransientFailure,
}

/// Why a retryable attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransientReason {
    #[error("{host} is unreachable")]
    Unreachable { host: String },

    #[error("timed out talking to {host}")]
    Timeout { host: String },

    #[error("device error from {host}: {message}")]
    DeviceError { host: String, message: String },

    #[error("no device with MAC {mac} found by discovery")]
    NotDiscovered { mac: MacAddress },
}

/// Every way a bootstrap attempt can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapError {
    /// Credentials were rejected. Needs user reauthentication.
    #[error("authentication failed for {host}")]
    Authentication { host: String },

    /// Network or device failure. Retried with backoff.
    #[error(transparent)]
    Transient(TransientReason),

    /// The device reached at the configured host is not the one the entry
    /// was created for.
    #[error("unexpected device found at {host}; expected {expected}, found {found}")]
    IdentityMismatch {
        host: String,
        expected: MacAddress,
        found: MacAddress,
    },
}

impl BootstrapError {
    /// Collapse this error into the outcome the lifecycle acts on.
    #[must_use]
    pub fn outcome(&self) -> AttemptOutcome {
        match self {
            Self::Authentication { .. } => AttemptOutcome::AuthFailure,
            Self::Transient(_) | Self::IdentityMismatch { .. } => AttemptOutcome::TransientFailure,
        }
    }

    /// Short machine-readable label, used as the `reason` field in logs
    /// and state-change events.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "authentication",
            Self::IdentityMismatch { .. } => "identity_mismatch",
            Self::Transient(TransientReason::NotDiscovered { .. }) => "not_discovered",
            Self::Transient(_) => "device_error",
        }
    }
}

impl From<ProtocolError> for BootstrapError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Authentication { host } => Self::Authentication { host },
            ProtocolError::Timeout { host } => Self::Transient(TransientReason::Timeout { host }),
            ProtocolError::Unreachable { host } => {
                Self::Transient(TransientReason::Unreachable { host })
            }
            ProtocolError::Device { host, message } => {
                Self::Transient(TransientReason::DeviceError { host, message })
            }
        }
    }
}
