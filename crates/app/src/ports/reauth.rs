//! Reauthentication flow port — where credential prompts are raised.

use std::future::Future;
use std::sync::Arc;

use devlink_domain::error::LinkError;
use devlink_domain::id::EntryId;

/// Tracks user-facing reauthentication flows, at most one per entry.
pub trait ReauthFlowHost: Send + Sync {
    /// Ask the user for new credentials. Returns `true` when a new flow was
    /// started, `false` when one was already active for the entry.
    fn request_reauth(&self, entry_id: EntryId)
    -> impl Future<Output = Result<bool, LinkError>> + Send;

    /// Number of flows currently active for the entry (0 or 1).
    fn active_reauth_flows(
        &self,
        entry_id: EntryId,
    ) -> impl Future<Output = Result<usize, LinkError>> + Send;

    /// Close any active flow for the entry.
    fn resolve_reauth(&self, entry_id: EntryId)
    -> impl Future<Output = Result<(), LinkError>> + Send;
}

impl<T: ReauthFlowHost> ReauthFlowHost for Arc<T> {
    fn request_reauth(
        &self,
        entry_id: EntryId,
    ) -> impl Future<Output = Result<bool, LinkError>> + Send {
        (**self).request_reauth(entry_id)
    }

    fn active_reauth_flows(
        &self,
        entry_id: EntryId,
    ) -> impl Future<Output = Result<usize, LinkError>> + Send {
        (**self).active_reauth_flows(entry_id)
    }

    fn resolve_reauth(
        &self,
        entry_id: EntryId,
    ) -> impl Future<Output = Result<(), LinkError>> + Send {
        (**self).resolve_reauth(entry_id)
    }
}
