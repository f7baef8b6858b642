//! In-process reauthentication flow tracking.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use devlink_domain::error::LinkError;
use devlink_domain::id::EntryId;
use devlink_domain::time::{Timestamp, now};

use crate::ports::ReauthFlowHost;

/// Keeps at most one open flow per entry, remembering when it was opened.
#[derive(Debug, Default)]
pub struct InProcessReauthFlows {
    flows: Mutex<HashMap<EntryId, Timestamp>>,
}

impl InProcessReauthFlows {
    /// Entries currently waiting for the user to supply credentials.
    #[must_use]
    pub fn pending(&self) -> Vec<(EntryId, Timestamp)> {
        let flows = self.flows.lock().unwrap_or_else(PoisonError::into_inner);
        let mut pending: Vec<_> = flows.iter().map(|(id, ts)| (*id, *ts)).collect();
        pending.sort_by_key(|(_, ts)| *ts);
        pending
    }
}

impl ReauthFlowHost for InProcessReauthFlows {
    fn request_reauth(
        &self,
        entry_id: EntryId,
    ) -> impl Future<Output = Result<bool, LinkError>> + Send {
        let mut flows = self.flows.lock().unwrap_or_else(PoisonError::into_inner);
        let started = if flows.contains_key(&entry_id) {
            false
        } else {
            flows.insert(entry_id, now());
            true
        };
        drop(flows);
        if started {
            tracing::info!(%entry_id, "reauthentication requested");
        }
        async move { Ok(started) }
    }

    fn active_reauth_flows(
        &self,
        entry_id: EntryId,
    ) -> impl Future<Output = Result<usize, LinkError>> + Send {
        let flows = self.flows.lock().unwrap_or_else(PoisonError::into_inner);
        let count = usize::from(flows.contains_key(&entry_id));
        async move { Ok(count) }
    }

    fn resolve_reauth(
        &self,
        entry_id: EntryId,
    ) -> impl Future<Output = Result<(), LinkError>> + Send {
        let removed = self
            .flows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&entry_id);
        if removed.is_some() {
            tracing::debug!(%entry_id, "reauthentication flow resolved");
        }
        async { Ok(()) }
    }
}
