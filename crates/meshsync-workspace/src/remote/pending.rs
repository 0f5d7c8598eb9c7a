//! Outgoing patch requests awaiting a response.

use crate::protocol::RequestId;
use meshsync_state::{Conflict, Patch, PatchExt};
use std::collections::HashMap;
use tokio::time::Instant;

#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub(crate) patch: Patch,
    pub(crate) deadline: Instant,
}

/// Requests keyed by id; responses resolve only their own entry.
#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    entries: HashMap<RequestId, PendingRequest>,
}

impl PendingRequests {
    pub(crate) fn insert(&mut self, id: RequestId, patch: Patch, deadline: Instant) {
        self.entries.insert(id, PendingRequest { patch, deadline });
    }

    pub(crate) fn resolve(&mut self, id: &RequestId) -> Option<PendingRequest> {
        self.entries.remove(id)
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|p| p.deadline).min()
    }

    /// Remove and return every request whose deadline has passed.
    pub(crate) fn take_expired(&mut self, now: Instant) -> Vec<RequestId> {
        let expired: Vec<RequestId> = self
            .entries
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.entries.remove(id);
        }
        expired
    }

    /// Conflicts between an inbound patch and unacknowledged local edits.
    pub(crate) fn conflicts_with(&self, inbound: &Patch) -> Vec<Conflict> {
        self.entries
            .values()
            .flat_map(|p| p.patch.conflicts_with(inbound))
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
