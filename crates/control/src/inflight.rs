//! In-flight action tracking
//!
//! At most one action per (resource, axis) is outstanding at any time.
//! Holders of an [`InFlightGuard`] own the slot; dropping the guard frees
//! it on every exit path, including errors and cancellation.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::resolver::ActionToken;
use crate::snapshot::ResourceId;
use crate::state::Axis;

/// Slot identity for duplicate suppression
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ActionKey {
    pub resource: ResourceId,
    pub axis: Axis,
}

impl ActionKey {
    pub fn new(resource: ResourceId, axis: Axis) -> Self {
        Self { resource, axis }
    }
}

impl std::fmt::Display for ActionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.resource, self.axis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingAction {
    pub key: ActionKey,
    pub action: ActionToken,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct InFlightActionTracker {
    pending: Mutex<HashMap<ActionKey, PendingAction>>,
}

impl InFlightActionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` pending; `false` if it already was
    pub fn begin(&self, key: ActionKey, action: ActionToken) -> bool {
        let mut pending = self.pending.lock();
        if pending.contains_key(&key) {
            debug!("{} already in flight", key);
            return false;
        }
        pending.insert(
            key.clone(),
            PendingAction {
                key,
                action,
                started_at: Utc::now(),
            },
        );
        true
    }

    pub fn end(&self, key: &ActionKey) -> Option<PendingAction> {
        self.pending.lock().remove(key)
    }

    pub fn is_pending(&self, key: &ActionKey) -> bool {
        self.pending.lock().contains_key(key)
    }

    /// Currently outstanding actions, oldest first
    pub fn pending(&self) -> Vec<PendingAction> {
        let mut list: Vec<_> = self.pending.lock().values().cloned().collect();
        list.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.key.cmp(&b.key)));
        list
    }

    /// [`begin`](Self::begin) returning a guard that ends the action on drop
    pub fn try_acquire(self: &Arc<Self>, key: ActionKey, action: ActionToken) -> Option<InFlightGuard> {
        if self.begin(key.clone(), action) {
            Some(InFlightGuard {
                tracker: Arc::clone(self),
                key,
            })
        } else {
            None
        }
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    tracker: Arc<InFlightActionTracker>,
    key: ActionKey,
}

impl InFlightGuard {
    pub fn key(&self) -> &ActionKey {
        &self.key
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tracker.end(&self.key);
    }
}
