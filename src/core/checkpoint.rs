//! Retained-snapshot bookkeeping shared by readers and the enumerator
//!
//! Both sides of the protocol keep every snapshot they hand to the
//! coordinator until it is either acknowledged complete or aborted. The
//! rules are the same on both sides:
//!
//! - snapshot ids must strictly increase
//! - completing `n` releases every retained snapshot `<= n`
//! - notifications at or below the last acknowledged id are no-ops
//! - ids may be skipped entirely

use super::split::CheckpointId;
use crate::error::{ConnectorError, ErrorCode, Result};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct CheckpointTracker<T> {
    pending: BTreeMap<CheckpointId, T>,
    last_snapshot: Option<CheckpointId>,
    last_acknowledged: Option<CheckpointId>,
}

impl<T> Default for CheckpointTracker<T> {
    fn default() -> Self {
        Self {
            pending: BTreeMap::new(),
            last_snapshot: None,
            last_acknowledged: None,
        }
    }
}

impl<T> CheckpointTracker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker for a component restored from checkpoint `id`.
    ///
    /// `id` counts as both snapshotted and acknowledged.
    pub fn restored(id: CheckpointId) -> Self {
        Self {
            pending: BTreeMap::new(),
            last_snapshot: Some(id),
            last_acknowledged: Some(id),
        }
    }

    /// Fail unless `id` is greater than every snapshot id issued so far
    pub fn ensure_next(&self, id: CheckpointId) -> Result<()> {
        match self.last_snapshot {
            Some(last) if id <= last => Err(ConnectorError::checkpoint_with_code(
                ErrorCode::CHECKPOINT_NON_MONOTONIC,
                format!("checkpoint {} is not greater than last snapshot {}", id, last),
                Some(id.value()),
            )),
            _ => Ok(()),
        }
    }

    /// Retain `snapshot` under `id`
    pub fn record(&mut self, id: CheckpointId, snapshot: T) -> Result<()> {
        self.ensure_next(id)?;
        self.last_snapshot = Some(id);
        self.pending.insert(id, snapshot);
        Ok(())
    }

    /// Acknowledge `id` as durable, releasing every snapshot up to and including it.
    ///
    /// Returns the released snapshots in id order; empty for stale or
    /// duplicate notifications.
    pub fn complete(&mut self, id: CheckpointId) -> Vec<(CheckpointId, T)> {
        if self.is_stale(id) {
            return Vec::new();
        }
        self.last_acknowledged = Some(id);

        let retained = self.pending.split_off(&id.next());
        std::mem::replace(&mut self.pending, retained)
            .into_iter()
            .collect()
    }

    /// Discard the snapshot for `id` without releasing anything else
    pub fn abort(&mut self, id: CheckpointId) -> Option<T> {
        if self.is_stale(id) {
            return None;
        }
        self.pending.remove(&id)
    }

    /// Whether a notification for `id` has already been superseded
    pub fn is_stale(&self, id: CheckpointId) -> bool {
        matches!(self.last_acknowledged, Some(last) if id <= last)
    }

    pub fn get(&self, id: CheckpointId) -> Option<&T> {
        self.pending.get(&id)
    }

    pub fn pending_ids(&self) -> Vec<CheckpointId> {
        self.pending.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn last_snapshot_id(&self) -> Option<CheckpointId> {
        self.last_snapshot
    }

    pub fn last_acknowledged(&self) -> Option<CheckpointId> {
        self.last_acknowledged
    }
}
