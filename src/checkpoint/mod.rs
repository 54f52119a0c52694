//! Job-level checkpoints
//!
//! A [`JobCheckpoint`] bundles the enumerator snapshot and every reader
//! snapshot taken for one barrier. Stores persist them; a job restores from
//! the latest one after [`JobCheckpoint::reconciled`] has resolved splits
//! that moved between the enumerator snapshot and the reader snapshots.

pub mod store;

pub use store::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};

use crate::core::{CheckpointId, SourceSplit, SplitId, SubtaskId};
use crate::enumerator::EnumeratorCheckpoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};
use uuid::Uuid;

/// Version of the checkpoint file layout
pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCheckpoint<S> {
    pub version: u32,
    pub id: CheckpointId,
    /// Identifies the run that wrote the checkpoint
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub enumerator: EnumeratorCheckpoint<S>,
    /// Unfinished splits per reader, cursors included
    pub readers: BTreeMap<SubtaskId, Vec<S>>,
}

impl<S: SourceSplit> JobCheckpoint<S> {
    pub fn new(
        id: CheckpointId,
        run_id: Uuid,
        enumerator: EnumeratorCheckpoint<S>,
        readers: BTreeMap<SubtaskId, Vec<S>>,
    ) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            id,
            run_id,
            created_at: Utc::now(),
            enumerator,
            readers,
        }
    }

    /// Splits held by readers, across all subtasks
    pub fn reader_split_count(&self) -> usize {
        self.readers.values().map(Vec::len).sum()
    }

    /// Make the enumerator and reader views agree, for a job of `parallelism` readers.
    ///
    /// The enumerator is snapshotted before the readers, so a reader may
    /// already hold a split the enumerator still lists as pending, and may
    /// have finished splits the enumerator still lists as assigned. Reader
    /// state wins in both cases. Splits held by subtasks that no longer exist
    /// go back to the head of the pending queue, cursors intact.
    pub fn reconciled(mut self, parallelism: usize) -> Self {
        let held: BTreeSet<SplitId> = self
            .readers
            .values()
            .flatten()
            .map(|s| s.split_id().to_string())
            .collect();
        self.enumerator
            .pending_splits
            .retain(|s| !held.contains(s.split_id()));

        let orphaned: Vec<SubtaskId> = self
            .readers
            .keys()
            .copied()
            .filter(|subtask| *subtask as usize >= parallelism)
            .collect();
        let mut returned = Vec::new();
        for subtask in orphaned {
            if let Some(splits) = self.readers.remove(&subtask) {
                warn!(
                    subtask,
                    splits = splits.len(),
                    "Returning splits of a subtask beyond the configured parallelism"
                );
                returned.extend(splits);
            }
        }
        for split in returned.into_iter().rev() {
            self.enumerator.pending_splits.insert(0, split);
        }

        self.enumerator.assignment = self
            .readers
            .iter()
            .filter(|(_, splits)| !splits.is_empty())
            .map(|(subtask, splits)| {
                let ids = splits.iter().map(|s| s.split_id().to_string()).collect();
                (*subtask, ids)
            })
            .collect();
        self.enumerator
            .no_more_splits_readers
            .retain(|subtask| (*subtask as usize) < parallelism);

        info!(
            checkpoint_id = %self.id,
            pending = self.enumerator.pending_splits.len(),
            held = self.reader_split_count(),
            "Reconciled checkpoint for restore"
        );
        self
    }
}
