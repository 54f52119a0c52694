//! Enumerator bookkeeping and its checkpoint form

use crate::core::{CheckpointId, SourceSplit, SplitId, SubtaskId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Enumerator lifecycle
///
/// ```text
/// Created ──start──▶ Started ──first discovery result or reader──▶ Running
///    │                  │                                            │
///    └──────────────────┴────────────────close───────────────────────┴──▶ Closing ──▶ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnumeratorLifecycle {
    Created,
    Started,
    Running,
    Closing,
    Closed,
}

impl EnumeratorLifecycle {
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Closing | Self::Closed)
    }
}

/// Immutable copy of the enumerator state taken at a checkpoint barrier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumeratorCheckpoint<S> {
    pub checkpoint_id: CheckpointId,
    pub pending_splits: Vec<S>,
    pub assignment: BTreeMap<SubtaskId, BTreeSet<SplitId>>,
    pub no_more_splits_readers: BTreeSet<SubtaskId>,
    pub discovered_ids: BTreeSet<SplitId>,
    pub discovery_exhausted: bool,
}

/// Live enumerator state.
///
/// Ownership invariant: a split id appears in at most one of `pending`
/// and the per-subtask `assignment` sets.
#[derive(Debug, Clone)]
pub struct EnumeratorState<S> {
    pending: VecDeque<S>,
    assignment: BTreeMap<SubtaskId, BTreeSet<SplitId>>,
    registered: BTreeSet<SubtaskId>,
    no_more_splits: BTreeSet<SubtaskId>,
    awaiting: VecDeque<SubtaskId>,
    discovered_ids: BTreeSet<SplitId>,
    discovery_exhausted: bool,
}

impl<S> Default for EnumeratorState<S> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            assignment: BTreeMap::new(),
            registered: BTreeSet::new(),
            no_more_splits: BTreeSet::new(),
            awaiting: VecDeque::new(),
            discovered_ids: BTreeSet::new(),
            discovery_exhausted: false,
        }
    }
}

impl<S: SourceSplit> EnumeratorState<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a checkpoint. Readers must register again.
    pub fn from_checkpoint(checkpoint: EnumeratorCheckpoint<S>) -> Self {
        let mut discovered_ids = checkpoint.discovered_ids;
        discovered_ids.extend(
            checkpoint
                .pending_splits
                .iter()
                .map(|s| s.split_id().to_string()),
        );
        for ids in checkpoint.assignment.values() {
            discovered_ids.extend(ids.iter().cloned());
        }

        Self {
            pending: checkpoint.pending_splits.into(),
            assignment: checkpoint.assignment,
            registered: BTreeSet::new(),
            no_more_splits: checkpoint.no_more_splits_readers,
            awaiting: VecDeque::new(),
            discovered_ids,
            discovery_exhausted: checkpoint.discovery_exhausted,
        }
    }

    pub fn snapshot(&self, checkpoint_id: CheckpointId) -> EnumeratorCheckpoint<S> {
        EnumeratorCheckpoint {
            checkpoint_id,
            pending_splits: self.pending.iter().cloned().collect(),
            assignment: self.assignment.clone(),
            no_more_splits_readers: self.no_more_splits.clone(),
            discovered_ids: self.discovered_ids.clone(),
            discovery_exhausted: self.discovery_exhausted,
        }
    }

    /// Append splits not seen before, in discovery order; returns how many were new
    pub fn add_discovered(&mut self, splits: Vec<S>) -> usize {
        let mut added = 0;
        for split in splits {
            if self.discovered_ids.insert(split.split_id().to_string()) {
                self.pending.push_back(split);
                added += 1;
            }
        }
        added
    }

    pub fn take_batch(&mut self, max: usize) -> Vec<S> {
        let n = max.min(self.pending.len());
        self.pending.drain(..n).collect()
    }

    /// Put splits back at the head of the pending queue, keeping their order
    pub fn return_to_front(&mut self, splits: Vec<S>) {
        for split in splits.into_iter().rev() {
            self.pending.push_front(split);
        }
    }

    pub fn record_assignment(&mut self, subtask: SubtaskId, splits: &[S]) {
        self.assignment
            .entry(subtask)
            .or_default()
            .extend(splits.iter().map(|s| s.split_id().to_string()));
    }

    /// Drop ownership of `split_id`; returns whether `subtask` owned it
    pub fn release(&mut self, subtask: SubtaskId, split_id: &str) -> bool {
        let Some(owned) = self.assignment.get_mut(&subtask) else {
            return false;
        };
        let removed = owned.remove(split_id);
        if owned.is_empty() {
            self.assignment.remove(&subtask);
        }
        removed
    }

    pub fn owner_of(&self, split_id: &str) -> Option<SubtaskId> {
        self.assignment
            .iter()
            .find(|(_, owned)| owned.contains(split_id))
            .map(|(subtask, _)| *subtask)
    }

    pub fn is_pending(&self, split_id: &str) -> bool {
        self.pending.iter().any(|s| s.split_id() == split_id)
    }

    /// Register `subtask`; returns whether it was already registered
    pub fn register(&mut self, subtask: SubtaskId) -> bool {
        !self.registered.insert(subtask)
    }

    pub fn is_registered(&self, subtask: SubtaskId) -> bool {
        self.registered.contains(&subtask)
    }

    /// Drop an unreachable reader. Its splits stay owned until they are
    /// added back or the subtask registers again.
    pub fn deregister(&mut self, subtask: SubtaskId) {
        self.registered.remove(&subtask);
        self.clear_signals(subtask);
    }

    /// Whether `subtask` is registered or still owns splits
    pub fn is_known(&self, subtask: SubtaskId) -> bool {
        self.registered.contains(&subtask) || self.assignment.contains_key(&subtask)
    }

    /// Forget what was already said to a subtask's previous reader instance
    pub fn clear_signals(&mut self, subtask: SubtaskId) {
        self.no_more_splits.remove(&subtask);
        self.awaiting.retain(|s| *s != subtask);
    }

    /// Forget per-instance state of a subtask whose reader was replaced
    pub fn reset_reader(&mut self, subtask: SubtaskId) -> BTreeSet<SplitId> {
        self.clear_signals(subtask);
        self.assignment.remove(&subtask).unwrap_or_default()
    }

    pub fn mark_no_more_splits(&mut self, subtask: SubtaskId) {
        self.no_more_splits.insert(subtask);
    }

    pub fn has_no_more_splits(&self, subtask: SubtaskId) -> bool {
        self.no_more_splits.contains(&subtask)
    }

    /// Park a reader whose request cannot be answered yet
    pub fn park(&mut self, subtask: SubtaskId) {
        if !self.awaiting.contains(&subtask) {
            self.awaiting.push_back(subtask);
        }
    }

    pub fn is_awaiting(&self, subtask: SubtaskId) -> bool {
        self.awaiting.contains(&subtask)
    }

    pub fn next_awaiting(&mut self) -> Option<SubtaskId> {
        self.awaiting.pop_front()
    }

    pub fn has_awaiting(&self) -> bool {
        !self.awaiting.is_empty()
    }

    pub fn clear_awaiting(&mut self) {
        self.awaiting.clear();
    }

    pub fn mark_discovery_exhausted(&mut self) {
        self.discovery_exhausted = true;
    }

    pub fn discovery_exhausted(&self) -> bool {
        self.discovery_exhausted
    }

    pub fn pending(&self) -> impl Iterator<Item = &S> {
        self.pending.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn assignment(&self) -> &BTreeMap<SubtaskId, BTreeSet<SplitId>> {
        &self.assignment
    }

    pub fn registered(&self) -> &BTreeSet<SubtaskId> {
        &self.registered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::split::fixtures::TestSplit;

    fn splits(ids: &[&str]) -> Vec<TestSplit> {
        ids.iter().map(|id| TestSplit::new(id)).collect()
    }

    fn pending_ids(state: &EnumeratorState<TestSplit>) -> Vec<String> {
        state.pending().map(|s| s.id.clone()).collect()
    }

    #[test]
    fn test_discovery_deduplicates_by_id() {
        let mut state = EnumeratorState::new();
        assert_eq!(state.add_discovered(splits(&["a", "b"])), 2);
        assert_eq!(state.add_discovered(splits(&["b", "c"])), 1);
        assert_eq!(pending_ids(&state), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_return_to_front_keeps_order() {
        let mut state = EnumeratorState::new();
        state.add_discovered(splits(&["c", "d"]));
        state.return_to_front(splits(&["a", "b"]));
        assert_eq!(pending_ids(&state), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_assignment_and_release() {
        let mut state = EnumeratorState::new();
        state.add_discovered(splits(&["a", "b"]));
        let batch = state.take_batch(5);
        state.record_assignment(1, &batch);

        assert_eq!(state.owner_of("a"), Some(1));
        assert!(state.release(1, "a"));
        assert!(!state.release(1, "a"));
        assert!(!state.release(2, "b"));
        assert!(state.release(1, "b"));
        assert!(state.assignment().is_empty());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut state = EnumeratorState::new();
        state.add_discovered(splits(&["a"]));
        let snapshot = state.snapshot(CheckpointId::new(1));

        state.take_batch(1);
        assert_eq!(snapshot.pending_splits.len(), 1);
        assert_eq!(state.pending_len(), 0);
    }

    #[test]
    fn test_restore_keeps_discovered_ids() {
        let mut state = EnumeratorState::new();
        state.add_discovered(splits(&["a", "b"]));
        let batch = state.take_batch(1);
        state.record_assignment(0, &batch);
        state.mark_discovery_exhausted();

        let mut restored = EnumeratorState::from_checkpoint(state.snapshot(CheckpointId::new(3)));
        assert_eq!(restored.add_discovered(splits(&["a", "b", "c"])), 1);
        assert_eq!(restored.owner_of("a"), Some(0));
        assert!(restored.discovery_exhausted());
        assert!(restored.registered().is_empty());
    }

    #[test]
    fn test_reset_reader_forgets_instance_state() {
        let mut state: EnumeratorState<TestSplit> = EnumeratorState::new();
        state.mark_no_more_splits(2);
        state.park(2);
        state.park(2);
        assert!(state.has_awaiting());

        state.reset_reader(2);
        assert!(!state.has_no_more_splits(2));
        assert!(!state.is_awaiting(2));
    }

    #[test]
    fn test_deregistered_reader_keeps_ownership() {
        let mut state = EnumeratorState::new();
        state.add_discovered(splits(&["a"]));
        state.register(4);
        let batch = state.take_batch(1);
        state.record_assignment(4, &batch);
        state.park(4);

        state.deregister(4);
        assert!(!state.is_registered(4));
        assert!(!state.is_awaiting(4));
        assert!(state.is_known(4));
        assert_eq!(state.owner_of("a"), Some(4));

        state.release(4, "a");
        assert!(!state.is_known(4));
    }
}
