//! Request-driven split assignment
//!
//! [`AssigningEnumerator`] hands pending splits out in discovery order, one
//! batch per request. A request that cannot be answered yet parks the reader
//! until discovery produces splits or reports exhaustion. Splits returned by
//! a failed reader go to the head of the queue so they are reassigned first.

use super::discovery::DiscoveryEvent;
use super::state::{EnumeratorCheckpoint, EnumeratorLifecycle, EnumeratorState};
use super::{EnumeratorContext, SplitEnumerator};
use crate::core::{CheckpointId, CheckpointTracker, SourceEvent, SourceSplit, SubtaskId};
use crate::error::{ConnectorError, ErrorCode, Result};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Handler for a custom source event kind
pub type EventHandler<S> = Box<
    dyn FnMut(SubtaskId, &serde_json::Value, &mut dyn EnumeratorContext<S>) -> Result<()> + Send,
>;

/// Commit hook run when a checkpoint becomes durable
pub trait CheckpointListener<S>: Send {
    /// Called once per released checkpoint, in id order
    fn on_checkpoint_complete(&mut self, checkpoint: &EnumeratorCheckpoint<S>) -> Result<()>;

    fn on_checkpoint_aborted(&mut self, _checkpoint_id: CheckpointId) -> Result<()> {
        Ok(())
    }
}

pub struct AssigningEnumerator<S: SourceSplit> {
    state: EnumeratorState<S>,
    lifecycle: EnumeratorLifecycle,
    batch_size: usize,
    checkpoints: CheckpointTracker<EnumeratorCheckpoint<S>>,
    handlers: HashMap<String, EventHandler<S>>,
    listener: Option<Box<dyn CheckpointListener<S>>>,
}

impl<S: SourceSplit> AssigningEnumerator<S> {
    pub fn new(batch_size: usize) -> Self {
        Self {
            state: EnumeratorState::new(),
            lifecycle: EnumeratorLifecycle::Created,
            batch_size: batch_size.max(1),
            checkpoints: CheckpointTracker::new(),
            handlers: HashMap::new(),
            listener: None,
        }
    }

    /// Enumerator resuming from `checkpoint`
    pub fn restore(checkpoint: EnumeratorCheckpoint<S>, batch_size: usize) -> Self {
        let checkpoint_id = checkpoint.checkpoint_id;
        info!(
            checkpoint_id = %checkpoint_id,
            pending = checkpoint.pending_splits.len(),
            "Restoring split enumerator"
        );
        Self {
            state: EnumeratorState::from_checkpoint(checkpoint),
            checkpoints: CheckpointTracker::restored(checkpoint_id),
            ..Self::new(batch_size)
        }
    }

    /// Seed splits known up front, as if discovered
    pub fn with_splits(mut self, splits: Vec<S>) -> Self {
        self.state.add_discovered(splits);
        self
    }

    pub fn with_event_handler(mut self, kind: impl Into<String>, handler: EventHandler<S>) -> Self {
        self.handlers.insert(kind.into(), handler);
        self
    }

    pub fn with_checkpoint_listener(mut self, listener: Box<dyn CheckpointListener<S>>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn lifecycle(&self) -> EnumeratorLifecycle {
        self.lifecycle
    }

    pub fn state(&self) -> &EnumeratorState<S> {
        &self.state
    }

    fn ensure_open(&self) -> Result<()> {
        if self.lifecycle.is_open() {
            Ok(())
        } else {
            Err(ConnectorError::closed("split enumerator"))
        }
    }

    fn ensure_registered(&self, subtask: SubtaskId) -> Result<()> {
        if self.state.is_registered(subtask) {
            Ok(())
        } else {
            Err(ConnectorError::protocol_with_code(
                ErrorCode::PROTOCOL_UNREGISTERED_READER,
                format!("subtask {} has not registered", subtask),
            )
            .with_subtask(subtask))
        }
    }

    /// Answer one request from `subtask`: a batch, no-more-splits, or parking
    fn respond(&mut self, subtask: SubtaskId, ctx: &mut dyn EnumeratorContext<S>) -> Result<()> {
        let batch = self.state.take_batch(self.batch_size);

        if !batch.is_empty() {
            if self.state.has_no_more_splits(subtask) {
                self.state.return_to_front(batch);
                return Err(ConnectorError::protocol_with_code(
                    ErrorCode::PROTOCOL_SPLITS_AFTER_NO_MORE,
                    format!("subtask {} was already told there are no more splits", subtask),
                )
                .with_subtask(subtask));
            }
            if let Err(err) = ctx.assign_splits(subtask, batch.clone()) {
                self.state.return_to_front(batch);
                return Err(err);
            }
            debug!(
                subtask,
                splits = ?batch.iter().map(|s| s.split_id()).collect::<Vec<_>>(),
                "Assigned splits"
            );
            self.state.record_assignment(subtask, &batch);
        } else if self.state.discovery_exhausted() {
            ctx.signal_no_more_splits(subtask)?;
            self.state.mark_no_more_splits(subtask);
            info!(subtask, "No more splits for reader");
        } else {
            debug!(subtask, "No split available yet, parking request");
            self.state.park(subtask);
        }
        Ok(())
    }

    /// Answer parked requests in arrival order while there is something to say.
    ///
    /// A parked reader that can no longer be reached is deregistered; the
    /// batch meant for it goes back to the head of the queue for the next one.
    fn serve_awaiting(&mut self, ctx: &mut dyn EnumeratorContext<S>) -> Result<()> {
        while self.state.has_awaiting()
            && (self.state.pending_len() > 0 || self.state.discovery_exhausted())
        {
            let Some(subtask) = self.state.next_awaiting() else {
                break;
            };
            match self.respond(subtask, ctx) {
                Ok(()) => {}
                Err(err) if err.code() == ErrorCode::PROTOCOL_CHANNEL_CLOSED => {
                    warn!(subtask, "Parked reader is unreachable, deregistering: {}", err);
                    self.state.deregister(subtask);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Subtasks that registered or still own splits may hand them back
    fn ensure_known(&self, subtask: SubtaskId) -> Result<()> {
        if self.state.is_known(subtask) {
            Ok(())
        } else {
            self.ensure_registered(subtask)
        }
    }

    fn mark_running(&mut self) {
        if self.lifecycle == EnumeratorLifecycle::Started {
            self.lifecycle = EnumeratorLifecycle::Running;
            info!("Split enumerator running");
        }
    }
}

impl<S: SourceSplit> SplitEnumerator for AssigningEnumerator<S> {
    type Split = S;
    type Checkpoint = EnumeratorCheckpoint<S>;

    fn start(&mut self, _ctx: &mut dyn EnumeratorContext<S>) -> Result<()> {
        match self.lifecycle {
            EnumeratorLifecycle::Created => {
                self.lifecycle = EnumeratorLifecycle::Started;
                info!(pending = self.state.pending_len(), "Split enumerator started");
                Ok(())
            }
            EnumeratorLifecycle::Closing | EnumeratorLifecycle::Closed => {
                Err(ConnectorError::closed("split enumerator"))
            }
            other => Err(ConnectorError::protocol_with_code(
                ErrorCode::PROTOCOL_INVALID_TRANSITION,
                format!("cannot start split enumerator in state {:?}", other),
            )),
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.lifecycle == EnumeratorLifecycle::Closed {
            return Ok(());
        }
        self.lifecycle = EnumeratorLifecycle::Closing;
        self.state.clear_awaiting();
        self.lifecycle = EnumeratorLifecycle::Closed;
        info!(
            pending = self.state.pending_len(),
            retained_checkpoints = self.checkpoints.len(),
            "Split enumerator closed"
        );
        Ok(())
    }

    fn handle_split_request(
        &mut self,
        subtask: SubtaskId,
        ctx: &mut dyn EnumeratorContext<S>,
    ) -> Result<()> {
        self.ensure_open()?;
        self.ensure_registered(subtask)?;

        self.mark_running();
        if self.state.has_no_more_splits(subtask) || self.state.is_awaiting(subtask) {
            debug!(subtask, "Ignoring request that is already answered or parked");
            return Ok(());
        }
        self.respond(subtask, ctx)
    }

    fn add_splits_back(
        &mut self,
        splits: Vec<S>,
        subtask: SubtaskId,
        ctx: &mut dyn EnumeratorContext<S>,
    ) -> Result<()> {
        self.ensure_open()?;
        self.ensure_known(subtask)?;

        for split in &splits {
            let id = split.split_id();
            match self.state.owner_of(id) {
                Some(owner) if owner != subtask => {
                    return Err(ConnectorError::protocol_with_code(
                        ErrorCode::PROTOCOL_UNKNOWN_SPLIT,
                        format!("split {} is owned by subtask {}, not {}", id, owner, subtask),
                    )
                    .with_subtask(subtask));
                }
                None if self.state.is_pending(id) => {
                    return Err(ConnectorError::protocol_with_code(
                        ErrorCode::PROTOCOL_UNKNOWN_SPLIT,
                        format!("split {} is already pending", id),
                    )
                    .with_subtask(subtask));
                }
                None => warn!(subtask, split_id = id, "Returned split was not assigned"),
                Some(_) => {}
            }
        }

        for split in &splits {
            self.state.release(subtask, split.split_id());
        }
        info!(subtask, splits = splits.len(), "Splits added back");
        self.state.return_to_front(splits);
        self.serve_awaiting(ctx)
    }

    fn add_reader(&mut self, subtask: SubtaskId, ctx: &mut dyn EnumeratorContext<S>) -> Result<()> {
        self.ensure_open()?;

        let reregistered = self.state.register(subtask);
        if reregistered {
            let stale = self.state.reset_reader(subtask);
            if !stale.is_empty() {
                warn!(
                    subtask,
                    splits = stale.len(),
                    "Reader re-registered; dropping ownership of splits that were not added back"
                );
            }
        } else {
            // A restored reader keeps the splits its checkpoint assigned to it.
            self.state.clear_signals(subtask);
        }
        info!(subtask, reregistered, "Reader registered");
        self.mark_running();
        self.respond(subtask, ctx)
    }

    fn snapshot_state(&mut self, checkpoint_id: CheckpointId) -> Result<EnumeratorCheckpoint<S>> {
        self.ensure_open()?;
        self.checkpoints.ensure_next(checkpoint_id)?;

        let snapshot = self.state.snapshot(checkpoint_id);
        self.checkpoints.record(checkpoint_id, snapshot.clone())?;
        debug!(
            checkpoint_id = %checkpoint_id,
            pending = snapshot.pending_splits.len(),
            "Enumerator snapshot taken"
        );
        Ok(snapshot)
    }

    fn notify_checkpoint_complete(&mut self, checkpoint_id: CheckpointId) -> Result<()> {
        self.ensure_open()?;

        let released = self.checkpoints.complete(checkpoint_id);
        if released.is_empty() {
            debug!(checkpoint_id = %checkpoint_id, "Ignoring stale checkpoint completion");
        }
        let Some(listener) = self.listener.as_mut() else {
            return Ok(());
        };
        // Released snapshots are gone from the tracker, so every hook runs.
        let mut first_error = None;
        for (id, checkpoint) in &released {
            if let Err(err) = listener.on_checkpoint_complete(checkpoint) {
                warn!(checkpoint_id = %id, "Checkpoint commit hook failed: {}", err);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn notify_checkpoint_aborted(&mut self, checkpoint_id: CheckpointId) -> Result<()> {
        self.ensure_open()?;

        if self.checkpoints.abort(checkpoint_id).is_some() {
            debug!(checkpoint_id = %checkpoint_id, "Enumerator snapshot discarded");
            if let Some(listener) = self.listener.as_mut() {
                listener.on_checkpoint_aborted(checkpoint_id)?;
            }
        }
        Ok(())
    }

    fn handle_source_event(
        &mut self,
        subtask: SubtaskId,
        event: SourceEvent,
        ctx: &mut dyn EnumeratorContext<S>,
    ) -> Result<()> {
        self.ensure_open()?;
        self.ensure_registered(subtask)?;

        match event {
            SourceEvent::SplitsFinished { split_ids } => {
                for id in &split_ids {
                    if !self.state.release(subtask, id) {
                        warn!(subtask, split_id = %id, "Finished split was not assigned to reader");
                    }
                }
                debug!(subtask, finished = split_ids.len(), "Splits finished");
                Ok(())
            }
            SourceEvent::Custom { kind, payload } => match self.handlers.get_mut(&kind) {
                Some(handler) => handler(subtask, &payload, ctx),
                None => Err(ConnectorError::protocol_with_code(
                    ErrorCode::PROTOCOL_UNKNOWN_EVENT,
                    format!("no handler for source event '{}'", kind),
                )
                .with_subtask(subtask)),
            },
        }
    }

    fn handle_discovery(
        &mut self,
        event: DiscoveryEvent<S>,
        ctx: &mut dyn EnumeratorContext<S>,
    ) -> Result<()> {
        self.ensure_open()?;

        match event {
            DiscoveryEvent::SplitsDiscovered(splits) => {
                let found = splits.len();
                let added = self.state.add_discovered(splits);
                if added > 0 {
                    info!(found, added, "Discovered new splits");
                }
                self.mark_running();
                self.serve_awaiting(ctx)
            }
            DiscoveryEvent::Exhausted => {
                self.state.mark_discovery_exhausted();
                self.mark_running();
                self.serve_awaiting(ctx)
            }
            DiscoveryEvent::Failed(err) => Err(err),
        }
    }
}
