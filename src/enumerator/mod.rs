//! Split enumerator
//!
//! The enumerator is the single owner of split assignment. It is driven one
//! message at a time (see [`actor`]), so implementations hold plain mutable
//! state and never lock.
//!
//! - `state` - pending queue, ownership map and checkpoint form
//! - `assigner` - [`AssigningEnumerator`], the generic request-driven implementation
//! - `discovery` - [`SplitDiscovery`] and the retrying background [`DiscoveryLoop`]
//! - `actor` - single-queue task wrapping an enumerator, plus its handle

pub mod actor;
pub mod assigner;
pub mod discovery;
pub mod state;

pub use actor::{EnumeratorActor, EnumeratorHandle, EnumeratorMessage, ReaderChannel};
pub use assigner::{AssigningEnumerator, CheckpointListener, EventHandler};
pub use discovery::{DiscoveryEvent, DiscoveryLoop, SplitDiscovery};
pub use state::{EnumeratorCheckpoint, EnumeratorLifecycle, EnumeratorState};

use crate::core::{CheckpointId, ReaderCommand, SourceEvent, SourceSplit, SubtaskId};
use crate::error::Result;
use std::fmt::Debug;

/// Outbound side of the enumerator: commands to individual readers
pub trait EnumeratorContext<S>: Send {
    fn assign_splits(&mut self, subtask: SubtaskId, splits: Vec<S>) -> Result<()>;

    fn signal_no_more_splits(&mut self, subtask: SubtaskId) -> Result<()>;

    fn send_event(&mut self, subtask: SubtaskId, event: SourceEvent) -> Result<()>;
}

/// Discovers splits and hands them to readers on request.
///
/// After [`close`](SplitEnumerator::close) every method except a repeated
/// `close` fails with a closed error.
pub trait SplitEnumerator: Send + 'static {
    type Split: SourceSplit;
    type Checkpoint: Clone + Debug + Send + 'static;

    fn start(&mut self, ctx: &mut dyn EnumeratorContext<Self::Split>) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn handle_split_request(
        &mut self,
        subtask: SubtaskId,
        ctx: &mut dyn EnumeratorContext<Self::Split>,
    ) -> Result<()>;

    /// Return splits from a reader, cursors intact
    fn add_splits_back(
        &mut self,
        splits: Vec<Self::Split>,
        subtask: SubtaskId,
        ctx: &mut dyn EnumeratorContext<Self::Split>,
    ) -> Result<()>;

    /// Register a reader; registration counts as its first split request
    fn add_reader(
        &mut self,
        subtask: SubtaskId,
        ctx: &mut dyn EnumeratorContext<Self::Split>,
    ) -> Result<()>;

    fn snapshot_state(&mut self, checkpoint_id: CheckpointId) -> Result<Self::Checkpoint>;

    fn notify_checkpoint_complete(&mut self, checkpoint_id: CheckpointId) -> Result<()>;

    fn notify_checkpoint_aborted(&mut self, checkpoint_id: CheckpointId) -> Result<()>;

    fn handle_source_event(
        &mut self,
        subtask: SubtaskId,
        event: SourceEvent,
        ctx: &mut dyn EnumeratorContext<Self::Split>,
    ) -> Result<()>;

    fn handle_discovery(
        &mut self,
        event: DiscoveryEvent<Self::Split>,
        ctx: &mut dyn EnumeratorContext<Self::Split>,
    ) -> Result<()>;
}

/// Context that keeps every command in memory instead of delivering it
#[derive(Debug)]
pub struct RecordingContext<S> {
    pub commands: Vec<(SubtaskId, ReaderCommand<S>)>,
}

impl<S> Default for RecordingContext<S> {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
        }
    }
}

impl<S: SourceSplit> RecordingContext<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits assigned to `subtask`, in assignment order
    pub fn assigned_to(&self, subtask: SubtaskId) -> Vec<&S> {
        self.commands
            .iter()
            .filter(|(target, _)| *target == subtask)
            .flat_map(|(_, command)| match command {
                ReaderCommand::AddSplits { splits } => splits.iter().collect::<Vec<_>>(),
                _ => Vec::new(),
            })
            .collect()
    }

    pub fn no_more_splits_sent(&self, subtask: SubtaskId) -> bool {
        self.commands.iter().any(|(target, command)| {
            *target == subtask && matches!(command, ReaderCommand::NoMoreSplits)
        })
    }

    pub fn take(&mut self) -> Vec<(SubtaskId, ReaderCommand<S>)> {
        std::mem::take(&mut self.commands)
    }
}

impl<S: SourceSplit> EnumeratorContext<S> for RecordingContext<S> {
    fn assign_splits(&mut self, subtask: SubtaskId, splits: Vec<S>) -> Result<()> {
        self.commands
            .push((subtask, ReaderCommand::AddSplits { splits }));
        Ok(())
    }

    fn signal_no_more_splits(&mut self, subtask: SubtaskId) -> Result<()> {
        self.commands.push((subtask, ReaderCommand::NoMoreSplits));
        Ok(())
    }

    fn send_event(&mut self, subtask: SubtaskId, event: SourceEvent) -> Result<()> {
        self.commands.push((subtask, ReaderCommand::Event { event }));
        Ok(())
    }
}
