//! Split reader
//!
//! A [`SourceReader`] consumes the splits assigned to one subtask. Its
//! `poll_next` never blocks: I/O happens on background fetchers that push
//! records into per-split queues and wake the reader's availability token.
//!
//! - `availability` - the shared, renewable availability token
//! - `fetcher` - background per-split fetch task
//! - `fetching` - [`FetchingSourceReader`], the generic implementation

mod availability;
mod fetcher;
pub mod fetching;

pub use availability::Availability;
pub use fetching::{FetchingSourceReader, ReaderEventHandler, ReaderLifecycle};

use crate::core::{CheckpointId, InputStatus, ReadinessSignal, SourceEvent, SourceSplit, SplitId, SubtaskId};
use crate::error::Result;
use crate::format::RecordReader;

/// Sink for records produced by [`SourceReader::poll_next`]
pub trait ReaderOutput<R> {
    fn collect(&mut self, record: R);
}

impl<R> ReaderOutput<R> for Vec<R> {
    fn collect(&mut self, record: R) {
        self.push(record);
    }
}

/// Outbound side of a reader: messages to the enumerator
pub trait ReaderContext: Send + Sync {
    fn subtask(&self) -> SubtaskId;

    fn send_split_request(&self) -> Result<()>;

    fn send_event(&self, event: SourceEvent) -> Result<()>;
}

/// Opens a blocking record reader for a split, resuming from its cursor if set
pub trait SplitOpener<S: SourceSplit>: Send + Sync + 'static {
    type Record: Send + 'static;

    fn open(
        &self,
        split: &S,
    ) -> Result<Box<dyn RecordReader<Record = Self::Record, Position = S::Position>>>;
}

/// Consumes assigned splits and checkpoints their cursors.
///
/// All methods run on the reader's own task, so snapshots are naturally
/// serialized against polling and split assignment.
pub trait SourceReader: Send {
    type Split: SourceSplit;
    type Record: Send + 'static;

    /// Begin consuming already-assigned splits; idempotent
    fn start(&mut self) -> Result<()>;

    /// Emit at most one record into `output` without waiting on I/O
    fn poll_next(&mut self, output: &mut dyn ReaderOutput<Self::Record>) -> Result<InputStatus>;

    /// Token that fires once polling may make progress
    fn availability(&mut self) -> ReadinessSignal;

    fn add_splits(&mut self, splits: Vec<Self::Split>) -> Result<()>;

    fn notify_no_more_splits(&mut self) -> Result<()>;

    /// Cursor of every unfinished split, retained until acknowledged
    fn snapshot_state(&mut self, checkpoint_id: CheckpointId) -> Result<Vec<Self::Split>>;

    fn notify_checkpoint_complete(&mut self, checkpoint_id: CheckpointId) -> Result<()>;

    fn notify_checkpoint_aborted(&mut self, checkpoint_id: CheckpointId) -> Result<()>;

    /// Advisory: stop emitting from `to_pause`, resume `to_resume`
    fn pause_or_resume_splits(&mut self, to_pause: &[SplitId], to_resume: &[SplitId]) -> Result<()>;

    fn handle_source_event(&mut self, event: SourceEvent) -> Result<()>;

    /// Cancel background fetches without waiting for them
    fn close(&mut self) -> Result<()>;
}
