//! Protocol vocabulary shared by every component
//!
//! - `readiness` - one-shot availability token used by non-blocking readers
//! - `split` - split trait, checkpoint/subtask identifiers, per-split lifecycle
//! - `messages` - serializable reader ⇄ enumerator messages
//! - `checkpoint` - retained-snapshot bookkeeping for the two-phase protocol

pub mod checkpoint;
pub mod messages;
pub mod readiness;
pub mod split;

pub use checkpoint::CheckpointTracker;
pub use messages::{EnumeratorRequest, ReaderCommand, SourceEvent};
pub use readiness::ReadinessSignal;
pub use split::{
    CheckpointId, InputStatus, SourceSplit, SplitId, SplitStatus, SplitTransition, SubtaskId,
};
