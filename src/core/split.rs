//! Split model shared by the enumerator and the readers
//!
//! A split is an opaque, uniquely identified unit of work carrying its own
//! progress cursor. The enumerator only ever looks at the identifier; the
//! cursor is owned and advanced by the reader that holds the split.

use crate::error::{ConnectorError, ErrorCode, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// Index of one parallel reader instance
pub type SubtaskId = u32;

/// Stable split identifier
pub type SplitId = String;

/// Coordinator-assigned checkpoint identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(u64);

impl CheckpointId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl From<u64> for CheckpointId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a single non-blocking poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputStatus {
    /// A record was produced; poll again immediately
    MoreAvailable,
    /// Nothing ready yet; wait on the availability token before polling again
    NothingAvailableNow,
    /// Every split is drained and no more will be assigned
    EndOfInput,
}

/// A unit of partitionable work with an embedded progress cursor.
///
/// Splits cross task boundaries as discrete messages, so they and their
/// positions must be serializable.
pub trait SourceSplit:
    Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Resume point inside the split
    type Position: Clone + Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static;

    /// Stable identifier, never reused for a different unit of work
    fn split_id(&self) -> &str;

    /// The cursor recorded so far, or `None` if reading has not started
    fn position(&self) -> Option<&Self::Position>;

    /// A copy of this split whose cursor is `position`
    fn with_position(&self, position: Self::Position) -> Self;
}

/// Per-split lifecycle inside a reader
///
/// ```text
/// Assigned ──start──▶ Reading ◀──resume── Paused
///                        │  └────pause────▶  │
///                        └─finish─▶ Finished ◀┘ (finish while paused)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitStatus {
    Assigned,
    Reading,
    Paused,
    Finished,
}

/// Transitions accepted by [`SplitStatus::apply`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitTransition {
    Start,
    Pause,
    Resume,
    Finish,
}

impl SplitStatus {
    /// Apply a transition, rejecting illegal ones
    pub fn apply(self, transition: SplitTransition) -> Result<SplitStatus> {
        use SplitStatus::*;
        use SplitTransition::*;

        match (self, transition) {
            (Assigned, Start) => Ok(Reading),
            (Assigned, Pause) | (Reading, Pause) => Ok(Paused),
            (Paused, Resume) => Ok(Reading),
            // Pausing or resuming is advisory; repeating it is harmless.
            (Paused, Pause) | (Reading, Resume) | (Assigned, Resume) => Ok(self),
            (Reading, Finish) | (Paused, Finish) | (Assigned, Finish) => Ok(Finished),
            (from, transition) => Err(ConnectorError::protocol_with_code(
                ErrorCode::PROTOCOL_INVALID_TRANSITION,
                format!("invalid split transition {:?} from {:?}", transition, from),
            )),
        }
    }

    pub fn is_pollable(&self) -> bool {
        matches!(self, SplitStatus::Assigned | SplitStatus::Reading)
    }
}
