//! Discrete messages exchanged between readers and the enumerator
//!
//! Readers and the enumerator never share memory; everything that crosses
//! between them is one of these serializable values.

use super::split::{SplitId, SubtaskId};
use serde::{Deserialize, Serialize};

/// Connector-specific event carried over the bidirectional event channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceEvent {
    /// The sender drained these splits and no longer owns them
    SplitsFinished { split_ids: Vec<SplitId> },
    /// Anything else; dispatched to a handler registered for `kind`
    Custom {
        kind: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

impl SourceEvent {
    pub fn custom(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::Custom {
            kind: kind.into(),
            payload,
        }
    }

    /// Name used for dispatch and logging
    pub fn kind(&self) -> &str {
        match self {
            SourceEvent::SplitsFinished { .. } => "splits_finished",
            SourceEvent::Custom { kind, .. } => kind,
        }
    }
}

/// Reader → enumerator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnumeratorRequest<S> {
    RegisterReader {
        subtask: SubtaskId,
    },
    SplitRequest {
        subtask: SubtaskId,
    },
    AddSplitsBack {
        subtask: SubtaskId,
        splits: Vec<S>,
    },
    Event {
        subtask: SubtaskId,
        event: SourceEvent,
    },
}

impl<S> EnumeratorRequest<S> {
    pub fn subtask(&self) -> SubtaskId {
        match self {
            EnumeratorRequest::RegisterReader { subtask }
            | EnumeratorRequest::SplitRequest { subtask }
            | EnumeratorRequest::AddSplitsBack { subtask, .. }
            | EnumeratorRequest::Event { subtask, .. } => *subtask,
        }
    }
}

/// Enumerator → reader
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReaderCommand<S> {
    AddSplits { splits: Vec<S> },
    NoMoreSplits,
    Event { event: SourceEvent },
    /// The enumerator refused one of this reader's requests
    Rejected { code: u16, message: String },
}
