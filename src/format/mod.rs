//! Record-decoding formats for file splits
//!
//! A [`StreamFormat`] turns a [`FileSourceSplit`] into a [`RecordReader`]
//! that yields records together with the position to resume from after
//! each one. Readers are plain blocking iterators; the reader runtime drives
//! them on background threads.

pub mod text_lines;

pub use text_lines::TextLineFormat;

use crate::connector::file::FileSourceSplit;
use crate::error::Result;
use crate::fs::FileSystem;
use serde::{Deserialize, Serialize};

/// Resume point inside a file split.
///
/// `offset` is a byte offset at which a record starts; `records_after_offset`
/// counts records to skip from there. Formats with record boundaries that
/// cannot be located from an arbitrary offset keep `offset` at the last
/// known boundary and advance the counter instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointedPosition {
    pub offset: u64,
    pub records_after_offset: u64,
}

impl CheckpointedPosition {
    pub fn at_offset(offset: u64) -> Self {
        Self {
            offset,
            records_after_offset: 0,
        }
    }
}

/// Blocking record iterator over one split
pub trait RecordReader: Send {
    type Record: Send + 'static;
    type Position: Clone + Send + 'static;

    /// Next record and the position just after it; `None` once the split is exhausted
    fn read(&mut self) -> Result<Option<(Self::Record, Self::Position)>>;

    fn close(&mut self) -> Result<()>;

    /// Position after the last record returned, if any was read
    fn checkpointed_position(&self) -> Option<Self::Position>;
}

pub type BoxedRecordReader<R> =
    Box<dyn RecordReader<Record = R, Position = CheckpointedPosition>>;

pub trait StreamFormat: Send + Sync + 'static {
    type Record: Send + 'static;

    /// Reader positioned at the start of the split
    fn create_reader(
        &self,
        fs: &dyn FileSystem,
        split: &FileSourceSplit,
    ) -> Result<BoxedRecordReader<Self::Record>>;

    /// Reader positioned at a previously checkpointed position
    fn restore_reader(
        &self,
        fs: &dyn FileSystem,
        split: &FileSourceSplit,
        position: CheckpointedPosition,
    ) -> Result<BoxedRecordReader<Self::Record>>;

    /// Whether a file may be divided into several splits
    fn is_splittable(&self) -> bool;

    /// Name of the produced record type
    fn produced_type(&self) -> &'static str;
}
