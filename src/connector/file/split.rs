use crate::core::{SourceSplit, SplitId};
use crate::format::CheckpointedPosition;
use crate::fs::Path;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A byte range of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSourceSplit {
    pub id: SplitId,
    pub path: Path,
    pub offset: u64,
    pub length: u64,
    pub file_size: u64,
    /// Milliseconds since the Unix epoch, as seen at discovery
    pub modification_time: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<CheckpointedPosition>,
}

impl FileSourceSplit {
    pub fn new(path: Path, offset: u64, length: u64, file_size: u64, modification_time: i64) -> Self {
        Self {
            id: Self::id_for(&path, offset),
            path,
            offset,
            length,
            file_size,
            modification_time,
            hosts: Vec::new(),
            position: None,
        }
    }

    /// Identifier of the split starting at `offset` in `path`
    pub fn id_for(path: &Path, offset: u64) -> SplitId {
        format!("{}#{}", path, offset)
    }

    pub fn with_hosts(mut self, hosts: Vec<String>) -> Self {
        self.hosts = hosts;
        self
    }

    /// Exclusive end offset
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }
}

impl SourceSplit for FileSourceSplit {
    type Position = CheckpointedPosition;

    fn split_id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> Option<&CheckpointedPosition> {
        self.position.as_ref()
    }

    fn with_position(&self, position: CheckpointedPosition) -> Self {
        Self {
            position: Some(position),
            ..self.clone()
        }
    }
}

impl fmt::Display for FileSourceSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}, {})", self.path, self.offset, self.end())?;
        if let Some(position) = &self.position {
            write!(
                f,
                " @ {}+{}",
                position.offset, position.records_after_offset
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_derived_from_path_and_offset() {
        let split = FileSourceSplit::new(Path::new("/data/a.txt").unwrap(), 64, 32, 96, 0);
        assert_eq!(split.split_id(), "/data/a.txt#64");
        assert_eq!(split.end(), 96);
        assert!(split.position().is_none());
    }

    #[test]
    fn test_with_position_keeps_identity() {
        let split = FileSourceSplit::new(Path::new("/data/a.txt").unwrap(), 0, 10, 10, 0);
        let moved = split.with_position(CheckpointedPosition::at_offset(4));

        assert_eq!(moved.split_id(), split.split_id());
        assert_eq!(moved.position(), Some(&CheckpointedPosition::at_offset(4)));
        assert_eq!(moved.to_string(), "/data/a.txt [0, 10) @ 4+0");
    }

    #[test]
    fn test_serde_omits_empty_fields() {
        let split = FileSourceSplit::new(Path::new("/x").unwrap(), 0, 1, 1, 0);
        let value = serde_json::to_value(&split).unwrap();
        assert!(value.get("position").is_none());
        assert!(value.get("hosts").is_none());

        let back: FileSourceSplit = serde_json::from_value(value).unwrap();
        assert_eq!(back, split);
    }
}
