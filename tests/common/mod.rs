//! Common test utilities and helpers
#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tributary::core::{SourceEvent, SourceSplit};
use tributary::error::{ConnectorError, ErrorCode, Result};
use tributary::format::RecordReader;
use tributary::reader::{ReaderContext, SplitOpener};

/// Split whose cursor is the number of records already emitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedSplit {
    pub id: String,
    pub records: u64,
    pub position: Option<u64>,
}

impl NamedSplit {
    pub fn new(id: &str, records: u64) -> Self {
        Self {
            id: id.to_string(),
            records,
            position: None,
        }
    }
}

impl SourceSplit for NamedSplit {
    type Position = u64;

    fn split_id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> Option<&u64> {
        self.position.as_ref()
    }

    fn with_position(&self, position: u64) -> Self {
        Self {
            position: Some(position),
            ..self.clone()
        }
    }
}

pub fn splits(ids: &[&str], records: u64) -> Vec<NamedSplit> {
    ids.iter().map(|id| NamedSplit::new(id, records)).collect()
}

/// Opens readers that emit `<id>:<n>`, optionally sleeping before every read
#[derive(Clone, Default)]
pub struct NumberedOpener {
    pub delay: Option<Duration>,
    /// Split ids whose open fails with a skippable error
    pub unavailable: Vec<String>,
    /// Split id and record number at which reading fails for good
    pub corrupt_at: Option<(String, u64)>,
    pub opened: Arc<AtomicUsize>,
}

impl NumberedOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn corrupt(split_id: &str, record: u64) -> Self {
        Self {
            corrupt_at: Some((split_id.to_string(), record)),
            ..Self::default()
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

pub struct NumberedReader {
    id: String,
    next: u64,
    limit: u64,
    delay: Option<Duration>,
    corrupt_at: Option<u64>,
}

impl RecordReader for NumberedReader {
    type Record = String;
    type Position = u64;

    fn read(&mut self) -> Result<Option<(String, u64)>> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.corrupt_at == Some(self.next) {
            return Err(ConnectorError::fatal_read("corrupt block", None));
        }
        if self.next >= self.limit {
            return Ok(None);
        }
        let record = format!("{}:{}", self.id, self.next);
        self.next += 1;
        Ok(Some((record, self.next)))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn checkpointed_position(&self) -> Option<u64> {
        Some(self.next)
    }
}

impl SplitOpener<NamedSplit> for NumberedOpener {
    type Record = String;

    fn open(
        &self,
        split: &NamedSplit,
    ) -> Result<Box<dyn RecordReader<Record = String, Position = u64>>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.contains(&split.id) {
            return Err(ConnectorError::transient_with_code(
                ErrorCode::COLLABORATOR_SPLIT_UNAVAILABLE,
                format!("{} is gone", split.id),
            ));
        }
        Ok(Box::new(NumberedReader {
            id: split.id.clone(),
            next: split.position.unwrap_or(0),
            limit: split.records,
            delay: self.delay,
            corrupt_at: self
                .corrupt_at
                .as_ref()
                .filter(|(id, _)| *id == split.id)
                .map(|(_, record)| *record),
        }))
    }
}

/// Reader context that records what the reader sent
#[derive(Clone, Default)]
pub struct RecordingReaderContext {
    pub subtask: u32,
    pub split_requests: Arc<AtomicUsize>,
    pub events: Arc<Mutex<Vec<SourceEvent>>>,
}

impl RecordingReaderContext {
    pub fn new(subtask: u32) -> Self {
        Self {
            subtask,
            ..Self::default()
        }
    }

    pub fn split_requests(&self) -> usize {
        self.split_requests.load(Ordering::SeqCst)
    }
}

impl ReaderContext for RecordingReaderContext {
    fn subtask(&self) -> u32 {
        self.subtask
    }

    fn send_split_request(&self) -> Result<()> {
        self.split_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn send_event(&self, event: SourceEvent) -> Result<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
        Ok(())
    }
}

/// Write `(relative path, content)` pairs below `root`
pub fn write_files(root: &Path, files: &[(&str, &str)]) -> std::io::Result<()> {
    for (name, content) in files {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
    }
    Ok(())
}
