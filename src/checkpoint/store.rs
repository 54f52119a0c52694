//! Checkpoint persistence backends

use super::{JobCheckpoint, CHECKPOINT_VERSION};
use crate::core::{CheckpointId, SourceSplit};
use crate::error::{ConnectorError, ErrorCode, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const FILE_PREFIX: &str = "checkpoint-";
const FILE_SUFFIX: &str = ".json";

/// Durable home for completed job checkpoints
#[async_trait]
pub trait CheckpointStore<S: SourceSplit>: Send + Sync {
    async fn save(&self, checkpoint: &JobCheckpoint<S>) -> Result<()>;

    /// The checkpoint with the highest id, if any
    async fn load_latest(&self) -> Result<Option<JobCheckpoint<S>>>;

    async fn load(&self, id: CheckpointId) -> Result<JobCheckpoint<S>>;

    /// Stored ids in ascending order
    async fn list(&self) -> Result<Vec<CheckpointId>>;
}

/// In-memory store for tests and dry runs
pub struct InMemoryCheckpointStore<S> {
    checkpoints: Arc<RwLock<BTreeMap<CheckpointId, JobCheckpoint<S>>>>,
}

impl<S> InMemoryCheckpointStore<S> {
    pub fn new() -> Self {
        Self {
            checkpoints: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl<S> Default for InMemoryCheckpointStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Clone for InMemoryCheckpointStore<S> {
    fn clone(&self) -> Self {
        Self {
            checkpoints: Arc::clone(&self.checkpoints),
        }
    }
}

#[async_trait]
impl<S: SourceSplit> CheckpointStore<S> for InMemoryCheckpointStore<S> {
    async fn save(&self, checkpoint: &JobCheckpoint<S>) -> Result<()> {
        self.checkpoints
            .write()
            .await
            .insert(checkpoint.id, checkpoint.clone());
        Ok(())
    }

    async fn load_latest(&self) -> Result<Option<JobCheckpoint<S>>> {
        Ok(self
            .checkpoints
            .read()
            .await
            .values()
            .next_back()
            .cloned())
    }

    async fn load(&self, id: CheckpointId) -> Result<JobCheckpoint<S>> {
        self.checkpoints
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn list(&self) -> Result<Vec<CheckpointId>> {
        Ok(self.checkpoints.read().await.keys().copied().collect())
    }
}

/// One pretty-printed JSON file per checkpoint inside a directory.
///
/// Files are written to a temporary name and renamed into place, so a crash
/// mid-write never leaves a truncated checkpoint behind. Only the newest
/// `retained` checkpoints are kept.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    retained: usize,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>, retained: usize) -> Self {
        Self {
            dir: dir.into(),
            retained: retained.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: CheckpointId) -> PathBuf {
        self.dir
            .join(format!("{FILE_PREFIX}{:020}{FILE_SUFFIX}", id.value()))
    }

    /// Read a single checkpoint file, wherever it lives
    pub async fn load_file<S: SourceSplit>(path: &Path) -> Result<JobCheckpoint<S>> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| io_error(path, "Failed to read checkpoint", e))?;
        let checkpoint: JobCheckpoint<S> = serde_json::from_str(&content).map_err(|e| {
            ConnectorError::storage_with_code(
                ErrorCode::STORAGE_SERIALIZATION_ERROR,
                "Failed to parse checkpoint",
                Some(path.to_path_buf()),
            )
            .with_source(e)
        })?;

        if checkpoint.version > CHECKPOINT_VERSION {
            return Err(ConnectorError::checkpoint_with_code(
                ErrorCode::CHECKPOINT_RESTORE_FAILED,
                format!(
                    "checkpoint version {} is newer than supported version {}",
                    checkpoint.version, CHECKPOINT_VERSION
                ),
                Some(checkpoint.id.value()),
            ));
        }
        Ok(checkpoint)
    }

    async fn stored_ids(&self) -> Result<Vec<CheckpointId>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.dir, "Failed to list checkpoints", e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.dir, "Failed to list checkpoints", e))?
        {
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(parse_file_name) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn prune(&self) -> Result<()> {
        let ids = self.stored_ids().await?;
        let excess = ids.len().saturating_sub(self.retained);
        for id in &ids[..excess] {
            let path = self.path_for(*id);
            match fs::remove_file(&path).await {
                Ok(()) => debug!(checkpoint_id = %id, "Pruned old checkpoint"),
                Err(e) => warn!(path = %path.display(), "Failed to prune checkpoint: {}", e),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<S: SourceSplit> CheckpointStore<S> for FileCheckpointStore {
    async fn save(&self, checkpoint: &JobCheckpoint<S>) -> Result<()> {
        let path = self.path_for(checkpoint.id);
        let temp_path = path.with_extension("tmp");

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, "Failed to create checkpoint directory", e))?;

        let json = serde_json::to_string_pretty(checkpoint)?;
        fs::write(&temp_path, json)
            .await
            .map_err(|e| io_error(&temp_path, "Failed to write checkpoint to temp file", e))?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| io_error(&path, "Failed to move checkpoint to final location", e))?;

        info!(
            checkpoint_id = %checkpoint.id,
            path = %path.display(),
            "Saved checkpoint"
        );
        self.prune().await
    }

    async fn load_latest(&self) -> Result<Option<JobCheckpoint<S>>> {
        match self.stored_ids().await?.last() {
            Some(id) => Self::load_file(&self.path_for(*id)).await.map(Some),
            None => Ok(None),
        }
    }

    async fn load(&self, id: CheckpointId) -> Result<JobCheckpoint<S>> {
        let path = self.path_for(id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(not_found(id));
        }
        Self::load_file(&path).await
    }

    async fn list(&self) -> Result<Vec<CheckpointId>> {
        self.stored_ids().await
    }
}

fn parse_file_name(name: &str) -> Option<CheckpointId> {
    name.strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?
        .parse::<u64>()
        .ok()
        .map(CheckpointId::new)
}

fn not_found(id: CheckpointId) -> ConnectorError {
    ConnectorError::checkpoint_with_code(
        ErrorCode::CHECKPOINT_NOT_FOUND,
        format!("no stored checkpoint {id}"),
        Some(id.value()),
    )
}

fn io_error(path: &Path, message: &str, err: std::io::Error) -> ConnectorError {
    let code = match err.kind() {
        ErrorKind::NotFound => ErrorCode::STORAGE_NOT_FOUND,
        ErrorKind::PermissionDenied => ErrorCode::STORAGE_PERMISSION_DENIED,
        ErrorKind::TimedOut | ErrorKind::Interrupted | ErrorKind::WouldBlock => {
            ErrorCode::STORAGE_TEMPORARY
        }
        _ => ErrorCode::STORAGE_IO_ERROR,
    };
    ConnectorError::storage_with_code(code, message, Some(path.to_path_buf())).with_source(err)
}
