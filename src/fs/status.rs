//! File metadata and the file-system collaborator

use super::path::Path;
use crate::error::{ConnectorError, ErrorCode, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::io::{Read, Seek};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

/// Metadata for one file or directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatus {
    pub path: Path,
    pub is_dir: bool,
    pub len: u64,
    pub block_size: u64,
    pub replication: u16,
    /// Milliseconds since the Unix epoch
    pub modification_time: i64,
    /// Milliseconds since the Unix epoch
    pub access_time: i64,
}

/// A byte range of a file and the hosts storing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLocation {
    pub hosts: Vec<String>,
    pub offset: u64,
    pub length: u64,
}

impl Ord for BlockLocation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.offset
            .cmp(&other.offset)
            .then(self.length.cmp(&other.length))
            .then_with(|| self.hosts.cmp(&other.hosts))
    }
}

impl PartialOrd for BlockLocation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Access to the files a source discovers and reads
pub trait FileSystem: Send + Sync {
    fn working_directory(&self) -> Result<Path>;

    fn home_directory(&self) -> Result<Path>;

    /// URI identifying this file system, e.g. `file:///`
    fn uri(&self) -> String;

    fn file_status(&self, path: &Path) -> Result<FileStatus>;

    /// Direct children of a directory
    fn list_status(&self, path: &Path) -> Result<Vec<FileStatus>>;

    /// Blocks overlapping `[start, start + len)`, ordered by offset
    fn block_locations(&self, status: &FileStatus, start: u64, len: u64)
        -> Result<Vec<BlockLocation>>;

    fn open(&self, path: &Path) -> Result<Box<dyn ReadSeek>>;
}

/// The local disk.
///
/// Reports files as a sequence of fixed-size blocks so that splittable
/// formats can divide large files across readers.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    block_size: u64,
}

/// Block size reported for local files unless configured otherwise
pub const DEFAULT_LOCAL_BLOCK_SIZE: u64 = 32 * 1024 * 1024;

impl Default for LocalFileSystem {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_LOCAL_BLOCK_SIZE,
        }
    }
}

impl LocalFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block_size(block_size: u64) -> Self {
        Self {
            block_size: block_size.max(1),
        }
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    fn status_from_metadata(&self, path: Path, metadata: &std::fs::Metadata) -> FileStatus {
        FileStatus {
            path,
            is_dir: metadata.is_dir(),
            len: if metadata.is_dir() { 0 } else { metadata.len() },
            block_size: self.block_size,
            replication: 1,
            modification_time: millis(metadata.modified()),
            access_time: millis(metadata.accessed()),
        }
    }
}

fn millis(time: std::io::Result<std::time::SystemTime>) -> i64 {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn missing_file(path: &Path, err: std::io::Error) -> ConnectorError {
    if err.kind() == std::io::ErrorKind::NotFound {
        ConnectorError::transient_with_code(
            ErrorCode::COLLABORATOR_SPLIT_UNAVAILABLE,
            format!("{} no longer exists", path),
        )
        .with_source(err)
    } else {
        ConnectorError::transient(format!("cannot access {}", path)).with_source(err)
    }
}

fn is_not_found(err: &walkdir::Error) -> bool {
    err.io_error()
        .is_some_and(|e| e.kind() == std::io::ErrorKind::NotFound)
}

fn walk_error(path: &Path, err: walkdir::Error) -> ConnectorError {
    let message = err.to_string();
    match err.into_io_error() {
        Some(io) => missing_file(path, io),
        None => ConnectorError::transient(format!("cannot list {}: {}", path, message)),
    }
}

impl FileSystem for LocalFileSystem {
    fn working_directory(&self) -> Result<Path> {
        Path::from_native(&std::env::current_dir()?)
    }

    fn home_directory(&self) -> Result<Path> {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map_err(|e| ConnectorError::config("home directory is not set").with_source(e))?;
        Path::new(&home)
    }

    fn uri(&self) -> String {
        "file:///".to_string()
    }

    fn file_status(&self, path: &Path) -> Result<FileStatus> {
        let metadata = std::fs::metadata(path.to_native()).map_err(|e| missing_file(path, e))?;
        Ok(self.status_from_metadata(path.clone(), &metadata))
    }

    fn list_status(&self, path: &Path) -> Result<Vec<FileStatus>> {
        let walker = WalkDir::new(path.to_native())
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name();

        let mut statuses = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| walk_error(path, e))?;
            let child = path.resolve(&Path::new(&entry.file_name().to_string_lossy())?);
            // Entries can vanish between listing and stat; they are simply not reported.
            match entry.metadata() {
                Ok(metadata) => statuses.push(self.status_from_metadata(child, &metadata)),
                Err(e) if is_not_found(&e) => continue,
                Err(e) => return Err(walk_error(&child, e)),
            }
        }
        Ok(statuses)
    }

    fn block_locations(
        &self,
        status: &FileStatus,
        start: u64,
        len: u64,
    ) -> Result<Vec<BlockLocation>> {
        let end = start.saturating_add(len).min(status.len);
        let mut blocks = Vec::new();
        let mut offset = (start / self.block_size) * self.block_size;

        while offset < end {
            let length = self.block_size.min(status.len - offset);
            blocks.push(BlockLocation {
                hosts: vec!["localhost".to_string()],
                offset,
                length,
            });
            offset += length;
        }
        Ok(blocks)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn ReadSeek>> {
        let file = std::fs::File::open(path.to_native()).map_err(|e| missing_file(path, e))?;
        Ok(Box::new(file))
    }
}
