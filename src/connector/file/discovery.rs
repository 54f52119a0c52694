//! Recursive file enumeration
//!
//! Walks the configured roots depth-first in name order and turns every
//! accepted file into one or more [`FileSourceSplit`]s. Splittable files are
//! cut along the block locations the file system reports, merging adjacent
//! blocks until a split reaches the minimum size.

use super::split::FileSourceSplit;
use crate::enumerator::SplitDiscovery;
use crate::error::{ConnectorError, Result};
use crate::fs::{accept_all, BlockLocation, FileFilter, FileStatus, FileSystem, Path};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct RecursiveFileDiscovery {
    fs: Arc<dyn FileSystem>,
    roots: Vec<Path>,
    file_filter: FileFilter,
    directory_filter: FileFilter,
    recursive: bool,
    splittable: bool,
    min_split_size: u64,
}

impl RecursiveFileDiscovery {
    pub fn new(fs: Arc<dyn FileSystem>, roots: Vec<Path>) -> Self {
        Self {
            fs,
            roots,
            file_filter: accept_all(),
            directory_filter: accept_all(),
            recursive: true,
            splittable: false,
            min_split_size: 0,
        }
    }

    pub fn with_file_filter(mut self, filter: FileFilter) -> Self {
        self.file_filter = filter;
        self
    }

    pub fn with_directory_filter(mut self, filter: FileFilter) -> Self {
        self.directory_filter = filter;
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Cut files along block boundaries instead of one split per file
    pub fn splittable(mut self, splittable: bool) -> Self {
        self.splittable = splittable;
        self
    }

    pub fn min_split_size(mut self, bytes: u64) -> Self {
        self.min_split_size = bytes;
        self
    }

    pub fn roots(&self) -> &[Path] {
        &self.roots
    }

    /// One blocking pass over every root
    pub fn scan(&self) -> Result<Vec<FileSourceSplit>> {
        let mut splits = Vec::new();
        for root in &self.roots {
            let status = self.fs.file_status(root)?;
            if status.is_dir {
                self.walk(&status.path, 0, &mut splits)?;
            } else if (self.file_filter)(&status.path) {
                self.add_file(&status, &mut splits)?;
            }
        }
        debug!(roots = self.roots.len(), splits = splits.len(), "File scan finished");
        Ok(splits)
    }

    fn walk(&self, dir: &Path, depth: usize, splits: &mut Vec<FileSourceSplit>) -> Result<()> {
        let children = match self.fs.list_status(dir) {
            Ok(children) => children,
            // Directories below a root may disappear mid-scan.
            Err(err) if depth > 0 && err.is_skippable() => {
                warn!(path = %dir, "Skipping vanished directory: {}", err);
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        for child in children {
            if child.is_dir {
                if self.recursive && (self.directory_filter)(&child.path) {
                    self.walk(&child.path, depth + 1, splits)?;
                }
            } else if (self.file_filter)(&child.path) {
                match self.add_file(&child, splits) {
                    Err(err) if err.is_skippable() => {
                        warn!(path = %child.path, "Skipping vanished file: {}", err);
                    }
                    other => other?,
                }
            }
        }
        Ok(())
    }

    fn add_file(&self, status: &FileStatus, splits: &mut Vec<FileSourceSplit>) -> Result<()> {
        if status.len == 0 {
            debug!(path = %status.path, "Skipping empty file");
            return Ok(());
        }
        if !self.splittable {
            splits.push(FileSourceSplit::new(
                status.path.clone(),
                0,
                status.len,
                status.len,
                status.modification_time,
            ));
            return Ok(());
        }

        let blocks = self.fs.block_locations(status, 0, status.len)?;
        if blocks.is_empty() {
            return Err(ConnectorError::transient(format!(
                "no block locations reported for {}",
                status.path
            )));
        }
        splits.extend(merge_blocks(&blocks, self.min_split_size).into_iter().map(
            |(offset, length, hosts)| {
                FileSourceSplit::new(
                    status.path.clone(),
                    offset,
                    length,
                    status.len,
                    status.modification_time,
                )
                .with_hosts(hosts)
            },
        ));
        Ok(())
    }
}

/// Group consecutive blocks into `(offset, length, hosts)` ranges of at least
/// `min_size` bytes; a short tail joins the previous range
fn merge_blocks(blocks: &[BlockLocation], min_size: u64) -> Vec<(u64, u64, Vec<String>)> {
    let mut ranges: Vec<(u64, u64, Vec<String>)> = Vec::new();
    let mut current: Option<(u64, u64, Vec<String>)> = None;

    for block in blocks {
        let (_, length, hosts) =
            current.get_or_insert_with(|| (block.offset, 0, Vec::new()));
        *length += block.length;
        for host in &block.hosts {
            if !hosts.contains(host) {
                hosts.push(host.clone());
            }
        }
        if *length >= min_size {
            ranges.extend(current.take());
        }
    }

    if let Some((offset, length, hosts)) = current {
        match ranges.last_mut() {
            Some(last) => {
                last.1 += length;
                for host in hosts {
                    if !last.2.contains(&host) {
                        last.2.push(host);
                    }
                }
            }
            None => ranges.push((offset, length, hosts)),
        }
    }
    ranges
}

#[async_trait]
impl SplitDiscovery<FileSourceSplit> for RecursiveFileDiscovery {
    async fn discover(&self) -> Result<Vec<FileSourceSplit>> {
        let scanner = self.clone();
        tokio::task::spawn_blocking(move || scanner.scan())
            .await
            .map_err(|e| ConnectorError::internal("file scan task failed").with_source(e))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SourceSplit;
    use crate::fs::{LocalFileSystem, PathFilter};
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("b/nested")).unwrap();
        std::fs::create_dir_all(root.join(".hidden")).unwrap();
        std::fs::write(root.join("a.log"), "a\n").unwrap();
        std::fs::write(root.join("b/c.log"), "c\n").unwrap();
        std::fs::write(root.join("b/nested/d.txt"), "d\n").unwrap();
        std::fs::write(root.join(".hidden/e.log"), "e\n").unwrap();
        std::fs::write(root.join("_in_progress.log"), "f\n").unwrap();
        std::fs::write(root.join("empty.log"), "").unwrap();
        dir
    }

    fn names(splits: &[FileSourceSplit]) -> Vec<String> {
        splits.iter().map(|s| s.path.name().to_string()).collect()
    }

    fn discovery(dir: &TempDir) -> RecursiveFileDiscovery {
        RecursiveFileDiscovery::new(
            Arc::new(LocalFileSystem::new()),
            vec![Path::from_native(dir.path()).unwrap()],
        )
    }

    #[test]
    fn test_default_filters_accept_everything() {
        let dir = tree();
        let splits = discovery(&dir).scan().unwrap();
        assert_eq!(
            names(&splits),
            vec!["e.log", "_in_progress.log", "a.log", "c.log", "d.txt"]
        );
    }

    #[test]
    fn test_filters_and_depth() {
        let dir = tree();
        let files = PathFilter::from_patterns(&["*.log"], &[]).unwrap();
        let splits = discovery(&dir)
            .with_file_filter(files.into_filter())
            .with_directory_filter(PathFilter::new().into_filter())
            .scan()
            .unwrap();
        assert_eq!(names(&splits), vec!["a.log", "c.log"]);

        let flat = discovery(&dir).recursive(false).scan().unwrap();
        assert_eq!(names(&flat), vec!["_in_progress.log", "a.log"]);
    }

    #[test]
    fn test_file_root_is_a_single_split() {
        let dir = tree();
        let root = Path::from_native(&dir.path().join("a.log")).unwrap();
        let splits = RecursiveFileDiscovery::new(Arc::new(LocalFileSystem::new()), vec![root.clone()])
            .scan()
            .unwrap();
        let ids: Vec<&str> = splits.iter().map(|s| s.split_id()).collect();
        assert_eq!(ids, vec![FileSourceSplit::id_for(&root, 0)]);
    }

    #[test]
    fn test_splittable_files_follow_blocks() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("big.txt"), vec![b'x'; 100]).unwrap();

        let splits = RecursiveFileDiscovery::new(
            Arc::new(LocalFileSystem::with_block_size(30)),
            vec![Path::from_native(dir.path()).unwrap()],
        )
        .splittable(true)
        .scan()
        .unwrap();

        let ranges: Vec<(u64, u64)> = splits.iter().map(|s| (s.offset, s.length)).collect();
        assert_eq!(ranges, vec![(0, 30), (30, 30), (60, 30), (90, 10)]);
        assert!(splits.iter().all(|s| s.file_size == 100));
    }

    #[test]
    fn test_merge_blocks_respects_min_size() {
        let block = |offset, length| BlockLocation {
            hosts: vec!["h".to_string()],
            offset,
            length,
        };
        let blocks = vec![block(0, 30), block(30, 30), block(60, 30), block(90, 10)];

        let ranges = |min| -> Vec<(u64, u64)> {
            merge_blocks(&blocks, min)
                .into_iter()
                .map(|(offset, length, _)| (offset, length))
                .collect()
        };
        assert_eq!(ranges(40), vec![(0, 60), (60, 40)]);
        // A tail shorter than the minimum joins the previous split.
        assert_eq!(ranges(50), vec![(0, 100)]);

        let whole = merge_blocks(&blocks, 1_000);
        assert_eq!(whole.len(), 1);
        assert_eq!((whole[0].0, whole[0].1), (0, 100));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tree();
        let missing = Path::from_native(&dir.path().join("nope")).unwrap();
        let result = RecursiveFileDiscovery::new(Arc::new(LocalFileSystem::new()), vec![missing]).scan();
        assert!(result.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_discover_runs_scan() {
        let dir = tree();
        let splits = discovery(&dir).discover().await.unwrap();
        assert_eq!(splits.len(), 5);
    }
}
