//! File source
//!
//! [`FileSource`] ties a [`StreamFormat`] to a file system and a set of root
//! paths. It hands out the two halves a job needs: a discovery for the
//! enumerator and an opener for the readers.

mod discovery;
mod split;

pub use discovery::RecursiveFileDiscovery;
pub use split::FileSourceSplit;

use crate::config::SourceConfig;
use crate::core::SourceSplit;
use crate::error::{ConnectorError, ErrorCode, Result};
use crate::format::{BoxedRecordReader, StreamFormat};
use crate::fs::{accept_all, FileFilter, FileSystem, LocalFileSystem, Path, PathFilter};
use crate::reader::SplitOpener;
use std::sync::Arc;
use tracing::debug;

pub struct FileSource<F: StreamFormat> {
    format: Arc<F>,
    fs: Arc<dyn FileSystem>,
    roots: Vec<Path>,
    file_filter: FileFilter,
    directory_filter: FileFilter,
    recursive: bool,
    min_split_size: u64,
}

impl<F: StreamFormat> FileSource<F> {
    /// Source over `roots` on the local disk, accepting every file and directory
    pub fn new(format: F, roots: Vec<Path>) -> Self {
        Self {
            format: Arc::new(format),
            fs: Arc::new(LocalFileSystem::new()),
            roots,
            file_filter: accept_all(),
            directory_filter: accept_all(),
            recursive: true,
            min_split_size: 0,
        }
    }

    /// Source described by the `[source]` section.
    ///
    /// Include and exclude globs filter files; excludes and the hidden-name
    /// rule also prune directories.
    pub fn from_config(format: F, config: &SourceConfig) -> Result<Self> {
        let root = config.path.as_deref().ok_or_else(|| {
            ConnectorError::config_with_code(
                ErrorCode::CONFIG_INVALID_VALUE,
                "source.path is required",
            )
        })?;
        let files = PathFilter::from_patterns(&config.include, &config.exclude)?;
        let no_patterns: &[String] = &[];
        let directories = PathFilter::from_patterns(no_patterns, &config.exclude)?;

        Ok(Self::new(format, vec![Path::from_native(root)?])
            .with_file_system(Arc::new(LocalFileSystem::with_block_size(config.block_size)))
            .with_file_filter(files.into_filter())
            .with_directory_filter(directories.into_filter())
            .recursive(config.recursive)
            .min_split_size(config.min_split_size))
    }

    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
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

    pub fn min_split_size(mut self, bytes: u64) -> Self {
        self.min_split_size = bytes;
        self
    }

    pub fn format(&self) -> &F {
        &self.format
    }

    pub fn discovery(&self) -> RecursiveFileDiscovery {
        RecursiveFileDiscovery::new(Arc::clone(&self.fs), self.roots.clone())
            .with_file_filter(Arc::clone(&self.file_filter))
            .with_directory_filter(Arc::clone(&self.directory_filter))
            .recursive(self.recursive)
            .splittable(self.format.is_splittable())
            .min_split_size(self.min_split_size)
    }

    pub fn opener(&self) -> FileSplitOpener<F> {
        FileSplitOpener {
            format: Arc::clone(&self.format),
            fs: Arc::clone(&self.fs),
        }
    }
}

/// Opens file splits with a [`StreamFormat`], restoring from the split's cursor
pub struct FileSplitOpener<F> {
    format: Arc<F>,
    fs: Arc<dyn FileSystem>,
}

impl<F> Clone for FileSplitOpener<F> {
    fn clone(&self) -> Self {
        Self {
            format: Arc::clone(&self.format),
            fs: Arc::clone(&self.fs),
        }
    }
}

impl<F: StreamFormat> SplitOpener<FileSourceSplit> for FileSplitOpener<F> {
    type Record = F::Record;

    fn open(&self, split: &FileSourceSplit) -> Result<BoxedRecordReader<F::Record>> {
        match split.position() {
            Some(position) => {
                debug!(split_id = %split.id, offset = position.offset, "Restoring split reader");
                self.format
                    .restore_reader(self.fs.as_ref(), split, *position)
            }
            None => self.format.create_reader(self.fs.as_ref(), split),
        }
    }
}
