//! File-system collaborator
//!
//! - `path` - normalized, immutable path value
//! - `status` - file metadata, block locations and the [`FileSystem`] trait
//! - `filter` - path predicates applied during discovery

pub mod filter;
pub mod path;
pub mod status;

pub use filter::{accept_all, is_hidden, FileFilter, PathFilter};
pub use path::Path;
pub use status::{BlockLocation, FileStatus, FileSystem, LocalFileSystem, ReadSeek};
