//! # Tributary
//!
//! A parallel, split-based ingestion runtime. A single enumerator discovers
//! splits and hands them to readers on request; readers poll their splits
//! without blocking and checkpoint per-split cursors so a job resumes
//! exactly where its last completed checkpoint left it.
//!
//! ## Usage
//!
//! ```bash
//! tributary run --path /data/logs -p 4 --print
//! tributary scan /data/logs
//! tributary inspect-checkpoint checkpoints/checkpoint-00000000000000000003.json
//! ```
//!
//! ## Modules
//!
//! - `core` - splits, identifiers, protocol messages and the readiness signal
//! - `enumerator` - split assignment, discovery and the enumerator actor
//! - `reader` - non-blocking split readers with background fetchers
//! - `checkpoint` - job checkpoints, reconciliation and stores
//! - `runtime` - in-process job coordinator
//! - `fs` - path model, file status and the local file system
//! - `format` - record formats over file splits
//! - `connector` - concrete sources built from the pieces above
//! - `config` - TOML configuration with environment overrides
//! - `error` - coded error type
//! - `cli` / `logging` - the binary's surface
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod connector;
pub mod core;
pub mod enumerator;
pub mod error;
pub mod format;
pub mod fs;
pub mod logging;
pub mod reader;
pub mod runtime;
