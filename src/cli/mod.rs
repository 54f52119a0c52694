//! Command-line interface
//!
//! - `args` - clap argument structures
//! - `commands` - command implementations
//! - `router` - dispatch from parsed arguments to commands

pub mod args;
pub mod commands;
pub mod router;

pub use args::{Cli, Commands};
pub use router::execute_command;
