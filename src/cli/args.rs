//! CLI argument structures

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parallel, checkpointed file ingestion
#[derive(Parser, Debug)]
#[command(name = "tributary")]
#[command(about = "tributary - Read files in parallel splits with resumable checkpoints", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest files as text lines
    Run {
        /// Configuration file (TOML)
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// File or directory to read; overrides source.path
        #[arg(long)]
        path: Option<PathBuf>,

        /// Number of parallel readers; overrides parallelism
        #[arg(short = 'p', long)]
        parallelism: Option<usize>,

        /// Resume from this checkpoint file
        #[arg(long, value_name = "FILE")]
        restore: Option<PathBuf>,

        /// Write every record to stdout
        #[arg(long)]
        print: bool,
    },

    /// List the splits a run would read, without reading them
    Scan {
        /// File or directory to scan
        path: PathBuf,

        /// Configuration file (TOML) for filters and split sizing
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,
    },

    /// Show the contents of a checkpoint file
    #[command(name = "inspect-checkpoint")]
    InspectCheckpoint {
        file: PathBuf,

        /// Print the raw JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
}
