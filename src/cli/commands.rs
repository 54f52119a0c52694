//! Command implementations

use crate::checkpoint::{FileCheckpointStore, JobCheckpoint};
use crate::config::RuntimeConfig;
use crate::connector::file::{FileSource, FileSourceSplit};
use crate::enumerator::SplitDiscovery;
use crate::format::TextLineFormat;
use crate::runtime::{JobSettings, SourceJob};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Options of the `run` command
#[derive(Debug, Default)]
pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub path: Option<PathBuf>,
    pub parallelism: Option<usize>,
    pub restore: Option<PathBuf>,
    pub print: bool,
}

/// Configuration file plus environment, then command-line overrides
fn load_config(
    file: Option<&Path>,
    path: Option<PathBuf>,
    parallelism: Option<usize>,
) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::load(file).context("Failed to load configuration")?;
    if let Some(path) = path {
        config.source.path = Some(path);
    }
    if let Some(parallelism) = parallelism {
        config.parallelism = parallelism;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

pub async fn run(options: RunOptions) -> Result<()> {
    let config = load_config(options.config.as_deref(), options.path, options.parallelism)?;
    let source = FileSource::from_config(TextLineFormat::new(), &config.source)
        .context("Failed to set up file source")?;

    let mut job = SourceJob::new(JobSettings::from(&config), source.opener())
        .with_discovery(Arc::new(source.discovery()), config.discovery.clone());
    if let Some(dir) = &config.checkpoint.directory {
        job = job.with_store(Arc::new(FileCheckpointStore::new(
            dir,
            config.checkpoint.retained,
        )));
    }
    if let Some(file) = &options.restore {
        let checkpoint = FileCheckpointStore::load_file::<FileSourceSplit>(file)
            .await
            .with_context(|| format!("Failed to load checkpoint {}", file.display()))?;
        info!(checkpoint_id = %checkpoint.id, "Resuming from checkpoint");
        job = job.restore_from(checkpoint);
    }

    let (tx, mut rx) = mpsc::channel::<String>(config.reader.fetch_queue_capacity);
    let print = options.print;
    let consumer = tokio::spawn(async move {
        let mut out = BufWriter::new(tokio::io::stdout());
        while let Some(line) = rx.recv().await {
            if print {
                out.write_all(line.as_bytes()).await?;
                out.write_all(b"\n").await?;
            }
        }
        out.flush().await
    });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let summary = job.run(tx, shutdown).await.context("Job failed")?;
    consumer
        .await
        .context("Record writer panicked")?
        .context("Failed to write records")?;

    eprintln!(
        "{:?}: {} records, {} checkpoints ({} aborted)",
        summary.outcome, summary.records, summary.checkpoints_completed, summary.checkpoints_aborted
    );
    if let Some(id) = summary.last_checkpoint {
        eprintln!("Last checkpoint: {id}");
    }
    for split in &summary.skipped_splits {
        eprintln!("Skipped: {split}");
    }
    Ok(())
}

pub async fn scan(path: PathBuf, config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config.as_deref(), Some(path), None)?;
    let source = FileSource::from_config(TextLineFormat::new(), &config.source)
        .context("Failed to set up file source")?;
    let splits = source
        .discovery()
        .discover()
        .await
        .context("Failed to scan for splits")?;

    let mut total = 0u64;
    for split in &splits {
        println!("{}\t{}\t{}", split.id, split.length, split.file_size);
        total += split.length;
    }
    eprintln!("{} splits, {} bytes", splits.len(), total);
    Ok(())
}

pub async fn inspect_checkpoint(file: PathBuf, json: bool) -> Result<()> {
    let checkpoint: JobCheckpoint<FileSourceSplit> = FileCheckpointStore::load_file(&file)
        .await
        .with_context(|| format!("Failed to load checkpoint {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&checkpoint)?);
        return Ok(());
    }

    println!("Checkpoint {} (format v{})", checkpoint.id, checkpoint.version);
    println!("  run:        {}", checkpoint.run_id);
    println!("  created:    {}", checkpoint.created_at.to_rfc3339());
    println!(
        "  discovery:  {}",
        if checkpoint.enumerator.discovery_exhausted {
            "exhausted"
        } else {
            "ongoing"
        }
    );
    println!("  pending:    {}", checkpoint.enumerator.pending_splits.len());
    for split in &checkpoint.enumerator.pending_splits {
        println!("    {}", describe(split));
    }
    for (subtask, splits) in &checkpoint.readers {
        println!("  reader {}: {} splits", subtask, splits.len());
        for split in splits {
            println!("    {}", describe(split));
        }
    }
    Ok(())
}

fn describe(split: &FileSourceSplit) -> String {
    match split.position {
        Some(position) => format!(
            "{} @ {}+{}",
            split.id, position.offset, position.records_after_offset
        ),
        None => split.id.clone(),
    }
}
