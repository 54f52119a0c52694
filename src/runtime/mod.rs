//! In-process job coordinator
//!
//! [`SourceJob`] wires one enumerator actor to `parallelism` reader tasks,
//! injects checkpoint barriers on a timer, persists each completed
//! [`JobCheckpoint`] and acknowledges it. A job can start fresh or resume
//! from a stored checkpoint.
//!
//! Barrier order: the enumerator is snapshotted first, then every reader.
//! Each reader applies the commands queued for it before it snapshots, so a
//! split is never lost between the two views. Restore reconciles the rest.

mod driver;

pub use driver::{DriverExit, ReaderControl, ReaderDriver, ReaderStatus};

use crate::checkpoint::{CheckpointStore, InMemoryCheckpointStore, JobCheckpoint};
use crate::config::{DiscoveryConfig, DiscoveryMode, RuntimeConfig};
use crate::core::{CheckpointId, SourceSplit, SplitId, SubtaskId};
use crate::enumerator::{
    AssigningEnumerator, DiscoveryLoop, EnumeratorActor, EnumeratorCheckpoint, EnumeratorHandle,
    SplitDiscovery,
};
use crate::error::{ConnectorError, ErrorCode, Result};
use crate::reader::{FetchingSourceReader, SourceReader, SplitOpener};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type Handle<S> = EnumeratorHandle<S, EnumeratorCheckpoint<S>>;
type ReaderTask<S, O> = JoinHandle<Result<DriverExit<FetchingSourceReader<S, O>>>>;

#[derive(Debug, Clone, PartialEq)]
pub struct JobSettings {
    pub parallelism: usize,
    pub assignment_batch_size: usize,
    pub fetch_queue_capacity: usize,
    /// Barrier interval; no checkpoints are taken when unset
    pub checkpoint_interval: Option<Duration>,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self::from(&RuntimeConfig::default())
    }
}

impl From<&RuntimeConfig> for JobSettings {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            parallelism: config.parallelism,
            assignment_batch_size: config.assignment_batch_size,
            fetch_queue_capacity: config.reader.fetch_queue_capacity,
            checkpoint_interval: config.checkpoint.interval,
        }
    }
}

/// How a job run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Every reader reached end of input
    Completed,
    /// The shutdown future resolved first
    Interrupted,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub run_id: Uuid,
    pub outcome: JobOutcome,
    pub records: u64,
    pub checkpoints_completed: u64,
    pub checkpoints_aborted: u64,
    pub last_checkpoint: Option<CheckpointId>,
    pub skipped_splits: Vec<SplitId>,
}

/// Discovery over a fixed list of splits
struct FixedSplits<S>(Vec<S>);

#[async_trait]
impl<S: SourceSplit> SplitDiscovery<S> for FixedSplits<S> {
    async fn discover(&self) -> Result<Vec<S>> {
        Ok(self.0.clone())
    }
}

pub struct SourceJob<S: SourceSplit, O: SplitOpener<S>> {
    settings: JobSettings,
    opener: Arc<O>,
    discovery: Option<DiscoveryLoop<S>>,
    store: Arc<dyn CheckpointStore<S>>,
    restore: Option<JobCheckpoint<S>>,
}

impl<S: SourceSplit, O: SplitOpener<S>> SourceJob<S, O> {
    pub fn new(settings: JobSettings, opener: O) -> Self {
        Self {
            settings,
            opener: Arc::new(opener),
            discovery: None,
            store: Arc::new(InMemoryCheckpointStore::new()),
            restore: None,
        }
    }

    pub fn with_discovery(
        mut self,
        discovery: Arc<dyn SplitDiscovery<S>>,
        config: DiscoveryConfig,
    ) -> Self {
        self.discovery = Some(DiscoveryLoop::new(discovery, config));
        self
    }

    /// Read exactly these splits, then finish
    pub fn with_splits(self, splits: Vec<S>) -> Self {
        let config = DiscoveryConfig {
            mode: DiscoveryMode::OneShot,
            ..DiscoveryConfig::default()
        };
        self.with_discovery(Arc::new(FixedSplits(splits)), config)
    }

    pub fn with_store(mut self, store: Arc<dyn CheckpointStore<S>>) -> Self {
        self.store = store;
        self
    }

    /// Resume from `checkpoint` instead of starting fresh
    pub fn restore_from(mut self, checkpoint: JobCheckpoint<S>) -> Self {
        self.restore = Some(checkpoint);
        self
    }

    /// Run until every reader reaches end of input or `shutdown` resolves.
    ///
    /// Records are sent to `output` as they are read. With checkpointing
    /// enabled, a final checkpoint is taken before the job stops, and the
    /// readers emit nothing after it.
    pub async fn run<F>(self, output: mpsc::Sender<O::Record>, shutdown: F) -> Result<JobSummary>
    where
        F: Future<Output = ()> + Send,
    {
        let Self {
            settings,
            opener,
            discovery,
            store,
            restore,
        } = self;
        let discovery = discovery.ok_or_else(|| {
            ConnectorError::config_with_code(
                ErrorCode::CONFIG_INVALID_VALUE,
                "job has neither a split discovery nor a split list",
            )
        })?;
        let parallelism = settings.parallelism.max(1);
        let run_id = Uuid::new_v4();

        let (enumerator, mut restored_readers, restored_id, discovery) = match restore {
            Some(checkpoint) => {
                info!(checkpoint_id = %checkpoint.id, previous_run = %checkpoint.run_id, "Restoring job");
                let checkpoint = checkpoint.reconciled(parallelism);
                // A finished bounded enumeration is not repeated.
                let discovery = if checkpoint.enumerator.discovery_exhausted {
                    info!("Split discovery already exhausted; skipping it");
                    None
                } else {
                    Some(discovery)
                };
                (
                    AssigningEnumerator::restore(
                        checkpoint.enumerator,
                        settings.assignment_batch_size,
                    ),
                    checkpoint.readers,
                    Some(checkpoint.id),
                    discovery,
                )
            }
            None => (
                AssigningEnumerator::new(settings.assignment_batch_size),
                BTreeMap::new(),
                None,
                Some(discovery),
            ),
        };

        info!(%run_id, parallelism, "Starting job");
        let (handle, enumerator_task) = EnumeratorActor::spawn(enumerator, discovery);
        handle.start().await?;

        let (status_tx, mut status_rx) = mpsc::unbounded_channel();
        let mut coordinator = Coordinator {
            handle,
            enumerator_task: Some(enumerator_task),
            readers: BTreeMap::new(),
            store,
            run_id,
            next_checkpoint: restored_id.map_or(CheckpointId::new(1), |id| id.next()),
            completed: 0,
            aborted: 0,
            last_checkpoint: restored_id,
        };

        for index in 0..parallelism {
            let subtask = index as SubtaskId;
            let channel = coordinator.handle.connect_reader(subtask)?;
            let context = Box::new(channel.context);
            let mut reader = match restored_id {
                Some(checkpoint_id) => FetchingSourceReader::restore(
                    Arc::clone(&opener),
                    context,
                    settings.fetch_queue_capacity,
                    checkpoint_id,
                    restored_readers.remove(&subtask).unwrap_or_default(),
                )?,
                None => FetchingSourceReader::new(
                    Arc::clone(&opener),
                    context,
                    settings.fetch_queue_capacity,
                ),
            };
            reader.start()?;

            let (control_tx, control_rx) = mpsc::unbounded_channel();
            let driver = ReaderDriver::new(
                subtask,
                reader,
                channel.commands,
                control_rx,
                output.clone(),
                status_tx.clone(),
            );
            let task = tokio::spawn(driver.run());
            coordinator.readers.insert(subtask, (control_tx, task));
            coordinator.handle.register_reader(subtask)?;
        }
        drop(status_tx);
        drop(output);

        let mut ticker = settings.checkpoint_interval.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        let mut finished = BTreeSet::new();
        tokio::pin!(shutdown);

        let stop = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break Stop::Done(JobOutcome::Interrupted);
                }
                status = status_rx.recv() => match status {
                    Some(ReaderStatus::EndOfInput(subtask)) => {
                        finished.insert(subtask);
                        debug!(subtask, finished = finished.len(), "Reader finished");
                        if finished.len() == parallelism {
                            break Stop::Done(JobOutcome::Completed);
                        }
                    }
                    Some(ReaderStatus::Failed(subtask)) => break Stop::ReaderFailed(subtask),
                    None => break Stop::Done(JobOutcome::Interrupted),
                },
                result = coordinator.enumerator_finished() => break Stop::EnumeratorFailed(result),
                _ = next_tick(&mut ticker) => coordinator.checkpoint(false).await,
            }
        };

        match stop {
            Stop::Done(outcome) => {
                if settings.checkpoint_interval.is_some() {
                    coordinator.checkpoint(true).await;
                }
                let summary = coordinator.shutdown(outcome).await;
                info!(
                    outcome = ?summary.outcome,
                    records = summary.records,
                    checkpoints = summary.checkpoints_completed,
                    "Job finished"
                );
                Ok(summary)
            }
            Stop::ReaderFailed(subtask) => {
                let err = coordinator.take_reader_error(subtask).await;
                coordinator.shutdown(JobOutcome::Interrupted).await;
                error!(subtask, "Job failed: {}", err);
                Err(err)
            }
            Stop::EnumeratorFailed(err) => {
                coordinator.shutdown(JobOutcome::Interrupted).await;
                error!("Job failed: {}", err);
                Err(err)
            }
        }
    }
}

enum Stop {
    Done(JobOutcome),
    ReaderFailed(SubtaskId),
    EnumeratorFailed(ConnectorError),
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

struct Coordinator<S: SourceSplit, O: SplitOpener<S>> {
    handle: Handle<S>,
    enumerator_task: Option<JoinHandle<Result<()>>>,
    readers: BTreeMap<SubtaskId, (mpsc::UnboundedSender<ReaderControl<S>>, ReaderTask<S, O>)>,
    store: Arc<dyn CheckpointStore<S>>,
    run_id: Uuid,
    next_checkpoint: CheckpointId,
    completed: u64,
    aborted: u64,
    last_checkpoint: Option<CheckpointId>,
}

impl<S: SourceSplit, O: SplitOpener<S>> Coordinator<S, O> {
    /// Resolves only if the enumerator task ends, which is always a failure
    async fn enumerator_finished(&mut self) -> ConnectorError {
        let Some(task) = self.enumerator_task.as_mut() else {
            return std::future::pending().await;
        };
        let result = task.await;
        self.enumerator_task = None;
        match result {
            Ok(Ok(())) => ConnectorError::internal("split enumerator stopped unexpectedly"),
            Ok(Err(err)) => err,
            Err(err) => ConnectorError::internal("split enumerator task panicked").with_source(err),
        }
    }

    /// Run one barrier. Failures abort the checkpoint but never the job.
    async fn checkpoint(&mut self, last: bool) {
        let checkpoint_id = self.next_checkpoint;
        self.next_checkpoint = checkpoint_id.next();

        match self.collect(checkpoint_id, last).await {
            Ok(checkpoint) => match self.store.save(&checkpoint).await {
                Ok(()) => {
                    self.completed += 1;
                    self.last_checkpoint = Some(checkpoint_id);
                    info!(
                        checkpoint_id = %checkpoint_id,
                        splits = checkpoint.reader_split_count(),
                        pending = checkpoint.enumerator.pending_splits.len(),
                        "Checkpoint completed"
                    );
                    self.acknowledge(checkpoint_id, true).await;
                }
                Err(err) => {
                    warn!(checkpoint_id = %checkpoint_id, "Failed to persist checkpoint: {}", err);
                    self.aborted += 1;
                    self.acknowledge(checkpoint_id, false).await;
                }
            },
            Err(err) => {
                warn!(checkpoint_id = %checkpoint_id, "Checkpoint aborted: {}", err);
                self.aborted += 1;
                self.acknowledge(checkpoint_id, false).await;
            }
        }
    }

    async fn collect(&self, checkpoint_id: CheckpointId, last: bool) -> Result<JobCheckpoint<S>> {
        debug!(checkpoint_id = %checkpoint_id, "Triggering checkpoint");
        let enumerator = self.handle.snapshot_state(checkpoint_id).await?;

        let replies = self.readers.iter().map(|(subtask, (control, _))| {
            let (reply, response) = oneshot::channel();
            let sent = control
                .send(ReaderControl::Snapshot {
                    checkpoint_id,
                    reply,
                    stop: last,
                })
                .is_ok();
            async move {
                if !sent {
                    return (*subtask, Err(ConnectorError::closed(format!("reader {subtask}"))));
                }
                let result = response
                    .await
                    .unwrap_or_else(|_| Err(ConnectorError::closed(format!("reader {subtask}"))));
                (*subtask, result)
            }
        });

        let mut readers = BTreeMap::new();
        for (subtask, result) in join_all(replies).await {
            let splits = result.map_err(|e| {
                ConnectorError::checkpoint_with_code(
                    ErrorCode::CHECKPOINT_GENERIC,
                    format!("reader {subtask} could not snapshot"),
                    Some(checkpoint_id.value()),
                )
                .with_source(e)
            })?;
            readers.insert(subtask, splits);
        }
        Ok(JobCheckpoint::new(checkpoint_id, self.run_id, enumerator, readers))
    }

    async fn acknowledge(&self, checkpoint_id: CheckpointId, completed: bool) {
        let result = if completed {
            self.handle.notify_checkpoint_complete(checkpoint_id).await
        } else {
            self.handle.notify_checkpoint_aborted(checkpoint_id).await
        };
        if let Err(err) = result {
            warn!(checkpoint_id = %checkpoint_id, "Enumerator did not take the acknowledgement: {}", err);
        }

        for (control, _) in self.readers.values() {
            let message = if completed {
                ReaderControl::Complete(checkpoint_id)
            } else {
                ReaderControl::Aborted(checkpoint_id)
            };
            // A stopped reader has nothing left to release.
            let _ = control.send(message);
        }
    }

    async fn take_reader_error(&mut self, subtask: SubtaskId) -> ConnectorError {
        let Some((_, task)) = self.readers.remove(&subtask) else {
            return ConnectorError::internal(format!("reader {subtask} is unknown"));
        };
        match task.await {
            Ok(Err(err)) => err,
            Ok(Ok(_)) => ConnectorError::internal(format!("reader {subtask} reported a failure")),
            Err(err) => ConnectorError::internal(format!("reader {subtask} panicked")).with_source(err),
        }
    }

    async fn shutdown(mut self, outcome: JobOutcome) -> JobSummary {
        let readers = std::mem::take(&mut self.readers);
        for (control, _) in readers.values() {
            let _ = control.send(ReaderControl::Stop);
        }

        let mut records = 0;
        let mut skipped_splits = Vec::new();
        for (subtask, (_, task)) in readers {
            match task.await {
                Ok(Ok(exit)) => {
                    records += exit.records;
                    skipped_splits.extend(exit.reader.skipped_splits().iter().cloned());
                }
                Ok(Err(err)) => warn!(subtask, "Reader ended with an error: {}", err),
                Err(err) => warn!(subtask, "Reader task panicked: {}", err),
            }
        }

        if let Err(err) = self.handle.close().await {
            debug!("Enumerator already stopped: {}", err);
        }
        let Self {
            handle,
            enumerator_task,
            run_id,
            completed,
            aborted,
            last_checkpoint,
            ..
        } = self;
        drop(handle);
        if let Some(task) = enumerator_task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("Enumerator ended with an error: {}", err),
                Err(err) => warn!("Enumerator task panicked: {}", err),
            }
        }

        JobSummary {
            run_id,
            outcome,
            records,
            checkpoints_completed: completed,
            checkpoints_aborted: aborted,
            last_checkpoint,
            skipped_splits,
        }
    }
}
