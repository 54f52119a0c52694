//! Task that owns one reader
//!
//! The driver interleaves three inputs on the reader's task: enumerator
//! commands, coordinator control messages and the reader's availability
//! token. Everything the reader does therefore happens on one task, so
//! snapshots never race polling or split assignment.

use crate::core::{CheckpointId, InputStatus, ReaderCommand, SubtaskId};
use crate::error::{ConnectorError, Result};
use crate::reader::SourceReader;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// Records emitted per wake-up before the driver looks at its inbox again
const POLL_BUDGET: usize = 64;

/// Coordinator → reader task
#[derive(Debug)]
pub enum ReaderControl<S> {
    Snapshot {
        checkpoint_id: CheckpointId,
        reply: oneshot::Sender<Result<Vec<S>>>,
        /// Close the reader right after the snapshot, emitting nothing further
        stop: bool,
    },
    Complete(CheckpointId),
    Aborted(CheckpointId),
    Stop,
}

/// Reader task → coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderStatus {
    EndOfInput(SubtaskId),
    /// The task is ending with an error; its join handle carries it
    Failed(SubtaskId),
}

/// What a driver hands back when its task ends
pub struct DriverExit<R> {
    pub reader: R,
    pub records: u64,
    pub end_of_input: bool,
}

pub struct ReaderDriver<R: SourceReader> {
    subtask: SubtaskId,
    reader: R,
    commands: mpsc::UnboundedReceiver<ReaderCommand<R::Split>>,
    control: mpsc::UnboundedReceiver<ReaderControl<R::Split>>,
    output: mpsc::Sender<R::Record>,
    status: mpsc::UnboundedSender<ReaderStatus>,
    records: u64,
    end_of_input: bool,
    commands_open: bool,
}

impl<R: SourceReader + 'static> ReaderDriver<R> {
    pub fn new(
        subtask: SubtaskId,
        reader: R,
        commands: mpsc::UnboundedReceiver<ReaderCommand<R::Split>>,
        control: mpsc::UnboundedReceiver<ReaderControl<R::Split>>,
        output: mpsc::Sender<R::Record>,
        status: mpsc::UnboundedSender<ReaderStatus>,
    ) -> Self {
        Self {
            subtask,
            reader,
            commands,
            control,
            output,
            status,
            records: 0,
            end_of_input: false,
            commands_open: true,
        }
    }

    pub async fn run(mut self) -> Result<DriverExit<R>> {
        match self.process().await {
            Ok(()) => {
                debug!(subtask = self.subtask, records = self.records, "Reader task stopped");
                Ok(DriverExit {
                    reader: self.reader,
                    records: self.records,
                    end_of_input: self.end_of_input,
                })
            }
            Err(err) => {
                error!(subtask = self.subtask, "Reader task failed: {}", err);
                let _ = self.reader.close();
                let _ = self.status.send(ReaderStatus::Failed(self.subtask));
                Err(err.with_subtask(self.subtask))
            }
        }
    }

    async fn process(&mut self) -> Result<()> {
        loop {
            if !self.end_of_input && !self.poll_batch().await? {
                return Ok(());
            }

            let token = self.reader.availability();
            tokio::select! {
                biased;
                control = self.control.recv() => {
                    if !self.handle_control(control)? {
                        return Ok(());
                    }
                }
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(command) => self.apply(command)?,
                    None => {
                        debug!(subtask = self.subtask, "Enumerator command channel closed");
                        self.commands_open = false;
                    }
                },
                _ = token.wait_until_ready(), if !self.end_of_input => {}
            }
        }
    }

    /// Poll until the reader runs dry or the budget is spent.
    /// Returns `false` once the record consumer has gone away.
    async fn poll_batch(&mut self) -> Result<bool> {
        let mut batch = Vec::with_capacity(1);
        for _ in 0..POLL_BUDGET {
            let status = self.reader.poll_next(&mut batch)?;
            for record in batch.drain(..) {
                if self.output.send(record).await.is_err() {
                    info!(subtask = self.subtask, "Record consumer dropped, stopping reader");
                    self.reader.close()?;
                    return Ok(false);
                }
                self.records += 1;
            }
            match status {
                InputStatus::MoreAvailable => {}
                InputStatus::NothingAvailableNow => break,
                InputStatus::EndOfInput => {
                    self.end_of_input = true;
                    let _ = self.status.send(ReaderStatus::EndOfInput(self.subtask));
                    break;
                }
            }
        }
        Ok(true)
    }

    fn apply(&mut self, command: ReaderCommand<R::Split>) -> Result<()> {
        match command {
            ReaderCommand::AddSplits { splits } => self.reader.add_splits(splits),
            ReaderCommand::NoMoreSplits => self.reader.notify_no_more_splits(),
            ReaderCommand::Event { event } => self.reader.handle_source_event(event),
            ReaderCommand::Rejected { code, message } => {
                Err(ConnectorError::protocol_with_code(code, message))
            }
        }
    }

    /// Returns `false` when the reader should stop
    fn handle_control(&mut self, control: Option<ReaderControl<R::Split>>) -> Result<bool> {
        match control {
            Some(ReaderControl::Snapshot {
                checkpoint_id,
                reply,
                stop,
            }) => {
                // Assignments made before the enumerator snapshot must be
                // part of this reader's snapshot.
                while let Ok(command) = self.commands.try_recv() {
                    self.apply(command)?;
                }
                let _ = reply.send(self.reader.snapshot_state(checkpoint_id));
                if stop {
                    self.reader.close()?;
                    return Ok(false);
                }
            }
            Some(ReaderControl::Complete(checkpoint_id)) => {
                self.reader.notify_checkpoint_complete(checkpoint_id)?;
            }
            Some(ReaderControl::Aborted(checkpoint_id)) => {
                self.reader.notify_checkpoint_aborted(checkpoint_id)?;
            }
            Some(ReaderControl::Stop) | None => {
                self.reader.close()?;
                return Ok(false);
            }
        }
        Ok(true)
    }
}
