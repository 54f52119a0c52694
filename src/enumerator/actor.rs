//! Single-queue enumerator task
//!
//! Every input to the enumerator (reader requests, discovery results and
//! coordinator calls) arrives on one unbounded channel and is handled to
//! completion before the next is taken. The enumerator therefore never
//! needs locks, and the order in which it observes events is the order in
//! which they were enqueued.
//!
//! A request that fails is rejected back to the reader that sent it; only
//! discovery failures stop the task.

use super::discovery::{DiscoveryEvent, DiscoveryLoop};
use super::{EnumeratorContext, SplitEnumerator};
use crate::core::{CheckpointId, EnumeratorRequest, ReaderCommand, SourceEvent, SubtaskId};
use crate::error::{ConnectorError, ErrorCode, Result};
use crate::reader::ReaderContext;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type Reply<T> = oneshot::Sender<Result<T>>;

/// Everything the enumerator task can be asked to do
#[derive(Debug)]
pub enum EnumeratorMessage<S, C> {
    Request(EnumeratorRequest<S>),
    Discovery(DiscoveryEvent<S>),
    Start {
        reply: Reply<()>,
    },
    Snapshot {
        checkpoint_id: CheckpointId,
        reply: Reply<C>,
    },
    CheckpointComplete {
        checkpoint_id: CheckpointId,
        reply: Reply<()>,
    },
    CheckpointAborted {
        checkpoint_id: CheckpointId,
        reply: Reply<()>,
    },
    /// Route future commands for `subtask` to `commands`
    ConnectReader {
        subtask: SubtaskId,
        commands: mpsc::UnboundedSender<ReaderCommand<S>>,
    },
    Close {
        reply: Reply<()>,
    },
}

/// Delivers enumerator commands to connected readers
struct ChannelContext<'a, S> {
    readers: &'a HashMap<SubtaskId, mpsc::UnboundedSender<ReaderCommand<S>>>,
}

impl<S: Send> ChannelContext<'_, S> {
    fn deliver(&self, subtask: SubtaskId, command: ReaderCommand<S>) -> Result<()> {
        let sender = self.readers.get(&subtask).ok_or_else(|| {
            ConnectorError::protocol_with_code(
                ErrorCode::PROTOCOL_CHANNEL_CLOSED,
                format!("no command channel for subtask {}", subtask),
            )
            .with_subtask(subtask)
        })?;
        sender.send(command).map_err(|_| {
            ConnectorError::protocol_with_code(
                ErrorCode::PROTOCOL_CHANNEL_CLOSED,
                format!("reader {} stopped accepting commands", subtask),
            )
            .with_subtask(subtask)
        })
    }
}

impl<S: Send + Sync> EnumeratorContext<S> for ChannelContext<'_, S> {
    fn assign_splits(&mut self, subtask: SubtaskId, splits: Vec<S>) -> Result<()> {
        self.deliver(subtask, ReaderCommand::AddSplits { splits })
    }

    fn signal_no_more_splits(&mut self, subtask: SubtaskId) -> Result<()> {
        self.deliver(subtask, ReaderCommand::NoMoreSplits)
    }

    fn send_event(&mut self, subtask: SubtaskId, event: SourceEvent) -> Result<()> {
        self.deliver(subtask, ReaderCommand::Event { event })
    }
}

pub struct EnumeratorActor<E: SplitEnumerator> {
    enumerator: E,
    readers: HashMap<SubtaskId, mpsc::UnboundedSender<ReaderCommand<E::Split>>>,
    inbox: mpsc::UnboundedReceiver<EnumeratorMessage<E::Split, E::Checkpoint>>,
    sink: mpsc::WeakUnboundedSender<EnumeratorMessage<E::Split, E::Checkpoint>>,
    discovery: Option<DiscoveryLoop<E::Split>>,
    discovery_task: Option<JoinHandle<()>>,
}

impl<E: SplitEnumerator> EnumeratorActor<E> {
    /// Spawn the enumerator on its own task.
    ///
    /// The task ends with `Err` on a discovery failure and with `Ok` once
    /// every handle has been dropped.
    pub fn spawn(
        enumerator: E,
        discovery: Option<DiscoveryLoop<E::Split>>,
    ) -> (
        EnumeratorHandle<E::Split, E::Checkpoint>,
        JoinHandle<Result<()>>,
    ) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let actor = Self {
            enumerator,
            readers: HashMap::new(),
            inbox,
            sink: tx.downgrade(),
            discovery,
            discovery_task: None,
        };
        let task = tokio::spawn(actor.run());
        (EnumeratorHandle { tx }, task)
    }

    async fn run(mut self) -> Result<()> {
        let result = self.process().await;
        if let Some(task) = self.discovery_task.take() {
            task.abort();
        }
        if let Err(err) = &result {
            error!("Split enumerator failed: {}", err);
        }
        result
    }

    async fn process(&mut self) -> Result<()> {
        while let Some(message) = self.inbox.recv().await {
            self.handle(message)?;
        }
        debug!("All enumerator handles dropped");
        Ok(())
    }

    fn handle(&mut self, message: EnumeratorMessage<E::Split, E::Checkpoint>) -> Result<()> {
        let mut ctx = ChannelContext {
            readers: &self.readers,
        };

        match message {
            EnumeratorMessage::Request(request) => {
                let subtask = request.subtask();
                let result = match request {
                    EnumeratorRequest::RegisterReader { subtask } => {
                        self.enumerator.add_reader(subtask, &mut ctx)
                    }
                    EnumeratorRequest::SplitRequest { subtask } => {
                        self.enumerator.handle_split_request(subtask, &mut ctx)
                    }
                    EnumeratorRequest::AddSplitsBack { subtask, splits } => {
                        self.enumerator.add_splits_back(splits, subtask, &mut ctx)
                    }
                    EnumeratorRequest::Event { subtask, event } => {
                        self.enumerator.handle_source_event(subtask, event, &mut ctx)
                    }
                };
                if let Err(err) = result {
                    Self::reject(&ctx, subtask, err.with_subtask(subtask));
                }
                Ok(())
            }
            EnumeratorMessage::Discovery(event) => {
                Self::absorb_closed(self.enumerator.handle_discovery(event, &mut ctx))
            }
            EnumeratorMessage::Start { reply } => {
                let result = self.enumerator.start(&mut ctx);
                if result.is_ok() {
                    self.spawn_discovery();
                }
                let _ = reply.send(result);
                Ok(())
            }
            EnumeratorMessage::Snapshot {
                checkpoint_id,
                reply,
            } => {
                let _ = reply.send(self.enumerator.snapshot_state(checkpoint_id));
                Ok(())
            }
            EnumeratorMessage::CheckpointComplete {
                checkpoint_id,
                reply,
            } => {
                let _ = reply.send(self.enumerator.notify_checkpoint_complete(checkpoint_id));
                Ok(())
            }
            EnumeratorMessage::CheckpointAborted {
                checkpoint_id,
                reply,
            } => {
                let _ = reply.send(self.enumerator.notify_checkpoint_aborted(checkpoint_id));
                Ok(())
            }
            EnumeratorMessage::ConnectReader { subtask, commands } => {
                debug!(subtask, "Reader command channel connected");
                self.readers.insert(subtask, commands);
                Ok(())
            }
            EnumeratorMessage::Close { reply } => {
                if let Some(task) = self.discovery_task.take() {
                    task.abort();
                }
                self.discovery = None;
                let _ = reply.send(self.enumerator.close());
                Ok(())
            }
        }
    }

    /// Hand a failed request back to the reader that made it
    fn reject(ctx: &ChannelContext<'_, E::Split>, subtask: SubtaskId, err: ConnectorError) {
        if err.is_closed() {
            debug!(subtask, "Dropping request for closed enumerator: {}", err);
            return;
        }
        warn!(subtask, "Rejecting reader request: {}", err);
        let command = ReaderCommand::Rejected {
            code: err.code(),
            message: err.message().to_string(),
        };
        if let Err(err) = ctx.deliver(subtask, command) {
            debug!(subtask, "Rejection not delivered: {}", err);
        }
    }

    /// Messages racing a close are dropped; anything else stops the actor
    fn absorb_closed(result: Result<()>) -> Result<()> {
        match result {
            Err(err) if err.is_closed() => {
                debug!("Dropping message for closed enumerator: {}", err);
                Ok(())
            }
            other => other,
        }
    }

    fn spawn_discovery(&mut self) {
        let Some(discovery) = self.discovery.take() else {
            return;
        };
        let sink = self.sink.clone();
        info!("Starting split discovery");
        self.discovery_task = Some(discovery.spawn(move |event| match sink.upgrade() {
            Some(tx) => tx.send(EnumeratorMessage::Discovery(event)).is_ok(),
            None => false,
        }));
    }
}

/// Cloneable address of a running enumerator actor
#[derive(Debug)]
pub struct EnumeratorHandle<S, C> {
    tx: mpsc::UnboundedSender<EnumeratorMessage<S, C>>,
}

impl<S, C> Clone for EnumeratorHandle<S, C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S, C> EnumeratorHandle<S, C>
where
    S: Send + Sync + 'static,
    C: Send + 'static,
{
    fn post(&self, message: EnumeratorMessage<S, C>) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| ConnectorError::closed("split enumerator"))
    }

    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> EnumeratorMessage<S, C>) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.post(build(reply))?;
        response
            .await
            .map_err(|_| ConnectorError::closed("split enumerator"))?
    }

    pub async fn start(&self) -> Result<()> {
        self.call(|reply| EnumeratorMessage::Start { reply }).await
    }

    pub async fn snapshot_state(&self, checkpoint_id: CheckpointId) -> Result<C> {
        self.call(|reply| EnumeratorMessage::Snapshot {
            checkpoint_id,
            reply,
        })
        .await
    }

    pub async fn notify_checkpoint_complete(&self, checkpoint_id: CheckpointId) -> Result<()> {
        self.call(|reply| EnumeratorMessage::CheckpointComplete {
            checkpoint_id,
            reply,
        })
        .await
    }

    pub async fn notify_checkpoint_aborted(&self, checkpoint_id: CheckpointId) -> Result<()> {
        self.call(|reply| EnumeratorMessage::CheckpointAborted {
            checkpoint_id,
            reply,
        })
        .await
    }

    pub async fn close(&self) -> Result<()> {
        self.call(|reply| EnumeratorMessage::Close { reply }).await
    }

    pub fn send_request(&self, request: EnumeratorRequest<S>) -> Result<()> {
        self.post(EnumeratorMessage::Request(request))
    }

    pub fn register_reader(&self, subtask: SubtaskId) -> Result<()> {
        self.send_request(EnumeratorRequest::RegisterReader { subtask })
    }

    pub fn add_splits_back(&self, subtask: SubtaskId, splits: Vec<S>) -> Result<()> {
        self.send_request(EnumeratorRequest::AddSplitsBack { subtask, splits })
    }

    /// Open the command channel for `subtask` and the context its reader talks back through
    pub fn connect_reader(&self, subtask: SubtaskId) -> Result<ReaderChannel<S, C>> {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        self.post(EnumeratorMessage::ConnectReader {
            subtask,
            commands: commands_tx,
        })?;
        Ok(ReaderChannel {
            commands,
            context: ChannelReaderContext {
                subtask,
                tx: self.tx.clone(),
            },
        })
    }
}

/// Both directions of one reader's connection to the enumerator
pub struct ReaderChannel<S, C> {
    pub commands: mpsc::UnboundedReceiver<ReaderCommand<S>>,
    pub context: ChannelReaderContext<S, C>,
}

/// [`ReaderContext`] that posts into the enumerator's queue
#[derive(Debug)]
pub struct ChannelReaderContext<S, C> {
    subtask: SubtaskId,
    tx: mpsc::UnboundedSender<EnumeratorMessage<S, C>>,
}

impl<S, C> Clone for ChannelReaderContext<S, C> {
    fn clone(&self) -> Self {
        Self {
            subtask: self.subtask,
            tx: self.tx.clone(),
        }
    }
}

impl<S: Send, C: Send> ChannelReaderContext<S, C> {
    fn post(&self, request: EnumeratorRequest<S>) -> Result<()> {
        self.tx
            .send(EnumeratorMessage::Request(request))
            .map_err(|_| ConnectorError::closed("split enumerator").with_subtask(self.subtask))
    }
}

impl<S: Send, C: Send> ReaderContext for ChannelReaderContext<S, C> {
    fn subtask(&self) -> SubtaskId {
        self.subtask
    }

    fn send_split_request(&self) -> Result<()> {
        self.post(EnumeratorRequest::SplitRequest {
            subtask: self.subtask,
        })
    }

    fn send_event(&self, event: SourceEvent) -> Result<()> {
        self.post(EnumeratorRequest::Event {
            subtask: self.subtask,
            event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiscoveryConfig, DiscoveryMode};
    use crate::core::split::fixtures::TestSplit;
    use crate::enumerator::{AssigningEnumerator, EnumeratorCheckpoint, SplitDiscovery};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    type Handle = EnumeratorHandle<TestSplit, EnumeratorCheckpoint<TestSplit>>;

    struct Fixed(Vec<&'static str>);

    #[async_trait]
    impl SplitDiscovery<TestSplit> for Fixed {
        async fn discover(&self) -> Result<Vec<TestSplit>> {
            Ok(self.0.iter().map(|id| TestSplit::new(id)).collect())
        }
    }

    fn discovery(ids: Vec<&'static str>) -> DiscoveryLoop<TestSplit> {
        DiscoveryLoop::new(
            Arc::new(Fixed(ids)),
            DiscoveryConfig {
                mode: DiscoveryMode::OneShot,
                ..DiscoveryConfig::default()
            },
        )
    }

    async fn next_command(
        channel: &mut ReaderChannel<TestSplit, EnumeratorCheckpoint<TestSplit>>,
    ) -> ReaderCommand<TestSplit> {
        tokio::time::timeout(Duration::from_secs(5), channel.commands.recv())
            .await
            .expect("timed out waiting for a reader command")
            .expect("command channel closed")
    }

    #[tokio::test]
    async fn test_reader_receives_splits_then_no_more() {
        let (handle, task): (Handle, _) =
            EnumeratorActor::spawn(AssigningEnumerator::new(1), Some(discovery(vec!["a"])));
        let mut channel = handle.connect_reader(0).unwrap();
        handle.start().await.unwrap();
        handle.register_reader(0).unwrap();

        match next_command(&mut channel).await {
            ReaderCommand::AddSplits { splits } => assert_eq!(splits, vec![TestSplit::new("a")]),
            other => panic!("unexpected command {:?}", other),
        }

        channel.context.send_split_request().unwrap();
        assert!(matches!(
            next_command(&mut channel).await,
            ReaderCommand::NoMoreSplits
        ));

        handle.close().await.unwrap();
        drop(channel);
        drop(handle);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_calls_after_close_report_closed() {
        let (handle, _task): (Handle, _) = EnumeratorActor::spawn(AssigningEnumerator::new(1), None);
        handle.start().await.unwrap();
        handle.close().await.unwrap();

        let err = handle.snapshot_state(CheckpointId::new(1)).await.unwrap_err();
        assert!(err.is_closed());
        // Fire-and-forget requests racing the close are dropped, not fatal.
        handle.register_reader(0).unwrap();
        assert!(handle.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_unregistered_request_is_rejected_to_sender() {
        let (handle, task): (Handle, _) = EnumeratorActor::spawn(AssigningEnumerator::new(1), None);
        let mut channel = handle.connect_reader(4).unwrap();
        handle.start().await.unwrap();
        channel.context.send_split_request().unwrap();

        match next_command(&mut channel).await {
            ReaderCommand::Rejected { code, message } => {
                assert_eq!(code, ErrorCode::PROTOCOL_UNREGISTERED_READER);
                assert!(message.contains("subtask 4"));
            }
            other => panic!("unexpected command {:?}", other),
        }
        // The enumerator keeps serving everyone else.
        assert!(handle.snapshot_state(CheckpointId::new(1)).await.is_ok());
        assert!(!task.is_finished());
    }

    #[tokio::test]
    async fn test_unknown_event_only_affects_its_sender() {
        let (handle, task): (Handle, _) = EnumeratorActor::spawn(
            AssigningEnumerator::new(1),
            Some(discovery(vec!["a", "b"])),
        );
        let mut first = handle.connect_reader(0).unwrap();
        let mut second = handle.connect_reader(1).unwrap();
        handle.start().await.unwrap();
        handle.register_reader(0).unwrap();
        assert!(matches!(
            next_command(&mut first).await,
            ReaderCommand::AddSplits { .. }
        ));

        first
            .context
            .send_event(SourceEvent::custom("bogus", serde_json::Value::Null))
            .unwrap();
        match next_command(&mut first).await {
            ReaderCommand::Rejected { code, .. } => {
                assert_eq!(code, ErrorCode::PROTOCOL_UNKNOWN_EVENT)
            }
            other => panic!("unexpected command {:?}", other),
        }

        handle.register_reader(1).unwrap();
        match next_command(&mut second).await {
            ReaderCommand::AddSplits { splits } => assert_eq!(splits, vec![TestSplit::new("b")]),
            other => panic!("unexpected command {:?}", other),
        }
        assert!(!task.is_finished());
    }

    struct Delayed(Duration, Vec<&'static str>);

    #[async_trait]
    impl SplitDiscovery<TestSplit> for Delayed {
        async fn discover(&self) -> Result<Vec<TestSplit>> {
            tokio::time::sleep(self.0).await;
            Ok(self.1.iter().map(|id| TestSplit::new(id)).collect())
        }
    }

    #[tokio::test]
    async fn test_unreachable_parked_reader_does_not_starve_others() {
        let slow = DiscoveryLoop::new(
            Arc::new(Delayed(Duration::from_millis(200), vec!["a", "b"])),
            DiscoveryConfig {
                mode: DiscoveryMode::OneShot,
                ..DiscoveryConfig::default()
            },
        );
        let (handle, task): (Handle, _) =
            EnumeratorActor::spawn(AssigningEnumerator::new(1), Some(slow));
        let gone = handle.connect_reader(0).unwrap();
        let mut alive = handle.connect_reader(1).unwrap();
        handle.start().await.unwrap();
        handle.register_reader(0).unwrap();
        handle.register_reader(1).unwrap();
        // Reader 0 is parked when its task goes away.
        drop(gone);

        match next_command(&mut alive).await {
            ReaderCommand::AddSplits { splits } => assert_eq!(splits, vec![TestSplit::new("a")]),
            other => panic!("unexpected command {:?}", other),
        }
        let snapshot = handle.snapshot_state(CheckpointId::new(1)).await.unwrap();
        assert_eq!(snapshot.pending_splits, vec![TestSplit::new("b")]);
        assert!(!snapshot.assignment.contains_key(&0));
        assert!(!task.is_finished());
    }

    #[tokio::test]
    async fn test_snapshot_reflects_assignment() {
        let (handle, _task): (Handle, _) = EnumeratorActor::spawn(
            AssigningEnumerator::new(1),
            Some(discovery(vec!["a", "b"])),
        );
        let mut channel = handle.connect_reader(1).unwrap();
        handle.start().await.unwrap();
        handle.register_reader(1).unwrap();
        next_command(&mut channel).await;

        let snapshot = handle.snapshot_state(CheckpointId::new(1)).await.unwrap();
        assert_eq!(snapshot.pending_splits, vec![TestSplit::new("b")]);
        assert!(snapshot.assignment[&1].contains("a"));
        handle
            .notify_checkpoint_complete(CheckpointId::new(1))
            .await
            .unwrap();
    }
}
