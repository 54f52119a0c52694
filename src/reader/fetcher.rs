//! Background fetch task for one split
//!
//! The fetcher opens the split on a blocking thread and pushes every record
//! into a bounded queue. A full queue blocks the fetcher, never the reader.
//! Dropping the queue's receiver (or setting the cancel flag) makes the
//! fetcher stop at its next step.

use super::availability::{Availability, NotifyOnDrop};
use super::SplitOpener;
use crate::core::SourceSplit;
use crate::error::ConnectorError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::debug;

#[derive(Debug)]
pub(crate) enum FetchEvent<R, P> {
    Record(R, P),
    Finished,
    /// The split could not be opened but may be skipped
    Skipped(ConnectorError),
    Failed(ConnectorError),
}

impl<R, P> FetchEvent<R, P> {
    fn is_terminal(&self) -> bool {
        !matches!(self, FetchEvent::Record(..))
    }
}

pub(crate) struct SplitFetcher<R, P> {
    events: mpsc::Receiver<FetchEvent<R, P>>,
    cancel: Arc<AtomicBool>,
}

pub(crate) enum Polled<R, P> {
    Event(FetchEvent<R, P>),
    Empty,
    /// The fetch task ended without a terminal event
    Lost,
}

impl<R, P> SplitFetcher<R, P>
where
    R: Send + 'static,
    P: Send + 'static,
{
    pub(crate) fn spawn<S, O>(
        runtime: &Handle,
        opener: Arc<O>,
        split: S,
        capacity: usize,
        availability: Availability,
    ) -> Self
    where
        S: SourceSplit<Position = P>,
        O: SplitOpener<S, Record = R>,
    {
        let (tx, events) = mpsc::channel(capacity.max(1));
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        // Detached: cancellation goes through the flag and the closed queue.
        runtime.spawn_blocking(move || fetch(opener, split, tx, flag, availability));
        Self { events, cancel }
    }

    pub(crate) fn poll(&mut self) -> Polled<R, P> {
        match self.events.try_recv() {
            Ok(event) => Polled::Event(event),
            Err(TryRecvError::Empty) => Polled::Empty,
            Err(TryRecvError::Disconnected) => Polled::Lost,
        }
    }

    /// Whether a poll would return something other than `Empty`
    pub(crate) fn has_progress(&self) -> bool {
        !self.events.is_empty() || self.events.is_closed()
    }

    /// Stop the fetch task without waiting for it
    pub(crate) fn cancel(mut self) {
        self.cancel.store(true, Ordering::Release);
        self.events.close();
    }
}

fn fetch<S, O>(
    opener: Arc<O>,
    split: S,
    tx: mpsc::Sender<FetchEvent<O::Record, S::Position>>,
    cancel: Arc<AtomicBool>,
    availability: Availability,
) where
    S: SourceSplit,
    O: SplitOpener<S>,
{
    let _wake = NotifyOnDrop(availability.clone());
    let split_id = split.split_id().to_string();

    let mut reader = match opener.open(&split) {
        Ok(reader) => reader,
        Err(err) => {
            let event = if err.is_skippable() {
                FetchEvent::Skipped(err)
            } else {
                FetchEvent::Failed(err)
            };
            let _ = tx.blocking_send(event);
            return;
        }
    };
    debug!(split_id = %split_id, "Fetcher opened split");

    while !cancel.load(Ordering::Acquire) {
        let event = match reader.read() {
            Ok(Some((record, position))) => FetchEvent::Record(record, position),
            Ok(None) => FetchEvent::Finished,
            Err(err) => FetchEvent::Failed(err),
        };
        let terminal = event.is_terminal();
        if tx.blocking_send(event).is_err() {
            debug!(split_id = %split_id, "Reader dropped fetch queue");
            break;
        }
        availability.notify();
        if terminal {
            break;
        }
    }

    if let Err(err) = reader.close() {
        debug!(split_id = %split_id, "Failed to close record reader: {}", err);
    }
}
