//! Reader with one background fetcher per split
//!
//! Splits are polled round-robin. Each poll takes at most one record from
//! the first non-paused split whose queue has one, so a single hot split
//! cannot starve the others. The position carried with each emitted record
//! becomes the split's cursor, which is what snapshots capture; records
//! still sitting in a queue are re-read after a restore.

use super::availability::Availability;
use super::fetcher::{FetchEvent, Polled, SplitFetcher};
use super::{ReaderContext, ReaderOutput, SourceReader, SplitOpener};
use crate::core::{
    CheckpointId, CheckpointTracker, InputStatus, ReadinessSignal, SourceEvent, SourceSplit,
    SplitId, SplitStatus, SplitTransition, SubtaskId,
};
use crate::error::{ConnectorError, ErrorCode, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Handler for enumerator-to-reader custom events
pub type ReaderEventHandler = Box<dyn FnMut(&SourceEvent, &dyn ReaderContext) -> Result<()> + Send>;

/// Reader lifecycle: `Created → Started → Running → Terminated`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderLifecycle {
    Created,
    Started,
    /// At least one record has been emitted
    Running,
    Terminated,
}

struct SplitSlot<S: SourceSplit, R> {
    split: S,
    position: Option<S::Position>,
    status: SplitStatus,
    fetcher: Option<SplitFetcher<R, S::Position>>,
}

impl<S: SourceSplit, R> SplitSlot<S, R> {
    fn new(split: S) -> Self {
        Self {
            position: split.position().cloned(),
            split,
            status: SplitStatus::Assigned,
            fetcher: None,
        }
    }

    fn id(&self) -> &str {
        self.split.split_id()
    }

    /// The split with its cursor advanced to the last emitted record
    fn current(&self) -> S {
        match &self.position {
            Some(position) => self.split.with_position(position.clone()),
            None => self.split.clone(),
        }
    }

    fn transition(&mut self, transition: SplitTransition) -> Result<()> {
        self.status = self.status.apply(transition)?;
        Ok(())
    }
}

pub struct FetchingSourceReader<S: SourceSplit, O: SplitOpener<S>> {
    subtask: SubtaskId,
    opener: Arc<O>,
    context: Box<dyn ReaderContext>,
    queue_capacity: usize,
    slots: Vec<SplitSlot<S, O::Record>>,
    next_slot: usize,
    no_more_splits: bool,
    end_of_input: bool,
    checkpoints: CheckpointTracker<Vec<S>>,
    lifecycle: ReaderLifecycle,
    availability: Availability,
    runtime: Option<Handle>,
    skipped_splits: Vec<SplitId>,
    event_handler: Option<ReaderEventHandler>,
}

impl<S: SourceSplit, O: SplitOpener<S>> FetchingSourceReader<S, O> {
    pub fn new(opener: Arc<O>, context: Box<dyn ReaderContext>, queue_capacity: usize) -> Self {
        Self {
            subtask: context.subtask(),
            opener,
            context,
            queue_capacity: queue_capacity.max(1),
            slots: Vec::new(),
            next_slot: 0,
            no_more_splits: false,
            end_of_input: false,
            checkpoints: CheckpointTracker::new(),
            lifecycle: ReaderLifecycle::Created,
            availability: Availability::new(),
            runtime: None,
            skipped_splits: Vec::new(),
            event_handler: None,
        }
    }

    /// Reader resuming after checkpoint `checkpoint_id`, holding `splits`
    pub fn restore(
        opener: Arc<O>,
        context: Box<dyn ReaderContext>,
        queue_capacity: usize,
        checkpoint_id: CheckpointId,
        splits: Vec<S>,
    ) -> Result<Self> {
        let mut reader = Self::new(opener, context, queue_capacity);
        reader.checkpoints = CheckpointTracker::restored(checkpoint_id);
        reader.add_splits(splits)?;
        Ok(reader)
    }

    pub fn with_event_handler(mut self, handler: ReaderEventHandler) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn subtask(&self) -> SubtaskId {
        self.subtask
    }

    pub fn lifecycle(&self) -> ReaderLifecycle {
        self.lifecycle
    }

    /// Splits skipped because they could not be opened
    pub fn skipped_splits(&self) -> &[SplitId] {
        &self.skipped_splits
    }

    /// Every split not yet finished, cursors at the last emitted record
    pub fn unfinished_splits(&self) -> Vec<S> {
        self.slots.iter().map(SplitSlot::current).collect()
    }

    pub fn has_no_more_splits(&self) -> bool {
        self.no_more_splits
    }

    fn ensure_open(&self) -> Result<()> {
        if self.lifecycle == ReaderLifecycle::Terminated {
            Err(ConnectorError::closed(format!("reader {}", self.subtask)))
        } else {
            Ok(())
        }
    }

    fn spawn_fetcher(&mut self, index: usize) {
        let Some(runtime) = self.runtime.as_ref() else {
            return;
        };
        let slot = &mut self.slots[index];
        if slot.fetcher.is_some() {
            return;
        }
        slot.fetcher = Some(SplitFetcher::spawn(
            runtime,
            Arc::clone(&self.opener),
            slot.current(),
            self.queue_capacity,
            self.availability.clone(),
        ));
    }

    /// Next event from the first pollable split that has one, round-robin
    fn next_event(&mut self) -> Option<(usize, FetchEvent<O::Record, S::Position>)> {
        let count = self.slots.len();
        for step in 0..count {
            let index = (self.next_slot + step) % count;
            let slot = &mut self.slots[index];
            if !slot.status.is_pollable() {
                continue;
            }
            let Some(fetcher) = slot.fetcher.as_mut() else {
                continue;
            };
            match fetcher.poll() {
                Polled::Event(event) => {
                    self.next_slot = (index + 1) % count;
                    return Some((index, event));
                }
                Polled::Empty => {}
                Polled::Lost => {
                    let err = ConnectorError::fatal_read_with_code(
                        ErrorCode::READ_FETCHER_LOST,
                        "fetch task ended unexpectedly",
                        Some(slot.id().to_string()),
                    );
                    return Some((index, FetchEvent::Failed(err)));
                }
            }
        }
        None
    }

    /// Remove a drained split and tell the enumerator
    fn finish_split(&mut self, index: usize) -> Result<()> {
        let mut slot = self.slots.remove(index);
        slot.transition(SplitTransition::Finish)?;
        if let Some(fetcher) = slot.fetcher.take() {
            fetcher.cancel();
        }
        if self.next_slot > index {
            self.next_slot -= 1;
        }
        if self.next_slot >= self.slots.len() {
            self.next_slot = 0;
        }

        let split_id = slot.id().to_string();
        debug!(subtask = self.subtask, split_id = %split_id, "Split finished");
        if let Err(err) = self.context.send_event(SourceEvent::SplitsFinished {
            split_ids: vec![split_id],
        }) {
            warn!(subtask = self.subtask, "Could not report finished split: {}", err);
        }
        if self.slots.is_empty() && !self.no_more_splits {
            if let Err(err) = self.context.send_split_request() {
                warn!(subtask = self.subtask, "Could not request more splits: {}", err);
            }
        }
        Ok(())
    }

    fn fail(&mut self, index: usize, err: ConnectorError) -> ConnectorError {
        let split_id = self.slots[index].id().to_string();
        let err = match err {
            err @ ConnectorError::FatalRead { .. } => err.with_split(split_id.clone()),
            other => ConnectorError::fatal_read_with_code(
                ErrorCode::READ_IO_FAULT,
                "failed to read split",
                Some(split_id.clone()),
            )
            .with_source(other),
        };
        error!(subtask = self.subtask, split_id = %split_id, "Fatal read error: {}", err);
        self.terminate();
        err
    }

    fn has_buffered_progress(&self) -> bool {
        self.slots.iter().any(|slot| {
            slot.status.is_pollable()
                && slot
                    .fetcher
                    .as_ref()
                    .is_some_and(|fetcher| fetcher.has_progress())
        })
    }

    fn terminate(&mut self) {
        for slot in &mut self.slots {
            if let Some(fetcher) = slot.fetcher.take() {
                fetcher.cancel();
            }
        }
        self.lifecycle = ReaderLifecycle::Terminated;
        self.availability.notify();
    }
}

impl<S: SourceSplit, O: SplitOpener<S>> SourceReader for FetchingSourceReader<S, O> {
    type Split = S;
    type Record = O::Record;

    fn start(&mut self) -> Result<()> {
        match self.lifecycle {
            ReaderLifecycle::Created => {}
            ReaderLifecycle::Started | ReaderLifecycle::Running => return Ok(()),
            ReaderLifecycle::Terminated => {
                return Err(ConnectorError::closed(format!("reader {}", self.subtask)))
            }
        }

        let runtime = Handle::try_current().map_err(|e| {
            ConnectorError::internal("reader must be started inside a tokio runtime")
                .with_source(e)
        })?;
        self.runtime = Some(runtime);
        self.lifecycle = ReaderLifecycle::Started;
        for index in 0..self.slots.len() {
            self.spawn_fetcher(index);
        }
        info!(
            subtask = self.subtask,
            splits = self.slots.len(),
            "Reader started"
        );
        Ok(())
    }

    fn poll_next(&mut self, output: &mut dyn ReaderOutput<Self::Record>) -> Result<InputStatus> {
        match self.lifecycle {
            ReaderLifecycle::Created => {
                return Err(ConnectorError::protocol_with_code(
                    ErrorCode::PROTOCOL_INVALID_TRANSITION,
                    "poll_next called before start",
                )
                .with_subtask(self.subtask))
            }
            ReaderLifecycle::Terminated => {
                return Err(ConnectorError::closed(format!("reader {}", self.subtask)))
            }
            ReaderLifecycle::Started | ReaderLifecycle::Running => {}
        }
        if self.end_of_input {
            return Ok(InputStatus::EndOfInput);
        }

        while let Some((index, event)) = self.next_event() {
            match event {
                FetchEvent::Record(record, position) => {
                    let slot = &mut self.slots[index];
                    if slot.status == SplitStatus::Assigned {
                        slot.transition(SplitTransition::Start)?;
                    }
                    slot.position = Some(position);
                    output.collect(record);
                    self.lifecycle = ReaderLifecycle::Running;
                    return Ok(InputStatus::MoreAvailable);
                }
                FetchEvent::Finished => self.finish_split(index)?,
                FetchEvent::Skipped(err) => {
                    let split_id = self.slots[index].id().to_string();
                    warn!(
                        subtask = self.subtask,
                        split_id = %split_id,
                        "Skipping unavailable split: {}",
                        err
                    );
                    self.skipped_splits.push(split_id);
                    self.finish_split(index)?;
                }
                FetchEvent::Failed(err) => return Err(self.fail(index, err)),
            }
        }

        if self.no_more_splits && self.slots.is_empty() {
            self.end_of_input = true;
            info!(subtask = self.subtask, "Reader reached end of input");
            return Ok(InputStatus::EndOfInput);
        }
        Ok(InputStatus::NothingAvailableNow)
    }

    fn availability(&mut self) -> ReadinessSignal {
        let token = self.availability.renew();
        // Data may have landed before the fresh token existed.
        if self.lifecycle == ReaderLifecycle::Terminated
            || self.end_of_input
            || (self.no_more_splits && self.slots.is_empty())
            || self.has_buffered_progress()
        {
            token.signal();
        }
        token
    }

    fn add_splits(&mut self, splits: Vec<S>) -> Result<()> {
        self.ensure_open()?;
        if self.no_more_splits {
            return Err(ConnectorError::protocol_with_code(
                ErrorCode::PROTOCOL_SPLITS_AFTER_NO_MORE,
                "splits assigned after no-more-splits",
            )
            .with_subtask(self.subtask));
        }

        let mut seen: HashSet<&str> = self.slots.iter().map(SplitSlot::id).collect();
        for split in &splits {
            if !seen.insert(split.split_id()) {
                return Err(ConnectorError::protocol(format!(
                    "split {} is already assigned to this reader",
                    split.split_id()
                ))
                .with_subtask(self.subtask));
            }
        }

        debug!(subtask = self.subtask, added = splits.len(), "Splits added");
        let first = self.slots.len();
        self.slots.extend(splits.into_iter().map(SplitSlot::new));
        for index in first..self.slots.len() {
            self.spawn_fetcher(index);
        }
        Ok(())
    }

    fn notify_no_more_splits(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.no_more_splits {
            debug!(subtask = self.subtask, "No more splits will be assigned");
            self.no_more_splits = true;
        }
        Ok(())
    }

    fn snapshot_state(&mut self, checkpoint_id: CheckpointId) -> Result<Vec<S>> {
        self.ensure_open()?;
        self.checkpoints.ensure_next(checkpoint_id)?;

        let splits = self.unfinished_splits();
        self.checkpoints.record(checkpoint_id, splits.clone())?;
        debug!(
            subtask = self.subtask,
            checkpoint_id = %checkpoint_id,
            splits = splits.len(),
            "Reader snapshot taken"
        );
        Ok(splits)
    }

    fn notify_checkpoint_complete(&mut self, checkpoint_id: CheckpointId) -> Result<()> {
        let released = self.checkpoints.complete(checkpoint_id);
        if !released.is_empty() {
            debug!(
                subtask = self.subtask,
                checkpoint_id = %checkpoint_id,
                released = released.len(),
                "Released reader snapshots"
            );
        }
        Ok(())
    }

    fn notify_checkpoint_aborted(&mut self, checkpoint_id: CheckpointId) -> Result<()> {
        if self.checkpoints.abort(checkpoint_id).is_some() {
            debug!(subtask = self.subtask, checkpoint_id = %checkpoint_id, "Reader snapshot discarded");
        }
        Ok(())
    }

    fn pause_or_resume_splits(&mut self, to_pause: &[SplitId], to_resume: &[SplitId]) -> Result<()> {
        self.ensure_open()?;
        let mut resumed = false;

        for (ids, transition) in [
            (to_pause, SplitTransition::Pause),
            (to_resume, SplitTransition::Resume),
        ] {
            for id in ids {
                match self.slots.iter_mut().find(|slot| slot.id() == id.as_str()) {
                    Some(slot) => {
                        slot.transition(transition)?;
                        resumed |= transition == SplitTransition::Resume;
                    }
                    None => debug!(subtask = self.subtask, split_id = %id, "Ignoring pause/resume for unknown split"),
                }
            }
        }

        if resumed && self.has_buffered_progress() {
            self.availability.notify();
        }
        Ok(())
    }

    fn handle_source_event(&mut self, event: SourceEvent) -> Result<()> {
        self.ensure_open()?;
        match self.event_handler.as_mut() {
            Some(handler) => handler(&event, self.context.as_ref()),
            None => {
                debug!(subtask = self.subtask, kind = event.kind(), "Ignoring source event");
                Ok(())
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.lifecycle != ReaderLifecycle::Terminated {
            self.terminate();
            info!(subtask = self.subtask, "Reader closed");
        }
        Ok(())
    }
}

impl<S: SourceSplit, O: SplitOpener<S>> Drop for FetchingSourceReader<S, O> {
    fn drop(&mut self) {
        for slot in &mut self.slots {
            if let Some(fetcher) = slot.fetcher.take() {
                fetcher.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::split::fixtures::TestSplit;
    use crate::format::RecordReader;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Yields `"{id}:{n}"` for n in position..len, position being the next index
    struct Counting {
        lengths: HashMap<String, u64>,
        missing: Vec<String>,
    }

    struct CountingReader {
        id: String,
        next: u64,
        len: u64,
    }

    impl RecordReader for CountingReader {
        type Record = String;
        type Position = u64;

        fn read(&mut self) -> Result<Option<(String, u64)>> {
            if self.next >= self.len {
                return Ok(None);
            }
            let record = format!("{}:{}", self.id, self.next);
            self.next += 1;
            Ok(Some((record, self.next)))
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn checkpointed_position(&self) -> Option<u64> {
            Some(self.next)
        }
    }

    impl SplitOpener<TestSplit> for Counting {
        type Record = String;

        fn open(
            &self,
            split: &TestSplit,
        ) -> Result<Box<dyn RecordReader<Record = String, Position = u64>>> {
            if self.missing.contains(&split.id) {
                return Err(ConnectorError::transient_with_code(
                    ErrorCode::COLLABORATOR_SPLIT_UNAVAILABLE,
                    "gone",
                ));
            }
            Ok(Box::new(CountingReader {
                id: split.id.clone(),
                next: split.position.unwrap_or(0),
                len: self.lengths.get(&split.id).copied().unwrap_or(0),
            }))
        }
    }

    #[derive(Default)]
    struct Recorder {
        requests: Mutex<u32>,
        events: Mutex<Vec<SourceEvent>>,
    }

    struct TestContext(Arc<Recorder>);

    impl ReaderContext for TestContext {
        fn subtask(&self) -> SubtaskId {
            0
        }

        fn send_split_request(&self) -> Result<()> {
            *self.0.requests.lock().unwrap() += 1;
            Ok(())
        }

        fn send_event(&self, event: SourceEvent) -> Result<()> {
            self.0.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn opener(lengths: &[(&str, u64)], missing: &[&str]) -> Arc<Counting> {
        Arc::new(Counting {
            lengths: lengths
                .iter()
                .map(|(id, len)| (id.to_string(), *len))
                .collect(),
            missing: missing.iter().map(|id| id.to_string()).collect(),
        })
    }

    fn reader(
        lengths: &[(&str, u64)],
        missing: &[&str],
    ) -> (FetchingSourceReader<TestSplit, Counting>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let reader = FetchingSourceReader::new(
            opener(lengths, missing),
            Box::new(TestContext(Arc::clone(&recorder))),
            4,
        );
        (reader, recorder)
    }

    /// Poll until a status other than NothingAvailableNow, waiting on the token in between
    async fn poll(
        reader: &mut FetchingSourceReader<TestSplit, Counting>,
        out: &mut Vec<String>,
    ) -> InputStatus {
        loop {
            let status = reader.poll_next(out).unwrap();
            if status != InputStatus::NothingAvailableNow {
                return status;
            }
            let token = reader.availability();
            assert!(
                token.wait_timeout(Duration::from_secs(5)).await,
                "availability token never fired"
            );
        }
    }

    async fn drain(reader: &mut FetchingSourceReader<TestSplit, Counting>) -> Vec<String> {
        let mut out = Vec::new();
        while poll(reader, &mut out).await == InputStatus::MoreAvailable {}
        out
    }

    #[tokio::test]
    async fn test_reads_all_splits_to_end_of_input() {
        let (mut reader, recorder) = reader(&[("a", 3), ("b", 2)], &[]);
        reader
            .add_splits(vec![TestSplit::new("a"), TestSplit::new("b")])
            .unwrap();
        reader.start().unwrap();
        reader.notify_no_more_splits().unwrap();

        let mut records = drain(&mut reader).await;
        records.sort();
        assert_eq!(records, vec!["a:0", "a:1", "a:2", "b:0", "b:1"]);

        let mut out = Vec::new();
        assert_eq!(reader.poll_next(&mut out).unwrap(), InputStatus::EndOfInput);
        assert!(out.is_empty());
        assert_eq!(recorder.events.lock().unwrap().len(), 2);
        // The request is withheld once no-more-splits is known.
        assert_eq!(*recorder.requests.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_finished_split_requests_more() {
        let (mut reader, recorder) = reader(&[("a", 1)], &[]);
        reader.add_splits(vec![TestSplit::new("a")]).unwrap();
        reader.start().unwrap();

        let mut out = Vec::new();
        assert_eq!(poll(&mut reader, &mut out).await, InputStatus::MoreAvailable);
        // Drain the finish event.
        tokio::time::timeout(Duration::from_secs(5), async {
            while *recorder.requests.lock().unwrap() == 0 {
                let _ = reader.poll_next(&mut out).unwrap();
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(
            recorder.events.lock().unwrap()[0],
            SourceEvent::SplitsFinished {
                split_ids: vec!["a".to_string()]
            }
        );
        assert_eq!(
            reader.poll_next(&mut out).unwrap(),
            InputStatus::NothingAvailableNow
        );
    }

    #[tokio::test]
    async fn test_snapshot_and_restore_resume_exactly() {
        let (mut reader, _) = reader(&[("a", 6)], &[]);
        reader.add_splits(vec![TestSplit::new("a")]).unwrap();
        reader.start().unwrap();

        let mut consumed = Vec::new();
        for _ in 0..2 {
            assert_eq!(poll(&mut reader, &mut consumed).await, InputStatus::MoreAvailable);
        }
        let snapshot = reader.snapshot_state(CheckpointId::new(1)).unwrap();
        assert_eq!(snapshot, vec![TestSplit::new("a").with_position(2)]);

        // Records consumed after the barrier are not part of the snapshot.
        assert_eq!(poll(&mut reader, &mut consumed).await, InputStatus::MoreAvailable);
        reader.close().unwrap();

        let mut restored = FetchingSourceReader::restore(
            opener(&[("a", 6)], &[]),
            Box::new(TestContext(Arc::new(Recorder::default()))),
            4,
            CheckpointId::new(1),
            snapshot,
        )
        .unwrap();
        restored.start().unwrap();
        restored.notify_no_more_splits().unwrap();

        assert_eq!(drain(&mut restored).await, vec!["a:2", "a:3", "a:4", "a:5"]);
        assert!(restored.snapshot_state(CheckpointId::new(1)).is_err());
    }

    #[tokio::test]
    async fn test_paused_split_is_not_emitted() {
        let (mut reader, _) = reader(&[("a", 2), ("b", 2)], &[]);
        reader
            .add_splits(vec![TestSplit::new("a"), TestSplit::new("b")])
            .unwrap();
        reader.start().unwrap();
        reader
            .pause_or_resume_splits(&["a".to_string(), "zzz".to_string()], &[])
            .unwrap();

        let mut out = Vec::new();
        for _ in 0..2 {
            assert_eq!(poll(&mut reader, &mut out).await, InputStatus::MoreAvailable);
        }
        assert_eq!(out, vec!["b:0", "b:1"]);

        reader.pause_or_resume_splits(&[], &["a".to_string()]).unwrap();
        assert_eq!(poll(&mut reader, &mut out).await, InputStatus::MoreAvailable);
        assert_eq!(out.last().map(String::as_str), Some("a:0"));
    }

    #[tokio::test]
    async fn test_unavailable_split_is_skipped() {
        let (mut reader, recorder) = reader(&[("b", 1)], &["a"]);
        reader
            .add_splits(vec![TestSplit::new("a"), TestSplit::new("b")])
            .unwrap();
        reader.notify_no_more_splits().unwrap();
        reader.start().unwrap();

        assert_eq!(drain(&mut reader).await, vec!["b:0"]);
        assert_eq!(reader.skipped_splits().to_vec(), vec!["a".to_string()]);
        assert_eq!(recorder.events.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_protocol_violations() {
        let (mut reader, _) = reader(&[], &[]);
        let mut out = Vec::new();
        assert!(reader.poll_next(&mut out).unwrap_err().is_protocol());

        reader.add_splits(vec![TestSplit::new("a")]).unwrap();
        assert!(reader.add_splits(vec![TestSplit::new("a")]).is_err());

        reader.notify_no_more_splits().unwrap();
        let err = reader.add_splits(vec![TestSplit::new("b")]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PROTOCOL_SPLITS_AFTER_NO_MORE);
    }

    #[tokio::test]
    async fn test_close_is_prompt_and_idempotent() {
        let (mut reader, _) = reader(&[("a", 1_000_000)], &[]);
        reader.add_splits(vec![TestSplit::new("a")]).unwrap();
        reader.start().unwrap();
        reader.close().unwrap();
        reader.close().unwrap();

        let mut out = Vec::new();
        assert!(reader.poll_next(&mut out).unwrap_err().is_closed());
        assert!(reader.availability().is_ready());
        assert!(reader.add_splits(vec![TestSplit::new("b")]).unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn test_end_of_input_is_sticky() {
        let (mut reader, _) = reader(&[], &[]);
        reader.start().unwrap();
        reader.notify_no_more_splits().unwrap();

        let mut out = Vec::new();
        for _ in 0..3 {
            assert_eq!(reader.poll_next(&mut out).unwrap(), InputStatus::EndOfInput);
        }
        assert!(reader.availability().is_ready());
    }
}
