//! Benchmarks for split assignment and checkpoint handling
//!
//! Covers draining a discovered split set through request-driven assignment,
//! restore reconciliation after a parallelism change, and persisting job
//! checkpoints to disk.

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use std::collections::BTreeMap;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tributary::checkpoint::{CheckpointStore, FileCheckpointStore, JobCheckpoint};
use tributary::connector::file::FileSourceSplit;
use tributary::core::{CheckpointId, SourceSplit, SubtaskId};
use tributary::enumerator::{
    AssigningEnumerator, DiscoveryEvent, RecordingContext, SplitEnumerator,
};
use tributary::format::CheckpointedPosition;
use tributary::fs::Path;
use uuid::Uuid;

fn file_splits(count: usize) -> Vec<FileSourceSplit> {
    (0..count)
        .map(|i| {
            let path = Path::new(&format!("/data/2026/10/part-{i:05}.log")).unwrap();
            FileSourceSplit::new(path, 0, 64 << 20, 64 << 20, 1_760_000_000_000)
        })
        .collect()
}

/// Enumerator with `splits` discovered and exhausted, every reader registered
fn drain_all(splits: &[FileSourceSplit], readers: SubtaskId, batch_size: usize) -> usize {
    let mut ctx = RecordingContext::new();
    let mut enumerator = AssigningEnumerator::new(batch_size);
    enumerator.start(&mut ctx).unwrap();
    enumerator
        .handle_discovery(DiscoveryEvent::SplitsDiscovered(splits.to_vec()), &mut ctx)
        .unwrap();
    enumerator
        .handle_discovery(DiscoveryEvent::Exhausted, &mut ctx)
        .unwrap();
    for subtask in 0..readers {
        enumerator.add_reader(subtask, &mut ctx).unwrap();
    }
    while enumerator.state().pending_len() > 0 {
        for subtask in 0..readers {
            enumerator.handle_split_request(subtask, &mut ctx).unwrap();
        }
    }
    ctx.take().len()
}

fn bench_assignment(c: &mut Criterion) {
    let mut group = c.benchmark_group("assignment");
    group
        .warm_up_time(Duration::from_secs(1))
        .measurement_time(Duration::from_secs(5));

    for count in [100, 1_000, 10_000] {
        let splits = file_splits(count);
        group.bench_with_input(BenchmarkId::new("drain_8_readers", count), &splits, |b, splits| {
            b.iter(|| black_box(drain_all(splits, 8, 1)))
        });
        group.bench_with_input(BenchmarkId::new("drain_8_readers_batch_16", count), &splits, |b, splits| {
            b.iter(|| black_box(drain_all(splits, 8, 16)))
        });
    }
    group.finish();
}

/// Checkpoint of a job where `readers` subtasks each hold `per_reader` splits mid-file
fn job_checkpoint(readers: SubtaskId, per_reader: usize) -> JobCheckpoint<FileSourceSplit> {
    let mut ctx = RecordingContext::new();
    let mut enumerator = AssigningEnumerator::new(per_reader);
    enumerator.start(&mut ctx).unwrap();
    let total = readers as usize * per_reader;
    enumerator
        .handle_discovery(DiscoveryEvent::SplitsDiscovered(file_splits(total * 2)), &mut ctx)
        .unwrap();
    for subtask in 0..readers {
        enumerator.add_reader(subtask, &mut ctx).unwrap();
    }

    let mut held: BTreeMap<SubtaskId, Vec<FileSourceSplit>> = BTreeMap::new();
    for (subtask, split) in ctx.take().into_iter().flat_map(|(subtask, command)| match command {
        tributary::core::ReaderCommand::AddSplits { splits } => {
            splits.into_iter().map(|s| (subtask, s)).collect::<Vec<_>>()
        }
        _ => Vec::new(),
    }) {
        let position = CheckpointedPosition {
            offset: 4096,
            records_after_offset: 7,
        };
        held.entry(subtask).or_default().push(split.with_position(position));
    }

    let snapshot = enumerator.snapshot_state(CheckpointId::new(1)).unwrap();
    JobCheckpoint::new(CheckpointId::new(1), Uuid::new_v4(), snapshot, held)
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    for (readers, parallelism) in [(8, 8), (16, 4), (64, 8)] {
        let checkpoint = job_checkpoint(readers, 32);
        group.bench_function(format!("{readers}_readers_to_{parallelism}"), |b| {
            b.iter_batched(
                || checkpoint.clone(),
                |checkpoint| black_box(checkpoint.reconciled(parallelism)),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_checkpoint_store(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("checkpoint_store");
    group
        .warm_up_time(Duration::from_secs(1))
        .measurement_time(Duration::from_secs(5));

    for (readers, per_reader) in [(4, 8), (16, 64)] {
        let checkpoint = Arc::new(job_checkpoint(readers, per_reader));
        let name = format!("{readers}x{per_reader}");

        group.bench_function(BenchmarkId::new("save", &name), |b| {
            b.to_async(&rt).iter_batched(
                || (TempDir::new().unwrap(), Arc::clone(&checkpoint)),
                |(dir, checkpoint)| async move {
                    let store = FileCheckpointStore::new(dir.path(), 2);
                    store.save(checkpoint.as_ref()).await.unwrap();
                },
                BatchSize::SmallInput,
            );
        });

        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path(), 2);
        rt.block_on(store.save(checkpoint.as_ref())).unwrap();
        group.bench_function(BenchmarkId::new("load_latest", &name), |b| {
            b.to_async(&rt).iter(|| async {
                let loaded = CheckpointStore::<FileSourceSplit>::load_latest(&store).await;
                black_box(loaded.unwrap());
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_assignment,
    bench_reconcile,
    bench_checkpoint_store
);
criterion_main!(benches);
