//! Storage backend benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sessiondb_bench::random_data;
use sessiondb_storage::{FileBackend, InMemoryBackend, KvBackend, ScanDirection, WriteBatch};
use tempfile::TempDir;

fn key(i: usize) -> Vec<u8> {
    format!("key-{i:08}").into_bytes()
}

fn populate(backend: &dyn KvBackend, count: usize, value_size: usize) {
    let value = random_data(value_size);
    let mut batch = WriteBatch::new();
    for i in 0..count {
        batch.put(key(i), value.clone());
    }
    backend.write(batch).unwrap();
}

/// Benchmark InMemoryBackend single puts.
fn bench_inmemory_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("inmemory_put");

    for size in [64, 256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let backend = InMemoryBackend::new();
            let data = random_data(size);
            let mut i = 0;

            b.iter(|| {
                i += 1;
                backend.put(black_box(&key(i)), black_box(&data)).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark FileBackend batch writes.
fn bench_file_write_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_write_batch");

    // Use larger sample size for file operations
    group.sample_size(50);

    for ops in [1, 8, 64].iter() {
        group.throughput(Throughput::Elements(*ops as u64));
        group.bench_with_input(BenchmarkId::from_parameter(ops), ops, |b, &ops| {
            let temp_dir = TempDir::new().unwrap();
            let backend =
                FileBackend::open_with_options(&temp_dir.path().join("bench.log"), false).unwrap();
            let data = random_data(128);
            let mut round = 0;

            b.iter(|| {
                round += 1;
                let mut batch = WriteBatch::new();
                for i in 0..ops {
                    batch.put(key(round * ops + i), data.clone());
                }
                batch.delete(key(round * ops - 1));
                backend.write(black_box(batch)).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark FileBackend writes that sync every batch.
fn bench_file_synced_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_synced_write");
    group.sample_size(20); // fsync is slow

    let temp_dir = TempDir::new().unwrap();
    let backend = FileBackend::open_with_options(&temp_dir.path().join("bench.log"), true).unwrap();
    let data = random_data(1024);
    let mut i = 0;

    group.bench_function("1kb", |b| {
        b.iter(|| {
            i += 1;
            backend.put(&key(i), &data).unwrap();
        });
    });

    group.finish();
}

/// Benchmark bounded range scans in both directions.
fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");

    let backend = InMemoryBackend::new();
    populate(&backend, 10_000, 64);

    for limit in [16, 128, 1024].iter() {
        group.throughput(Throughput::Elements(*limit as u64));
        group.bench_with_input(BenchmarkId::new("forward", limit), limit, |b, &limit| {
            b.iter(|| {
                let pairs = backend
                    .scan(&key(1_000), &key(9_000), ScanDirection::Forward, limit)
                    .unwrap();
                black_box(pairs);
            });
        });
        group.bench_with_input(BenchmarkId::new("backward", limit), limit, |b, &limit| {
            b.iter(|| {
                let pairs = backend
                    .scan(&key(1_000), &key(9_000), ScanDirection::Backward, limit)
                    .unwrap();
                black_box(pairs);
            });
        });
    }

    group.finish();
}

/// Benchmark range deletes, the way segments are dropped.
fn bench_delete_range(c: &mut Criterion) {
    c.bench_function("delete_range_1000", |b| {
        b.iter_batched(
            || {
                let backend = InMemoryBackend::new();
                populate(&backend, 2_000, 64);
                backend
            },
            |backend| {
                backend.delete_range(&key(500), &key(1_500)).unwrap();
                backend
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

/// Benchmark log replay on open.
fn bench_file_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_replay");
    group.sample_size(20);

    for count in [1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let temp_dir = TempDir::new().unwrap();
            let path = temp_dir.path().join("bench.log");
            {
                let backend = FileBackend::open_with_options(&path, false).unwrap();
                for i in 0..count {
                    backend.put(&key(i), &random_data(64)).unwrap();
                }
                backend.flush().unwrap();
            }

            b.iter(|| {
                let backend = FileBackend::open(black_box(&path)).unwrap();
                black_box(backend.len());
            });
        });
    }

    group.finish();
}

/// Benchmark log compaction.
fn bench_file_compact(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_compact");
    group.sample_size(20);

    group.bench_function("1000_keys_10_versions", |b| {
        let temp_dir = TempDir::new().unwrap();
        let backend =
            FileBackend::open_with_options(&temp_dir.path().join("bench.log"), false).unwrap();

        b.iter(|| {
            for _ in 0..10 {
                populate(&backend, 1_000, 32);
            }
            let reclaimed = backend.compact().unwrap();
            black_box(reclaimed);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_inmemory_put,
    bench_file_write_batch,
    bench_file_synced_write,
    bench_scan,
    bench_delete_range,
    bench_file_replay,
    bench_file_compact,
);

criterion_main!(benches);
