//! Microbenchmarks for the cell index lock operations.
//!
//! - Insert path: fresh ids into a pre-sized index.
//! - Hit path: load and save of existing cells, with and without growth.
//! - Contended chains: many cells forced into a handful of buckets.

use std::time::Duration;

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, SamplingMode,
    Throughput,
};

use oxitrunk::{ArenaConfig, CellIndex, CellIndexConfig};

const CELLS: u64 = 4096;

fn build_index(bucket_count: u32) -> CellIndex {
    let config = CellIndexConfig::new(bucket_count, CELLS as u32 * 2)
        .with_arena(ArenaConfig::new(64 << 20, 1 << 20));
    CellIndex::new(config).unwrap()
}

fn populated_index(bucket_count: u32, cell_size: usize) -> CellIndex {
    let index = build_index(bucket_count);
    for id in 0..CELLS {
        let mut lease = index.lock_for_add(id, cell_size, 0).unwrap();
        lease.as_mut_slice().fill(id as u8);
    }
    index
}

fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("cell_index/add");
    group.sampling_mode(SamplingMode::Flat);
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(CELLS));

    for buckets in [16u32, 1024, 8192] {
        group.bench_function(BenchmarkId::new("buckets", buckets), |b| {
            b.iter_batched(
                || build_index(buckets),
                |index| {
                    for id in 0..CELLS {
                        let lease = index.lock_for_add(black_box(id), 64, 0).unwrap();
                        black_box(lease.size());
                    }
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_load_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("cell_index/load_hit");
    group.throughput(Throughput::Elements(CELLS));

    for size in [16usize, 256, 4096] {
        let index = populated_index(8192, size);
        group.bench_function(BenchmarkId::new("cell_size", size), |b| {
            b.iter(|| {
                for id in 0..CELLS {
                    let lease = index.lock_for_load(black_box(id)).unwrap();
                    black_box(lease.as_slice()[0]);
                }
            })
        });
    }

    group.finish();
}

fn bench_save_same_size(c: &mut Criterion) {
    let index = populated_index(8192, 128);
    let mut group = c.benchmark_group("cell_index/save_existing");
    group.throughput(Throughput::Elements(CELLS));

    group.bench_function("same_size", |b| {
        b.iter(|| {
            for id in 0..CELLS {
                let mut lease = index.lock_for_save(black_box(id), 128, 0).unwrap();
                lease.as_mut_slice()[0] = 1;
            }
        })
    });

    group.finish();
}

fn bench_save_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("cell_index/save_growth");
    group.sampling_mode(SamplingMode::Flat);
    group.throughput(Throughput::Elements(CELLS));

    group.bench_function("double_inline", |b| {
        b.iter_batched(
            || populated_index(8192, 64),
            |index| {
                for id in 0..CELLS {
                    let lease = index.lock_for_save(black_box(id), 128, 0).unwrap();
                    black_box(lease.as_slice()[0]);
                }
            },
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

fn bench_add_or_use_mixed(c: &mut Criterion) {
    let index = populated_index(1024, 32);
    let mut group = c.benchmark_group("cell_index/add_or_use");
    group.throughput(Throughput::Elements(CELLS));

    group.bench_function("all_found", |b| {
        b.iter(|| {
            for id in 0..CELLS {
                let outcome = index.lock_for_add_or_use(black_box(id), 32, 0).unwrap();
                black_box(outcome.was_found());
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_add,
    bench_load_hit,
    bench_save_same_size,
    bench_save_growth,
    bench_add_or_use_mixed
);
criterion_main!(benches);
