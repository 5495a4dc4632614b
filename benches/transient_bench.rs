//! Benchmark for transient batch mutation.
//!
//! Compares `TransientOrderedMap` against repeated persistent inserts
//! and the standard `BTreeMap` for batch operations.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use persimmon::persistent::{PersistentOrderedMap, TransientOrderedMap};
use std::collections::BTreeMap;
use std::hint::black_box;

// =============================================================================
// Batch Insert
// =============================================================================

fn benchmark_transient_insert(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("transient_insert");

    for size in [1_000, 10_000, 100_000] {
        // TransientOrderedMap insert
        group.bench_with_input(
            BenchmarkId::new("TransientOrderedMap", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    let mut transient = TransientOrderedMap::new();
                    for index in 0..size {
                        transient.insert(black_box(index), black_box(index * 2));
                    }
                    black_box(transient.persistent())
                });
            },
        );

        // PersistentOrderedMap insert (immutable)
        group.bench_with_input(
            BenchmarkId::new("PersistentOrderedMap", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    let mut map = PersistentOrderedMap::new();
                    for index in 0..size {
                        map = map.insert(black_box(index), black_box(index * 2));
                    }
                    black_box(map)
                });
            },
        );

        // Standard BTreeMap insert
        group.bench_with_input(
            BenchmarkId::new("BTreeMap", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    let mut map = BTreeMap::new();
                    for index in 0..size {
                        map.insert(black_box(index), black_box(index * 2));
                    }
                    black_box(map)
                });
            },
        );
    }

    group.finish();
}

// =============================================================================
// Batch Remove
// =============================================================================

fn benchmark_transient_remove(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("transient_remove");

    for size in [1_000, 10_000] {
        let persistent_map: PersistentOrderedMap<i32, i32> =
            (0..size).map(|key| (key, key)).collect();

        group.bench_with_input(
            BenchmarkId::new("TransientOrderedMap", size),
            &size,
            |bencher, &size| {
                let map = persistent_map.clone();
                bencher.iter_batched(
                    || map.transient(),
                    |mut transient| {
                        for key in 0..size {
                            transient.remove(black_box(&key));
                        }
                        black_box(transient.persistent())
                    },
                    criterion::BatchSize::SmallInput,
                );
            },
        );

        group.bench_with_input(
            BenchmarkId::new("PersistentOrderedMap", size),
            &size,
            |bencher, &size| {
                let map = persistent_map.clone();
                bencher.iter(|| {
                    let mut current = map.clone();
                    for key in 0..size {
                        current = current.remove(black_box(&key));
                    }
                    black_box(current)
                });
            },
        );
    }

    group.finish();
}

// =============================================================================
// Roundtrip
// =============================================================================

fn benchmark_transient_roundtrip(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("transient_roundtrip");

    for size in [1_000, 100_000] {
        let persistent_map: PersistentOrderedMap<i32, i32> =
            (0..size).map(|key| (key, key)).collect();

        // Measure roundtrip: persistent -> transient -> persistent
        group.bench_with_input(BenchmarkId::new("roundtrip", size), &size, |bencher, _| {
            bencher.iter(|| {
                let transient = persistent_map.transient();
                black_box(transient.persistent())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_transient_insert,
    benchmark_transient_remove,
    benchmark_transient_roundtrip
);
criterion_main!(benches);
