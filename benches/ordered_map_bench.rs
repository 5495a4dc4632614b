//! Benchmark for `PersistentOrderedMap` vs standard `BTreeMap`.
//!
//! Compares persimmon's persistent ordered map against Rust's standard
//! `BTreeMap` for common operations.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use persimmon::persistent::PersistentOrderedMap;
use std::collections::BTreeMap;
use std::hint::black_box;

// =============================================================================
// insert Benchmark
// =============================================================================

fn benchmark_insert(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("insert");

    for size in [100, 1000, 10000] {
        // PersistentOrderedMap insert
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
// get Benchmark
// =============================================================================

fn benchmark_get(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("get");

    for size in [100, 1000, 10000] {
        let persistent_map: PersistentOrderedMap<i32, i32> =
            (0..size).map(|key| (key, key * 2)).collect();
        let standard_map: BTreeMap<i32, i32> = (0..size).map(|key| (key, key * 2)).collect();

        group.bench_with_input(
            BenchmarkId::new("PersistentOrderedMap", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    for key in 0..size {
                        black_box(persistent_map.get(black_box(&key)));
                    }
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("BTreeMap", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    for key in 0..size {
                        black_box(standard_map.get(black_box(&key)));
                    }
                });
            },
        );
    }

    group.finish();
}

// =============================================================================
// remove Benchmark
// =============================================================================

fn benchmark_remove(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("remove");

    for size in [100, 1000, 10000] {
        let persistent_map: PersistentOrderedMap<i32, i32> =
            (0..size).map(|key| (key, key)).collect();

        group.bench_with_input(
            BenchmarkId::new("PersistentOrderedMap", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    let mut map = persistent_map.clone();
                    for key in 0..size {
                        map = map.remove(black_box(&key));
                    }
                    black_box(map)
                });
            },
        );
    }

    group.finish();
}

// =============================================================================
// iterate Benchmark
// =============================================================================

fn benchmark_iterate(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("iterate");

    for size in [100, 1000, 10000] {
        let persistent_map: PersistentOrderedMap<i32, i32> =
            (0..size).map(|key| (key, key)).collect();
        let standard_map: BTreeMap<i32, i32> = (0..size).map(|key| (key, key)).collect();

        group.bench_with_input(
            BenchmarkId::new("PersistentOrderedMap", size),
            &size,
            |bencher, _| {
                bencher.iter(|| {
                    let sum: i64 = persistent_map.values().map(|value| i64::from(*value)).sum();
                    black_box(sum)
                });
            },
        );

        group.bench_with_input(BenchmarkId::new("BTreeMap", size), &size, |bencher, _| {
            bencher.iter(|| {
                let sum: i64 = standard_map.values().map(|value| i64::from(*value)).sum();
                black_box(sum)
            });
        });
    }

    group.finish();
}

// =============================================================================
// bulk build Benchmark
// =============================================================================

fn benchmark_bulk_build(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("bulk_build");

    for size in [1000, 10000] {
        group.bench_with_input(
            BenchmarkId::new("from_sorted_iter", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    black_box(PersistentOrderedMap::<i32, i32>::from_sorted_iter(
                        (0..size).map(|key| (key, key)),
                    ))
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("collect", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    black_box(
                        (0..size)
                            .map(|key| (key, key))
                            .collect::<PersistentOrderedMap<i32, i32>>(),
                    )
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_insert,
    benchmark_get,
    benchmark_remove,
    benchmark_iterate,
    benchmark_bulk_build
);
criterion_main!(benches);
