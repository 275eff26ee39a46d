//! Benchmark for serde support.
//!
//! Compares JSON serialization of persistent collections against the
//! standard library equivalents.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::collections::{HashMap, HashSet};
use std::hint::black_box;
use trie_collections::persistent::{PersistentHashMap, PersistentHashSet};

// =============================================================================
// PersistentHashMap Benchmarks
// =============================================================================

fn benchmark_hashmap_serialize(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("hashmap_serialize");

    for size in [100, 1_000, 10_000] {
        let persistent: PersistentHashMap<String, i32> =
            (0..size).map(|i| (format!("key_{i}"), i)).collect();
        let standard: HashMap<String, i32> = (0..size).map(|i| (format!("key_{i}"), i)).collect();

        group.bench_with_input(
            BenchmarkId::new("PersistentHashMap", size),
            &size,
            |bencher, _| {
                bencher.iter(|| black_box(serde_json::to_string(&persistent).unwrap()));
            },
        );

        group.bench_with_input(BenchmarkId::new("HashMap", size), &size, |bencher, _| {
            bencher.iter(|| black_box(serde_json::to_string(&standard).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_hashmap_deserialize(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("hashmap_deserialize");

    for size in [100, 1_000, 10_000] {
        let standard: HashMap<String, i32> = (0..size).map(|i| (format!("key_{i}"), i)).collect();
        let json = serde_json::to_string(&standard).unwrap();

        group.bench_with_input(
            BenchmarkId::new("PersistentHashMap", size),
            &json,
            |bencher, json| {
                bencher.iter(|| {
                    let map: PersistentHashMap<String, i32> =
                        serde_json::from_str(black_box(json)).unwrap();
                    black_box(map)
                });
            },
        );

        group.bench_with_input(BenchmarkId::new("HashMap", size), &json, |bencher, json| {
            bencher.iter(|| {
                let map: HashMap<String, i32> = serde_json::from_str(black_box(json)).unwrap();
                black_box(map)
            });
        });
    }

    group.finish();
}

// =============================================================================
// PersistentHashSet Benchmarks
// =============================================================================

fn benchmark_hashset_roundtrip(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("hashset_roundtrip");

    for size in [100, 1_000, 10_000] {
        let persistent: PersistentHashSet<i32> = (0..size).collect();
        let standard: HashSet<i32> = (0..size).collect();

        group.bench_with_input(
            BenchmarkId::new("PersistentHashSet", size),
            &size,
            |bencher, _| {
                bencher.iter(|| {
                    let json = serde_json::to_string(&persistent).unwrap();
                    let set: PersistentHashSet<i32> = serde_json::from_str(&json).unwrap();
                    black_box(set)
                });
            },
        );

        group.bench_with_input(BenchmarkId::new("HashSet", size), &size, |bencher, _| {
            bencher.iter(|| {
                let json = serde_json::to_string(&standard).unwrap();
                let set: HashSet<i32> = serde_json::from_str(&json).unwrap();
                black_box(set)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_hashmap_serialize,
    benchmark_hashmap_deserialize,
    benchmark_hashset_roundtrip
);

criterion_main!(benches);
