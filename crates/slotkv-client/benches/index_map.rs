//! IndexMap benchmarks.
//!
//! Measures loading an index log into the map, as `KvClient::init` does,
//! and point lookups against a loaded map.
//!
//! Run with:
//! ```bash
//! cargo bench --bench index_map
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use slotkv_client::{IndexMap, parse_key};
use std::hint::black_box;

/// Keys spread like decimal benchmark keys.
fn keys(count: u64) -> Vec<u64> {
    (0..count)
        .map(|i| i.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 1)
        .collect()
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_map_load");
    for count in [10_000u64, 64_000, 256_000] {
        let keys = keys(count);
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &keys, |b, keys| {
            b.iter(|| {
                let mut map = IndexMap::with_capacity(66 * 1024);
                for (slot, key) in keys.iter().enumerate() {
                    map.put(*key, slot as u32);
                }
                black_box(map.len())
            });
        });
    }
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let keys = keys(64_000);
    let mut map = IndexMap::with_capacity(keys.len());
    for (slot, key) in keys.iter().enumerate() {
        map.put(*key, slot as u32);
    }

    let mut group = c.benchmark_group("index_map_get");
    group.throughput(Throughput::Elements(keys.len() as u64));
    group.bench_function("hit", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(map.get(*key));
            }
        });
    });
    group.bench_function("miss", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(map.get(key ^ 1));
            }
        });
    });
    group.bench_function("parse_and_get", |b| {
        let strings: Vec<String> = keys.iter().take(1000).map(ToString::to_string).collect();
        b.iter(|| {
            for s in &strings {
                black_box(map.get(parse_key(s)));
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bench_load, bench_get);
criterion_main!(benches);
