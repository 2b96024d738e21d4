//! State Store Benchmarks - Per-Cycle Hot Path
//!
//! Benchmarks the work done under the state write lock on every cycle
//! and the cache validation done at cold start.
//!
//! Run with: cargo bench --bench state_bench

use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use price_relay::domain::snapshot::{AssetTick, Generation, Generations, Snapshot};
use price_relay::domain::state::StateStore;
use price_relay::domain::validity::{self, AgeLimit};

const NOW: i64 = 1_700_000_000_000;

fn pairs() -> Vec<String> {
    ["eur", "usd", "gbp", "jpy"].map(String::from).to_vec()
}

fn assets() -> Vec<String> {
    (0..50).map(|i| format!("A{i:02}")).collect()
}

/// Every other asset failed.
fn batch(assets: &[String]) -> Snapshot {
    let ticks = assets
        .iter()
        .enumerate()
        .map(|(i, symbol)| AssetTick {
            symbol: symbol.clone(),
            timestamp: NOW,
            last: (i % 2 == 0).then_some(100.0 + i as f64),
            success: i % 2 == 0,
        })
        .collect();
    Snapshot::from_ticks(ticks, NOW)
}

fn filled_store() -> StateStore {
    let (pairs, assets) = (pairs(), assets());
    let mut store = StateStore::from_template(&pairs, &assets);
    let full = Snapshot::from_ticks(
        assets
            .iter()
            .map(|symbol| AssetTick {
                symbol: symbol.clone(),
                timestamp: NOW,
                last: Some(1.0),
                success: true,
            })
            .collect(),
        NOW,
    );
    for pair in &pairs {
        let _ = store.merge(Generation::Current, pair, &full, false);
    }
    store
}

/// Benchmark the shuffle of current into previous.
fn bench_shuffle(c: &mut Criterion) {
    let mut store = filled_store();

    c.bench_function("shuffle_4x50", |b| {
        b.iter(|| {
            let _ = store.shuffle(black_box(Generation::Current), black_box(Generation::Previous));
        });
    });
}

/// Benchmark a granular merge of a half-failed batch.
fn bench_granular_merge(c: &mut Criterion) {
    let mut store = filled_store();
    let incoming = batch(&assets());

    c.bench_function("granular_merge_50", |b| {
        b.iter(|| {
            let _summary = store.merge(Generation::Current, "eur", black_box(&incoming), true);
        });
    });
}

/// Benchmark cold-start validation and consolidation of a full cache.
fn bench_validate_cache(c: &mut Criterion) {
    let store = filled_store();
    let mut cache: Generations = store.export_all();
    cache.previous = cache.current.clone();
    let limit = AgeLimit {
        minutes: 5,
        ..AgeLimit::default()
    };
    let assets = assets();

    c.bench_function("validate_consolidate_4_pairs", |b| {
        b.iter(|| {
            let reports: BTreeMap<String, _> = pairs()
                .into_iter()
                .map(|pair| {
                    let report = validity::validate(black_box(&cache), &pair, &assets, &limit, NOW);
                    (pair, report)
                })
                .collect();
            let _ = validity::consolidate(&reports);
        });
    });
}

criterion_group!(
    benches,
    bench_shuffle,
    bench_granular_merge,
    bench_validate_cache,
);
criterion_main!(benches);
