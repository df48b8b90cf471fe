//! Benchmarks for cache operations
//!
//! This benchmark measures:
//! - Request fingerprinting over nested parameters
//! - TTL-LRU get/set on a warm cache
//! - Insert throughput when every insert evicts

use api_resilience::{CacheKey, CacheKeyGenerator, TtlLruCache};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(300);

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    let keys = CacheKeyGenerator::new();

    let flat = json!({"query": "rust async", "limit": 25, "sort": "new"});
    let nested = json!({
        "url": "https://example.com/r/rust/comments/abc123",
        "options": {"depth": 3, "sort": "top", "filters": {"nsfw": false, "min_score": 10}},
        "fields": ["title", "author", "score", "comments"]
    });

    group.bench_function("flat_params", |b| {
        b.iter(|| keys.generate(black_box("search"), black_box(&flat)))
    });
    group.bench_function("nested_params", |b| {
        b.iter(|| keys.generate(black_box("thread"), black_box(&nested)))
    });

    group.finish();
}

fn bench_get_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("ttl_lru");

    for capacity in [50usize, 200, 1000] {
        let cache: TtlLruCache<CacheKey, u64> = TtlLruCache::new(capacity);
        let keys: Vec<CacheKey> = (0..capacity).map(|i| CacheKey::new(format!("k{i}"))).collect();
        for (i, k) in keys.iter().enumerate() {
            cache.set(k.clone(), i as u64, TTL);
        }

        group.throughput(Throughput::Elements(keys.len() as u64));
        group.bench_with_input(BenchmarkId::new("get_hit", capacity), &keys, |b, keys| {
            b.iter(|| {
                for k in keys {
                    black_box(cache.get(k));
                }
            })
        });

        let missing = CacheKey::new("absent");
        group.bench_with_input(BenchmarkId::new("get_miss", capacity), &missing, |b, k| {
            b.iter(|| black_box(cache.get(k)))
        });
    }

    group.finish();
}

fn bench_evicting_inserts(c: &mut Criterion) {
    let mut group = c.benchmark_group("evicting_inserts");
    let cache: TtlLruCache<u64, u64> = TtlLruCache::new(100);
    let mut next = 0u64;

    group.throughput(Throughput::Elements(1));
    group.bench_function("set_past_capacity", |b| {
        b.iter(|| {
            next += 1;
            cache.set(black_box(next), next, TTL);
        })
    });

    group.finish();
}

criterion_group!(benches, bench_fingerprint, bench_get_set, bench_evicting_inserts);
criterion_main!(benches);
