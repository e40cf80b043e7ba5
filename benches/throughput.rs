//! Throughput Benchmark for FlashKV
//!
//! Measures the store and the dispatcher under various workloads.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use flashkv_core::commands::{Command, Dispatcher};
use flashkv_core::config::EngineConfig;
use flashkv_core::storage::{now_ms, EvictionConfig, EvictionPolicy, Store, Value};

fn populated(n: usize) -> Store {
    let mut store = Store::default();
    for i in 0..n {
        store
            .set(
                Bytes::from(format!("key:{}", i)),
                Value::string(format!("value:{}", i)),
                None,
            )
            .unwrap();
    }
    while store.rehash_step(1000) {}
    store
}

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    for (name, size) in [("set_small", 11), ("set_medium", 1024), ("set_large", 64 * 1024)] {
        let mut store = Store::default();
        let value = Bytes::from("x".repeat(size));
        group.bench_function(name, |b| {
            let mut i = 0u64;
            b.iter(|| {
                let key = Bytes::from(format!("key:{}", i % 100_000));
                store.set(key, Value::string(value.clone()), None).unwrap();
                i += 1;
            });
        });
    }

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let mut store = populated(100_000);

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(store.get(key.as_bytes()));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(store.get(key.as_bytes()));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark mixed workload (80% reads, 20% writes) through the dispatcher
fn bench_mixed(c: &mut Criterion) {
    let mut store = populated(10_000);
    let mut dispatcher = Dispatcher::new();

    let mut group = c.benchmark_group("mixed");
    group.throughput(Throughput::Elements(1));

    group.bench_function("80_read_20_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let command = if i % 5 == 0 {
                Command::new("set", vec![Bytes::from(format!("new:{}", i)), Bytes::from("value")])
            } else {
                Command::new("get", vec![Bytes::from(format!("key:{}", i % 10_000))])
            };
            black_box(dispatcher.execute(&mut store, &command).unwrap());
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark INCR operations
fn bench_incr(c: &mut Criterion) {
    let mut store = Store::default();
    let mut dispatcher = Dispatcher::new();

    let mut group = c.benchmark_group("incr");
    group.throughput(Throughput::Elements(1));

    group.bench_function("single_counter", |b| {
        let command = Command::new("incr", vec![Bytes::from("counter")]);
        b.iter(|| {
            black_box(dispatcher.execute(&mut store, &command).unwrap());
        });
    });

    group.bench_function("multiple_counters", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let command = Command::new("incr", vec![Bytes::from(format!("counter:{}", i % 1000))]);
            black_box(dispatcher.execute(&mut store, &command).unwrap());
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark writes that have to evict to stay under the memory ceiling
fn bench_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction");
    group.throughput(Throughput::Elements(1));

    for policy in [
        EvictionPolicy::AllkeysLru,
        EvictionPolicy::AllkeysLfu,
        EvictionPolicy::AllkeysRandom,
    ] {
        let config = EngineConfig {
            memory: EvictionConfig {
                max_bytes: 1 << 20,
                policy,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut store = Store::new(0, &config);
        group.bench_function(policy.as_str(), |b| {
            let mut i = 0u64;
            b.iter(|| {
                let key = Bytes::from(format!("key:{}", i));
                store.set(key, Value::string("x".repeat(100)), None).unwrap();
                i += 1;
            });
        });
    }

    group.finish();
}

/// Benchmark expiry operations
fn bench_expiry(c: &mut Criterion) {
    let mut store = populated(10_000);

    let mut group = c.benchmark_group("expiry");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_with_ttl", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("ttl:{}", i % 100_000));
            store
                .set(key, Value::string("value"), Some(now_ms() + 3_600_000))
                .unwrap();
            i += 1;
        });
    });

    group.bench_function("expire_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 10_000);
            store.expire_at(key.as_bytes(), now_ms() + 3_600_000);
            i += 1;
        });
    });

    group.bench_function("active_expire_step", |b| {
        b.iter(|| black_box(store.active_expire_step()));
    });

    group.finish();
}

/// Benchmark KEYS pattern matching
fn bench_keys(c: &mut Criterion) {
    let mut store = Store::default();
    for i in 0..1_000 {
        for (prefix, data) in [("user", "user_data"), ("session", "session_data"), ("cache", "cache_data")] {
            store
                .set(Bytes::from(format!("{}:{}", prefix, i)), Value::string(data), None)
                .unwrap();
        }
    }

    let mut group = c.benchmark_group("keys");

    group.bench_function("keys_pattern", |b| {
        b.iter(|| black_box(store.keys(b"user:*")));
    });

    group.bench_function("keys_all", |b| {
        b.iter(|| black_box(store.keys(b"*")));
    });

    group.bench_function("scan_full", |b| {
        b.iter(|| {
            let mut cursor = 0;
            loop {
                let (next, keys) = store.scan(cursor, 100, None);
                black_box(keys);
                if next == 0 {
                    break;
                }
                cursor = next;
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_mixed,
    bench_incr,
    bench_eviction,
    bench_expiry,
    bench_keys,
);

criterion_main!(benches);
