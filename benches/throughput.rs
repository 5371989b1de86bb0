//! Throughput Benchmark for emberkv
//!
//! Measures the keyspace store under the hot command paths. The store is
//! exercised directly (the way a dispatcher worker drives it), so the
//! numbers reflect keyspace work without network or queueing overhead.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use emberkv::storage::{Db, SetFlag};

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut db = Db::new();
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i);
            db.set(&key, "small_value", SetFlag::None, 0);
            i += 1;
        });
    });

    group.bench_function("set_integer_encoded", |b| {
        let mut db = Db::new();
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i);
            let value = i.to_string();
            db.set(&key, &value, SetFlag::None, 0);
            i += 1;
        });
    });

    group.bench_function("set_medium", |b| {
        let mut db = Db::new();
        let value = "x".repeat(1024); // 1KB value
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i);
            db.set(&key, &value, SetFlag::None, 0);
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let mut db = Db::new();
    for i in 0..100_000 {
        let key = format!("key:{}", i);
        let value = format!("value:{}", i);
        db.set(&key, &value, SetFlag::None, 0);
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_hit", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(db.get(&key).unwrap());
            i += 1;
        });
    });

    group.bench_function("get_miss", |b| {
        b.iter(|| {
            black_box(db.get("missing-key").unwrap());
        });
    });

    group.finish();
}

/// Benchmark INCR operations
fn bench_incr(c: &mut Criterion) {
    let mut group = c.benchmark_group("incr");
    group.throughput(Throughput::Elements(1));

    group.bench_function("incr_single_key", |b| {
        let mut db = Db::new();
        b.iter(|| {
            black_box(db.incr("counter", 1).unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_set, bench_get, bench_incr);
criterion_main!(benches);
