//! Benchmarks for rowcache performance.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rowcache::{
    CacheLimits, CacheOptions, DatabaseCacheState, Key, KeyFactory, OptionsBuilder, Predicate,
    TableSchema, Value,
};

fn salaries_schema() -> TableSchema {
    TableSchema::builder("salaries")
        .indexed_column("emp_no")
        .column("salary")
        .column("from_date")
        .column("to_date")
        .primary_key(["emp_no", "from_date"])
        .build()
        .unwrap()
}

fn salary(emp_no: i32, year: i32) -> Vec<Value> {
    vec![
        Value::from(emp_no),
        Value::from(60000 + year),
        Value::from(format!("{}-06-26", year)),
        Value::from("9999-01-01"),
    ]
}

/// Cache holding `rows` salary rows, 16 per employee.
fn populated(rows: i32, options: CacheOptions) -> Arc<DatabaseCacheState> {
    let cache = DatabaseCacheState::new([salaries_schema()], options).unwrap();
    for i in 0..rows {
        cache
            .upsert("salaries", salary(10001 + i / 16, 1986 + i % 16))
            .unwrap();
    }
    cache
}

/// Benchmark composite key construction.
fn bench_key_factory(c: &mut Criterion) {
    let values = [Value::from(10004i32), Value::from("1986-06-26")];
    c.bench_function("key_factory_composite", |b| {
        b.iter(|| black_box(KeyFactory::from_values(black_box(&values)).unwrap()))
    });
}

/// Benchmark upserts into an empty table.
fn bench_upsert(c: &mut Criterion) {
    let mut group = c.benchmark_group("upsert");

    for size in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_with_setup(
                || DatabaseCacheState::new([salaries_schema()], CacheOptions::default()).unwrap(),
                |cache| {
                    for i in 0..size {
                        cache
                            .upsert("salaries", salary(10001 + i / 16, 1986 + i % 16))
                            .unwrap();
                    }
                    black_box(cache)
                },
            );
        });
    }

    group.finish();
}

/// Benchmark upserts against a row limit, so every insert may evict.
fn bench_upsert_with_limit(c: &mut Criterion) {
    let options = OptionsBuilder::new()
        .default_limits(CacheLimits::unbounded().max_rows(1000))
        .no_sweeper()
        .build()
        .unwrap();
    let cache = populated(1000, options);
    let mut next = 1000;

    c.bench_function("upsert_at_row_limit", |b| {
        b.iter(|| {
            next += 1;
            cache
                .upsert("salaries", salary(10001 + next / 16, 1986 + next % 16))
                .unwrap()
        })
    });
}

/// Benchmark primary-key reads.
fn bench_get(c: &mut Criterion) {
    let cache = populated(10000, CacheOptions::default());
    let keys: Vec<Key> = (0..10000)
        .map(|i| {
            KeyFactory::from_values(&[
                Value::from(10001 + i / 16),
                Value::from(format!("{}-06-26", 1986 + i % 16)),
            ])
            .unwrap()
        })
        .collect();

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(keys.len() as u64));
    group.bench_function("10000_keys", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(cache.get("salaries", key).unwrap());
            }
        })
    });
    group.finish();
}

/// Benchmark secondary index lookups.
fn bench_lookup(c: &mut Criterion) {
    let cache = populated(10000, CacheOptions::default());
    let value = Value::from(10004i32);

    c.bench_function("lookup_emp_no", |b| {
        b.iter(|| black_box(cache.lookup("salaries", "emp_no", &value).unwrap()))
    });
}

/// Benchmark predicate resolution and probe.
fn bench_find(c: &mut Criterion) {
    let cache = populated(10000, CacheOptions::default());
    let predicate = Predicate::and([
        Predicate::eq("emp_no", 10004i32),
        Predicate::eq("from_date", "1990-06-26"),
    ]);

    c.bench_function("find_by_primary_key", |b| {
        b.iter(|| black_box(cache.find("salaries", &predicate).unwrap()))
    });
}

/// Benchmark transaction read-through and commit.
fn bench_transaction(c: &mut Criterion) {
    let cache = populated(1000, CacheOptions::default());
    let key = KeyFactory::from_values(&[Value::from(10004i32), Value::from("1990-06-26")])
        .unwrap();

    c.bench_function("txn_read_write_commit", |b| {
        b.iter(|| {
            let txn = cache.begin_transaction();
            black_box(txn.get("salaries", &key).unwrap());
            txn.upsert("salaries", salary(10004, 1990)).unwrap();
            txn.commit().unwrap();
        })
    });
}

/// Benchmark snapshots while rows are cached.
fn bench_snapshot(c: &mut Criterion) {
    let cache = populated(10000, CacheOptions::default());
    c.bench_function("make_snapshot", |b| b.iter(|| black_box(cache.make_snapshot())));
}

criterion_group!(
    benches,
    bench_key_factory,
    bench_upsert,
    bench_upsert_with_limit,
    bench_get,
    bench_lookup,
    bench_find,
    bench_transaction,
    bench_snapshot,
);

criterion_main!(benches);
