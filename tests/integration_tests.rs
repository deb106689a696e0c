//! Integration tests for complete cache workflows.

use bytes::Bytes;
use rowcache::{
    CacheLimits, CacheProbe, CacheSubscriber, Clock, DatabaseCacheState, Error, Invalidation,
    InvalidationReason, Key, KeyFactory, ManualClock, OptionsBuilder, Predicate, Result,
    TableSchema, Tick, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn employees_schema() -> TableSchema {
    TableSchema::builder("employees")
        .column("emp_no")
        .column("birth_date")
        .column("first_name")
        .indexed_column("last_name")
        .column("gender")
        .column("hire_date")
        .primary_key(["emp_no"])
        .build()
        .unwrap()
}

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

fn employee(emp_no: i32, first: &str, last: &str) -> Vec<Value> {
    vec![
        Value::from(emp_no),
        Value::from("1953-09-02"),
        Value::from(first),
        Value::from(last),
        Value::enumeration("gender", 1u8),
        Value::from("1986-06-26"),
    ]
}

fn salary(emp_no: i32, amount: i32, from: &str) -> Vec<Value> {
    vec![
        Value::from(emp_no),
        Value::from(amount),
        Value::from(from),
        Value::from("9999-01-01"),
    ]
}

fn cache_with_clock(clock: &Arc<ManualClock>) -> Arc<DatabaseCacheState> {
    let options = OptionsBuilder::new().no_sweeper().build().unwrap();
    DatabaseCacheState::with_clock(
        [employees_schema(), salaries_schema()],
        options,
        Arc::clone(clock) as Arc<dyn Clock>,
    )
    .unwrap()
}

#[derive(Default)]
struct CountingSubscriber {
    calls: AtomicUsize,
}

impl CacheSubscriber for CountingSubscriber {
    fn invalidate(&self, _event: &Invalidation) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Test repeated reads return the same row instance.
#[test]
fn integration_read_identity() {
    let clock = Arc::new(ManualClock::new(Tick(1)));
    let cache = cache_with_clock(&clock);
    cache
        .upsert("employees", employee(10001, "Georgi", "Facello"))
        .unwrap();

    let key = Key::from(10001i32);
    let first = cache.get("employees", &key).unwrap().unwrap();
    for _ in 0..10 {
        let again = cache.get("employees", &key).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }

    // A new upsert installs a new instance.
    cache
        .upsert("employees", employee(10001, "Georgi", "Facello"))
        .unwrap();
    let replaced = cache.get("employees", &key).unwrap().unwrap();
    assert!(!Arc::ptr_eq(&first, &replaced));
}

/// Test composite key equality through the factory.
#[test]
fn integration_composite_keys() {
    let a = KeyFactory::from_values(&[Value::from(1i32), Value::from("a")]).unwrap();
    let b = KeyFactory::from_values(&[Value::from(1i32), Value::from("a")]).unwrap();
    let swapped = KeyFactory::from_values(&[Value::from("a"), Value::from(1i32)]).unwrap();
    let other = KeyFactory::from_values(&[Value::from(2i32), Value::from("b")]).unwrap();

    assert_eq!(a, b);
    assert_ne!(a, swapped);
    assert_ne!(a, other);

    // A single value never produces a composite.
    let single = KeyFactory::from_values(&[Value::from(7i32)]).unwrap();
    assert_eq!(single, Key::from(7i32));
    assert!(matches!(KeyFactory::from_values(&[]), Err(Error::EmptyKey)));
}

/// Test byte keys compare by content.
#[test]
fn integration_byte_keys() {
    let schema = TableSchema::builder("blobs")
        .column("digest")
        .column("payload")
        .primary_key(["digest"])
        .build()
        .unwrap();
    let cache = DatabaseCacheState::new([schema], Default::default()).unwrap();

    let digest = vec![0xdeu8, 0xad, 0xbe, 0xef];
    cache
        .upsert(
            "blobs",
            vec![Value::from(digest.clone()), Value::from("payload")],
        )
        .unwrap();

    // A different buffer with the same bytes finds the row.
    let copied = Key::from(Bytes::from(digest));
    assert!(cache.get("blobs", &copied).unwrap().is_some());
    assert!(cache
        .get("blobs", &Key::from(vec![0xdeu8, 0xad, 0xbe, 0xee]))
        .unwrap()
        .is_none());
}

/// Test enum values are keyed by their underlying integer.
#[test]
fn integration_enum_keys() {
    let by_enum = KeyFactory::from_value(&Value::enumeration("gender", 1u8)).unwrap();
    assert_eq!(by_enum, Key::from(1u8));
    assert!(KeyFactory::from_value(&Value::Null).is_err());
}

/// Test index lookup over sixteen rows sharing one value.
#[test]
fn integration_index_lookup_emp_10004() {
    let clock = Arc::new(ManualClock::new(Tick(1)));
    let cache = cache_with_clock(&clock);

    for i in 0..16 {
        clock.advance(1);
        let from = format!("{}-06-26", 1986 + i);
        cache
            .upsert("salaries", salary(10004, 40054 + i * 1000, &from))
            .unwrap();
    }
    cache
        .upsert("salaries", salary(10005, 78228, "1989-09-12"))
        .unwrap();

    for _ in 0..100 {
        let keys = cache
            .lookup("salaries", "emp_no", &Value::from(10004i32))
            .unwrap();
        assert_eq!(keys.len(), 16);
        for key in &keys {
            assert!(cache.get("salaries", key).unwrap().is_some());
        }
    }

    let table = cache.table("salaries").unwrap();
    assert_eq!(table.row_count(), 17);
    let snapshot = cache.make_snapshot();
    let salaries = snapshot.iter().find(|s| &*s.table == "salaries").unwrap();
    assert_eq!(salaries.row_count, 17);
    assert_eq!(salaries.total_bytes, table.byte_estimate());
}

/// Test tick-based eviction.
#[test]
fn integration_remove_rows_before_tick() {
    let clock = Arc::new(ManualClock::new(Tick(100)));
    let cache = cache_with_clock(&clock);
    let subscriber = Arc::new(CountingSubscriber::default());
    cache.subscribe("employees", &subscriber).unwrap();

    cache
        .upsert("employees", employee(1, "a", "x"))
        .unwrap();
    cache
        .upsert("employees", employee(2, "b", "x"))
        .unwrap();
    clock.set(Tick(200));
    cache
        .upsert("employees", employee(3, "c", "y"))
        .unwrap();
    clock.set(Tick(300));
    cache
        .upsert("employees", employee(4, "d", "y"))
        .unwrap();

    let removed = cache.remove_rows_inserted_before_tick(Tick(200));
    assert_eq!(removed, vec![(Arc::<str>::from("employees"), 2)]);
    assert_eq!(cache.table("employees").unwrap().row_count(), 2);
    assert_eq!(subscriber.calls.load(Ordering::SeqCst), 1);

    assert!(cache.remove_rows_inserted_before_tick(Tick(200)).is_empty());
    assert!(cache.remove_rows_inserted_before_tick(Tick(150)).is_empty());
    assert_eq!(cache.table("employees").unwrap().row_count(), 2);
    assert_eq!(subscriber.calls.load(Ordering::SeqCst), 1);

    // Evicted rows are gone from the index too.
    let keys = cache
        .lookup("employees", "last_name", &Value::from("x"))
        .unwrap();
    assert!(keys.is_empty());
}

/// Test dropped subscribers are never invoked.
#[test]
fn integration_weak_subscribers() {
    let clock = Arc::new(ManualClock::new(Tick(1)));
    let cache = cache_with_clock(&clock);
    let kept = Arc::new(CountingSubscriber::default());
    let dropped = Arc::new(CountingSubscriber::default());
    cache.subscribe("employees", &kept).unwrap();
    cache.subscribe("employees", &dropped).unwrap();
    drop(dropped);

    cache.clear_cache();
    assert_eq!(kept.calls.load(Ordering::SeqCst), 1);

    let manager = cache.table("employees").unwrap().notifications();
    assert_eq!(manager.clean(), 0);
    assert_eq!(manager.len(), 1);
}

/// Test transactions see private, stable rows.
#[test]
fn integration_transaction_isolation() {
    let clock = Arc::new(ManualClock::new(Tick(1)));
    let cache = cache_with_clock(&clock);
    cache
        .upsert("employees", employee(10001, "Georgi", "Facello"))
        .unwrap();
    let key = Key::from(10001i32);

    let txn1 = cache.begin_transaction();
    let txn2 = cache.begin_transaction();

    let a1 = txn1.get("employees", &key).unwrap().unwrap();
    let b1 = txn2.get("employees", &key).unwrap().unwrap();
    assert!(!Arc::ptr_eq(&a1, &b1));

    for _ in 0..5 {
        let a = txn1.get("employees", &key).unwrap().unwrap();
        let b = txn2.get("employees", &key).unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &a1));
        assert!(Arc::ptr_eq(&b, &b1));
    }

    txn1.upsert("employees", employee(10001, "Georgi", "Renamed"))
        .unwrap();
    txn1.commit().unwrap();

    // txn2 keeps its own copy until it ends.
    let b = txn2.get("employees", &key).unwrap().unwrap();
    assert!(Arc::ptr_eq(&b, &b1));
    assert_eq!(b.value(3), Some(&Value::from("Facello")));
    txn2.rollback().unwrap();

    let shared = cache.get("employees", &key).unwrap().unwrap();
    assert_eq!(shared.value(3), Some(&Value::from("Renamed")));
}

/// Test commit notifies only the tables it wrote.
#[test]
fn integration_commit_notifications() {
    let clock = Arc::new(ManualClock::new(Tick(1)));
    let cache = cache_with_clock(&clock);
    let employees = Arc::new(CountingSubscriber::default());
    let salaries = Arc::new(CountingSubscriber::default());
    cache.subscribe("employees", &employees).unwrap();
    cache.subscribe("salaries", &salaries).unwrap();
    cache
        .upsert("employees", employee(10001, "Georgi", "Facello"))
        .unwrap();

    let txn = cache.begin_transaction();
    txn.get("employees", &Key::from(10001i32)).unwrap();
    txn.upsert("salaries", salary(10001, 60117, "1986-06-26"))
        .unwrap();
    txn.commit().unwrap();

    assert_eq!(employees.calls.load(Ordering::SeqCst), 0);
    assert_eq!(salaries.calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.metrics().txn_commit.get(), 1);
}

/// Test limits resolved per table.
#[test]
fn integration_per_table_limits() {
    let clock = Arc::new(ManualClock::new(Tick(1)));
    let options = OptionsBuilder::new()
        .default_limits(CacheLimits::unbounded().max_rows(100))
        .table_limits("salaries", CacheLimits::unbounded().max_rows(5))
        .eviction_headroom_percent(0)
        .no_sweeper()
        .build()
        .unwrap();
    let cache = DatabaseCacheState::with_clock(
        [employees_schema(), salaries_schema()],
        options,
        Arc::clone(&clock) as Arc<dyn Clock>,
    )
    .unwrap();

    for i in 0..20 {
        clock.advance(1);
        cache
            .upsert("employees", employee(i, "n", "l"))
            .unwrap();
        cache
            .upsert("salaries", salary(i, 1000, "1990-01-01"))
            .unwrap();
    }

    assert_eq!(cache.table("employees").unwrap().row_count(), 20);
    assert_eq!(cache.table("salaries").unwrap().row_count(), 5);
    assert_eq!(cache.table("salaries").unwrap().limits().max_rows, Some(5));
}

/// Test predicate probes against cached rows.
#[test]
fn integration_find_by_predicate() {
    let clock = Arc::new(ManualClock::new(Tick(1)));
    let cache = cache_with_clock(&clock);
    cache
        .upsert("salaries", salary(10001, 60117, "1986-06-26"))
        .unwrap();
    cache
        .upsert("salaries", salary(10001, 62102, "1987-06-26"))
        .unwrap();

    let by_pk = Predicate::and([
        Predicate::eq("emp_no", 10001i32),
        Predicate::eq("from_date", "1987-06-26"),
    ]);
    match cache.find("salaries", &by_pk).unwrap() {
        CacheProbe::Hit(row) => assert_eq!(row.value(1), Some(&Value::from(62102i32))),
        other => panic!("expected a hit, got {:?}", other),
    }

    match cache
        .find("salaries", &Predicate::eq("emp_no", 10001i32))
        .unwrap()
    {
        CacheProbe::Related(rows) => assert_eq!(rows.len(), 2),
        other => panic!("expected related rows, got {:?}", other),
    }

    let ranged = Predicate::and([Predicate::eq("emp_no", 10001i32), Predicate::Opaque]);
    assert!(matches!(
        cache.find("salaries", &ranged).unwrap(),
        CacheProbe::Unresolved
    ));
}

/// Test invalidation reasons delivered in order.
#[test]
fn integration_invalidation_reasons() {
    struct Log(parking_lot::Mutex<Vec<InvalidationReason>>);

    impl CacheSubscriber for Log {
        fn invalidate(&self, event: &Invalidation) -> Result<()> {
            assert_eq!(&*event.table, "employees");
            self.0.lock().push(event.reason);
            Ok(())
        }
    }

    let clock = Arc::new(ManualClock::new(Tick(1)));
    let cache = cache_with_clock(&clock);
    let log = Arc::new(Log(parking_lot::Mutex::new(Vec::new())));
    cache.subscribe("employees", &log).unwrap();

    cache
        .upsert("employees", employee(1, "a", "b"))
        .unwrap();
    cache.invalidate("employees", &Key::from(1i32)).unwrap();
    cache
        .upsert("employees", employee(2, "a", "b"))
        .unwrap();
    clock.advance(10);
    cache.remove_rows_inserted_before_tick(clock.now());
    cache.clear_cache();

    assert_eq!(
        *log.0.lock(),
        vec![
            InvalidationReason::Removed,
            InvalidationReason::Evicted,
            InvalidationReason::Cleared,
        ]
    );
}
