//! Basic usage example for rowcache.
//!
//! Run with: cargo run --example basic

use rowcache::{CacheOptions, DatabaseCacheState, Key, TableSchema, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> rowcache::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Describe the cached table
    let employees = TableSchema::builder("employees")
        .column("emp_no")
        .column("first_name")
        .indexed_column("last_name")
        .primary_key(["emp_no"])
        .build()?;

    let cache = DatabaseCacheState::new([employees], CacheOptions::default())?;
    println!("Row cache created!");

    // Store some materialized rows
    for (emp_no, first, last) in [
        (10001, "Georgi", "Facello"),
        (10002, "Bezalel", "Simmel"),
        (10003, "Parto", "Bamford"),
        (10004, "Chirstian", "Koblick"),
        (10005, "Kyoichi", "Maliniak"),
        (10006, "Anneke", "Facello"),
    ] {
        cache.upsert(
            "employees",
            vec![Value::from(emp_no), Value::from(first), Value::from(last)],
        )?;
    }
    println!("Cached 6 rows");

    // Point lookups return the same row instance every time
    let key = Key::from(10001i32);
    if let Some(row) = cache.get("employees", &key)? {
        println!("{} = {:?}", key, row.values());
        let again = cache.get("employees", &key)?.expect("row is cached");
        println!("Same instance on re-read: {}", std::sync::Arc::ptr_eq(&row, &again));
    }

    // Secondary index lookup
    let facellos = cache.lookup("employees", "last_name", &Value::from("Facello"))?;
    println!("Employees named Facello: {}", facellos.len());

    // Invalidate a row
    cache.invalidate("employees", &Key::from(10003i32))?;
    match cache.get("employees", &Key::from(10003i32))? {
        Some(_) => println!("Row 10003 still cached (unexpected)"),
        None => println!("Row 10003 invalidated"),
    }

    for snapshot in cache.make_snapshot() {
        println!("{}", snapshot);
    }
    println!("{}", cache.metrics().summary());

    Ok(())
}
