//! Transaction example for rowcache.
//!
//! Run with: cargo run --example transactions

use std::sync::Arc;

use rowcache::{
    CacheOptions, CacheSubscriber, DatabaseCacheState, Invalidation, Key, TableSchema, Value,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Stands in for a compiled query that depends on the table.
struct CompiledQuery {
    name: &'static str,
}

impl CacheSubscriber for CompiledQuery {
    fn invalidate(&self, event: &Invalidation) -> rowcache::Result<()> {
        println!("  [{}] {} changed ({:?})", self.name, event.table, event.reason);
        Ok(())
    }
}

fn main() -> rowcache::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let titles = TableSchema::builder("titles")
        .column("emp_no")
        .column("title")
        .column("from_date")
        .primary_key(["emp_no", "from_date"])
        .build()?;
    let cache = DatabaseCacheState::new([titles], CacheOptions::default())?;

    let query = Arc::new(CompiledQuery { name: "titles_by_emp" });
    cache.subscribe("titles", &query)?;

    cache.upsert(
        "titles",
        vec![Value::from(10001i32), Value::from("Senior Engineer"), Value::from("1986-06-26")],
    )?;
    let key = Key::composite([Key::from(10001i32), Key::from("1986-06-26")]);

    // Two transactions read the same row
    println!("Reading in two transactions...");
    let txn1 = cache.begin_transaction();
    let txn2 = cache.begin_transaction();
    let in_txn1 = txn1.get("titles", &key)?.expect("row is cached");
    let in_txn2 = txn2.get("titles", &key)?.expect("row is cached");
    println!("  Distinct instances: {}", !Arc::ptr_eq(&in_txn1, &in_txn2));

    // txn1 promotes the employee and commits
    txn1.upsert(
        "titles",
        vec![Value::from(10001i32), Value::from("Staff Engineer"), Value::from("1986-06-26")],
    )?;
    println!("Committing txn1...");
    txn1.commit()?;

    // txn2 still sees its own copy
    let still = txn2.get("titles", &key)?.expect("row is in the overlay");
    println!("  txn2 sees: {}", still.values()[1]);
    txn2.rollback()?;

    let shared = cache.get("titles", &key)?.expect("row is cached");
    println!("Shared cache sees: {}", shared.values()[1]);

    // Dropping a transaction without commit rolls it back
    {
        let txn = cache.begin_transaction();
        txn.remove("titles", &key)?;
        println!("Dropping a transaction with a pending removal...");
    }
    println!("Row still cached: {}", cache.get("titles", &key)?.is_some());

    println!("{}", cache.metrics().summary());
    Ok(())
}
