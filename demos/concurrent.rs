//! Concurrent access example for rowcache.
//!
//! Run with: cargo run --example concurrent

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use rowcache::{CacheOptions, DatabaseCacheState, TableSchema, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> rowcache::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let dept_emp = TableSchema::builder("dept_emp")
        .indexed_column("emp_no")
        .indexed_column("dept_no")
        .column("from_date")
        .primary_key(["emp_no", "dept_no"])
        .build()?;
    let cache = DatabaseCacheState::new([dept_emp], CacheOptions::default())?;

    let num_threads = 8;
    let rows_per_thread = 10_000;
    let start = Instant::now();

    // Every thread materializes the same rows, as concurrent queries would
    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..rows_per_thread {
                    let row = vec![
                        Value::from(10001 + i / 4),
                        Value::from(format!("d{:03}", i % 4 + 1)),
                        Value::from("1990-01-01"),
                    ];
                    if let Err(e) = cache.upsert("dept_emp", row) {
                        eprintln!("thread {} failed: {}", t, e);
                        return;
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("writer thread panicked");
    }

    let elapsed = start.elapsed();
    let table = cache.table("dept_emp")?;
    println!(
        "{} upserts from {} threads in {:?}",
        num_threads * rows_per_thread,
        num_threads,
        elapsed
    );
    println!("Distinct rows cached: {}", table.row_count());

    let in_d001 = cache.lookup("dept_emp", "dept_no", &Value::from("d001"))?;
    println!("Rows in d001: {}", in_d001.len());

    println!("{}", cache.to_prometheus());
    Ok(())
}
