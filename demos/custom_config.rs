//! Custom configuration example for rowcache.
//!
//! Run with: cargo run --example custom_config

use std::time::Duration;

use rowcache::{CacheLimits, DatabaseCacheState, OptionsBuilder, TableSchema, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> rowcache::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let salaries = TableSchema::builder("salaries")
        .indexed_column("emp_no")
        .column("salary")
        .column("from_date")
        .primary_key(["emp_no", "from_date"])
        .build()?;
    let employees = TableSchema::builder("employees")
        .column("emp_no")
        .column("last_name")
        .primary_key(["emp_no"])
        .build()?;

    // Every table: at most 4 MB and 10 minutes old.
    // Salaries: additionally at most 1000 rows.
    let options = OptionsBuilder::new()
        .default_limits(CacheLimits::unbounded().max_megabytes(4).max_age_minutes(10))
        .table_limits("salaries", CacheLimits::unbounded().max_rows(1000))
        .eviction_headroom_percent(20)
        .sweep_interval(Duration::from_millis(200))
        .build()?;

    println!("Options: {:#?}", options);
    let cache = DatabaseCacheState::new([salaries, employees], options)?;
    let sweeper = cache.start_sweeper()?;

    for i in 0..5000 {
        cache.upsert(
            "salaries",
            vec![
                Value::from(10001 + i / 10),
                Value::from(40000 + i),
                Value::from(format!("{}-01-01", 1985 + i % 10)),
            ],
        )?;
    }

    // Row limit trims to 800 (20% headroom) whenever 1000 is exceeded
    for snapshot in cache.make_snapshot() {
        println!("{}", snapshot);
    }
    println!("Evictions so far: {}", cache.metrics().evictions.get());

    std::thread::sleep(Duration::from_millis(500));
    if let Some(sweeper) = sweeper {
        println!("Sweeper passes: {}", sweeper.passes());
        sweeper.stop();
    }

    Ok(())
}
