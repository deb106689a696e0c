//! # rowcache
//!
//! An in-process row cache for a database access layer.
//!
//! ## Features
//!
//! - **Stable row identity**: repeated reads of a cached key return the same
//!   `Arc<RowSlot>`
//! - **Secondary indices**: value lookups on indexed columns
//! - **Weak subscribers**: dependent components are told when a table's
//!   cached rows change, without being kept alive by the cache
//! - **Limits**: row-count, byte and age limits per table, enforced on write
//!   and by a background sweeper
//! - **Transaction views**: private read-through overlays merged on commit
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rowcache::{CacheOptions, DatabaseCacheState, Key, TableSchema, Value};
//!
//! let employees = TableSchema::builder("employees")
//!     .column("emp_no")
//!     .indexed_column("last_name")
//!     .primary_key(["emp_no"])
//!     .build()?;
//! let cache = DatabaseCacheState::new([employees], CacheOptions::default())?;
//!
//! cache.upsert("employees", vec![Value::from(10001i32), Value::from("Facello")])?;
//! let row = cache.get("employees", &Key::from(10001i32))?;
//! let keys = cache.lookup("employees", "last_name", &Value::from("Facello"))?;
//!
//! let txn = cache.begin_transaction();
//! txn.upsert("employees", vec![Value::from(10002i32), Value::from("Simmel")])?;
//! txn.commit()?;
//! ```

// Public modules
pub mod clock;
pub mod error;
pub mod key;
pub mod notify;
pub mod options;
pub mod query;
pub mod schema;
pub mod value;

// Cache modules
mod database;
mod metrics;
mod table;
mod transaction;

// Re-export main types for convenience
pub use clock::{Clock, ManualClock, MonotonicClock, Tick, TICKS_PER_SECOND};
pub use error::{Error, Result};
pub use key::{Key, KeyFactory};
pub use notify::{
    CacheNotificationManager, CacheSubscriber, Invalidation, InvalidationReason, NotifyReport,
};
pub use options::{CacheLimits, CacheOptions, OptionsBuilder};
pub use query::{CacheProbe, Predicate, Resolution};
pub use schema::{ColumnDef, TableSchema, TableSchemaBuilder};
pub use value::Value;

// Cache state
pub use database::{CacheSweeper, DatabaseCacheState, Snapshot, SweepReport};
pub use table::{RowSlot, TableCache};

// Metrics
pub use metrics::{CacheMetrics, Counter, MetricsSummary};

// Transactions
pub use transaction::{TransactionId, TransactionRowView, TransactionState};
