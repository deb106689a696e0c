//! Database cache state - every table's cache behind one handle.
//!
//! [`DatabaseCacheState`] is built once from the set of table schemas and
//! lives as long as the cached database. It owns:
//!
//! - One [`TableCache`] per table, with limits resolved from [`CacheOptions`]
//! - The clock that stamps rows with insertion ticks
//! - Shared [`CacheMetrics`]
//!
//! Row and byte limits are enforced right after each upsert (unless disabled
//! in the options). Age limits, and anything a disabled reactive check let
//! through, are enforced by [`DatabaseCacheState::sweep`], which the
//! background [`CacheSweeper`] runs periodically.

mod snapshot;
mod sweeper;

pub use snapshot::{Snapshot, SweepReport};
pub use sweeper::CacheSweeper;

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::{Clock, MonotonicClock, Tick};
use crate::key::Key;
use crate::metrics::CacheMetrics;
use crate::notify::{CacheSubscriber, InvalidationReason};
use crate::options::CacheOptions;
use crate::query::{self, CacheProbe, Predicate, Resolution};
use crate::schema::TableSchema;
use crate::table::{RowSlot, TableCache};
use crate::transaction::TransactionRowView;
use crate::value::Value;
use crate::{Error, Result};

/// Row caches of every table in one database.
pub struct DatabaseCacheState {
    /// Tables by name. Ordered so bulk results come out sorted.
    tables: BTreeMap<Arc<str>, Arc<TableCache>>,
    options: Arc<CacheOptions>,
    clock: Arc<dyn Clock>,
    metrics: Arc<CacheMetrics>,
    next_txn_id: AtomicU64,
}

impl DatabaseCacheState {
    /// Build the cache for `schemas` using the monotonic wall clock.
    pub fn new<I>(schemas: I, options: CacheOptions) -> Result<Arc<Self>>
    where
        I: IntoIterator<Item = TableSchema>,
    {
        Self::with_clock(schemas, options, Arc::new(MonotonicClock::new()))
    }

    /// Build the cache for `schemas` with an explicit clock.
    pub fn with_clock<I>(
        schemas: I,
        options: CacheOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>>
    where
        I: IntoIterator<Item = TableSchema>,
    {
        options.validate()?;

        let mut tables: BTreeMap<Arc<str>, Arc<TableCache>> = BTreeMap::new();
        for schema in schemas {
            let name = Arc::clone(schema.name());
            if tables.contains_key(&name) {
                return Err(Error::invalid_schema(format!(
                    "table {} is defined twice",
                    name
                )));
            }
            let limits = options.limits_for(&name);
            let cache = TableCache::new(
                Arc::new(schema),
                limits,
                options.eviction_headroom_percent,
            );
            tables.insert(name, Arc::new(cache));
        }

        if let Some(unknown) = options
            .table_limits
            .keys()
            .find(|name| !tables.contains_key(name.as_str()))
        {
            return Err(Error::InvalidConfiguration(format!(
                "limits given for unknown table {}",
                unknown
            )));
        }

        tracing::info!("Created row cache with {} tables", tables.len());

        Ok(Arc::new(Self {
            tables,
            options: Arc::new(options),
            clock,
            metrics: Arc::new(CacheMetrics::new()),
            next_txn_id: AtomicU64::new(1),
        }))
    }

    /// Get the cache of one table.
    pub fn table(&self, name: &str) -> Result<&Arc<TableCache>> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// All table caches, ordered by name.
    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableCache>> {
        self.tables.values()
    }

    /// Current tick of the cache clock.
    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    /// Get the options.
    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Get the metrics.
    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    /// Store a materialized row, replacing any row with the same primary key.
    pub fn upsert(&self, table: &str, values: Vec<Value>) -> Result<Arc<RowSlot>> {
        let cache = self.table(table)?;
        let key = cache.schema().key_for(&values)?;
        let slot = cache.upsert(key, values, self.now())?;
        self.metrics.upserts.inc();
        self.enforce_after_write(cache);
        Ok(slot)
    }

    /// Point lookup by primary key.
    pub fn get(&self, table: &str, key: &Key) -> Result<Option<Arc<RowSlot>>> {
        let row = self.table(table)?.try_get(key);
        if row.is_some() {
            self.metrics.hits.inc();
        } else {
            self.metrics.misses.inc();
        }
        Ok(row)
    }

    /// Primary keys of cached rows whose `column` equals `value`.
    pub fn lookup(&self, table: &str, column: &str, value: &Value) -> Result<HashSet<Key>> {
        let keys = self.table(table)?.lookup(column, value)?;
        self.metrics.index_lookups.inc();
        Ok(keys)
    }

    /// Drop the cached row for `key`, notifying the table if it was present.
    pub fn invalidate(&self, table: &str, key: &Key) -> Result<bool> {
        let cache = self.table(table)?;
        if cache.remove(key).is_none() {
            return Ok(false);
        }
        self.metrics.removals.inc();
        self.notify(cache, InvalidationReason::Removed);
        Ok(true)
    }

    /// Register `subscriber` for invalidations of `table`.
    pub fn subscribe<S>(&self, table: &str, subscriber: &Arc<S>) -> Result<()>
    where
        S: CacheSubscriber + 'static,
    {
        self.table(table)?.notifications().subscribe(subscriber);
        Ok(())
    }

    /// Answer `predicate` from the cache where its shape allows.
    pub fn find(&self, table: &str, predicate: &Predicate) -> Result<CacheProbe> {
        let cache = self.table(table)?;
        match query::resolve(cache.schema(), predicate) {
            Resolution::PrimaryKey(key) => Ok(match self.get(table, &key)? {
                Some(row) => CacheProbe::Hit(row),
                None => CacheProbe::Miss(key),
            }),
            Resolution::Index { column, key } => {
                let keys = cache.lookup_key(&column, &key)?;
                self.metrics.index_lookups.inc();
                let rows = keys.iter().filter_map(|k| cache.try_get(k)).collect();
                Ok(CacheProbe::Related(rows))
            }
            Resolution::Unresolved => Ok(CacheProbe::Unresolved),
        }
    }

    /// Empty every table and notify each table's subscribers.
    ///
    /// Returns the number of rows dropped.
    pub fn clear_cache(&self) -> usize {
        let mut removed = 0;
        for cache in self.tables.values() {
            removed += cache.clear();
            self.notify(cache, InvalidationReason::Cleared);
        }
        self.metrics.evictions.add(removed as u64);
        tracing::info!("Cleared row cache ({} rows)", removed);
        removed
    }

    /// Row count and byte estimate of every table, sorted by table name.
    pub fn make_snapshot(&self) -> Vec<Snapshot> {
        self.tables
            .values()
            .map(|cache| Snapshot {
                table: Arc::clone(cache.name()),
                row_count: cache.row_count(),
                total_bytes: cache.byte_estimate(),
            })
            .collect()
    }

    /// Drop rows inserted strictly before `tick` from every table.
    ///
    /// Only tables that lost rows are reported and notified.
    pub fn remove_rows_inserted_before_tick(&self, tick: Tick) -> Vec<(Arc<str>, usize)> {
        let mut affected = Vec::new();
        for cache in self.tables.values() {
            let removed = cache.remove_inserted_before(tick);
            if removed > 0 {
                self.metrics.evictions.add(removed as u64);
                self.notify(cache, InvalidationReason::Evicted);
                affected.push((Arc::clone(cache.name()), removed));
            }
        }
        affected
    }

    /// Enforce every table's limits, age included.
    pub fn sweep(&self) -> SweepReport {
        let tick = self.now();
        let mut report = SweepReport {
            tick,
            evicted: Vec::new(),
        };
        for cache in self.tables.values() {
            let removed = cache.enforce_limits(tick);
            if removed > 0 {
                self.metrics.evictions.add(removed as u64);
                self.notify(cache, InvalidationReason::Evicted);
                report.evicted.push((Arc::clone(cache.name()), removed));
            }
        }
        self.metrics.sweeps.inc();
        report
    }

    /// Start a transaction-scoped view over this cache.
    pub fn begin_transaction(self: &Arc<Self>) -> TransactionRowView {
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        self.metrics.txn_begin.inc();
        tracing::debug!("Began transaction {}", id);
        TransactionRowView::new(id, Arc::clone(self))
    }

    /// Start the background sweeper configured in the options.
    ///
    /// Returns `None` when the options disable sweeping.
    pub fn start_sweeper(self: &Arc<Self>) -> Result<Option<CacheSweeper>> {
        match self.options.sweep_interval {
            Some(interval) => CacheSweeper::start(self, interval).map(Some),
            None => Ok(None),
        }
    }

    /// Format the metrics and per-table sizes as Prometheus text.
    pub fn to_prometheus(&self) -> String {
        self.metrics.to_prometheus(&self.make_snapshot())
    }

    /// Account for rows a transaction merged into `cache`.
    pub(crate) fn record_commit(&self, cache: &TableCache, upserts: usize, removals: usize) {
        self.metrics.upserts.add(upserts as u64);
        self.metrics.removals.add(removals as u64);
        self.enforce_after_write(cache);
        self.notify(cache, InvalidationReason::Committed);
    }

    fn enforce_after_write(&self, cache: &TableCache) {
        if !self.options.enforce_on_upsert {
            return;
        }
        let evicted = cache.enforce_capacity();
        if evicted > 0 {
            self.metrics.evictions.add(evicted as u64);
            self.notify(cache, InvalidationReason::Evicted);
        }
    }

    fn notify(&self, cache: &TableCache, reason: InvalidationReason) {
        let report = cache.notifications().notify(reason);
        self.metrics.notifications.add(report.delivered as u64);
        self.metrics.subscriber_failures.add(report.failed as u64);
    }
}

impl std::fmt::Debug for DatabaseCacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseCacheState")
            .field("tables", &self.tables.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}
