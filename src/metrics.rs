//! Cache metrics.
//!
//! Atomic counters for cache traffic, evictions and invalidation fan-out,
//! with a Prometheus text rendering and a human-readable summary.

use std::fmt;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::database::Snapshot;

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Increment the counter by 1.
    pub fn inc(&self) {
        self.add(1);
    }

    /// Add a value to the counter.
    pub fn add(&self, v: u64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    /// Get the current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Counters shared by every table of one cache state.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Primary-key reads that found a row.
    pub hits: Counter,
    /// Primary-key reads that found nothing.
    pub misses: Counter,
    /// Secondary-index probes.
    pub index_lookups: Counter,
    /// Rows stored through upsert or commit.
    pub upserts: Counter,
    /// Rows removed by explicit invalidation.
    pub removals: Counter,
    /// Rows removed by limits, age cutoffs or clears.
    pub evictions: Counter,
    /// Sweep passes completed.
    pub sweeps: Counter,
    /// Subscriber callbacks delivered.
    pub notifications: Counter,
    /// Subscriber callbacks that failed or panicked.
    pub subscriber_failures: Counter,
    /// Transactions started.
    pub txn_begin: Counter,
    /// Transactions committed.
    pub txn_commit: Counter,
    /// Transactions rolled back or dropped.
    pub txn_rollback: Counter,
}

impl CacheMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of primary-key reads served from the cache.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.get();
        let total = hits + self.misses.get();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Format as Prometheus metrics, with per-table gauges from `tables`.
    pub fn to_prometheus(&self, tables: &[Snapshot]) -> String {
        let mut out = String::new();
        let counters = [
            ("rowcache_hits_total", "Primary-key cache hits", &self.hits),
            ("rowcache_misses_total", "Primary-key cache misses", &self.misses),
            ("rowcache_index_lookups_total", "Secondary index probes", &self.index_lookups),
            ("rowcache_upserts_total", "Rows stored", &self.upserts),
            ("rowcache_removals_total", "Rows invalidated explicitly", &self.removals),
            ("rowcache_evictions_total", "Rows evicted", &self.evictions),
            ("rowcache_sweeps_total", "Sweep passes", &self.sweeps),
            ("rowcache_notifications_total", "Subscriber callbacks delivered", &self.notifications),
            (
                "rowcache_subscriber_failures_total",
                "Subscriber callbacks failed",
                &self.subscriber_failures,
            ),
            ("rowcache_txn_begin_total", "Transactions started", &self.txn_begin),
            ("rowcache_txn_commit_total", "Transactions committed", &self.txn_commit),
            ("rowcache_txn_rollback_total", "Transactions rolled back", &self.txn_rollback),
        ];
        for (name, help, counter) in counters {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}\n", name, counter.get());
        }

        let _ = writeln!(out, "# HELP rowcache_table_rows Cached rows per table");
        let _ = writeln!(out, "# TYPE rowcache_table_rows gauge");
        for t in tables {
            let _ = writeln!(out, "rowcache_table_rows{{table=\"{}\"}} {}", t.table, t.row_count);
        }
        out.push('\n');

        let _ = writeln!(out, "# HELP rowcache_table_bytes Estimated cached bytes per table");
        let _ = writeln!(out, "# TYPE rowcache_table_bytes gauge");
        for t in tables {
            let _ = writeln!(out, "rowcache_table_bytes{{table=\"{}\"}} {}", t.table, t.total_bytes);
        }

        out
    }

    /// Point-in-time copy of the counters.
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            hits: self.hits.get(),
            misses: self.misses.get(),
            upserts: self.upserts.get(),
            evictions: self.evictions.get(),
            removals: self.removals.get(),
            notifications: self.notifications.get(),
            subscriber_failures: self.subscriber_failures.get(),
            txn_commits: self.txn_commit.get(),
            txn_rollbacks: self.txn_rollback.get(),
            hit_rate: self.hit_rate(),
        }
    }
}

/// Human-readable metrics summary.
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub hits: u64,
    pub misses: u64,
    pub upserts: u64,
    pub evictions: u64,
    pub removals: u64,
    pub notifications: u64,
    pub subscriber_failures: u64,
    pub txn_commits: u64,
    pub txn_rollbacks: u64,
    pub hit_rate: f64,
}

impl fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Row Cache Summary ===")?;
        writeln!(f, "Reads:   {} hits, {} misses ({:.1}% hit rate)", self.hits, self.misses, self.hit_rate * 100.0)?;
        writeln!(f, "Writes:  {} upserts", self.upserts)?;
        writeln!(f, "Removed: {} evicted, {} invalidated", self.evictions, self.removals)?;
        writeln!(
            f,
            "Notify:  {} delivered, {} failed",
            self.notifications, self.subscriber_failures
        )?;
        writeln!(f, "Txns:    {} committed, {} rolled back", self.txn_commits, self.txn_rollbacks)?;
        Ok(())
    }
}
