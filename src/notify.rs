//! Invalidation fan-out to weakly held subscribers.
//!
//! Components that keep state derived from a table (compiled queries,
//! materialized relations, ...) implement [`CacheSubscriber`] and register
//! with the table's [`CacheNotificationManager`]. The manager only holds
//! `Weak` handles: a subscriber disappears from the registry once its owner
//! drops it, with no unregistration call.
//!
//! The registry is an immutable `Vec` published through `ArcSwap`. Subscribe
//! and clean build a replacement and install it with a compare-and-swap
//! retry loop; notify iterates whatever vector was current when it started.
//! A subscriber added during a notify is therefore not lost, it simply
//! receives the next one.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;

use crate::Result;

/// Why a table's subscribers are being invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    /// Rows were evicted by a limit or an age cutoff.
    Evicted,
    /// Rows were invalidated explicitly.
    Removed,
    /// The whole table was cleared.
    Cleared,
    /// A transaction merged writes into the table.
    Committed,
}

/// Event handed to each subscriber.
#[derive(Debug, Clone)]
pub struct Invalidation {
    /// Table whose cached rows changed.
    pub table: Arc<str>,
    /// What changed them.
    pub reason: InvalidationReason,
}

/// Holder of state derived from a cached table.
pub trait CacheSubscriber: Send + Sync {
    /// Drop whatever was derived from the table's previous contents.
    fn invalidate(&self, event: &Invalidation) -> Result<()>;
}

/// Outcome of one [`CacheNotificationManager::notify`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    /// Subscribers whose callback returned `Ok`.
    pub delivered: usize,
    /// Subscribers whose callback returned an error or panicked.
    pub failed: usize,
    /// Registry entries whose subscriber had already been dropped.
    pub dead: usize,
}

type Registry = Vec<Weak<dyn CacheSubscriber>>;

/// Weak-reference subscriber registry of one table.
pub struct CacheNotificationManager {
    table: Arc<str>,
    subscribers: ArcSwap<Registry>,
}

impl CacheNotificationManager {
    /// Create an empty registry for `table`.
    pub fn new(table: Arc<str>) -> Self {
        Self {
            table,
            subscribers: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Register a subscriber without keeping it alive.
    ///
    /// Dead entries encountered while copying the registry are dropped.
    pub fn subscribe<S>(&self, subscriber: &Arc<S>)
    where
        S: CacheSubscriber + 'static,
    {
        let weak: Weak<S> = Arc::downgrade(subscriber);
        let weak: Weak<dyn CacheSubscriber> = weak;
        self.subscribers.rcu(|current| {
            let mut next: Registry = current
                .iter()
                .filter(|w| w.strong_count() > 0)
                .cloned()
                .collect();
            next.push(weak.clone());
            next
        });
    }

    /// Invoke `invalidate` on every subscriber alive now.
    ///
    /// A failing or panicking subscriber is logged and skipped; the remaining
    /// subscribers are still notified.
    pub fn notify(&self, reason: InvalidationReason) -> NotifyReport {
        let registry = self.subscribers.load_full();
        let event = Invalidation {
            table: Arc::clone(&self.table),
            reason,
        };

        let mut report = NotifyReport::default();
        for weak in registry.iter() {
            let Some(subscriber) = weak.upgrade() else {
                report.dead += 1;
                continue;
            };
            match panic::catch_unwind(AssertUnwindSafe(|| subscriber.invalidate(&event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!("Subscriber of {} failed to invalidate: {}", self.table, e);
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::warn!("Subscriber of {} panicked during invalidate", self.table);
                }
            }
        }

        if report.dead > 0 {
            self.clean();
        }
        report
    }

    /// Purge registry entries whose subscriber has been dropped.
    ///
    /// Returns the number of entries removed.
    pub fn clean(&self) -> usize {
        let mut removed = 0;
        self.subscribers.rcu(|current| {
            let next: Registry = current
                .iter()
                .filter(|w| w.strong_count() > 0)
                .cloned()
                .collect();
            removed = current.len() - next.len();
            next
        });
        removed
    }

    /// Number of registry entries, dead ones included.
    pub fn len(&self) -> usize {
        self.subscribers.load().len()
    }

    /// Check if the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of subscribers still alive.
    pub fn live_count(&self) -> usize {
        self.subscribers
            .load()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

impl fmt::Debug for CacheNotificationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheNotificationManager")
            .field("table", &self.table)
            .field("entries", &self.len())
            .finish()
    }
}
