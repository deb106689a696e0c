//! Point-in-time views of the cache state.

use std::fmt;
use std::sync::Arc;

use crate::clock::Tick;

/// Size of one table at the moment it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Table name.
    pub table: Arc<str>,
    /// Number of cached rows.
    pub row_count: u64,
    /// Estimated bytes held by the cached rows.
    pub total_bytes: u64,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} rows, {} bytes",
            self.table, self.row_count, self.total_bytes
        )
    }
}

/// Outcome of one sweep over every table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Tick the sweep enforced age limits against.
    pub tick: Tick,
    /// Tables that lost rows, with the number removed.
    pub evicted: Vec<(Arc<str>, usize)>,
}

impl SweepReport {
    /// Total rows removed across all tables.
    pub fn total_evicted(&self) -> usize {
        self.evicted.iter().map(|(_, n)| n).sum()
    }

    /// Check if the sweep removed nothing.
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty()
    }
}
