//! Transaction module - transaction-scoped row views.
//!
//! A [`TransactionRowView`] is a read-through layer over the shared cache:
//!
//! - Reads go to the transaction's private overlay first, then to the shared
//!   cache. A row read from the shared cache is copied into the overlay, so
//!   the transaction keeps seeing one stable instance and never shares it
//!   with another transaction.
//! - Writes and removals are buffered in the overlay.
//! - Commit merges the buffered writes into the shared cache and notifies
//!   each affected table. Reads are not merged.
//! - Rollback, or dropping an active view, discards the overlay.
//!
//! There is no conflict detection: when two transactions write the same key,
//! the last commit wins.

mod view;

pub use view::TransactionRowView;

use std::sync::Arc;

use ahash::AHashMap;

use crate::key::Key;
use crate::table::RowSlot;

/// Transaction ID type.
pub type TransactionId = u64;

/// Transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can read/write.
    Active,
    /// Transaction was committed.
    Committed,
    /// Transaction was rolled back or dropped.
    RolledBack,
}

/// One key's entry in a transaction overlay.
#[derive(Debug, Clone)]
enum OverlayEntry {
    /// Private copy of a row read from the shared cache.
    Read(Arc<RowSlot>),
    /// Row written by the transaction.
    Written(Arc<RowSlot>),
    /// Row removed by the transaction.
    Removed,
}

impl OverlayEntry {
    /// Row visible to the transaction, if any.
    fn row(&self) -> Option<&Arc<RowSlot>> {
        match self {
            OverlayEntry::Read(row) | OverlayEntry::Written(row) => Some(row),
            OverlayEntry::Removed => None,
        }
    }

    fn is_write(&self) -> bool {
        !matches!(self, OverlayEntry::Read(_))
    }
}

/// Overlay entries by table, then by primary key.
type Overlay = AHashMap<Arc<str>, AHashMap<Key, OverlayEntry>>;
