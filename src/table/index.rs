//! Secondary index - column value to the primary keys of matching rows.

use std::collections::HashSet;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;

use crate::key::Key;

/// Secondary index over one column.
///
/// Buckets are keyed by the column value's canonical key. Empty buckets are
/// dropped so the index never outgrows the rows it describes.
pub(crate) struct SecondaryIndex {
    column: usize,
    name: Arc<str>,
    buckets: RwLock<AHashMap<Key, AHashSet<Key>>>,
}

impl SecondaryIndex {
    pub(crate) fn new(column: usize, name: Arc<str>) -> Self {
        Self {
            column,
            name,
            buckets: RwLock::new(AHashMap::new()),
        }
    }

    /// Position of the indexed column in the row.
    pub(crate) fn column(&self) -> usize {
        self.column
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn insert(&self, value: Key, primary: Key) {
        self.buckets.write().entry(value).or_default().insert(primary);
    }

    pub(crate) fn remove(&self, value: &Key, primary: &Key) {
        let mut buckets = self.buckets.write();
        if let Some(bucket) = buckets.get_mut(value) {
            bucket.remove(primary);
            if bucket.is_empty() {
                buckets.remove(value);
            }
        }
    }

    /// Move `primary` from the `old` bucket to the `new` one.
    pub(crate) fn replace(&self, old: Option<&Key>, new: Option<&Key>, primary: &Key) {
        if old == new {
            return;
        }
        if let Some(old) = old {
            self.remove(old, primary);
        }
        if let Some(new) = new {
            self.insert(new.clone(), primary.clone());
        }
    }

    pub(crate) fn lookup(&self, value: &Key) -> HashSet<Key> {
        self.buckets
            .read()
            .get(value)
            .map(|bucket| bucket.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }
}
