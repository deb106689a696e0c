//! Table cache - the per-table row store.
//!
//! Each [`TableCache`] holds:
//!
//! - **Primary store**: `Key -> Arc<RowSlot>`, split into lock shards
//! - **Secondary indices**: one per indexed column, value key -> primary keys
//! - **Counters**: row count and byte estimate, readable without locking
//! - **Limits** and the table's [`CacheNotificationManager`]
//!
//! # Locking
//!
//! A structural write locks the key's shard first and the affected index
//! buckets second, never the other way round. Index probes only take the
//! index lock. Concurrent upserts of one key therefore serialize on its
//! shard: they converge on a single slot and bump the row count once.

mod index;
mod row;

pub use row::RowSlot;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use ahash::{AHashMap, RandomState};
use parking_lot::RwLock;

use crate::clock::Tick;
use crate::key::{Key, KeyFactory};
use crate::notify::CacheNotificationManager;
use crate::options::CacheLimits;
use crate::schema::TableSchema;
use crate::value::Value;
use crate::{Error, Result};

use index::SecondaryIndex;

/// Number of lock shards in the primary store.
const NUM_SHARDS: usize = 16;

type Shard = RwLock<AHashMap<Key, Arc<RowSlot>>>;

/// Cached rows of one table.
pub struct TableCache {
    schema: Arc<TableSchema>,
    shards: Vec<Shard>,
    indices: Vec<SecondaryIndex>,
    row_count: AtomicU64,
    byte_estimate: AtomicU64,
    limits: CacheLimits,
    /// Percent below a row or byte limit that eviction trims to.
    headroom_percent: u8,
    /// Set while one thread is trimming the table.
    evicting: AtomicBool,
    notifications: CacheNotificationManager,
    hasher: RandomState,
}

impl TableCache {
    /// Create an empty cache for `schema`.
    pub fn new(schema: Arc<TableSchema>, limits: CacheLimits, headroom_percent: u8) -> Self {
        let shards = (0..NUM_SHARDS)
            .map(|_| RwLock::new(AHashMap::new()))
            .collect();
        let indices = schema
            .indexed_columns()
            .map(|i| SecondaryIndex::new(i, schema.columns()[i].name.clone()))
            .collect();
        let notifications = CacheNotificationManager::new(schema.name().clone());

        Self {
            schema,
            shards,
            indices,
            row_count: AtomicU64::new(0),
            byte_estimate: AtomicU64::new(0),
            limits,
            headroom_percent,
            evicting: AtomicBool::new(false),
            notifications,
            hasher: RandomState::new(),
        }
    }

    /// Table name.
    pub fn name(&self) -> &Arc<str> {
        self.schema.name()
    }

    /// Table schema.
    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    /// Effective limits of this table.
    pub fn limits(&self) -> &CacheLimits {
        &self.limits
    }

    /// Subscribers to this table's invalidations.
    pub fn notifications(&self) -> &CacheNotificationManager {
        &self.notifications
    }

    /// Number of cached rows.
    pub fn row_count(&self) -> u64 {
        self.row_count.load(Ordering::Acquire)
    }

    /// Estimated bytes held by cached rows.
    pub fn byte_estimate(&self) -> u64 {
        self.byte_estimate.load(Ordering::Acquire)
    }

    /// Check if the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Insert or replace the row for `key`.
    ///
    /// Index buckets whose value changed since the previous row are moved;
    /// unchanged buckets are left alone.
    pub fn upsert(&self, key: Key, values: Vec<Value>, tick: Tick) -> Result<Arc<RowSlot>> {
        let slot = Arc::new(self.prepare(key, values, tick)?);
        Ok(self.install(slot))
    }

    /// Build a slot for this table without storing it.
    ///
    /// Validates the row shape and computes index bucket keys, so a failing
    /// row never reaches the store half-applied.
    pub(crate) fn prepare(&self, key: Key, values: Vec<Value>, tick: Tick) -> Result<RowSlot> {
        self.schema.check_row(&values)?;
        let index_keys = self
            .indices
            .iter()
            .map(|index| index_key(&values[index.column()]))
            .collect::<Result<Vec<_>>>()?;
        Ok(RowSlot::new(key, values, index_keys, tick))
    }

    /// Store a prepared slot, replacing any previous row with its key.
    pub(crate) fn install(&self, slot: Arc<RowSlot>) -> Arc<RowSlot> {
        let key = slot.key().clone();
        let mut shard = self.shard(&key).write();
        let previous = shard.insert(key.clone(), Arc::clone(&slot));

        match &previous {
            None => {
                self.row_count.fetch_add(1, Ordering::AcqRel);
                self.byte_estimate
                    .fetch_add(slot.size() as u64, Ordering::AcqRel);
            }
            Some(old) => self.adjust_bytes(old.size(), slot.size()),
        }

        for (i, index) in self.indices.iter().enumerate() {
            let old = previous.as_ref().and_then(|p| p.index_keys()[i].as_ref());
            index.replace(old, slot.index_keys()[i].as_ref(), &key);
        }
        drop(shard);

        slot
    }

    /// Point lookup by primary key.
    pub fn try_get(&self, key: &Key) -> Option<Arc<RowSlot>> {
        self.shard(key).read().get(key).cloned()
    }

    /// Check if a row with `key` is cached.
    pub fn contains(&self, key: &Key) -> bool {
        self.shard(key).read().contains_key(key)
    }

    /// Primary keys of all rows whose `column` equals `value`.
    ///
    /// Returns an empty set when nothing matches. NULL and floats never match.
    pub fn lookup(&self, column: &str, value: &Value) -> Result<HashSet<Key>> {
        let index = self.find_index(column)?;
        match index_key(value)? {
            Some(bucket) => Ok(index.lookup(&bucket)),
            None => Ok(HashSet::new()),
        }
    }

    /// Primary keys in the bucket of an already canonical column key.
    pub(crate) fn lookup_key(&self, column: &str, bucket: &Key) -> Result<HashSet<Key>> {
        Ok(self.find_index(column)?.lookup(bucket))
    }

    /// Rows whose `column` equals `value`.
    ///
    /// Rows evicted between the index probe and the fetch are skipped.
    pub fn lookup_rows(&self, column: &str, value: &Value) -> Result<Vec<Arc<RowSlot>>> {
        let keys = self.lookup(column, value)?;
        Ok(keys.iter().filter_map(|k| self.try_get(k)).collect())
    }

    /// Remove the row for `key`. Absent keys are a no-op.
    pub fn remove(&self, key: &Key) -> Option<Arc<RowSlot>> {
        let mut shard = self.shard(key).write();
        let removed = shard.remove(key)?;
        self.unlink(&removed);
        Some(removed)
    }

    /// Remove every row inserted strictly before `tick`.
    pub fn remove_inserted_before(&self, tick: Tick) -> usize {
        self.remove_where(|slot| slot.inserted_at() < tick)
    }

    /// Remove every row.
    pub fn clear(&self) -> usize {
        self.remove_where(|_| true)
    }

    /// Trim rows until the row-count and byte limits hold.
    pub fn enforce_capacity(&self) -> usize {
        if !self.over_capacity() {
            return 0;
        }
        self.with_eviction_guard(|| self.trim_capacity())
    }

    /// Enforce every limit: age first, then row count and bytes.
    pub fn enforce_limits(&self, now: Tick) -> usize {
        if self.limits.is_unbounded() {
            return 0;
        }
        self.with_eviction_guard(|| {
            let mut removed = 0;
            if let Some(max_age) = self.limits.max_age {
                if now > max_age {
                    removed += self.remove_inserted_before(now - max_age);
                }
            }
            removed + self.trim_capacity()
        })
    }

    /// Check if the row-count or byte limit is exceeded.
    pub fn over_capacity(&self) -> bool {
        self.limits.max_rows.is_some_and(|max| self.row_count() > max)
            || self
                .limits
                .max_bytes
                .is_some_and(|max| self.byte_estimate() > max)
    }

    fn trim_capacity(&self) -> usize {
        let mut removed = 0;

        if let Some(max) = self.limits.max_rows {
            let rows = self.row_count();
            if rows > max {
                let excess = rows - trim_target(max, self.headroom_percent);
                removed += self.evict_oldest(excess, |_| 1);
            }
        }

        if let Some(max) = self.limits.max_bytes {
            let bytes = self.byte_estimate();
            if bytes > max {
                let excess = bytes - trim_target(max, self.headroom_percent);
                removed += self.evict_oldest(excess, |slot| slot.size() as u64);
            }
        }

        removed
    }

    /// Remove rows oldest first until their weight covers `excess`.
    ///
    /// Rows sharing a tick are removed one at a time, so a batch stamped
    /// with a single tick is only trimmed as far as needed.
    fn evict_oldest<F>(&self, excess: u64, weight: F) -> usize
    where
        F: Fn(&RowSlot) -> u64,
    {
        let mut stamps: Vec<(Tick, Key, u64)> = Vec::with_capacity(self.row_count() as usize);
        for shard in &self.shards {
            stamps.extend(shard.read().iter().map(|(key, slot)| {
                (slot.inserted_at(), key.clone(), weight(slot.as_ref()))
            }));
        }
        stamps.sort_unstable_by_key(|(tick, _, _)| *tick);

        let mut freed = 0u64;
        let mut removed = 0;
        for (tick, key, w) in stamps {
            if freed >= excess {
                break;
            }
            if self.remove_stamped(&key, tick) {
                freed += w;
                removed += 1;
            }
        }
        removed
    }

    /// Remove `key` only if its row still carries `tick`.
    ///
    /// A row replaced since it was listed is newer and stays.
    fn remove_stamped(&self, key: &Key, tick: Tick) -> bool {
        let mut shard = self.shard(key).write();
        if !shard.get(key).is_some_and(|slot| slot.inserted_at() == tick) {
            return false;
        }
        match shard.remove(key) {
            Some(slot) => {
                self.unlink(&slot);
                true
            }
            None => false,
        }
    }

    /// Run `f` unless another thread is already trimming this table.
    fn with_eviction_guard<F>(&self, f: F) -> usize
    where
        F: FnOnce() -> usize,
    {
        if self
            .evicting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return 0;
        }
        let removed = f();
        self.evicting.store(false, Ordering::Release);
        if removed > 0 {
            tracing::debug!(
                "Evicted {} rows from {} ({} rows, {} bytes left)",
                removed,
                self.name(),
                self.row_count(),
                self.byte_estimate()
            );
        }
        removed
    }

    fn remove_where<F>(&self, pred: F) -> usize
    where
        F: Fn(&RowSlot) -> bool,
    {
        let mut removed = 0;
        for shard in &self.shards {
            let mut shard = shard.write();
            let doomed: Vec<Key> = shard
                .iter()
                .filter_map(|(k, slot)| pred(slot.as_ref()).then(|| k.clone()))
                .collect();
            for key in doomed {
                if let Some(slot) = shard.remove(&key) {
                    self.unlink(&slot);
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Drop a removed slot from the counters and indices.
    ///
    /// Must be called while the slot's shard is still write-locked.
    fn unlink(&self, slot: &RowSlot) {
        self.row_count.fetch_sub(1, Ordering::AcqRel);
        self.byte_estimate
            .fetch_sub(slot.size() as u64, Ordering::AcqRel);
        for (i, index) in self.indices.iter().enumerate() {
            if let Some(bucket) = &slot.index_keys()[i] {
                index.remove(bucket, slot.key());
            }
        }
    }

    fn adjust_bytes(&self, old: usize, new: usize) {
        if new >= old {
            self.byte_estimate
                .fetch_add((new - old) as u64, Ordering::AcqRel);
        } else {
            self.byte_estimate
                .fetch_sub((old - new) as u64, Ordering::AcqRel);
        }
    }

    fn find_index(&self, column: &str) -> Result<&SecondaryIndex> {
        if let Some(index) = self.indices.iter().find(|i| i.name() == column) {
            return Ok(index);
        }
        // Distinguish a missing column from an unindexed one.
        self.schema.column_index(column)?;
        Err(Error::ColumnNotIndexed {
            table: self.name().to_string(),
            column: column.to_string(),
        })
    }

    fn shard(&self, key: &Key) -> &Shard {
        let idx = self.hasher.hash_one(key) as usize % NUM_SHARDS;
        &self.shards[idx]
    }
}

impl std::fmt::Debug for TableCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableCache")
            .field("name", self.name())
            .field("rows", &self.row_count())
            .field("bytes", &self.byte_estimate())
            .field("limits", &self.limits)
            .finish()
    }
}

/// Bucket key for an indexed column value.
///
/// NULL and floats have no exact equality and are not indexed.
fn index_key(value: &Value) -> Result<Option<Key>> {
    match value {
        Value::Null | Value::Float(_) => Ok(None),
        other => KeyFactory::from_value(other).map(Some),
    }
}

fn trim_target(limit: u64, headroom_percent: u8) -> u64 {
    limit - limit * headroom_percent as u64 / 100
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn dept_emp() -> Arc<TableSchema> {
        Arc::new(
            TableSchema::builder("dept_emp")
                .indexed_column("emp_no")
                .indexed_column("dept_no")
                .column("from_date")
                .primary_key(["emp_no", "dept_no"])
                .build()
                .unwrap(),
        )
    }

    fn row(emp: i32, dept: &str) -> (Key, Vec<Value>) {
        let values = vec![Value::from(emp), Value::from(dept), Value::from("1990-01-01")];
        let key = Key::composite([Key::from(emp), Key::from(dept)]);
        (key, values)
    }

    fn table() -> TableCache {
        TableCache::new(dept_emp(), CacheLimits::unbounded(), 0)
    }

    #[test]
    fn test_upsert_and_get() {
        let cache = table();
        let (key, values) = row(10001, "d005");
        let slot = cache.upsert(key.clone(), values, Tick(1)).unwrap();

        let fetched = cache.try_get(&key).unwrap();
        assert!(Arc::ptr_eq(&slot, &fetched));
        assert_eq!(cache.row_count(), 1);
        assert_eq!(cache.byte_estimate(), slot.size() as u64);
    }

    #[test]
    fn test_upsert_same_key_counts_once() {
        let cache = table();
        for tick in 0..5 {
            let (key, values) = row(10001, "d005");
            cache.upsert(key, values, Tick(tick)).unwrap();
        }
        assert_eq!(cache.row_count(), 1);
        let (key, _) = row(10001, "d005");
        assert_eq!(cache.try_get(&key).unwrap().inserted_at(), Tick(4));
    }

    #[test]
    fn test_upsert_moves_index_bucket() {
        let schema = Arc::new(
            TableSchema::builder("employees")
                .column("emp_no")
                .indexed_column("dept_no")
                .primary_key(["emp_no"])
                .build()
                .unwrap(),
        );
        let cache = TableCache::new(schema, CacheLimits::unbounded(), 0);
        let key = Key::from(1i32);

        cache
            .upsert(key.clone(), vec![Value::from(1i32), Value::from("d001")], Tick(1))
            .unwrap();
        cache
            .upsert(key.clone(), vec![Value::from(1i32), Value::from("d002")], Tick(2))
            .unwrap();

        assert!(cache.lookup("dept_no", &Value::from("d001")).unwrap().is_empty());
        assert!(cache
            .lookup("dept_no", &Value::from("d002"))
            .unwrap()
            .contains(&key));

        cache
            .upsert(key.clone(), vec![Value::from(1i32), Value::Null], Tick(3))
            .unwrap();
        assert!(cache.lookup("dept_no", &Value::from("d002")).unwrap().is_empty());
        assert!(cache.lookup("dept_no", &Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_lookup_errors() {
        let cache = table();
        assert!(matches!(
            cache.lookup("from_date", &Value::from("x")),
            Err(Error::ColumnNotIndexed { .. })
        ));
        assert!(matches!(
            cache.lookup("salary", &Value::from(1i32)),
            Err(Error::ColumnNotFound { .. })
        ));
        assert!(cache.lookup("emp_no", &Value::from(42i32)).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_rejects_bad_rows() {
        let cache = table();
        let (key, _) = row(1, "d001");
        assert!(cache.upsert(key, vec![Value::from(1i32)], Tick(1)).is_err());
        assert_eq!(cache.row_count(), 0);
    }

    #[test]
    fn test_float_column_values_are_not_indexed() {
        let cache = table();
        let (key, _) = row(1, "d001");
        let values = vec![Value::Float(1.5), Value::from("d001"), Value::Null];
        cache.upsert(key.clone(), values, Tick(1)).unwrap();

        assert!(cache.contains(&key));
        assert!(cache.lookup("emp_no", &Value::Float(1.5)).unwrap().is_empty());
        assert_eq!(cache.lookup("dept_no", &Value::from("d001")).unwrap().len(), 1);
    }

    #[test]
    fn test_remove() {
        let cache = table();
        let (key, values) = row(10001, "d005");
        cache.upsert(key.clone(), values, Tick(1)).unwrap();

        assert!(cache.remove(&key).is_some());
        assert!(cache.remove(&key).is_none());
        assert_eq!(cache.row_count(), 0);
        assert_eq!(cache.byte_estimate(), 0);
        assert!(cache.lookup("emp_no", &Value::from(10001i32)).unwrap().is_empty());
    }

    #[test]
    fn test_remove_inserted_before() {
        let cache = table();
        for (i, tick) in [1u64, 1, 2, 3].iter().enumerate() {
            let (key, values) = row(i as i32, "d001");
            cache.upsert(key, values, Tick(*tick)).unwrap();
        }

        assert_eq!(cache.remove_inserted_before(Tick(2)), 2);
        assert_eq!(cache.row_count(), 2);
        assert_eq!(cache.remove_inserted_before(Tick(2)), 0);
        assert_eq!(cache.remove_inserted_before(Tick(1)), 0);
        assert_eq!(cache.lookup("dept_no", &Value::from("d001")).unwrap().len(), 2);
    }

    #[test]
    fn test_clear() {
        let cache = table();
        for i in 0..20 {
            let (key, values) = row(i, "d003");
            cache.upsert(key, values, Tick(i as u64)).unwrap();
        }
        assert_eq!(cache.clear(), 20);
        assert!(cache.is_empty());
        assert_eq!(cache.byte_estimate(), 0);
    }

    #[test]
    fn test_enforce_row_limit_evicts_oldest() {
        let cache = TableCache::new(dept_emp(), CacheLimits::unbounded().max_rows(10), 0);
        for i in 0..15 {
            let (key, values) = row(i, "d001");
            cache.upsert(key, values, Tick(i as u64)).unwrap();
        }
        assert!(cache.over_capacity());
        assert_eq!(cache.enforce_capacity(), 5);
        assert_eq!(cache.row_count(), 10);

        let (oldest, _) = row(4, "d001");
        let (kept, _) = row(5, "d001");
        assert!(!cache.contains(&oldest));
        assert!(cache.contains(&kept));
    }

    #[test]
    fn test_enforce_row_limit_same_tick() {
        let cache = TableCache::new(dept_emp(), CacheLimits::unbounded().max_rows(10), 0);
        for i in 0..11 {
            let (key, values) = row(i, "d001");
            cache.upsert(key, values, Tick(7)).unwrap();
        }
        assert_eq!(cache.enforce_capacity(), 1);
        assert_eq!(cache.row_count(), 10);
        assert_eq!(cache.lookup("dept_no", &Value::from("d001")).unwrap().len(), 10);
    }

    #[test]
    fn test_enforce_byte_limit_same_tick() {
        let (key, values) = row(0, "d001");
        let size = table().upsert(key, values, Tick(0)).unwrap().size() as u64;
        let limits = CacheLimits::unbounded().max_bytes(size * 4);
        let cache = TableCache::new(dept_emp(), limits, 0);
        for i in 0..6 {
            let (key, values) = row(1000 + i, "d001");
            cache.upsert(key, values, Tick(3)).unwrap();
        }
        assert_eq!(cache.enforce_capacity(), 2);
        assert_eq!(cache.row_count(), 4);
    }

    #[test]
    fn test_enforce_row_limit_with_headroom() {
        let cache = TableCache::new(dept_emp(), CacheLimits::unbounded().max_rows(10), 20);
        for i in 0..11 {
            let (key, values) = row(i, "d001");
            cache.upsert(key, values, Tick(i as u64)).unwrap();
        }
        cache.enforce_capacity();
        assert_eq!(cache.row_count(), 8);
    }

    #[test]
    fn test_enforce_byte_limit() {
        let (key, values) = row(0, "d001");
        let size = table().upsert(key, values, Tick(0)).unwrap().size() as u64;

        let cache = TableCache::new(dept_emp(), CacheLimits::unbounded().max_bytes(size * 4), 0);
        for i in 0..8 {
            let (key, values) = row(i, "d001");
            cache.upsert(key, values, Tick(i as u64)).unwrap();
        }
        cache.enforce_capacity();
        assert!(cache.byte_estimate() <= size * 4);
        assert!(!cache.over_capacity());
    }

    #[test]
    fn test_enforce_age_limit() {
        let cache = TableCache::new(dept_emp(), CacheLimits::unbounded().max_age_ticks(10), 0);
        for i in 0..5 {
            let (key, values) = row(i, "d001");
            cache.upsert(key, values, Tick(i as u64 * 10)).unwrap();
        }
        // Rows at ticks 0, 10, 20 are older than 10 ticks at t=35.
        assert_eq!(cache.enforce_limits(Tick(35)), 3);
        assert_eq!(cache.row_count(), 2);
    }

    #[test]
    fn test_concurrent_upserts_same_key() {
        let cache = Arc::new(table());
        let handles: Vec<_> = (0..16)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..200 {
                        let (key, values) = row(10004, "d004");
                        cache.upsert(key, values, Tick(t * 1000 + i)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(cache.row_count(), 1);
        assert_eq!(cache.lookup("emp_no", &Value::from(10004i32)).unwrap().len(), 1);
        let (key, _) = row(10004, "d004");
        assert_eq!(
            cache.byte_estimate(),
            cache.try_get(&key).unwrap().size() as u64
        );
    }
}
