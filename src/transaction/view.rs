//! TransactionRowView - private overlay over the shared cache.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::database::DatabaseCacheState;
use crate::key::Key;
use crate::table::RowSlot;
use crate::value::Value;
use crate::{Error, Result};

use super::{Overlay, OverlayEntry, TransactionId, TransactionState};

/// Transaction-scoped view of the cached rows.
///
/// # Example
///
/// ```ignore
/// let txn = state.begin_transaction();
///
/// // Same instance on every read within this transaction
/// let row = txn.get("employees", &Key::from(10001i32))?;
///
/// // Buffered until commit
/// txn.upsert("employees", values)?;
/// txn.commit()?;
/// ```
pub struct TransactionRowView {
    /// Transaction ID.
    id: TransactionId,
    /// Shared cache state.
    db: Arc<DatabaseCacheState>,
    /// Rows read or written by this transaction.
    overlay: Mutex<Overlay>,
    /// Current state.
    state: Mutex<TransactionState>,
}

impl TransactionRowView {
    pub(crate) fn new(id: TransactionId, db: Arc<DatabaseCacheState>) -> Self {
        Self {
            id,
            db,
            overlay: Mutex::new(Overlay::default()),
            state: Mutex::new(TransactionState::Active),
        }
    }

    /// Get the transaction ID.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Get the current state.
    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    /// Check if the transaction is still active.
    pub fn is_active(&self) -> bool {
        *self.state.lock() == TransactionState::Active
    }

    /// Number of buffered writes and removals.
    pub fn pending_writes(&self) -> usize {
        self.overlay
            .lock()
            .values()
            .flat_map(|rows| rows.values())
            .filter(|entry| entry.is_write())
            .count()
    }

    /// Get a row by primary key.
    ///
    /// The first read of a key copies the shared row into the overlay; later
    /// reads return that copy. A key removed in this transaction reads as
    /// absent.
    pub fn get(&self, table: &str, key: &Key) -> Result<Option<Arc<RowSlot>>> {
        self.check_active()?;
        let cache = self.db.table(table)?;

        let mut overlay = self.overlay.lock();
        let rows = overlay.entry(Arc::clone(cache.name())).or_default();
        if let Some(entry) = rows.get(key) {
            return Ok(entry.row().cloned());
        }

        let Some(shared) = self.db.get(table, key)? else {
            return Ok(None);
        };
        let private = Arc::new(RowSlot::clone(&shared));
        rows.insert(key.clone(), OverlayEntry::Read(Arc::clone(&private)));
        Ok(Some(private))
    }

    /// Buffer a row write.
    ///
    /// The row is validated now, so a malformed row fails here rather than
    /// at commit.
    pub fn upsert(&self, table: &str, values: Vec<Value>) -> Result<Arc<RowSlot>> {
        self.check_active()?;
        let cache = self.db.table(table)?;
        let key = cache.schema().key_for(&values)?;
        let slot = Arc::new(cache.prepare(key.clone(), values, self.db.now())?);

        self.overlay
            .lock()
            .entry(Arc::clone(cache.name()))
            .or_default()
            .insert(key, OverlayEntry::Written(Arc::clone(&slot)));
        Ok(slot)
    }

    /// Buffer a row removal.
    pub fn remove(&self, table: &str, key: &Key) -> Result<()> {
        self.check_active()?;
        let cache = self.db.table(table)?;

        self.overlay
            .lock()
            .entry(Arc::clone(cache.name()))
            .or_default()
            .insert(key.clone(), OverlayEntry::Removed);
        Ok(())
    }

    /// Merge buffered writes into the shared cache.
    ///
    /// Written rows are stamped with the commit tick. Every table that
    /// received a write or removal is notified.
    pub fn commit(self) -> Result<()> {
        self.finish(TransactionState::Committed)?;

        let overlay = std::mem::take(&mut *self.overlay.lock());
        let tick = self.db.now();
        let mut tables = 0;

        for (table, rows) in overlay {
            let cache = self.db.table(&table)?;
            let mut upserts = 0;
            let mut removals = 0;

            for (key, entry) in rows {
                match entry {
                    OverlayEntry::Read(_) => {}
                    OverlayEntry::Written(slot) => {
                        cache.install(Arc::new(slot.restamped(tick)));
                        upserts += 1;
                    }
                    OverlayEntry::Removed => {
                        cache.remove(&key);
                        removals += 1;
                    }
                }
            }

            if upserts + removals > 0 {
                self.db.record_commit(cache, upserts, removals);
                tables += 1;
            }
        }

        self.db.metrics().txn_commit.inc();
        tracing::debug!("Committed transaction {} ({} tables)", self.id, tables);
        Ok(())
    }

    /// Discard the overlay.
    pub fn rollback(self) -> Result<()> {
        self.finish(TransactionState::RolledBack)?;
        self.overlay.lock().clear();
        self.db.metrics().txn_rollback.inc();
        tracing::debug!("Rolled back transaction {}", self.id);
        Ok(())
    }

    /// Move from Active to `next`.
    fn finish(&self, next: TransactionState) -> Result<()> {
        let mut state = self.state.lock();
        if *state != TransactionState::Active {
            return Err(Error::TransactionNotActive);
        }
        *state = next;
        Ok(())
    }

    fn check_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::TransactionNotActive)
        }
    }
}

impl Drop for TransactionRowView {
    fn drop(&mut self) {
        // Dropped without commit or rollback: implicit rollback.
        let mut state = self.state.lock();
        if *state == TransactionState::Active {
            *state = TransactionState::RolledBack;
            self.db.metrics().txn_rollback.inc();
        }
    }
}

impl std::fmt::Debug for TransactionRowView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionRowView")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
