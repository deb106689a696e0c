//! RowSlot - one cached row.

use std::sync::Arc;

use crate::clock::Tick;
use crate::key::Key;
use crate::value::Value;

/// A cached row.
///
/// Slots are shared as `Arc<RowSlot>`; the `Arc` is the row's in-memory
/// identity. An upsert installs a new slot rather than editing the shared
/// one, so a reader holding an `Arc` always sees a consistent row.
#[derive(Debug, Clone)]
pub struct RowSlot {
    key: Key,
    values: Arc<[Value]>,
    /// Index bucket keys, aligned with the table's secondary indices.
    index_keys: Arc<[Option<Key>]>,
    inserted_at: Tick,
    size: usize,
}

impl RowSlot {
    pub(crate) fn new(
        key: Key,
        values: Vec<Value>,
        index_keys: Vec<Option<Key>>,
        inserted_at: Tick,
    ) -> Self {
        let size = std::mem::size_of::<RowSlot>()
            + key.approximate_size()
            + values.iter().map(Value::approximate_size).sum::<usize>();
        Self {
            key,
            values: values.into(),
            index_keys: index_keys.into(),
            inserted_at,
            size,
        }
    }

    /// Primary key.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Column values in schema order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value of the column at `index`.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Tick at which this row entered the cache.
    pub fn inserted_at(&self) -> Tick {
        self.inserted_at
    }

    /// Approximate memory footprint in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn index_keys(&self) -> &[Option<Key>] {
        &self.index_keys
    }

    /// Same row stamped with a different insertion tick.
    pub(crate) fn restamped(&self, tick: Tick) -> Self {
        Self {
            inserted_at: tick,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_slot_accessors() {
        let slot = RowSlot::new(
            Key::from(1i32),
            vec![Value::from(1i32), Value::from("Georgi")],
            vec![],
            Tick(7),
        );
        assert_eq!(slot.key(), &Key::from(1i32));
        assert_eq!(slot.value(1), Some(&Value::from("Georgi")));
        assert_eq!(slot.value(2), None);
        assert_eq!(slot.inserted_at(), Tick(7));
        assert!(slot.size() > std::mem::size_of::<RowSlot>());
    }

    #[test]
    fn test_restamp_keeps_values() {
        let slot = RowSlot::new(Key::from(1u8), vec![Value::from(1u8)], vec![None], Tick(1));
        let restamped = slot.restamped(Tick(9));
        assert_eq!(restamped.inserted_at(), Tick(9));
        assert_eq!(restamped.values(), slot.values());
        assert_eq!(restamped.size(), slot.size());
    }
}
