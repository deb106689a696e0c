//! Query key resolution.
//!
//! Before issuing a query, the query layer can ask whether its filter pins
//! down a row the cache may already hold. [`resolve`] answers from the
//! schema alone:
//!
//! - an AND of equalities that binds every primary-key column, and nothing
//!   else, resolves to the row's primary key;
//! - a single equality on an indexed column resolves to an index bucket;
//! - anything else is unresolved and the caller runs the query.

use std::sync::Arc;

use crate::key::{Key, KeyFactory};
use crate::schema::TableSchema;
use crate::table::RowSlot;
use crate::value::Value;

/// Filter over one table's columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column = value`.
    Eq { column: Arc<str>, value: Value },
    /// All terms hold.
    And(Vec<Predicate>),
    /// At least one term holds.
    Or(Vec<Predicate>),
    /// The term does not hold.
    Not(Box<Predicate>),
    /// A term the cache cannot reason about (ranges, functions, ...).
    Opaque,
}

impl Predicate {
    /// `column = value`.
    pub fn eq(column: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        Predicate::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Conjunction of `terms`.
    pub fn and<I: IntoIterator<Item = Predicate>>(terms: I) -> Self {
        Predicate::And(terms.into_iter().collect())
    }

    /// Disjunction of `terms`.
    pub fn or<I: IntoIterator<Item = Predicate>>(terms: I) -> Self {
        Predicate::Or(terms.into_iter().collect())
    }

    /// Negation of `term`.
    pub fn not(term: Predicate) -> Self {
        Predicate::Not(Box::new(term))
    }
}

/// What a predicate means for the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly the row with this primary key.
    PrimaryKey(Key),
    /// The rows in one secondary index bucket.
    Index { column: Arc<str>, key: Key },
    /// Not answerable from the cache.
    Unresolved,
}

/// What the cache holds for a predicate.
#[derive(Debug, Clone)]
pub enum CacheProbe {
    /// The row with the resolved primary key is cached.
    Hit(Arc<RowSlot>),
    /// The predicate names this key but the row is not cached.
    Miss(Key),
    /// Cached rows in the resolved index bucket. Rows that were never
    /// materialized are not listed.
    Related(Vec<Arc<RowSlot>>),
    /// The predicate could not be resolved.
    Unresolved,
}

/// Resolve `predicate` against `schema`.
pub fn resolve(schema: &TableSchema, predicate: &Predicate) -> Resolution {
    let mut terms = Vec::new();
    if !flatten_conjunction(predicate, &mut terms) || terms.is_empty() {
        return Resolution::Unresolved;
    }

    // Column position -> bound value. A column bound twice must agree.
    let mut bound: Vec<Option<&Value>> = vec![None; schema.column_count()];
    for &(column, value) in &terms {
        let Ok(pos) = schema.column_index(column) else {
            return Resolution::Unresolved;
        };
        if bound[pos].is_some_and(|existing| existing != value) {
            return Resolution::Unresolved;
        }
        bound[pos] = Some(value);
    }

    if let Some(key) = primary_key(schema, &bound) {
        return Resolution::PrimaryKey(key);
    }

    let mut bound_columns = bound.iter().enumerate().filter(|(_, v)| v.is_some());
    if let (Some((pos, Some(value))), None) = (bound_columns.next(), bound_columns.next()) {
        let column = &schema.columns()[pos];
        if column.indexed && !value.is_null() {
            if let Ok(key) = KeyFactory::from_value(value) {
                return Resolution::Index {
                    column: Arc::clone(&column.name),
                    key,
                };
            }
        }
    }

    Resolution::Unresolved
}

/// Collect the equalities of a pure AND tree. False if anything else appears.
fn flatten_conjunction<'a>(predicate: &'a Predicate, out: &mut Vec<(&'a str, &'a Value)>) -> bool {
    match predicate {
        Predicate::Eq { column, value } => {
            out.push((column.as_ref(), value));
            true
        }
        Predicate::And(terms) => terms.iter().all(|t| flatten_conjunction(t, out)),
        Predicate::Or(_) | Predicate::Not(_) | Predicate::Opaque => false,
    }
}

/// Key of the row pinned by `bound`, when the bindings cover exactly the
/// primary-key columns.
fn primary_key(schema: &TableSchema, bound: &[Option<&Value>]) -> Option<Key> {
    let pk = schema.primary_key();
    let bound_count = bound.iter().filter(|v| v.is_some()).count();
    if bound_count != pk.len() {
        return None;
    }
    let values = pk
        .iter()
        .map(|&i| bound[i].cloned())
        .collect::<Option<Vec<Value>>>()?;
    KeyFactory::from_values(&values).ok()
}
