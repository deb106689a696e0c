//! Table schema descriptors.
//!
//! The cache does not extract schema metadata itself. Whatever owns the
//! mapping builds one [`TableSchema`] per table: the column list, which
//! columns carry a secondary index, and the ordered primary-key columns that
//! decide between single and composite keys.

use std::collections::HashSet;
use std::sync::Arc;

use crate::key::{Key, KeyFactory};
use crate::value::Value;
use crate::{Error, Result};

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: Arc<str>,
    /// Whether a secondary index is maintained for this column.
    pub indexed: bool,
}

/// Immutable description of a cached table.
#[derive(Debug, Clone)]
pub struct TableSchema {
    name: Arc<str>,
    columns: Vec<ColumnDef>,
    primary_key: Vec<usize>,
}

impl TableSchema {
    /// Start building a schema for `name`.
    pub fn builder(name: impl Into<Arc<str>>) -> TableSchemaBuilder {
        TableSchemaBuilder {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    /// Table name.
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// All columns in row order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Positions of the primary-key columns, in key order.
    pub fn primary_key(&self) -> &[usize] {
        &self.primary_key
    }

    /// Check if the primary key spans more than one column.
    pub fn has_composite_key(&self) -> bool {
        self.primary_key.len() > 1
    }

    /// Position of a column by name.
    pub fn column_index(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| &*c.name == column)
            .ok_or_else(|| Error::ColumnNotFound {
                table: self.name.to_string(),
                column: column.to_string(),
            })
    }

    /// Positions of every indexed column.
    pub fn indexed_columns(&self) -> impl Iterator<Item = usize> + '_ {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.indexed)
            .map(|(i, _)| i)
    }

    /// Check that a row has one value per column.
    pub fn check_row(&self, values: &[Value]) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(Error::RowShapeMismatch {
                table: self.name.to_string(),
                expected: self.columns.len(),
                actual: values.len(),
            });
        }
        Ok(())
    }

    /// Build the primary key of a full row.
    pub fn key_for(&self, values: &[Value]) -> Result<Key> {
        self.check_row(values)?;
        let pk: Vec<Value> = self
            .primary_key
            .iter()
            .map(|&i| values[i].clone())
            .collect();
        KeyFactory::from_values(&pk)
    }
}

/// Builder for [`TableSchema`].
#[derive(Debug, Clone)]
pub struct TableSchemaBuilder {
    name: Arc<str>,
    columns: Vec<ColumnDef>,
    primary_key: Vec<Arc<str>>,
}

impl TableSchemaBuilder {
    /// Add an unindexed column.
    pub fn column(mut self, name: impl Into<Arc<str>>) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            indexed: false,
        });
        self
    }

    /// Add a column with a secondary index.
    ///
    /// Rows whose value in this column is NULL or a float are cached but
    /// left out of the index.
    pub fn indexed_column(mut self, name: impl Into<Arc<str>>) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            indexed: true,
        });
        self
    }

    /// Set the primary-key columns, in key order.
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Validate and build the schema.
    pub fn build(self) -> Result<TableSchema> {
        if self.name.is_empty() {
            return Err(Error::invalid_schema("table name is empty"));
        }
        if self.columns.is_empty() {
            return Err(Error::invalid_schema(format!(
                "table {} has no columns",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.clone()) {
                return Err(Error::invalid_schema(format!(
                    "table {} declares column {} twice",
                    self.name, column.name
                )));
            }
        }

        if self.primary_key.is_empty() {
            return Err(Error::invalid_schema(format!(
                "table {} has no primary key",
                self.name
            )));
        }

        let mut primary_key = Vec::with_capacity(self.primary_key.len());
        for pk in &self.primary_key {
            let idx = self
                .columns
                .iter()
                .position(|c| c.name == *pk)
                .ok_or_else(|| {
                    Error::invalid_schema(format!(
                        "primary key column {}.{} does not exist",
                        self.name, pk
                    ))
                })?;
            if primary_key.contains(&idx) {
                return Err(Error::invalid_schema(format!(
                    "primary key of {} repeats column {}",
                    self.name, pk
                )));
            }
            primary_key.push(idx);
        }

        Ok(TableSchema {
            name: self.name,
            columns: self.columns,
            primary_key,
        })
    }
}
