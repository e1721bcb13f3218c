//! Result rows as returned by a connection provider.

use std::sync::Arc;

use crate::error::ConversionError;
use crate::value::{FromSqlValue, SqlValue};

/// One result row: shared column names plus the row's values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Creates a row. `values` must line up with `columns`.
    #[must_use]
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the value of the first column named `name` (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .map(|i| &self.values[i])
    }

    /// Reads the column at `index` as `T`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConversionError`] if the index is out of range or the
    /// value cannot be coerced.
    pub fn try_get<T: FromSqlValue>(&self, index: usize) -> Result<T, ConversionError> {
        let value = self
            .values
            .get(index)
            .cloned()
            .ok_or(ConversionError {
                expected: "column",
                found: "nothing",
                column: None,
            })?;
        let column = self.columns.get(index).cloned().unwrap_or_default();
        T::from_sql_value(value).map_err(|e| e.with_column(column))
    }

    /// Consumes the row into `(column, value)` pairs.
    pub fn into_pairs(self) -> impl Iterator<Item = (String, SqlValue)> {
        let columns = self.columns;
        self.values
            .into_iter()
            .enumerate()
            .map(move |(i, v)| (columns[i].clone(), v))
    }
}
