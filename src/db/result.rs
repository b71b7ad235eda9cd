//! Query results.

use crate::sql::Value;
use serde::{Deserialize, Serialize};

/// One result row: column names alongside their values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Builds a row. Extra values beyond the column count are dropped.
    #[must_use]
    pub fn new(columns: Vec<String>, mut values: Vec<Value>) -> Self {
        values.truncate(columns.len());
        Self { columns, values }
    }

    /// Value of the named column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Value at a column index.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Column names in result order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in result order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true for a row without columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterates `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Consumes the row into `(column, value)` pairs.
    #[must_use]
    pub fn into_pairs(self) -> Vec<(String, Value)> {
        self.columns.into_iter().zip(self.values).collect()
    }
}

/// Outcome of [`Database::query`](super::Database::query) and
/// [`Database::read`](super::Database::read).
///
/// A failed statement never panics or returns `Err`; `success` is false,
/// `rows` is empty, and `error` carries the backend message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    /// Whether the statement ran.
    pub success: bool,
    /// Result rows, empty for statements without a result set.
    pub rows: Vec<Row>,
    /// Rows changed by the statement, or returned by the query.
    pub affected: usize,
    /// Backend error message on failure.
    pub error: Option<String>,
    /// Row id of the most recent insert on the connection, read while the
    /// statement still held it.
    pub insert_id: i64,
}

impl QueryResult {
    pub(crate) fn ok(rows: Vec<Row>, affected: usize) -> Self {
        Self {
            success: true,
            rows,
            affected,
            error: None,
            insert_id: 0,
        }
    }

    pub(crate) fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            rows: Vec::new(),
            affected: 0,
            error: Some(error.into()),
            insert_id: 0,
        }
    }

    /// Number of rows in the result set.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }
}
