//! Prepared statements with accumulated typed binds.

use crate::sql::{Value, collapse_whitespace};
use crate::sqlite::acquire_lock;
use crate::{Error, Result};
use rusqlite::{Connection, params_from_iter};
use std::sync::{Arc, Mutex};

/// A statement prepared against the write connection.
///
/// Binds accumulate in call order and are cleared by every
/// [`execute`](Self::execute), successful or not.
pub struct PreparedStatement {
    conn: Arc<Mutex<Connection>>,
    sql: String,
    parameter_count: usize,
    binds: Vec<Value>,
    insert_id: Option<i64>,
    affected: usize,
}

impl PreparedStatement {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>, sql: String, parameter_count: usize) -> Self {
        Self {
            conn,
            sql,
            parameter_count,
            binds: Vec::new(),
            insert_id: None,
            affected: 0,
        }
    }

    /// Binds an integer.
    pub fn bind_int(&mut self, value: i64) -> &mut Self {
        self.binds.push(Value::Integer(value));
        self
    }

    /// Binds a float.
    pub fn bind_float(&mut self, value: f64) -> &mut Self {
        self.binds.push(Value::Real(value));
        self
    }

    /// Binds a string.
    pub fn bind_str(&mut self, value: impl Into<String>) -> &mut Self {
        self.binds.push(Value::Text(value.into()));
        self
    }

    /// Binds raw bytes.
    pub fn bind_blob(&mut self, value: impl Into<Vec<u8>>) -> &mut Self {
        self.binds.push(Value::Blob(value.into()));
        self
    }

    /// Binds `NULL`.
    pub fn bind_null(&mut self) -> &mut Self {
        self.binds.push(Value::Null);
        self
    }

    /// Number of placeholders in the statement.
    #[must_use]
    pub const fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    /// Number of values bound since the last execute.
    #[must_use]
    pub fn bound(&self) -> usize {
        self.binds.len()
    }

    /// Runs the statement with the accumulated binds.
    ///
    /// Returns `Ok(false)` (and logs) when the database rejects it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContractViolation`] when the number of binds differs
    /// from the number of placeholders. The binds are cleared either way.
    pub fn execute(&mut self) -> Result<bool> {
        let binds = std::mem::take(&mut self.binds);
        if binds.len() != self.parameter_count {
            return Err(Error::ContractViolation(format!(
                "statement expects {} bind(s), {} given: {}",
                self.parameter_count,
                binds.len(),
                collapse_whitespace(&self.sql)
            )));
        }

        let conn = acquire_lock(&self.conn);
        let outcome = conn.prepare_cached(&self.sql).and_then(|mut stmt| {
            if stmt.column_count() > 0 {
                let mut rows = stmt.query(params_from_iter(binds.iter()))?;
                let mut count = 0;
                while rows.next()?.is_some() {
                    count += 1;
                }
                Ok(count)
            } else {
                stmt.execute(params_from_iter(binds.iter()))
            }
        });

        match outcome {
            Ok(affected) => {
                self.affected = affected;
                self.insert_id = Some(conn.last_insert_rowid());
                Ok(true)
            },
            Err(e) => {
                tracing::warn!(
                    sql = %collapse_whitespace(&self.sql),
                    error = %e,
                    "prepared statement failed"
                );
                self.affected = 0;
                Ok(false)
            },
        }
    }

    /// Row id of the last row inserted through this statement's connection.
    #[must_use]
    pub const fn insert_id(&self) -> Option<i64> {
        self.insert_id
    }

    /// Rows changed (or returned) by the last execute.
    #[must_use]
    pub const fn affected_rows(&self) -> usize {
        self.affected
    }
}

impl std::fmt::Debug for PreparedStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("sql", &self.sql)
            .field("parameter_count", &self.parameter_count)
            .field("bound", &self.binds.len())
            .finish_non_exhaustive()
    }
}
