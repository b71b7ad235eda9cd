//! Ordered collections of records with a cursor.

use super::row::fetch_rows;
use super::{Criteria, LoadOptions, Record, RowStatus, Table};
use crate::db::{Database, Row};
use crate::sql::{FieldValue, Value};
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// Rows of table `T` in load order, addressed by primary key.
///
/// A load that matches nothing yields an empty set: [`valid`](Self::valid)
/// is false and [`count`](Self::count) is 0.
pub struct RecordSet<T: Table> {
    rows: Vec<Record<T>>,
    cursor: usize,
}

impl<T: Table> RecordSet<T> {
    /// Loads every row matching `criteria` (subject to `options.limit`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContractViolation`] if the table identity of `T`
    /// cannot be resolved.
    #[tracing::instrument(level = "debug", skip(db), fields(table = std::any::type_name::<T>()))]
    pub fn load(db: &Arc<Database>, criteria: &Criteria, options: &LoadOptions) -> Result<Self> {
        let rows = fetch_rows::<T>(db, criteria, options)?;
        Ok(Self {
            rows: rows.into_iter().map(|row| Record::from_row(db, row)).collect(),
            cursor: 0,
        })
    }

    /// Adopts rows fetched by a custom query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContractViolation`] if more than one row lacks a
    /// primary key.
    pub fn from_rows(db: &Arc<Database>, rows: Vec<Row>) -> Result<Self> {
        Self::from_records(rows.into_iter().map(|row| Record::from_row(db, row)).collect())
    }

    /// Wraps already-built records.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContractViolation`] if more than one record is new.
    pub fn from_records(rows: Vec<Record<T>>) -> Result<Self> {
        let new_rows = rows.iter().filter(|r| r.status() == RowStatus::New).count();
        if new_rows > 1 {
            return Err(Error::ContractViolation(format!(
                "a record set of {} can hold at most one new row, {new_rows} given",
                std::any::type_name::<T>()
            )));
        }
        Ok(Self { rows, cursor: 0 })
    }

    /// Record under the cursor.
    #[must_use]
    pub fn current(&self) -> Option<&Record<T>> {
        self.rows.get(self.cursor)
    }

    /// Mutable record under the cursor.
    pub fn current_mut(&mut self) -> Option<&mut Record<T>> {
        self.rows.get_mut(self.cursor)
    }

    /// Advances the cursor. Returns whether it now points at a row.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        if self.cursor < self.rows.len() {
            self.cursor += 1;
        }
        self.valid()
    }

    /// Moves the cursor back. Returns whether it now points at a row.
    pub fn prev(&mut self) -> bool {
        if self.cursor == 0 {
            // Before the first row.
            self.cursor = self.rows.len();
        } else {
            self.cursor -= 1;
        }
        self.valid()
    }

    /// Moves the cursor to the first row.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// True while the cursor points at a valid row.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.current().is_some_and(Record::valid)
    }

    /// Number of rows.
    #[must_use]
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    /// Moves the cursor to the row with primary key `pk` and returns it.
    pub fn get(&mut self, pk: impl Into<FieldValue>) -> Option<&mut Record<T>> {
        let index = self.position(&pk.into())?;
        self.cursor = index;
        self.rows.get_mut(index)
    }

    /// True if a row with primary key `pk` is present.
    #[must_use]
    pub fn contains(&self, pk: impl Into<FieldValue>) -> bool {
        self.position(&pk.into()).is_some()
    }

    fn position(&self, pk: &FieldValue) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| r.pk().is_some_and(|key| key.loosely_equals(pk)))
    }

    /// Primary keys in order; rows without one are skipped.
    #[must_use]
    pub fn keys(&self) -> Vec<Value> {
        self.rows
            .iter()
            .filter_map(|r| r.pk().and_then(FieldValue::as_value).cloned())
            .collect()
    }

    /// Iterates the rows without moving the cursor.
    pub fn iter(&self) -> std::slice::Iter<'_, Record<T>> {
        self.rows.iter()
    }

    /// Iterates the rows mutably without moving the cursor.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Record<T>> {
        self.rows.iter_mut()
    }

    /// Saves every row in order. The cursor does not move.
    ///
    /// # Errors
    ///
    /// Stops at the first contract violation.
    pub fn save_all(&mut self, async_write: bool) -> Result<Vec<Option<Value>>> {
        let mut keys = Vec::with_capacity(self.rows.len());
        for row in &mut self.rows {
            keys.push(row.save(async_write)?);
        }
        Ok(keys)
    }

    /// Consumes the set into its records.
    #[must_use]
    pub fn into_records(self) -> Vec<Record<T>> {
        self.rows
    }
}

impl<'a, T: Table> IntoIterator for &'a RecordSet<T> {
    type Item = &'a Record<T>;
    type IntoIter = std::slice::Iter<'a, Record<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Table> fmt::Debug for RecordSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordSet")
            .field("table", &std::any::type_name::<T>())
            .field("count", &self.rows.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}
