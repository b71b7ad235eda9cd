//! A single table row.

use super::criteria::select_sql;
use super::{Criteria, FieldPermission, LoadOptions, Table, TableIdentity, permission_of};
use crate::db::{Database, Row};
use crate::sql::{FieldValue, Value, render_assignments, render_insert_values, quote_identifier};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Lifecycle state of a [`Record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    /// Not yet inserted.
    New,
    /// A load matched nothing.
    NotFound,
    /// Mirrors a stored row.
    Persisted,
}

/// One row of table `T`.
///
/// `current` holds buffered edits; `original` the values as last read from
/// or written to the database. `original` is only replaced after a
/// successful save.
pub struct Record<T: Table> {
    db: Arc<Database>,
    current: BTreeMap<String, FieldValue>,
    original: BTreeMap<String, FieldValue>,
    status: RowStatus,
    table: PhantomData<fn() -> T>,
}

impl<T: Table> Record<T> {
    /// A new, empty row.
    #[must_use]
    pub fn new(db: &Arc<Database>) -> Self {
        Self::with_status(db, RowStatus::New)
    }

    fn with_status(db: &Arc<Database>, status: RowStatus) -> Self {
        Self {
            db: Arc::clone(db),
            current: BTreeMap::new(),
            original: BTreeMap::new(),
            status,
            table: PhantomData,
        }
    }

    /// Loads the row whose primary key equals `pk`.
    ///
    /// A missing row is not an error: the record's [`valid`](Self::valid) is
    /// false.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContractViolation`] if the table identity of `T`
    /// cannot be resolved.
    pub fn load(db: &Arc<Database>, pk: impl Into<FieldValue>) -> Result<Self> {
        Self::load_by(db, Criteria::by(T::PK, pk), &LoadOptions::default())
    }

    /// Loads the first row matching `criteria`.
    ///
    /// # Errors
    ///
    /// See [`Record::load`].
    #[tracing::instrument(level = "debug", skip(db), fields(table = std::any::type_name::<T>()))]
    pub fn load_by(db: &Arc<Database>, criteria: Criteria, options: &LoadOptions) -> Result<Self> {
        let options = LoadOptions {
            limit: Some(1),
            ..options.clone()
        };
        let rows = fetch_rows::<T>(db, &criteria, &options)?;
        Ok(rows.into_iter().next().map_or_else(
            || Self::with_status(db, RowStatus::NotFound),
            |row| Self::from_row(db, row),
        ))
    }

    /// Adopts a row fetched by a custom query.
    ///
    /// With a non-empty primary key the record is treated as persisted;
    /// otherwise it is new.
    #[must_use]
    pub fn from_row(db: &Arc<Database>, row: Row) -> Self {
        Self::from_data(
            db,
            row.into_pairs()
                .into_iter()
                .map(|(column, value)| (column, FieldValue::Value(value))),
        )
    }

    /// Adopts column values from any source.
    #[must_use]
    pub fn from_data<I, K>(db: &Arc<Database>, data: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldValue)>,
        K: Into<String>,
    {
        let current: BTreeMap<String, FieldValue> =
            data.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let persisted = current.get(T::PK).is_some_and(|pk| !pk.is_empty());
        let (original, status) = if persisted {
            (current.clone(), RowStatus::Persisted)
        } else {
            (BTreeMap::new(), RowStatus::New)
        };
        Self {
            db: Arc::clone(db),
            current,
            original,
            status,
            table: PhantomData,
        }
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn status(&self) -> RowStatus {
        self.status
    }

    /// True unless a load matched nothing.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.status != RowStatus::NotFound
    }

    /// True until the row has been inserted.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.status != RowStatus::Persisted
    }

    /// The database this row reads from and writes to.
    #[must_use]
    pub const fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Current primary-key value, if set.
    #[must_use]
    pub fn pk(&self) -> Option<&FieldValue> {
        self.current.get(T::PK).filter(|pk| !pk.is_empty())
    }

    /// Reads a column.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContractViolation`] for a no-access column.
    pub fn get(&self, column: &str) -> Result<Option<&FieldValue>> {
        if permission_of::<T>(column) == FieldPermission::NoAccess {
            return Err(Error::ContractViolation(format!(
                "column `{column}` of {} is not publicly accessible",
                std::any::type_name::<T>()
            )));
        }
        Ok(self.current.get(column))
    }

    /// Reads a column's literal value; expressions and unset columns are `None`.
    ///
    /// # Errors
    ///
    /// See [`Record::get`].
    pub fn value(&self, column: &str) -> Result<Option<&Value>> {
        Ok(self.get(column)?.and_then(FieldValue::as_value))
    }

    /// Buffers a write. Nothing reaches the database until [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContractViolation`] for a read-only or no-access column.
    pub fn set(&mut self, column: &str, value: impl Into<FieldValue>) -> Result<()> {
        match permission_of::<T>(column) {
            FieldPermission::ReadWrite => {},
            denied => {
                return Err(Error::ContractViolation(format!(
                    "column `{column}` of {} is {} and cannot be set",
                    std::any::type_name::<T>(),
                    if denied == FieldPermission::ReadOnly {
                        "read-only"
                    } else {
                        "not publicly accessible"
                    }
                )));
            },
        }
        if self.status == RowStatus::NotFound {
            self.status = RowStatus::New;
        }
        self.current.insert(column.to_string(), value.into());
        Ok(())
    }

    /// All current values, without no-access columns.
    #[must_use]
    pub fn data(&self) -> BTreeMap<String, FieldValue> {
        self.current
            .iter()
            .filter(|(column, _)| permission_of::<T>(column) != FieldPermission::NoAccess)
            .map(|(c, v)| (c.clone(), v.clone()))
            .collect()
    }

    /// Columns whose current value differs from the last persisted one.
    /// The primary key is never part of the change set.
    #[must_use]
    pub fn changes(&self) -> Vec<(String, FieldValue)> {
        self.current
            .iter()
            .filter(|(column, _)| column.as_str() != T::PK)
            .filter(|(column, value)| {
                self.original
                    .get(column.as_str())
                    .is_none_or(|original| !original.loosely_equals(value))
            })
            .map(|(c, v)| (c.clone(), v.clone()))
            .collect()
    }

    /// True if [`changes`](Self::changes) is non-empty.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.changes().is_empty()
    }

    /// Inserts or updates the row.
    ///
    /// A new row (or one without a primary key) is inserted with every
    /// current column plus the created/modified timestamps, then re-read
    /// from the write connection so server defaults are visible. A persisted
    /// row writes only its [`changes`](Self::changes) plus the modified
    /// timestamp; with no changes nothing is written.
    ///
    /// Returns the primary key, or `None` when the database rejected the
    /// write. `async_write` is accepted for callers that request a
    /// low-priority write; `SQLite` runs the same statement either way.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContractViolation`] if the table identity cannot be
    /// resolved or the primary key is not a literal value.
    #[tracing::instrument(level = "debug", skip(self), fields(table = std::any::type_name::<T>()))]
    pub fn save(&mut self, async_write: bool) -> Result<Option<Value>> {
        let identity = TableIdentity::of::<T>()?;
        if self.status == RowStatus::Persisted && self.pk().is_some() {
            self.update(&identity)
        } else {
            self.insert(&identity)
        }
    }

    fn insert(&mut self, identity: &TableIdentity) -> Result<Option<Value>> {
        let mut fields: Vec<(String, FieldValue)> = self
            .current
            .iter()
            .map(|(c, v)| (c.clone(), v.clone()))
            .collect();
        for column in [T::CREATED_COLUMN, T::MODIFIED_COLUMN].into_iter().flatten() {
            if !self.current.contains_key(column) {
                fields.push((column.to_string(), FieldValue::Now));
            }
        }

        let sql = match render_insert_values(&fields) {
            Some((columns, values)) => format!(
                "INSERT INTO {} ({columns}) VALUES ({values})",
                identity.qualified()
            ),
            None => format!("INSERT INTO {} DEFAULT VALUES", identity.qualified()),
        };

        let result = self.db.query(&sql);
        if !result.success {
            record_save("insert", "error");
            return Ok(None);
        }

        let pk = match self.pk() {
            Some(pk) => literal_pk(pk)?,
            None => Value::Integer(result.insert_id),
        };

        let reload = LoadOptions::default().from_write_master();
        let mut rows = fetch_rows::<T>(&self.db, &Criteria::by(identity.pk, pk.clone()), &reload)?;
        if let Some(row) = rows.pop() {
            self.current = row
                .into_pairs()
                .into_iter()
                .map(|(column, value)| (column, FieldValue::Value(value)))
                .collect();
        } else {
            tracing::warn!(table = %identity, pk = %pk, "inserted row could not be re-read");
            self.current
                .insert(identity.pk.to_string(), FieldValue::Value(pk.clone()));
        }
        self.original = self.current.clone();
        self.status = RowStatus::Persisted;
        record_save("insert", "success");
        Ok(Some(pk))
    }

    fn update(&mut self, identity: &TableIdentity) -> Result<Option<Value>> {
        let pk = match self.pk() {
            Some(pk) => literal_pk(pk)?,
            None => return Ok(None),
        };

        let mut changes = self.changes();
        if changes.is_empty() {
            record_save("noop", "success");
            return Ok(Some(pk));
        }
        if let Some(modified) = T::MODIFIED_COLUMN
            && !changes.iter().any(|(c, _)| c == modified)
        {
            changes.push((modified.to_string(), FieldValue::Now));
        }

        let Some(assignments) = render_assignments(&changes) else {
            return Ok(Some(pk));
        };
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE {} = {}",
            identity.qualified(),
            quote_identifier(identity.pk),
            pk.to_sql_literal()
        );

        if !self.db.query(&sql).success {
            record_save("update", "error");
            return Ok(None);
        }
        self.original = self.current.clone();
        record_save("update", "success");
        Ok(Some(pk))
    }
}

fn literal_pk(pk: &FieldValue) -> Result<Value> {
    pk.as_value().cloned().ok_or_else(|| {
        Error::ContractViolation(format!("primary key must be a literal value, got {pk}"))
    })
}

fn record_save(kind: &'static str, status: &'static str) {
    metrics::counter!("record_saves_total", "kind" => kind, "status" => status).increment(1);
}

/// Runs a load for table `T` through the router's select path.
pub(crate) fn fetch_rows<T: Table>(
    db: &Database,
    criteria: &Criteria,
    options: &LoadOptions,
) -> Result<Vec<Row>> {
    let identity = TableIdentity::of::<T>()?;
    let sql = select_sql(&identity, criteria, options);
    if options.use_write_master {
        db.set_select_mode_master(true);
        return Ok(db.select_all(&sql, None, None));
    }
    let cache = options.cache.or(T::DEFAULT_CACHE);
    let ttl = options.ttl.or(T::DEFAULT_CACHE_TTL);
    Ok(db.select_all(&sql, cache, ttl))
}

impl<T: Table> fmt::Debug for Record<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("table", &std::any::type_name::<T>())
            .field("status", &self.status)
            .field("data", &self.data())
            .finish_non_exhaustive()
    }
}
