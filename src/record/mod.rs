//! Active-record engine.
//!
//! A table is declared by implementing [`Table`] on a marker type. Rows are
//! handled as [`Record`]s, which keep the last persisted values next to the
//! current ones so that [`Record::save`] only writes what changed.
//! Multi-row loads produce a [`RecordSet`] that owns a cursor.
//!
//! ```rust,ignore
//! mod shop {
//!     use argos_data::record::{FieldPermission, Table};
//!
//!     pub struct Orders;
//!     impl Table for Orders {
//!         fn field_permissions() -> Vec<(&'static str, FieldPermission)> {
//!             vec![("total", FieldPermission::ReadOnly)]
//!         }
//!     }
//! }
//! // Resolves to `shop`.`orders` with primary key `id`.
//! ```

mod criteria;
mod row;
mod set;

pub use criteria::{Criteria, LoadOptions, OrderBy, SortDirection};
pub use row::{Record, RowStatus};
pub use set::RecordSet;

use crate::cache::CacheBackendKind;
use crate::sql::qualified_table;
use crate::{Error, Result};
use std::fmt;

/// Access level of one column through [`Record::get`] / [`Record::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FieldPermission {
    /// Readable and writable.
    #[default]
    ReadWrite,
    /// Readable only.
    ReadOnly,
    /// Neither readable nor writable.
    NoAccess,
}

/// Declares a table.
///
/// Every item has a default; an empty `impl Table for X {}` is a table named
/// after `X` in a schema named after the enclosing module, keyed by `id`.
pub trait Table {
    /// Schema (attached database) name override.
    const DATABASE: Option<&'static str> = None;
    /// Table name override.
    const TABLE: Option<&'static str> = None;
    /// Primary-key column.
    const PK: &'static str = "id";
    /// Column set to the database time on insert.
    const CREATED_COLUMN: Option<&'static str> = Some("date_added");
    /// Column set to the database time on every write.
    const MODIFIED_COLUMN: Option<&'static str> = Some("date_modified");
    /// Cache used by loads that do not name one.
    const DEFAULT_CACHE: Option<CacheBackendKind> = None;
    /// TTL used by loads that do not give one.
    const DEFAULT_CACHE_TTL: Option<u64> = None;

    /// Per-column permissions. Unlisted columns are read-write.
    #[must_use]
    fn field_permissions() -> Vec<(&'static str, FieldPermission)> {
        Vec::new()
    }
}

/// Resolved schema, table and primary key of a [`Table`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableIdentity {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Primary-key column.
    pub pk: &'static str,
}

impl TableIdentity {
    /// Resolves the identity of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContractViolation`] if no schema or table name can
    /// be established.
    pub fn of<T: Table + ?Sized>() -> Result<Self> {
        let (derived_schema, derived_table) = derive_names(std::any::type_name::<T>());
        let schema = T::DATABASE.map_or(derived_schema, str::to_string);
        let table = T::TABLE.map_or(derived_table, str::to_string);

        if schema.is_empty() || table.is_empty() || T::PK.is_empty() {
            return Err(Error::ContractViolation(format!(
                "table identity of {} is incomplete (schema '{schema}', table '{table}', pk '{}')",
                std::any::type_name::<T>(),
                T::PK
            )));
        }
        Ok(Self {
            schema,
            table,
            pk: T::PK,
        })
    }

    /// `` `schema`.`table` ``
    #[must_use]
    pub fn qualified(&self) -> String {
        qualified_table(&self.schema, &self.table)
    }
}

impl fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Permission of `column` in `T`.
#[must_use]
pub fn permission_of<T: Table + ?Sized>(column: &str) -> FieldPermission {
    T::field_permissions()
        .into_iter()
        .find(|(c, _)| *c == column)
        .map_or(FieldPermission::ReadWrite, |(_, p)| p)
}

/// Splits a type path into `(schema, table)`.
///
/// The last module segment is the schema (`main` at a crate root) and the
/// type name in snake case is the table. Generic arguments are ignored.
fn derive_names(type_path: &str) -> (String, String) {
    let path = type_path.split('<').next().unwrap_or(type_path);
    let mut segments = path.rsplit("::");
    let type_name = segments.next().unwrap_or_default();
    let schema = segments.next().unwrap_or("main");
    (schema.to_string(), to_snake_case(type_name))
}

/// `UserGroups` -> `user_groups`, `HTTPLog` -> `http_log`.
#[must_use]
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if i > 0 && (prev_lower || (prev_upper && next_lower)) && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
