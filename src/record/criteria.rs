//! Load predicates and options.

use super::TableIdentity;
use crate::cache::CacheBackendKind;
use crate::sql::{FieldValue, quote_identifier, render_conditions};

/// An `AND`-joined predicate: `column = value` for literals, `IS NULL` for
/// nulls, or the comparison's own operator.
///
/// ```rust
/// use argos_data::record::Criteria;
/// use argos_data::sql::Comparison;
///
/// let criteria = Criteria::new()
///     .and("status", "open")
///     .and("score", Comparison::gte(10));
/// assert_eq!(
///     criteria.to_sql().unwrap(),
///     "`status` = 'open' AND `score` >= 10"
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pairs: Vec<(String, FieldValue)>,
}

impl Criteria {
    /// An empty predicate (matches every row).
    #[must_use]
    pub const fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// A single-column predicate.
    #[must_use]
    pub fn by(column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new().and(column, value)
    }

    /// Adds a condition.
    #[must_use]
    pub fn and(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.pairs.push((column.into(), value.into()));
        self
    }

    /// Returns true if there are no conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The conditions in insertion order.
    #[must_use]
    pub fn pairs(&self) -> &[(String, FieldValue)] {
        &self.pairs
    }

    /// Renders the `WHERE` body, or `None` when empty.
    #[must_use]
    pub fn to_sql(&self) -> Option<String> {
        render_conditions(&self.pairs)
    }
}

impl From<Vec<(String, FieldValue)>> for Criteria {
    fn from(pairs: Vec<(String, FieldValue)>) -> Self {
        Self { pairs }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// `ORDER BY` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Column to sort on.
    pub column: String,
    /// Direction.
    pub direction: SortDirection,
}

/// Options for [`Record::load_by`](super::Record::load_by) and
/// [`RecordSet::load`](super::RecordSet::load).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Row limit; `None` loads every match. Defaults to 1.
    pub limit: Option<usize>,
    /// Sort order.
    pub order_by: Option<OrderBy>,
    /// Query cache backend; falls back to the table's default.
    pub cache: Option<CacheBackendKind>,
    /// Query cache TTL; falls back to the table's default.
    pub ttl: Option<u64>,
    /// Read this load from the write connection, bypassing the query cache.
    pub use_write_master: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            limit: Some(1),
            order_by: None,
            cache: None,
            ttl: None,
            use_write_master: false,
        }
    }
}

impl LoadOptions {
    /// Options without a row limit.
    #[must_use]
    pub fn all() -> Self {
        Self {
            limit: None,
            ..Self::default()
        }
    }

    /// Sets the row limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Sorts by `column`.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = Some(OrderBy {
            column: column.into(),
            direction,
        });
        self
    }

    /// Caches the underlying query.
    #[must_use]
    pub const fn cached(mut self, kind: CacheBackendKind, ttl: Option<u64>) -> Self {
        self.cache = Some(kind);
        self.ttl = ttl;
        self
    }

    /// Reads from the write connection.
    #[must_use]
    pub const fn from_write_master(mut self) -> Self {
        self.use_write_master = true;
        self
    }
}

/// Renders `SELECT * FROM ... [WHERE] [ORDER BY] [LIMIT]`.
pub(crate) fn select_sql(identity: &TableIdentity, criteria: &Criteria, options: &LoadOptions) -> String {
    let mut sql = format!("SELECT * FROM {}", identity.qualified());
    if let Some(conditions) = criteria.to_sql() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions);
    }
    if let Some(order) = &options.order_by {
        sql.push_str(&format!(
            " ORDER BY {} {}",
            quote_identifier(&order.column),
            order.direction.as_sql()
        ));
    }
    if let Some(limit) = options.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{Comparison, Value};

    fn identity() -> TableIdentity {
        TableIdentity {
            schema: "main".to_string(),
            table: "widgets".to_string(),
            pk: "id",
        }
    }

    #[test]
    fn test_default_select_has_limit_one() {
        let sql = select_sql(&identity(), &Criteria::by("id", 7), &LoadOptions::default());
        assert_eq!(sql, "SELECT * FROM `main`.`widgets` WHERE `id` = 7 LIMIT 1");
    }

    #[test]
    fn test_select_with_order_and_no_limit() {
        let criteria = Criteria::new()
            .and("deleted_at", Value::Null)
            .and("kind", Comparison::in_list(["a", "b"]));
        let options = LoadOptions::all().order_by("name", SortDirection::Desc);
        assert_eq!(
            select_sql(&identity(), &criteria, &options),
            "SELECT * FROM `main`.`widgets` WHERE `deleted_at` IS NULL AND `kind` IN ('a','b') ORDER BY `name` DESC"
        );
    }

    #[test]
    fn test_empty_criteria_has_no_where() {
        let sql = select_sql(&identity(), &Criteria::new(), &LoadOptions::all());
        assert_eq!(sql, "SELECT * FROM `main`.`widgets`");
    }
}
