//! SQL fragment builders.
//!
//! Small value objects and helpers that render SQL safely:
//!
//! - [`Value`] / [`FieldValue`]: literals and the raw-fragment values a record
//!   field or predicate may hold
//! - [`Expression`]: verbatim fragments (function calls, date arithmetic)
//! - [`Comparison`]: operators that replace `=` in a predicate
//!
//! Generated statements use backtick-quoted identifiers and single-quoted,
//! escaped string literals.

mod comparison;
mod expression;
mod value;

pub use comparison::{Comparison, ComparisonOp, Operand};
pub use expression::{DateUnit, Expression};
pub use value::{FieldValue, SQL_COMMAND_NOW, Value};

/// Escapes a string for inclusion inside a single-quoted SQL literal.
///
/// Doubles single quotes and strips NUL bytes, which `SQLite` would treat as
/// a string terminator.
#[must_use]
pub fn escape_val(input: &str) -> String {
    input.replace('\0', "").replace('\'', "''")
}

/// Escapes an identifier for inclusion inside backticks.
#[must_use]
pub fn escape_identifier(input: &str) -> String {
    input.replace('\0', "").replace('`', "``")
}

/// Renders `` `name` ``.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", escape_identifier(name))
}

/// Renders `` `schema`.`table` ``.
#[must_use]
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(table))
}

/// Collapses newlines and runs of whitespace into single spaces.
#[must_use]
pub fn collapse_whitespace(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Renders a `SET` list: `` `a` = 'x', `b` = CURRENT_TIMESTAMP ``.
///
/// Returns `None` when there is nothing to assign.
#[must_use]
pub fn render_assignments(pairs: &[(String, FieldValue)]) -> Option<String> {
    if pairs.is_empty() {
        return None;
    }
    let rendered: Vec<String> = pairs
        .iter()
        .map(|(column, value)| match value {
            FieldValue::Comparison(c) => format!("{} {c}", quote_identifier(column)),
            other => format!("{} = {}", quote_identifier(column), other.to_sql()),
        })
        .collect();
    Some(rendered.join(", "))
}

/// Renders an `AND`-joined predicate.
///
/// Literals compare with `=`, `NULL` with `IS NULL`, and comparisons supply
/// their own operator. Returns `None` for an empty predicate.
#[must_use]
pub fn render_conditions(pairs: &[(String, FieldValue)]) -> Option<String> {
    if pairs.is_empty() {
        return None;
    }
    let rendered: Vec<String> = pairs
        .iter()
        .map(|(column, value)| {
            let column = quote_identifier(column);
            match value {
                FieldValue::Comparison(c) => format!("{column} {c}"),
                v if v.is_null() => format!("{column} IS NULL"),
                v => format!("{column} = {}", v.to_sql()),
            }
        })
        .collect();
    Some(rendered.join(" AND "))
}

/// Renders the column list and `VALUES` tuple of an `INSERT`.
///
/// Returns `None` when there are no columns.
#[must_use]
pub fn render_insert_values(pairs: &[(String, FieldValue)]) -> Option<(String, String)> {
    if pairs.is_empty() {
        return None;
    }
    let columns: Vec<String> = pairs.iter().map(|(c, _)| quote_identifier(c)).collect();
    let values: Vec<String> = pairs.iter().map(|(_, v)| v.to_sql()).collect();
    Some((columns.join(", "), values.join(", ")))
}
