//! Column values and the values a caller may place in a row or a predicate.

use super::{Comparison, Expression, escape_val};
use chrono::{DateTime, Utc};
use rusqlite::types::{ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved token meaning "use the database's current-time function".
///
/// A text value equal to this token is rendered as `CURRENT_TIMESTAMP`
/// instead of a quoted literal.
pub const SQL_COMMAND_NOW: &str = "{{SQL_COMMAND_NOW}}";

/// A value stored in (or read from) a column.
///
/// Mirrors the `SQLite` storage classes. Serialized untagged so cached result
/// sets stay compact JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl Value {
    /// Returns true for SQL `NULL`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true for `NULL` or an empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            Self::Blob(b) => b.is_empty(),
            Self::Integer(_) | Self::Real(_) => false,
        }
    }

    /// Returns the integer value, parsing text when it holds a decimal integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the float value of numeric or numeric-text values.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Real(f) => Some(*f),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Textual form used for loose comparison and key rendering.
    fn text_form(&self) -> Option<String> {
        match self {
            Self::Null | Self::Blob(_) => None,
            Self::Integer(i) => Some(i.to_string()),
            Self::Real(f) => Some(f.to_string()),
            Self::Text(s) => Some(s.clone()),
        }
    }

    /// Compares two values the way the change-set diff does.
    ///
    /// Identical storage classes compare exactly. Across classes, numbers and
    /// text are equal when their textual forms match (`5` equals `"5"`), and
    /// numbers compare numerically (`5` equals `5.0`). `NULL` equals only
    /// `NULL`.
    #[must_use]
    pub fn loosely_equals(&self, other: &Self) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => false,
            (Self::Integer(_) | Self::Real(_), Self::Integer(_) | Self::Real(_)) => {
                self.as_f64() == other.as_f64()
            },
            _ => match (self.text_form(), other.text_form()) {
                (Some(a), Some(b)) => {
                    a == b
                        || matches!((self.as_f64(), other.as_f64()), (Some(x), Some(y)) if x == y)
                },
                _ => false,
            },
        }
    }

    /// Renders the value as an escaped SQL literal.
    ///
    /// Numbers stay bare so that columns without a declared type keep their
    /// storage class. Non-finite reals have no SQL literal and are quoted.
    #[must_use]
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Real(r) if r.is_finite() => format!("{r:?}"),
            Self::Blob(bytes) => format!("X'{}'", hex::encode(bytes)),
            Self::Text(s) if s == SQL_COMMAND_NOW => Expression::NOW_SQL.to_string(),
            other => format!("'{}'", escape_val(&other.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Text(s) => f.write_str(s),
            Self::Blob(b) => write!(f, "{}", hex::encode(b)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(f) => Self::Real(f),
            ValueRef::Text(t) => Self::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Self::Blob(b.to_vec()),
        }
    }
}

impl rusqlite::ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Self::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Self::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Self::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

/// A value placed in a record field or a load predicate.
///
/// Plain [`Value`]s are escaped and quoted. The other variants are embedded
/// as raw SQL fragments.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A literal, escaped and quoted on render.
    Value(Value),
    /// The database's current-time function.
    Now,
    /// A point in time, rendered as a UTC `'YYYY-MM-DD HH:MM:SS'` literal.
    DateTime(DateTime<Utc>),
    /// A pre-built SQL expression.
    Expression(Expression),
    /// A pre-built comparison; in a predicate it replaces the `=` operator.
    Comparison(Comparison),
}

impl FieldValue {
    /// Returns the literal value, if this is one.
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Returns true for a `NULL` literal.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Value(Value::Null))
    }

    /// Returns true when the value is empty the way a missing primary key is.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Value(v) => v.is_empty() || matches!(v, Value::Integer(0)),
            _ => false,
        }
    }

    /// Renders the value as it appears on the right of `=` (or, for
    /// comparisons, as the whole right-hand side).
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Value(v) => v.to_sql_literal(),
            Self::Now => Expression::NOW_SQL.to_string(),
            Self::DateTime(dt) => Expression::date_time(dt).to_string(),
            Self::Expression(e) => e.to_string(),
            Self::Comparison(c) => c.to_string(),
        }
    }

    /// Compares two field values for the change-set diff.
    #[must_use]
    pub fn loosely_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => a.loosely_equals(b),
            (a, b) => a == b,
        }
    }
}

impl Default for FieldValue {
    fn default() -> Self {
        Self::Value(Value::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            other => f.write_str(&other.to_sql()),
        }
    }
}

macro_rules! field_value_from_literal {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(v: $ty) -> Self {
                    Self::Value(Value::from(v))
                }
            }
        )*
    };
}

field_value_from_literal!(i64, i32, u32, bool, f64, &str, String, Vec<u8>);

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        Self::Value(Value::from(v))
    }
}

impl From<Expression> for FieldValue {
    fn from(e: Expression) -> Self {
        Self::Expression(e)
    }
}

impl From<Comparison> for FieldValue {
    fn from(c: Comparison) -> Self {
        Self::Comparison(c)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }
}
