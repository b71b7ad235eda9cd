//! Raw SQL expressions: function calls, date arithmetic, literal dates.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit for [`Expression::date_add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DateUnit {
    /// Calendar years.
    #[default]
    Year,
    /// Calendar months.
    Month,
    /// Days.
    Day,
    /// Hours.
    Hour,
    /// Minutes.
    Minute,
    /// Seconds.
    Second,
}

impl DateUnit {
    /// Returns the `SQLite` date modifier unit.
    #[must_use]
    pub const fn as_modifier(self) -> &'static str {
        match self {
            Self::Year => "years",
            Self::Month => "months",
            Self::Day => "days",
            Self::Hour => "hours",
            Self::Minute => "minutes",
            Self::Second => "seconds",
        }
    }
}

/// A SQL fragment embedded verbatim into generated statements.
///
/// Expressions are never escaped. Build them from trusted input only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expression {
    sql: String,
}

impl Expression {
    /// The database's current-time function.
    pub const NOW_SQL: &'static str = "CURRENT_TIMESTAMP";

    /// Wraps a raw SQL command or expression.
    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }

    /// The database's current time.
    #[must_use]
    pub fn now() -> Self {
        Self::raw(Self::NOW_SQL)
    }

    /// A date offset from `start` (itself a SQL expression) by `amount` units.
    ///
    /// ```rust
    /// use argos_data::sql::{DateUnit, Expression};
    ///
    /// let expiry = Expression::date_add(Expression::NOW_SQL, 30, DateUnit::Day);
    /// assert_eq!(expiry.as_sql(), "datetime(CURRENT_TIMESTAMP, '+30 days')");
    /// ```
    #[must_use]
    pub fn date_add(start: &str, amount: i64, unit: DateUnit) -> Self {
        Self::raw(format!(
            "datetime({start}, '{amount:+} {}')",
            unit.as_modifier()
        ))
    }

    /// A literal timestamp, converted to UTC.
    #[must_use]
    pub fn date_time<Tz: TimeZone>(date: &DateTime<Tz>) -> Self {
        let utc = date.with_timezone(&Utc);
        Self::raw(format!("'{}'", utc.format("%Y-%m-%d %H:%M:%S")))
    }

    /// A literal timestamp from Unix seconds. `None` when out of range.
    #[must_use]
    pub fn date_time_from_unix(timestamp: i64) -> Option<Self> {
        Utc.timestamp_opt(timestamp, 0)
            .single()
            .map(|dt| Self::date_time(&dt))
    }

    /// Returns the SQL text.
    #[must_use]
    pub fn as_sql(&self) -> &str {
        &self.sql
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn test_date_add_signs() {
        assert_eq!(
            Expression::date_add("'2020-01-01'", 1, DateUnit::Year).as_sql(),
            "datetime('2020-01-01', '+1 years')"
        );
        assert_eq!(
            Expression::date_add(Expression::NOW_SQL, -2, DateUnit::Hour).as_sql(),
            "datetime(CURRENT_TIMESTAMP, '-2 hours')"
        );
    }

    #[test]
    fn test_date_time_converts_to_utc() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2024, 1, 1, 1, 30, 0).unwrap();
        assert_eq!(
            Expression::date_time(&local).as_sql(),
            "'2023-12-31 23:30:00'"
        );
    }

    #[test]
    fn test_date_time_from_unix() {
        let expr = Expression::date_time_from_unix(0).unwrap();
        assert_eq!(expr.to_string(), "'1970-01-01 00:00:00'");
    }
}
