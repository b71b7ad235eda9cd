//! Comparison operators used in load predicates in place of the default `=`.

use super::FieldValue;
use std::fmt;

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    /// `> v`
    Gt,
    /// `>= v`
    Gte,
    /// `< v`
    Lt,
    /// `<= v`
    Lte,
    /// `IS NULL`
    IsNull,
    /// `IS NOT NULL`
    IsNotNull,
    /// `!= v`
    NotEqual,
    /// `= v`
    Equal,
    /// `LIKE v`
    Like,
    /// `NOT LIKE v`
    NotLike,
    /// `IN (v, ...)`
    In,
    /// `NOT IN (v, ...)`
    NotIn,
    /// `IS TRUE`
    BoolTrue,
    /// `IS FALSE`
    BoolFalse,
}

impl ComparisonOp {
    /// SQL template; `{val}` is replaced by the rendered operand.
    const fn template(self) -> &'static str {
        match self {
            Self::Gt => "> {val}",
            Self::Gte => ">= {val}",
            Self::Lt => "< {val}",
            Self::Lte => "<= {val}",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
            Self::NotEqual => "!= {val}",
            Self::Equal => "= {val}",
            Self::Like => "LIKE {val}",
            Self::NotLike => "NOT LIKE {val}",
            Self::In => "IN ({val})",
            Self::NotIn => "NOT IN ({val})",
            Self::BoolTrue => "IS TRUE",
            Self::BoolFalse => "IS FALSE",
        }
    }

    /// Parses an operator name (`GT`, `NOTIN`, `ISNULL`, ...), case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let op = match name.to_ascii_uppercase().as_str() {
            "GT" => Self::Gt,
            "GTE" => Self::Gte,
            "LT" => Self::Lt,
            "LTE" => Self::Lte,
            "ISNULL" => Self::IsNull,
            "ISNOTNULL" => Self::IsNotNull,
            "NOTEQUAL" => Self::NotEqual,
            "EQUAL" => Self::Equal,
            "LIKE" => Self::Like,
            "NOTLIKE" => Self::NotLike,
            "IN" => Self::In,
            "NOTIN" => Self::NotIn,
            "BOOLTRUE" => Self::BoolTrue,
            "BOOLFALSE" => Self::BoolFalse,
            _ => return None,
        };
        Some(op)
    }

    /// Parses an operator name, falling back to [`ComparisonOp::Equal`] with a
    /// warning when the name is unknown.
    #[must_use]
    pub fn parse_or_equal(name: &str) -> Self {
        Self::parse(name).unwrap_or_else(|| {
            tracing::warn!(comparison = name, "Invalid comparison indicated, defaulting to equals");
            Self::Equal
        })
    }

    const fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    const fn takes_no_value(self) -> bool {
        matches!(
            self,
            Self::IsNull | Self::IsNotNull | Self::BoolTrue | Self::BoolFalse
        )
    }
}

/// Operand handed to [`Comparison::build`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Operand {
    /// No operand (`IS NULL`, `IS TRUE`, ...).
    #[default]
    None,
    /// A single value.
    Single(FieldValue),
    /// A list of values (`IN`, `NOT IN`).
    List(Vec<FieldValue>),
}

/// A rendered comparison, e.g. `>= 5` or `IN ('a','b')`.
///
/// Placed as a value in a load predicate, it replaces the default `= value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Comparison {
    sql: String,
}

impl Comparison {
    /// Builds a comparison.
    ///
    /// Mismatched operands are coerced with a warning: a single value given to
    /// `IN` becomes a one-element list, and a list given to a scalar operator
    /// uses its first element.
    #[must_use]
    pub fn build(op: ComparisonOp, operand: Operand) -> Self {
        let rendered = if op.takes_no_value() {
            String::new()
        } else if op.takes_list() {
            let values = match operand {
                Operand::List(values) => values,
                Operand::Single(value) => {
                    tracing::warn!(
                        ?op,
                        "IN() or NOT IN() comparison called with non-list value, converting to list"
                    );
                    vec![value]
                },
                Operand::None => Vec::new(),
            };
            values
                .iter()
                .map(FieldValue::to_sql)
                .collect::<Vec<_>>()
                .join(",")
        } else {
            let value = match operand {
                Operand::Single(value) => value,
                Operand::List(values) => {
                    tracing::warn!(?op, "Comparison operator requires a single value, list given");
                    values.into_iter().next().unwrap_or_default()
                },
                Operand::None => FieldValue::from(""),
            };
            value.to_sql()
        };

        Self {
            sql: op.template().replace("{val}", &rendered),
        }
    }

    fn single(op: ComparisonOp, value: impl Into<FieldValue>) -> Self {
        Self::build(op, Operand::Single(value.into()))
    }

    fn list<I, V>(op: ComparisonOp, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        Self::build(op, Operand::List(values.into_iter().map(Into::into).collect()))
    }

    /// `IS FALSE`
    #[must_use]
    pub fn is_false() -> Self {
        Self::build(ComparisonOp::BoolFalse, Operand::None)
    }

    /// `IS TRUE`
    #[must_use]
    pub fn is_true() -> Self {
        Self::build(ComparisonOp::BoolTrue, Operand::None)
    }

    /// `IS NULL`
    #[must_use]
    pub fn is_null() -> Self {
        Self::build(ComparisonOp::IsNull, Operand::None)
    }

    /// `IS NOT NULL`
    #[must_use]
    pub fn is_not_null() -> Self {
        Self::build(ComparisonOp::IsNotNull, Operand::None)
    }

    /// `= v`
    #[must_use]
    pub fn equals(value: impl Into<FieldValue>) -> Self {
        Self::single(ComparisonOp::Equal, value)
    }

    /// `!= v`
    #[must_use]
    pub fn not_equal(value: impl Into<FieldValue>) -> Self {
        Self::single(ComparisonOp::NotEqual, value)
    }

    /// `LIKE v`. Bring your own wildcards.
    #[must_use]
    pub fn like(value: impl Into<FieldValue>) -> Self {
        Self::single(ComparisonOp::Like, value)
    }

    /// `NOT LIKE v`. Bring your own wildcards.
    #[must_use]
    pub fn not_like(value: impl Into<FieldValue>) -> Self {
        Self::single(ComparisonOp::NotLike, value)
    }

    /// `> v`
    #[must_use]
    pub fn gt(value: impl Into<FieldValue>) -> Self {
        Self::single(ComparisonOp::Gt, value)
    }

    /// `>= v`
    #[must_use]
    pub fn gte(value: impl Into<FieldValue>) -> Self {
        Self::single(ComparisonOp::Gte, value)
    }

    /// `< v`
    #[must_use]
    pub fn lt(value: impl Into<FieldValue>) -> Self {
        Self::single(ComparisonOp::Lt, value)
    }

    /// `<= v`
    #[must_use]
    pub fn lte(value: impl Into<FieldValue>) -> Self {
        Self::single(ComparisonOp::Lte, value)
    }

    /// `IN (v1, v2, ...)`
    #[must_use]
    pub fn in_list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        Self::list(ComparisonOp::In, values)
    }

    /// `NOT IN (v1, v2, ...)`
    #[must_use]
    pub fn not_in<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        Self::list(ComparisonOp::NotIn, values)
    }

    /// Returns the rendered SQL chunk.
    #[must_use]
    pub fn as_sql(&self) -> &str {
        &self.sql
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{DateUnit, Expression, Value};
    use test_case::test_case;

    #[test_case(Comparison::gt(5), "> 5" ; "greater than")]
    #[test_case(Comparison::gte("a"), ">= 'a'" ; "greater or equal")]
    #[test_case(Comparison::lt(1.5), "< 1.5" ; "less than")]
    #[test_case(Comparison::lte(0), "<= 0" ; "less or equal")]
    #[test_case(Comparison::not_equal("x"), "!= 'x'" ; "not equal")]
    #[test_case(Comparison::equals(Value::Null), "= NULL" ; "equal null")]
    #[test_case(Comparison::like("ab%"), "LIKE 'ab%'" ; "like")]
    #[test_case(Comparison::not_like("%'%"), "NOT LIKE '%''%'" ; "not like escapes quotes")]
    #[test_case(Comparison::is_null(), "IS NULL" ; "is null")]
    #[test_case(Comparison::is_not_null(), "IS NOT NULL" ; "is not null")]
    #[test_case(Comparison::is_true(), "IS TRUE" ; "is true")]
    #[test_case(Comparison::is_false(), "IS FALSE" ; "is false")]
    #[test_case(Comparison::in_list([1, 2, 3]), "IN (1,2,3)" ; "in list")]
    #[test_case(Comparison::not_in(["a", "b"]), "NOT IN ('a','b')" ; "not in list")]
    fn test_rendering(comparison: Comparison, expected: &str) {
        assert_eq!(comparison.as_sql(), expected);
    }

    #[test]
    fn test_expression_operand_is_not_quoted() {
        let cmp = Comparison::lt(Expression::date_add(Expression::NOW_SQL, -1, DateUnit::Day));
        assert_eq!(cmp.as_sql(), "< datetime(CURRENT_TIMESTAMP, '-1 days')");
    }

    #[test]
    fn test_operand_coercion() {
        let single_in = Comparison::build(ComparisonOp::In, Operand::Single("x".into()));
        assert_eq!(single_in.as_sql(), "IN ('x')");

        let list_gt = Comparison::build(
            ComparisonOp::Gt,
            Operand::List(vec![FieldValue::from(4), FieldValue::from(9)]),
        );
        assert_eq!(list_gt.as_sql(), "> 4");
    }

    #[test]
    fn test_parse_operator_names() {
        assert_eq!(ComparisonOp::parse("notin"), Some(ComparisonOp::NotIn));
        assert_eq!(ComparisonOp::parse("BOOLTRUE"), Some(ComparisonOp::BoolTrue));
        assert_eq!(ComparisonOp::parse("between"), None);
        assert_eq!(ComparisonOp::parse_or_equal("between"), ComparisonOp::Equal);
    }
}
