//! Value predicates for declarative filters.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A test on a single member value, usable as a source or destination
/// filter in rule profiles.
///
/// Numeric comparisons fail on non-numeric values; string tests fail on
/// non-strings. Null only satisfies `null` and negations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Present, i.e. not null.
    Any,
    Null,
    Eq(Value),
    Ne(Value),
    Gt(f64),
    Gte(f64),
    Lt(f64),
    Lte(f64),
    StartsWith(String),
    EndsWith(String),
    Contains(String),
    OneOf(Vec<Value>),
    /// An enum value whose variant name is listed.
    Variant(Vec<String>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Predicate::Any => !value.is_null(),
            Predicate::Null => value.is_null(),
            Predicate::Eq(expected) => loosely_equal(value, expected),
            Predicate::Ne(expected) => !loosely_equal(value, expected),
            Predicate::Gt(n) => value.as_f64().is_some_and(|v| v > *n),
            Predicate::Gte(n) => value.as_f64().is_some_and(|v| v >= *n),
            Predicate::Lt(n) => value.as_f64().is_some_and(|v| v < *n),
            Predicate::Lte(n) => value.as_f64().is_some_and(|v| v <= *n),
            Predicate::StartsWith(prefix) => value.as_str().is_some_and(|s| s.starts_with(prefix)),
            Predicate::EndsWith(suffix) => value.as_str().is_some_and(|s| s.ends_with(suffix)),
            Predicate::Contains(substr) => value.as_str().is_some_and(|s| s.contains(substr)),
            Predicate::OneOf(values) => values.iter().any(|v| loosely_equal(value, v)),
            Predicate::Variant(names) => value
                .as_enum()
                .is_some_and(|e| names.iter().any(|n| n.as_str() == e.variant.as_ref())),
            Predicate::Not(inner) => !inner.matches(value),
        }
    }
}

/// Equality that ignores the signed/unsigned split of parsed literals.
fn loosely_equal(value: &Value, expected: &Value) -> bool {
    match (value, expected) {
        (Value::Int(_) | Value::UInt(_), Value::Int(_) | Value::UInt(_)) => {
            value.as_i64().zip(expected.as_i64()).is_some_and(|(a, b)| a == b)
                || value.as_u64().zip(expected.as_u64()).is_some_and(|(a, b)| a == b)
        }
        _ => value == expected,
    }
}
