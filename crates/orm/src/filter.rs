//! Abstract filter expressions
//!
//! The opaque, immutable filter value the manager composes queries from.
//! Supports logical AND/OR/NOT combination, a distinguished "always false"
//! value, and a query of which fields the expression references. Backends
//! receive the expression untouched; the in-memory backend additionally
//! evaluates it over a record's field map.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operator for a filter leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    BeginsWith,
}

impl std::fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterOperator::Eq => write!(f, "="),
            FilterOperator::Ne => write!(f, "!="),
            FilterOperator::Lt => write!(f, "<"),
            FilterOperator::Le => write!(f, "<="),
            FilterOperator::Gt => write!(f, ">"),
            FilterOperator::Ge => write!(f, ">="),
            FilterOperator::Contains => write!(f, "CONTAINS"),
            FilterOperator::BeginsWith => write!(f, "BEGINSWITH"),
        }
    }
}

/// Immutable filter expression value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpression {
    /// Distinguished "never matches" value; queries carrying it short-circuit
    /// to an empty result without any backend call.
    AlwaysFalse,
    Comparison {
        field: String,
        operator: FilterOperator,
        value: Value,
    },
    And(Box<FilterExpression>, Box<FilterExpression>),
    Or(Box<FilterExpression>, Box<FilterExpression>),
    Not(Box<FilterExpression>),
}

impl FilterExpression {
    /// The distinguished "always false" value.
    pub fn always_false() -> Self {
        FilterExpression::AlwaysFalse
    }

    /// Build a comparison leaf.
    pub fn compare(
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<Value>,
    ) -> Self {
        FilterExpression::Comparison {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, FilterOperator::Eq, value)
    }

    pub fn begins_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::compare(field, FilterOperator::BeginsWith, prefix.into())
    }

    pub fn contains(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::compare(field, FilterOperator::Contains, text.into())
    }

    /// Logical AND. An `AlwaysFalse` operand collapses the whole expression.
    pub fn and(self, other: FilterExpression) -> Self {
        if self.is_always_false() || other.is_always_false() {
            return FilterExpression::AlwaysFalse;
        }
        FilterExpression::And(Box::new(self), Box::new(other))
    }

    /// Logical OR. `AlwaysFalse` is the identity element.
    pub fn or(self, other: FilterExpression) -> Self {
        if self.is_always_false() {
            return other;
        }
        if other.is_always_false() {
            return self;
        }
        FilterExpression::Or(Box::new(self), Box::new(other))
    }

    /// Logical negation.
    pub fn negate(self) -> Self {
        FilterExpression::Not(Box::new(self))
    }

    /// True for the distinguished "always false" value.
    pub fn is_always_false(&self) -> bool {
        matches!(self, FilterExpression::AlwaysFalse)
    }

    /// The set of field names this expression references.
    pub fn fields(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields(&self, out: &mut BTreeSet<String>) {
        match self {
            FilterExpression::AlwaysFalse => {}
            FilterExpression::Comparison { field, .. } => {
                out.insert(field.clone());
            }
            FilterExpression::And(a, b) | FilterExpression::Or(a, b) => {
                a.collect_fields(out);
                b.collect_fields(out);
            }
            FilterExpression::Not(inner) => inner.collect_fields(out),
        }
    }

    /// Stable textual rendering, carried in query-execution errors.
    pub fn to_query_text(&self) -> String {
        match self {
            FilterExpression::AlwaysFalse => "FALSE".to_string(),
            FilterExpression::Comparison {
                field,
                operator,
                value,
            } => format!("({} {} {})", field, operator, value),
            FilterExpression::And(a, b) => {
                format!("({} AND {})", a.to_query_text(), b.to_query_text())
            }
            FilterExpression::Or(a, b) => {
                format!("({} OR {})", a.to_query_text(), b.to_query_text())
            }
            FilterExpression::Not(inner) => format!("(NOT {})", inner.to_query_text()),
        }
    }

    /// Evaluate the expression over a record's field map.
    ///
    /// Comparisons against a missing field are false for every operator;
    /// `NOT` still matches such records through negation.
    pub fn evaluate(&self, record: &HashMap<String, Value>) -> bool {
        match self {
            FilterExpression::AlwaysFalse => false,
            FilterExpression::And(a, b) => a.evaluate(record) && b.evaluate(record),
            FilterExpression::Or(a, b) => a.evaluate(record) || b.evaluate(record),
            FilterExpression::Not(inner) => !inner.evaluate(record),
            FilterExpression::Comparison {
                field,
                operator,
                value,
            } => match record.get(field) {
                Some(actual) => evaluate_comparison(actual, *operator, value),
                None => false,
            },
        }
    }
}

fn evaluate_comparison(actual: &Value, operator: FilterOperator, expected: &Value) -> bool {
    match operator {
        FilterOperator::Eq => actual == expected,
        FilterOperator::Ne => actual != expected,
        FilterOperator::Lt => compare_values(actual, expected) == Some(Ordering::Less),
        FilterOperator::Le => matches!(
            compare_values(actual, expected),
            Some(Ordering::Less) | Some(Ordering::Equal)
        ),
        FilterOperator::Gt => compare_values(actual, expected) == Some(Ordering::Greater),
        FilterOperator::Ge => matches!(
            compare_values(actual, expected),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        ),
        FilterOperator::Contains => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(e)) => a.contains(e),
            _ => false,
        },
        FilterOperator::BeginsWith => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(e)) => a.starts_with(e),
            _ => false,
        },
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
