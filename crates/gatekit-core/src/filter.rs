//! # Filter Parameters
//!
//! Storage predicates supplied by a resource itself rather than by the
//! caller. The typical use is scoping a child resource to the parent id
//! found in the URL path:
//!
//! ```
//! use gatekit_core::{FilterOperator, FilterParam};
//!
//! let scope = FilterParam::new("widget_id", FilterOperator::Eq, "7");
//! assert!(scope.matches(&serde_json::json!({"widget_id": 7})));
//! ```
//!
//! Parameters are built per request and consumed immediately by storage.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operator of a [`FilterParam`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    /// `=`
    #[serde(rename = "=")]
    Eq,
    /// `!=`
    #[serde(rename = "!=")]
    Ne,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
    /// SQL-style `like` with `%` and `_` wildcards.
    #[serde(rename = "like")]
    Like,
}

impl FilterOperator {
    /// The SQL spelling of this operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "like",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Ok(Self::Eq),
            "!=" | "<>" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "like" => Ok(Self::Like),
            other => Err(format!("unknown filter operator: {other}")),
        }
    }
}

/// A single `key operator value` predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterParam {
    /// Field name the predicate applies to.
    pub key: String,
    /// Opaque scalar compared against the field.
    pub value: Value,
    /// Comparison operator.
    pub operator: FilterOperator,
}

impl FilterParam {
    /// Build a predicate.
    pub fn new(key: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            operator,
        }
    }

    /// Shorthand for an equality predicate.
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(key, FilterOperator::Eq, value)
    }

    /// Evaluate the predicate against a JSON object's top-level field.
    ///
    /// A missing or non-scalar field never matches. Numbers compare
    /// numerically even when one side arrived as a string (path parameters
    /// always do).
    pub fn matches(&self, record: &Value) -> bool {
        let Some(field) = record.get(&self.key) else {
            return false;
        };

        if self.operator == FilterOperator::Like {
            return match (scalar_text(field), scalar_text(&self.value)) {
                (Some(text), Some(pattern)) => like(&text, &pattern),
                _ => false,
            };
        }

        let Some(ordering) = compare_scalars(field, &self.value) else {
            return false;
        };
        match self.operator {
            FilterOperator::Eq => ordering == Ordering::Equal,
            FilterOperator::Ne => ordering != Ordering::Equal,
            FilterOperator::Lt => ordering == Ordering::Less,
            FilterOperator::Le => ordering != Ordering::Greater,
            FilterOperator::Gt => ordering == Ordering::Greater,
            FilterOperator::Ge => ordering != Ordering::Less,
            FilterOperator::Like => false,
        }
    }
}

/// String form of a JSON scalar. Objects, arrays and null have none.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Order two JSON scalars.
///
/// Numbers (or numeric strings facing a number) compare numerically, two
/// strings lexicographically, two booleans with `false < true`. Anything
/// else is incomparable.
pub(crate) fn compare_scalars(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            as_number(a)?.partial_cmp(&as_number(b)?)
        }
        _ => None,
    }
}

/// SQL `LIKE`: `%` matches any run of characters, `_` exactly one.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    // dp[j]: pattern[..i] matches text[..j]
    let mut dp = vec![false; text.len() + 1];
    dp[0] = true;
    for p in &pattern {
        let mut next = vec![false; text.len() + 1];
        match p {
            '%' => {
                let mut seen = false;
                for j in 0..=text.len() {
                    seen |= dp[j];
                    next[j] = seen;
                }
            }
            '_' => {
                for j in 1..=text.len() {
                    next[j] = dp[j - 1];
                }
            }
            c => {
                for j in 1..=text.len() {
                    next[j] = dp[j - 1] && text[j - 1] == *c;
                }
            }
        }
        dp = next;
    }
    dp[text.len()]
}
