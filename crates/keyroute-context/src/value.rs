//! Values stored under context keys
//!
//! Context values are deliberately small: booleans, numbers and strings.
//! Truthiness and loose equality are defined here once so that expression
//! evaluation never depends on ad-hoc coercions.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A value held by a context key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl ContextValue {
    /// `false`, `0`, `NaN` and the empty string are falsy; everything else is truthy
    pub fn is_truthy(&self) -> bool {
        match self {
            ContextValue::Bool(b) => *b,
            ContextValue::Number(n) => *n != 0.0 && !n.is_nan(),
            ContextValue::String(s) => !s.is_empty(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ContextValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ContextValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ContextValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Loose equality used by `==` and `!=` clauses.
    ///
    /// Two booleans compare as booleans. Any other pairing compares the
    /// string forms of both sides, so `1 == '1'` holds while `true == 'true'`
    /// holds too (both render as `"true"`).
    pub fn loose_eq(&self, other: &ContextValue) -> bool {
        match (self, other) {
            (ContextValue::Bool(a), ContextValue::Bool(b)) => a == b,
            _ => self.to_string() == other.to_string(),
        }
    }

    /// Convert a JSON scalar into a context value; objects, arrays and null have no counterpart
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(ContextValue::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(ContextValue::Number),
            serde_json::Value::String(s) => Some(ContextValue::String(s.clone())),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            ContextValue::Bool(_) => 0,
            ContextValue::Number(_) => 1,
            ContextValue::String(_) => 2,
        }
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Bool(b) => write!(f, "{}", b),
            ContextValue::Number(n) if n.is_infinite() => {
                if n.is_sign_positive() {
                    write!(f, "Infinity")
                } else {
                    write!(f, "-Infinity")
                }
            }
            ContextValue::Number(n) => write!(f, "{}", n),
            ContextValue::String(s) => write!(f, "{}", s),
        }
    }
}

// Canonical total order: booleans, then numbers, then strings.
impl Ord for ContextValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ContextValue::Bool(a), ContextValue::Bool(b)) => a.cmp(b),
            (ContextValue::Number(a), ContextValue::Number(b)) => a.total_cmp(b),
            (ContextValue::String(a), ContextValue::String(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for ContextValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ContextValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ContextValue {}

impl From<bool> for ContextValue {
    fn from(b: bool) -> Self {
        ContextValue::Bool(b)
    }
}

impl From<f64> for ContextValue {
    fn from(n: f64) -> Self {
        ContextValue::Number(n)
    }
}

impl From<i32> for ContextValue {
    fn from(n: i32) -> Self {
        ContextValue::Number(n as f64)
    }
}

impl From<u32> for ContextValue {
    fn from(n: u32) -> Self {
        ContextValue::Number(n as f64)
    }
}

impl From<i64> for ContextValue {
    fn from(n: i64) -> Self {
        ContextValue::Number(n as f64)
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        ContextValue::String(s.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        ContextValue::String(s)
    }
}
