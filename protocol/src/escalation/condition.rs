//! Out-of-scope condition grammar.
//!
//! Conditions come from configuration as plain strings and are parsed once,
//! at deserialization time, into a closed set of predicates over the
//! executor's context map. Nothing here is ever executed as code.
//!
//! | Form                   | Meaning                                           |
//! |------------------------|---------------------------------------------------|
//! | `refund_amount > 50`   | numeric context value compared to a literal       |
//! | `legal_threat`         | context value at that key is boolean `true`       |
//! | anything else          | unrecognized; always false                        |
//!
//! Supported comparison operators: `>`, `>=`, `<`, `<=`, `==`, `!=`.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::JsonMap;

static COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*(>=|<=|==|!=|>|<)\s*(-?[0-9]+(?:\.[0-9]+)?)\s*$")
        .expect("comparison grammar is a valid regex")
});

/// Characters that mark a string as an attempted comparison.
const OPERATOR_CHARS: &[char] = &['>', '<', '=', '!'];

/// Comparison operator in a `<key> <op> <number>` condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
}

impl Comparison {
    fn parse(op: &str) -> Option<Self> {
        match op {
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Gte),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Lte),
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            _ => None,
        }
    }

    fn holds(self, actual: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => actual > threshold,
            Self::Gte => actual >= threshold,
            Self::Lt => actual < threshold,
            Self::Lte => actual <= threshold,
            Self::Eq => actual == threshold,
            Self::Ne => actual != threshold,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
        };
        f.write_str(op)
    }
}

/// A parsed out-of-scope condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Condition {
    /// `<key> <op> <number>` against a numeric context value.
    Compare {
        key: String,
        op: Comparison,
        threshold: f64,
    },
    /// Bare key: true iff the context holds boolean `true` there.
    Flag(String),
    /// Kept verbatim for diagnostics; never holds.
    Unrecognized(String),
}

impl Condition {
    /// Parse a condition string. Never fails: malformed input becomes
    /// [`Condition::Unrecognized`].
    pub fn parse(raw: &str) -> Self {
        if let Some(caps) = COMPARISON.captures(raw) {
            let op = Comparison::parse(&caps[2]);
            let threshold = caps[3].parse::<f64>().ok();
            if let (Some(op), Some(threshold)) = (op, threshold) {
                return Self::Compare {
                    key: caps[1].to_string(),
                    op,
                    threshold,
                };
            }
        }

        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.contains(OPERATOR_CHARS) {
            Self::Unrecognized(raw.to_string())
        } else {
            Self::Flag(trimmed.to_string())
        }
    }

    /// Evaluate against the executor's context map.
    pub fn holds(&self, context: &JsonMap) -> bool {
        match self {
            Self::Compare { key, op, threshold } => context
                .get(key)
                .and_then(serde_json::Value::as_f64)
                .is_some_and(|actual| op.holds(actual, *threshold)),
            Self::Flag(key) => matches!(context.get(key), Some(serde_json::Value::Bool(true))),
            Self::Unrecognized(_) => false,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl From<String> for Condition {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<Condition> for String {
    fn from(condition: Condition) -> Self {
        condition.to_string()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { key, op, threshold } => write!(f, "{key} {op} {threshold}"),
            Self::Flag(key) => f.write_str(key),
            Self::Unrecognized(raw) => f.write_str(raw),
        }
    }
}
