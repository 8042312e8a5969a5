//! Permission Gate: tool allow/deny patterns and numeric limits
//!
//! Patterns are parsed once when the gate is built:
//!
//! | Pattern            | Matches                                         |
//! |--------------------|-------------------------------------------------|
//! | `orders.lookup`    | exactly `orders.lookup`                         |
//! | `orders.*`         | any name starting with `orders.`                |
//! | `*_readonly`       | any name ending with `_readonly`                |
//! | `crm.*.read`       | starts with `crm.` and ends with `.read`        |
//! | `a*b*c`            | nothing (more than one `*` fails closed)        |
//!
//! Deny patterns are checked first and always win. A tool that matches no
//! allow pattern is denied.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde_json::Value;
use tracing::debug;

use crate::config::ToolPolicy;
use crate::error::ToolCallError;

static NO_LIMITS: LazyLock<BTreeMap<String, f64>> = LazyLock::new(BTreeMap::new);

/// A parsed tool-name pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolPattern {
    Exact(String),
    Wildcard { prefix: String, suffix: String },
    /// More than one `*`.
    Never,
}

impl ToolPattern {
    pub fn parse(pattern: &str) -> Self {
        let mut parts = pattern.split('*');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(exact), None, _) => Self::Exact(exact.to_string()),
            (Some(prefix), Some(suffix), None) => Self::Wildcard {
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
            },
            _ => Self::Never,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(exact) => name == exact,
            Self::Wildcard { prefix, suffix } => name.starts_with(prefix) && name.ends_with(suffix),
            Self::Never => false,
        }
    }
}

/// Decides whether a tool may be called and with which arguments.
#[derive(Debug, Clone, Default)]
pub struct PermissionGate {
    allowed: Vec<ToolPattern>,
    denied: Vec<ToolPattern>,
    limits: BTreeMap<String, BTreeMap<String, f64>>,
}

impl PermissionGate {
    pub fn from_policy(policy: &ToolPolicy) -> Self {
        Self {
            allowed: policy.allowed.iter().map(|p| ToolPattern::parse(p)).collect(),
            denied: policy.denied.iter().map(|p| ToolPattern::parse(p)).collect(),
            limits: policy
                .limits
                .keys()
                .map(|tool| (tool.clone(), policy.numeric_limits(tool)))
                .filter(|(_, limits)| !limits.is_empty())
                .collect(),
        }
    }

    /// Deny wins; otherwise the tool must match an allow pattern.
    pub fn is_allowed(&self, tool: &str) -> bool {
        if self.denied.iter().any(|p| p.matches(tool)) {
            return false;
        }
        self.allowed.iter().any(|p| p.matches(tool))
    }

    /// Numeric limits for an exact tool name; empty when none are configured.
    pub fn limits_for(&self, tool: &str) -> &BTreeMap<String, f64> {
        self.limits.get(tool).unwrap_or(&NO_LIMITS)
    }

    /// Pre-call check: permission, then every `max_*`/`min_*` limit against
    /// the matching numeric argument.
    pub fn check_call(&self, tool: &str, args: &Value) -> Result<(), ToolCallError> {
        if !self.is_allowed(tool) {
            debug!(tool, "Tool call denied by pattern");
            return Err(ToolCallError::denied(tool));
        }

        for (limit, &bound) in self.limits_for(tool) {
            let (argument, upper) = if let Some(field) = limit.strip_prefix("max_") {
                (field, true)
            } else if let Some(field) = limit.strip_prefix("min_") {
                (field, false)
            } else {
                continue;
            };

            let Some(actual) = args.get(argument).and_then(Value::as_f64) else {
                continue;
            };
            let exceeded = if upper { actual > bound } else { actual < bound };
            if exceeded {
                debug!(tool, limit = %limit, actual, bound, "Tool call over limit");
                return Err(ToolCallError::LimitExceeded {
                    tool: tool.to_string(),
                    limit: limit.clone(),
                    argument: argument.to_string(),
                    bound,
                    actual,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gate(allowed: &[&str], denied: &[&str]) -> PermissionGate {
        PermissionGate::from_policy(&ToolPolicy {
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
            denied: denied.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        })
    }

    fn refund_gate() -> PermissionGate {
        let mut policy = ToolPolicy {
            allowed: vec!["orders.*".to_string()],
            ..Default::default()
        };
        let limits = json!({
            "max_amount": 50,
            "min_amount": 1,
            "daily_cap": 10,
            "allowed_reasons": ["damaged", "late"]
        });
        policy.limits.insert(
            "orders.process_refund".to_string(),
            serde_json::from_value(limits).unwrap(),
        );
        PermissionGate::from_policy(&policy)
    }

    #[test]
    fn test_pattern_parsing() {
        assert_eq!(ToolPattern::parse("a.b"), ToolPattern::Exact("a.b".to_string()));
        assert_eq!(
            ToolPattern::parse("a.*"),
            ToolPattern::Wildcard {
                prefix: "a.".to_string(),
                suffix: String::new()
            }
        );
        assert_eq!(ToolPattern::parse("a*b*c"), ToolPattern::Never);
        assert_eq!(ToolPattern::parse("**"), ToolPattern::Never);
    }

    #[test]
    fn test_wildcard_prefix_suffix() {
        let g = gate(&["crm.*.read", "*_readonly", "orders.*"], &[]);
        assert!(g.is_allowed("crm.contacts.read"));
        assert!(!g.is_allowed("crm.contacts.write"));
        assert!(g.is_allowed("db_readonly"));
        assert!(g.is_allowed("orders.lookup"));
        assert!(!g.is_allowed("order.lookup"));
    }

    #[test]
    fn test_lone_star_allows_everything() {
        let g = gate(&["*"], &[]);
        assert!(g.is_allowed("anything.at.all"));
        assert!(g.is_allowed(""));
    }

    #[test]
    fn test_deny_wins_over_allow() {
        let g = gate(&["orders.*"], &["orders.delete_*"]);
        assert!(g.is_allowed("orders.lookup"));
        assert!(!g.is_allowed("orders.delete_all"));

        // Exact allow does not beat a wildcard deny.
        let g = gate(&["orders.delete_all"], &["orders.*"]);
        assert!(!g.is_allowed("orders.delete_all"));
    }

    #[test]
    fn test_default_deny() {
        let g = gate(&[], &[]);
        assert!(!g.is_allowed("orders.lookup"));
    }

    #[test]
    fn test_multi_wildcard_fails_closed() {
        let g = gate(&["a*b*c", "*.*"], &[]);
        assert!(!g.is_allowed("abc"));
        assert!(!g.is_allowed("axbxc"));
        assert!(!g.is_allowed("x.y"));

        // A malformed deny pattern denies nothing either.
        let g = gate(&["*"], &["*.*"]);
        assert!(g.is_allowed("x.y"));
    }

    #[test]
    fn test_limits_exact_lookup() {
        let g = refund_gate();
        assert_eq!(g.limits_for("orders.process_refund").get("max_amount"), Some(&50.0));
        assert!(g.limits_for("orders.process_refund").get("allowed_reasons").is_none());
        assert!(g.limits_for("orders.*").is_empty());
        assert!(g.limits_for("orders.lookup").is_empty());
    }

    #[test]
    fn test_refund_over_max_rejected() {
        let g = refund_gate();
        let err = g
            .check_call("orders.process_refund", &json!({"amount": 75}))
            .unwrap_err();
        assert_eq!(
            err,
            ToolCallError::LimitExceeded {
                tool: "orders.process_refund".to_string(),
                limit: "max_amount".to_string(),
                argument: "amount".to_string(),
                bound: 50.0,
                actual: 75.0,
            }
        );
        assert!(err.to_string().contains("max_amount"));
    }

    #[test]
    fn test_refund_bounds_inclusive() {
        let g = refund_gate();
        assert!(g.check_call("orders.process_refund", &json!({"amount": 50})).is_ok());
        assert!(g.check_call("orders.process_refund", &json!({"amount": 1})).is_ok());
        assert!(matches!(
            g.check_call("orders.process_refund", &json!({"amount": 0.5})),
            Err(ToolCallError::LimitExceeded { ref limit, .. }) if limit == "min_amount"
        ));
    }

    #[test]
    fn test_unchecked_limits_and_arguments() {
        let g = refund_gate();
        // Non-numeric or missing arguments are not checked; neither are
        // limit names without a max_/min_ prefix.
        assert!(g.check_call("orders.process_refund", &json!({"amount": "75"})).is_ok());
        assert!(g.check_call("orders.process_refund", &json!({"daily_cap": 99})).is_ok());
        assert!(g.check_call("orders.process_refund", &json!(null)).is_ok());
    }

    #[test]
    fn test_check_call_denied() {
        let g = refund_gate();
        assert_eq!(
            g.check_call("crm.update", &json!({})),
            Err(ToolCallError::denied("crm.update"))
        );
    }
}
