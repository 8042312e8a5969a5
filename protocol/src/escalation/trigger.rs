//! Escalation triggers and the configured rules that produce them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::condition::Condition;

/// Default confidence threshold when a rule omits `threshold`.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;
/// Default attempt budget when a rule omits `attempts`.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Reason text used when no trigger-specific text is available.
pub const GENERIC_REASON: &str = "Human review required";

/// Why a request was handed to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTrigger {
    ConfidenceThreshold,
    ExplicitRequest,
    OutOfScope,
    MaxAttempts,
    Timeout,
    PolicyViolation,
}

impl EscalationTrigger {
    /// Human-readable reason attached to handoffs.
    pub fn reason_text(self) -> &'static str {
        match self {
            Self::ConfidenceThreshold => "Confidence fell below the escalation threshold",
            Self::ExplicitRequest => "Customer explicitly asked for a human",
            Self::OutOfScope => "Request is outside the automated scope",
            Self::MaxAttempts => "Maximum automated attempts reached",
            Self::Timeout => "Execution exceeded the delivery latency bound",
            Self::PolicyViolation => "Requested action would violate policy",
        }
    }
}

impl fmt::Display for EscalationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfidenceThreshold => write!(f, "confidence_threshold"),
            Self::ExplicitRequest => write!(f, "explicit_request"),
            Self::OutOfScope => write!(f, "out_of_scope"),
            Self::MaxAttempts => write!(f, "max_attempts"),
            Self::Timeout => write!(f, "timeout"),
            Self::PolicyViolation => write!(f, "policy_violation"),
        }
    }
}

/// One configured trigger rule, tagged by `type`.
///
/// ```yaml
/// triggers:
///   - type: confidence_threshold
///     threshold: 0.7
///   - type: explicit_request
///     patterns: ["speak to a human", "manager"]
///   - type: out_of_scope
///     conditions: ["refund_amount > 50", "legal_threat"]
///   - type: max_attempts
///     attempts: 3
/// ```
///
/// Rule types this build does not know deserialize into
/// [`TriggerRule::Unrecognized`] and never fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerRule {
    ConfidenceThreshold {
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
    ExplicitRequest {
        #[serde(default)]
        patterns: Vec<String>,
    },
    OutOfScope {
        #[serde(default)]
        conditions: Vec<Condition>,
    },
    MaxAttempts {
        #[serde(default = "default_attempts")]
        attempts: u32,
    },
    /// Consulted by the engine when the latency bound is exceeded.
    Timeout,
    /// Raised directly by executors; not signal-driven.
    PolicyViolation,
    #[serde(other)]
    Unrecognized,
}

impl TriggerRule {
    /// The trigger this rule produces, or `None` for unrecognized rules.
    pub fn trigger(&self) -> Option<EscalationTrigger> {
        match self {
            Self::ConfidenceThreshold { .. } => Some(EscalationTrigger::ConfidenceThreshold),
            Self::ExplicitRequest { .. } => Some(EscalationTrigger::ExplicitRequest),
            Self::OutOfScope { .. } => Some(EscalationTrigger::OutOfScope),
            Self::MaxAttempts { .. } => Some(EscalationTrigger::MaxAttempts),
            Self::Timeout => Some(EscalationTrigger::Timeout),
            Self::PolicyViolation => Some(EscalationTrigger::PolicyViolation),
            Self::Unrecognized => None,
        }
    }
}

fn default_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
