//! Escalation Evaluator: first-match-wins over configured trigger rules.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::trigger::{EscalationTrigger, TriggerRule};
use crate::config::EscalationConfig;
use crate::request::EscalationPolicyOverride;
use crate::JsonMap;

/// Live signals an executor reports for escalation evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationSignals {
    /// Model confidence in `[0, 1]`.
    #[serde(default = "full_confidence")]
    pub confidence: f64,
    /// Attempts made so far on this request.
    #[serde(default)]
    pub attempt_count: u32,
    /// The latest customer/user message.
    #[serde(default)]
    pub message: String,
    /// Arbitrary flags and numbers, read by `out_of_scope` conditions.
    #[serde(default)]
    pub context: JsonMap,
}

fn full_confidence() -> f64 {
    1.0
}

impl Default for EscalationSignals {
    fn default() -> Self {
        Self {
            confidence: full_confidence(),
            attempt_count: 0,
            message: String::new(),
            context: JsonMap::new(),
        }
    }
}

impl EscalationSignals {
    pub fn new(confidence: f64) -> Self {
        Self {
            confidence,
            ..Default::default()
        }
    }

    pub fn with_attempt_count(mut self, attempt_count: u32) -> Self {
        self.attempt_count = attempt_count;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Evaluates trigger rules in declaration order.
///
/// Only signal-driven rules are evaluated here. `timeout` rules are
/// consulted by the engine when the latency bound trips (see
/// [`EscalationEvaluator::has_rule`]); `policy_violation` is raised by
/// executors directly. Unrecognized rules are skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationEvaluator {
    enabled: bool,
    rules: Vec<TriggerRule>,
}

impl EscalationEvaluator {
    /// Create an enabled evaluator over the given rules.
    pub fn new(rules: Vec<TriggerRule>) -> Self {
        Self {
            enabled: true,
            rules,
        }
    }

    /// Build from the engine's escalation section.
    pub fn from_config(config: &EscalationConfig) -> Self {
        Self {
            enabled: config.enabled,
            rules: config.triggers.clone(),
        }
    }

    /// Evaluator for a single request, applying its policy override.
    ///
    /// An override's `triggers` replace the engine's rules; `enabled: false`
    /// switches rule evaluation off for the request.
    pub fn with_override(&self, policy: &EscalationPolicyOverride) -> Self {
        Self {
            enabled: policy.enabled.unwrap_or(self.enabled),
            rules: policy
                .triggers
                .clone()
                .unwrap_or_else(|| self.rules.clone()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn rules(&self) -> &[TriggerRule] {
        &self.rules
    }

    /// Whether an enabled rule produces `trigger`.
    pub fn has_rule(&self, trigger: EscalationTrigger) -> bool {
        self.enabled && self.rules.iter().any(|r| r.trigger() == Some(trigger))
    }

    /// Return the trigger of the first rule whose condition holds.
    pub fn evaluate(&self, signals: &EscalationSignals) -> Option<EscalationTrigger> {
        if !self.enabled {
            return None;
        }

        let message = signals.message.to_lowercase();
        for (index, rule) in self.rules.iter().enumerate() {
            let fired = match rule {
                TriggerRule::ConfidenceThreshold { threshold } => signals.confidence < *threshold,
                TriggerRule::ExplicitRequest { patterns } => patterns
                    .iter()
                    .any(|p| message.contains(&p.to_lowercase())),
                TriggerRule::MaxAttempts { attempts } => signals.attempt_count >= *attempts,
                TriggerRule::OutOfScope { conditions } => {
                    conditions.iter().any(|c| c.holds(&signals.context))
                }
                TriggerRule::Timeout
                | TriggerRule::PolicyViolation
                | TriggerRule::Unrecognized => false,
            };

            if fired {
                let trigger = rule.trigger();
                debug!(rule_index = index, trigger = ?trigger, "Escalation rule fired");
                return trigger;
            }
        }
        None
    }
}
