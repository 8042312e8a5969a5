//! Outcome request wire types.
//!
//! Everything except `request_id` and `outcome_type` defaults when absent,
//! so sparse requests from the marketplace deserialize cleanly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::escalation::TriggerRule;
use crate::JsonMap;

/// Immutable input to one engine execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRequest {
    pub request_id: String,
    pub outcome_type: String,
    /// Free-form task parameters (`objective`, `repository`, ...).
    #[serde(default)]
    pub specification: JsonMap,
    #[serde(default)]
    pub context_sources: Vec<JsonMap>,
    #[serde(default)]
    pub tools: Vec<JsonMap>,
    #[serde(default)]
    pub success_criteria: SuccessCriteria,
    #[serde(default)]
    pub delivery_constraints: DeliveryConstraints,
    #[serde(default)]
    pub escalation_policy: EscalationPolicyOverride,
    #[serde(default)]
    pub bid_strategy: JsonMap,
    #[serde(default)]
    pub guarantee_terms: JsonMap,
    /// May carry `requested_at` as an RFC 3339 timestamp.
    #[serde(default)]
    pub metadata: JsonMap,
}

impl OutcomeRequest {
    pub fn new(request_id: impl Into<String>, outcome_type: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            outcome_type: outcome_type.into(),
            specification: JsonMap::new(),
            context_sources: Vec::new(),
            tools: Vec::new(),
            success_criteria: SuccessCriteria::default(),
            delivery_constraints: DeliveryConstraints::default(),
            escalation_policy: EscalationPolicyOverride::default(),
            bid_strategy: JsonMap::new(),
            guarantee_terms: JsonMap::new(),
            metadata: JsonMap::new(),
        }
    }

    pub fn with_specification(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.specification.insert(key.into(), value.into());
        self
    }

    pub fn with_required(mut self, criterion: Criterion) -> Self {
        self.success_criteria.required.push(criterion);
        self
    }

    pub fn with_optional(mut self, criterion: Criterion) -> Self {
        self.success_criteria.optional.push(criterion);
        self
    }

    pub fn with_max_latency(mut self, seconds: f64) -> Self {
        self.delivery_constraints.max_latency_seconds = Some(seconds);
        self
    }

    pub fn with_escalation_policy(mut self, policy: EscalationPolicyOverride) -> Self {
        self.escalation_policy = policy;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The `objective` string from the specification, if any.
    pub fn objective(&self) -> Option<&str> {
        self.specification.get("objective").and_then(Value::as_str)
    }

    /// `metadata.requested_at` when present and parseable.
    pub fn requested_at(&self) -> Option<DateTime<Utc>> {
        self.metadata
            .get("requested_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Required and optional criteria, each evaluated in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuccessCriteria {
    #[serde(default)]
    pub required: Vec<Criterion>,
    #[serde(default)]
    pub optional: Vec<Criterion>,
}

/// One metric check: `<metric> <operator> <value>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub metric: String,
    #[serde(default)]
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

impl Criterion {
    pub fn new(metric: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            metric: metric.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Criterion comparison operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[default]
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    /// Any operator this build does not know; the criterion always fails.
    #[serde(other)]
    Unsupported,
}

/// Delivery constraints. Only `max_latency_seconds` is interpreted;
/// other keys are preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency_seconds: Option<f64>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Per-request overrides of the engine's escalation policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EscalationPolicyOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Replaces the engine's trigger list when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Vec<TriggerRule>>,
}
