//! Outcome response wire types.
//!
//! Field presence depends on status and is part of the wire contract:
//!
//! | Status                 | `outcome` | `escalation` | criteria results |
//! |------------------------|-----------|--------------|------------------|
//! | `completed` / `failed` | present   | absent       | present          |
//! | `escalated`            | absent    | present      | absent           |
//! | `cancelled`            | absent    | absent       | absent           |
//!
//! Responses are only built through the status-specific constructors on
//! [`OutcomeResponse`], so these rules hold by construction.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{Destination, EngineIdentity, DEFAULT_EFFORT};
use crate::escalation::{trigger::GENERIC_REASON, EscalationTrigger};
use crate::ids::{prefixed_id, RESPONSE_PREFIX};
use crate::request::OutcomeRequest;

// ── Status ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Pending,
    Completed,
    Failed,
    Escalated,
    Cancelled,
}

impl OutcomeStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Escalated => write!(f, "escalated"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ── Outcome payload ─────────────────────────────────────────────────────

/// The delivered work product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomePayload {
    #[serde(rename = "type")]
    pub outcome_type: String,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl OutcomePayload {
    /// Payload for a request whose executor never produced a result.
    pub fn empty(outcome_type: impl Into<String>) -> Self {
        Self {
            outcome_type: outcome_type.into(),
            result: Value::Object(Default::default()),
            artifacts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Value,
}

impl Artifact {
    pub fn new(kind: impl Into<String>, content: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            content: content.into(),
        }
    }

    /// A plain-text message artifact.
    pub fn message(text: impl Into<String>) -> Self {
        Self::new("message", text.into())
    }
}

// ── Criteria ────────────────────────────────────────────────────────────

/// Per-criterion results in request order, plus the overall verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaReport {
    pub required: Vec<CriterionResult>,
    pub optional: Vec<CriterionResult>,
    pub overall_success: bool,
}

impl CriteriaReport {
    /// Report for a request that failed before evaluation.
    pub fn rejected() -> Self {
        Self {
            required: Vec::new(),
            optional: Vec::new(),
            overall_success: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionResult {
    pub metric: String,
    pub passed: bool,
    /// Resolved metric value, when one was found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
}

// ── Metrics ─────────────────────────────────────────────────────────────

/// Token and cost totals reported by an executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceUsage {
    pub tokens_used: u64,
    pub compute_cost: f64,
}

impl ResourceUsage {
    pub fn new(tokens_used: u64, compute_cost: f64) -> Self {
        Self {
            tokens_used,
            compute_cost,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub compute: f64,
    /// Calculated by the marketplace; always 0 here.
    pub risk_premium: f64,
    pub total: f64,
}

impl CostBreakdown {
    pub fn from_compute(compute: f64) -> Self {
        Self {
            compute,
            risk_premium: 0.0,
            total: compute,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallOutcome {
    Success,
    Error,
    /// Rejected by the permission gate before running.
    Denied,
}

/// One tool invocation as seen by the execution hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: ToolCallOutcome,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryMetrics {
    pub latency_seconds: f64,
    pub tokens_used: u64,
    pub cost_breakdown: CostBreakdown,
    pub effort_level: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub timed_out: bool,
}

impl DeliveryMetrics {
    pub fn new(latency: Duration, usage: ResourceUsage) -> Self {
        Self {
            latency_seconds: latency.as_secs_f64(),
            tokens_used: usage.tokens_used,
            cost_breakdown: CostBreakdown::from_compute(usage.compute_cost),
            effort_level: DEFAULT_EFFORT.to_string(),
            tool_calls: Vec::new(),
            error: None,
            timed_out: false,
        }
    }

    pub fn with_effort(mut self, effort: impl Into<String>) -> Self {
        self.effort_level = effort.into();
        self
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = calls;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Mark as exceeding the latency bound.
    pub fn timed_out(mut self) -> Self {
        self.timed_out = true;
        self
    }
}

// ── Timestamps ──────────────────────────────────────────────────────────

/// `requested_at` plus exactly one terminal timestamp matching the status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timestamps {
    pub requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Timestamps {
    pub fn new(requested_at: DateTime<Utc>) -> Self {
        Self {
            requested_at,
            started_at: None,
            completed_at: None,
            failed_at: None,
            escalated_at: None,
            cancelled_at: None,
        }
    }

    /// Record the moment the executor was invoked.
    pub fn started(mut self) -> Self {
        self.started_at = Some(Utc::now());
        self
    }

    fn finish(mut self, status: OutcomeStatus) -> Self {
        let now = Some(Utc::now());
        match status {
            OutcomeStatus::Completed => self.completed_at = now,
            OutcomeStatus::Failed => self.failed_at = now,
            OutcomeStatus::Escalated => self.escalated_at = now,
            OutcomeStatus::Cancelled => self.cancelled_at = now,
            OutcomeStatus::Pending => {}
        }
        self
    }

    /// The terminal timestamp for `status`, if stamped.
    pub fn terminal(&self, status: OutcomeStatus) -> Option<DateTime<Utc>> {
        match status {
            OutcomeStatus::Completed => self.completed_at,
            OutcomeStatus::Failed => self.failed_at,
            OutcomeStatus::Escalated => self.escalated_at,
            OutcomeStatus::Cancelled => self.cancelled_at,
            OutcomeStatus::Pending => None,
        }
    }

    fn terminal_count(&self) -> usize {
        [
            self.completed_at,
            self.failed_at,
            self.escalated_at,
            self.cancelled_at,
        ]
        .iter()
        .filter(|t| t.is_some())
        .count()
    }
}

// ── Escalation ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffReason {
    /// `None` when the executor escalated without naming a trigger.
    pub trigger: Option<EscalationTrigger>,
    pub details: String,
}

impl HandoffReason {
    /// Explicit detail wins, then the trigger's text, then the generic text.
    pub fn new(trigger: Option<EscalationTrigger>, detail: Option<String>) -> Self {
        let details = detail
            .filter(|d| !d.trim().is_empty())
            .or_else(|| trigger.map(|t| t.reason_text().to_string()))
            .unwrap_or_else(|| GENERIC_REASON.to_string());
        Self { trigger, details }
    }
}

/// The response's `escalation` field: what was handed off and where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub handoff_id: String,
    pub reason: HandoffReason,
    pub destination: Option<Destination>,
    pub summary_provided: bool,
    pub transcript_provided: bool,
    pub customer_context_provided: bool,
}

// ── Response ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct OutcomeResponse {
    pub response_id: String,
    pub request_id: String,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OutcomePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_criteria_results: Option<CriteriaReport>,
    pub delivery_metrics: DeliveryMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationRecord>,
    pub execution_engine: EngineIdentity,
    pub timestamps: Timestamps,
}

impl OutcomeResponse {
    fn build(
        request: &OutcomeRequest,
        status: OutcomeStatus,
        metrics: DeliveryMetrics,
        identity: &EngineIdentity,
        timestamps: Timestamps,
    ) -> Self {
        Self {
            response_id: prefixed_id(RESPONSE_PREFIX),
            request_id: request.request_id.clone(),
            status,
            outcome: None,
            success_criteria_results: None,
            delivery_metrics: metrics,
            escalation: None,
            execution_engine: identity.clone(),
            timestamps: timestamps.finish(status),
        }
    }

    /// `completed` when every required criterion passed, else `failed`.
    pub fn evaluated(
        request: &OutcomeRequest,
        payload: OutcomePayload,
        report: CriteriaReport,
        metrics: DeliveryMetrics,
        identity: &EngineIdentity,
        timestamps: Timestamps,
    ) -> Self {
        let status = if report.overall_success {
            OutcomeStatus::Completed
        } else {
            OutcomeStatus::Failed
        };
        let mut response = Self::build(request, status, metrics, identity, timestamps);
        response.outcome = Some(payload);
        response.success_criteria_results = Some(report);
        response
    }

    /// `failed` without evaluation (rejected, faulted or timed out). The
    /// payload is the executor's partial result when there was one.
    pub fn failed(
        request: &OutcomeRequest,
        partial: Option<OutcomePayload>,
        metrics: DeliveryMetrics,
        identity: &EngineIdentity,
        timestamps: Timestamps,
    ) -> Self {
        let mut response =
            Self::build(request, OutcomeStatus::Failed, metrics, identity, timestamps);
        response.outcome =
            Some(partial.unwrap_or_else(|| OutcomePayload::empty(&request.outcome_type)));
        response.success_criteria_results = Some(CriteriaReport::rejected());
        response
    }

    pub fn escalated(
        request: &OutcomeRequest,
        record: EscalationRecord,
        metrics: DeliveryMetrics,
        identity: &EngineIdentity,
        timestamps: Timestamps,
    ) -> Self {
        let mut response =
            Self::build(request, OutcomeStatus::Escalated, metrics, identity, timestamps);
        response.escalation = Some(record);
        response
    }

    pub fn cancelled(
        request: &OutcomeRequest,
        metrics: DeliveryMetrics,
        identity: &EngineIdentity,
        timestamps: Timestamps,
    ) -> Self {
        Self::build(request, OutcomeStatus::Cancelled, metrics, identity, timestamps)
    }

    /// Whether field presence matches the status. Useful for checking
    /// responses that arrived over the wire.
    pub fn is_consistent(&self) -> bool {
        let shape = match self.status {
            OutcomeStatus::Completed | OutcomeStatus::Failed => {
                self.outcome.is_some()
                    && self.escalation.is_none()
                    && self.success_criteria_results.is_some()
            }
            OutcomeStatus::Escalated => {
                self.outcome.is_none()
                    && self.escalation.is_some()
                    && self.success_criteria_results.is_none()
            }
            OutcomeStatus::Cancelled => self.outcome.is_none() && self.escalation.is_none(),
            OutcomeStatus::Pending => false,
        };
        shape
            && self.timestamps.terminal(self.status).is_some()
            && self.timestamps.terminal_count() == 1
    }
}
