//! Executor contract and the per-execution context.
//!
//! An [`OutcomeExecutor`] does the actual work for one outcome type. The
//! engine hands it the request, the resolved outcome config and a fresh
//! [`ExecutionContext`], and gets back a three-way [`ExecutionOutcome`]:
//!
//! ```text
//! execute(request, config, &mut ctx)
//!   ├─ Ok(Completed(result))    → criteria evaluation → completed | failed
//!   ├─ Ok(Failed { reason })    → failed
//!   ├─ Ok(Escalated(signal))    → handoff → escalated
//!   └─ Err(ExecutionError)      → failed, error text in delivery metrics
//! ```
//!
//! Tool calls go through the context's [`ToolHooks`], which check the
//! permission gate before the call and record it afterwards. Each execution
//! owns its hooks; nothing is shared between requests.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outcomes_protocol::{
    Artifact, EscalationEvaluator, EscalationSignals, EscalationTrigger, JsonMap, OutcomeRequest,
    OutcomeTypeConfig, PermissionGate, ResourceUsage, ToolCallError, ToolCallOutcome,
    ToolCallRecord,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::ExecutionError;

// ── Executor trait ───────────────────────────────────────────────────────────

/// Performs the work for one outcome type.
#[async_trait]
pub trait OutcomeExecutor: Send + Sync {
    /// Executor name for logging (e.g. `"code-review"`).
    fn name(&self) -> &str;

    /// Run the request to a three-way outcome.
    ///
    /// Implementations should check `ctx.cancellation()` at await points; the
    /// engine also drops the future on cancellation or timeout.
    async fn execute(
        &self,
        request: &OutcomeRequest,
        config: &OutcomeTypeConfig,
        ctx: &mut ExecutionContext,
    ) -> Result<ExecutionOutcome, ExecutionError>;
}

// ── Outcome types ────────────────────────────────────────────────────────────

/// What an executor produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Work finished; success criteria decide `completed` vs `failed`.
    Completed(ExecutionResult),
    /// The executor knows it could not deliver.
    Failed {
        reason: String,
        #[serde(default)]
        partial: Option<ExecutionResult>,
    },
    /// The executor wants a human to take over.
    Escalated(EscalationSignal),
}

impl ExecutionOutcome {
    pub fn usage(&self) -> ResourceUsage {
        match self {
            Self::Completed(result) => result.usage,
            Self::Failed { partial, .. } => partial.as_ref().map(|p| p.usage).unwrap_or_default(),
            Self::Escalated(signal) => signal.usage,
        }
    }
}

/// Result payload plus accounting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionResult {
    pub result: Value,
    pub artifacts: Vec<Artifact>,
    /// Flat metrics checked by success criteria before the result payload.
    pub metrics: JsonMap,
    pub usage: ResourceUsage,
    /// Live signals for the escalation evaluator.
    pub signals: Option<EscalationSignals>,
}

impl ExecutionResult {
    pub fn new(result: Value) -> Self {
        Self {
            result,
            ..Default::default()
        }
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }

    pub fn with_usage(mut self, usage: ResourceUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_signals(mut self, signals: EscalationSignals) -> Self {
        self.signals = Some(signals);
        self
    }
}

/// A direct escalation from the executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationSignal {
    pub trigger: Option<EscalationTrigger>,
    pub detail: Option<String>,
    /// Customer/task context; `customer`, `sentiment`, `attempted_actions`
    /// and `recommended_action` feed the handoff summary.
    pub context: JsonMap,
    pub transcript: Vec<TranscriptEntry>,
    pub usage: ResourceUsage,
}

impl EscalationSignal {
    pub fn new(trigger: EscalationTrigger) -> Self {
        Self {
            trigger: Some(trigger),
            ..Default::default()
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_transcript(mut self, transcript: Vec<TranscriptEntry>) -> Self {
        self.transcript = transcript;
        self
    }

    pub fn with_usage(mut self, usage: ResourceUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// One turn of the conversation, for the handoff transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TranscriptEntry {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: None,
        }
    }
}

// ── Tool hooks ───────────────────────────────────────────────────────────────

/// Pre/post tool-call hooks bound to one execution.
#[derive(Debug)]
pub struct ToolHooks {
    gate: Arc<PermissionGate>,
    calls: Vec<ToolCallRecord>,
}

impl ToolHooks {
    pub fn new(gate: Arc<PermissionGate>) -> Self {
        Self {
            gate,
            calls: Vec::new(),
        }
    }

    /// Check permission and limits. A rejection is recorded as a `denied`
    /// call and returned to the caller; nothing else is affected.
    pub fn pre_tool_call(&mut self, tool: &str, args: &Value) -> Result<(), ToolCallError> {
        self.gate.check_call(tool, args).inspect_err(|e| {
            warn!(tool, error = %e, "Tool call rejected");
            self.calls.push(ToolCallRecord {
                tool: tool.to_string(),
                timestamp: Utc::now(),
                outcome: ToolCallOutcome::Denied,
                duration_ms: 0,
                error: Some(e.to_string()),
            });
        })
    }

    /// Record a call that ran.
    pub fn post_tool_call(&mut self, tool: &str, started: Instant, error: Option<String>) {
        let duration_ms = started.elapsed().as_millis() as u64;
        let outcome = if error.is_some() {
            ToolCallOutcome::Error
        } else {
            ToolCallOutcome::Success
        };
        debug!(tool, duration_ms, outcome = ?outcome, "Tool call finished");
        self.calls.push(ToolCallRecord {
            tool: tool.to_string(),
            timestamp: Utc::now(),
            outcome,
            duration_ms,
            error,
        });
    }

    pub fn calls(&self) -> &[ToolCallRecord] {
        &self.calls
    }
}

// ── Execution context ────────────────────────────────────────────────────────

/// Mutable state owned by one execution and lent to the executor.
pub struct ExecutionContext {
    request_id: String,
    attempt_count: u32,
    actions_taken: Vec<String>,
    hooks: ToolHooks,
    cancel: CancellationToken,
    escalation: Arc<EscalationEvaluator>,
}

impl ExecutionContext {
    pub fn new(
        request_id: impl Into<String>,
        gate: Arc<PermissionGate>,
        escalation: Arc<EscalationEvaluator>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            attempt_count: 0,
            actions_taken: Vec::new(),
            hooks: ToolHooks::new(gate),
            cancel,
            escalation,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Start a new attempt; returns the attempt number (1-based).
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt_count += 1;
        self.attempt_count
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn record_action(&mut self, action: impl Into<String>) {
        self.actions_taken.push(action.into());
    }

    pub fn actions_taken(&self) -> &[String] {
        &self.actions_taken
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Pre-call check only, for executors that run tools themselves.
    pub fn check_tool(&mut self, tool: &str, args: &Value) -> Result<(), ToolCallError> {
        self.hooks.pre_tool_call(tool, args)
    }

    /// Run a tool through the hooks: gate check, call, record.
    ///
    /// A gate rejection comes back as `ExecutionError::ToolRejected` for this
    /// call only; the executor decides whether to carry on.
    pub async fn invoke_tool<F, Fut>(
        &mut self,
        tool: &str,
        args: Value,
        call: F,
    ) -> Result<Value, ExecutionError>
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = Result<Value, ExecutionError>>,
    {
        self.hooks.pre_tool_call(tool, &args)?;

        let started = Instant::now();
        let result = call(args).await;
        self.hooks
            .post_tool_call(tool, started, result.as_ref().err().map(ToString::to_string));
        if result.is_ok() {
            self.record_action(tool);
        }
        result
    }

    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        self.hooks.calls()
    }

    pub(crate) fn into_tool_calls(self) -> Vec<ToolCallRecord> {
        self.hooks.calls
    }

    /// Ask the request's escalation rules whether `signals` warrant a
    /// handoff. The attempt count is at least the context's own.
    pub fn should_escalate(&self, signals: &EscalationSignals) -> Option<EscalationTrigger> {
        let mut signals = signals.clone();
        signals.attempt_count = signals.attempt_count.max(self.attempt_count);
        self.escalation.evaluate(&signals)
    }
}
