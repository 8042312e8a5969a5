//! Outcome Engine: drives one request from `received` to a terminal status.
//!
//! ```text
//! execute(request)
//!   validating ── unknown/disabled type, no executor ─────────────→ failed
//!   executing  ── select! { cancel, timeout(max_latency, executor) }
//!     ├─ cancelled ───────────────────────────────────────────────→ cancelled
//!     ├─ timed out ── timeout rule? ─ yes → escalating ───────────→ escalated
//!     │                             └ no ─────────────────────────→ failed (timed_out)
//!     ├─ Err(ExecutionError) ─────────────────────────────────────→ failed
//!     ├─ Failed { reason } ───────────────────────────────────────→ failed
//!     ├─ Escalated(signal) ── escalating ─────────────────────────→ escalated
//!     └─ Completed(result)
//!          ├─ signals fire an escalation rule ── escalating ──────→ escalated
//!          └─ evaluating ── criteria ─────────────────────────────→ completed | failed
//! ```
//!
//! Handoff delivery and conversions reporting are spawned on a
//! [`TaskTracker`] and never delay the response; [`OutcomeEngine::drain`]
//! waits for them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use outcomes_protocol::{
    CriteriaEvaluator, CriteriaReport, DeliveryMetrics, EngineConfig, EngineState,
    EscalationEvaluator, EscalationTrigger, OutcomePayload, OutcomeRequest, OutcomeResponse,
    OutcomeTypeConfig, PermissionGate, ResourceUsage, StateMachine, Timestamps, ToolCallRecord,
};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::conversions::{ConversionsReporter, FailureCategory};
use crate::errors::ExecutionError;
use crate::executor::{
    ExecutionContext, ExecutionOutcome, ExecutionResult, OutcomeExecutor, TranscriptEntry,
};
use crate::handoff::{DeliveryRegistry, HandoffBuilder, HandoffInput};

/// Executes outcome requests against registered executors.
pub struct OutcomeEngine {
    config: Arc<EngineConfig>,
    gate: Arc<PermissionGate>,
    escalation: EscalationEvaluator,
    criteria: CriteriaEvaluator,
    handoff: Arc<HandoffBuilder>,
    reporter: Arc<ConversionsReporter>,
    executors: HashMap<String, Arc<dyn OutcomeExecutor>>,
    tasks: TaskTracker,
}

/// Per-request bookkeeping threaded through the terminal paths.
struct Run<'a> {
    request: &'a OutcomeRequest,
    machine: StateMachine,
    started: Instant,
    timestamps: Timestamps,
    effort: String,
}

impl Run<'_> {
    fn advance(&mut self, to: EngineState, reason: Option<&str>) {
        if let Err(e) = self.machine.advance(to, reason) {
            error!(request_id = %self.request.request_id, error = %e, "Illegal state transition");
        }
    }

    fn metrics(&self, usage: ResourceUsage, tool_calls: Vec<ToolCallRecord>) -> DeliveryMetrics {
        DeliveryMetrics::new(self.started.elapsed(), usage)
            .with_effort(self.effort.clone())
            .with_tool_calls(tool_calls)
    }
}

impl OutcomeEngine {
    /// Engine with the built-in webhook and Zendesk delivery capabilities.
    pub fn new(config: EngineConfig) -> Self {
        let client = reqwest::Client::new();
        let handoff = HandoffBuilder::new(
            &config.escalation,
            DeliveryRegistry::with_defaults(client.clone()),
        );
        Self {
            gate: Arc::new(PermissionGate::from_policy(&config.tools)),
            escalation: EscalationEvaluator::from_config(&config.escalation),
            criteria: CriteriaEvaluator::new(),
            handoff: Arc::new(handoff),
            reporter: Arc::new(ConversionsReporter::new(config.conversions.clone(), client)),
            executors: HashMap::new(),
            tasks: TaskTracker::new(),
            config: Arc::new(config),
        }
    }

    /// Replace the destination delivery capabilities.
    pub fn with_delivery(mut self, registry: DeliveryRegistry) -> Self {
        self.handoff = Arc::new(HandoffBuilder::new(&self.config.escalation, registry));
        self
    }

    /// Bind `executor` to an outcome type key, replacing any previous one.
    pub fn register_executor(
        &mut self,
        outcome_type: impl Into<String>,
        executor: Arc<dyn OutcomeExecutor>,
    ) {
        let outcome_type = outcome_type.into();
        debug!(outcome_type = %outcome_type, executor = executor.name(), "Registered executor");
        self.executors.insert(outcome_type, executor);
    }

    pub fn with_executor(
        mut self,
        outcome_type: impl Into<String>,
        executor: Arc<dyn OutcomeExecutor>,
    ) -> Self {
        self.register_executor(outcome_type, executor);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `request` to a terminal response.
    pub async fn execute(&self, request: &OutcomeRequest) -> OutcomeResponse {
        self.execute_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), but abandons the executor and returns
    /// `cancelled` as soon as `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        request: &OutcomeRequest,
        cancel: CancellationToken,
    ) -> OutcomeResponse {
        info!(
            request_id = %request.request_id,
            outcome_type = %request.outcome_type,
            "Outcome request received"
        );
        let mut run = Run {
            request,
            machine: StateMachine::new(&request.request_id),
            started: Instant::now(),
            timestamps: Timestamps::new(request.requested_at().unwrap_or_else(Utc::now)),
            effort: outcomes_protocol::config::DEFAULT_EFFORT.to_string(),
        };
        run.advance(EngineState::Validating, None);

        let Some(outcome_config) = self.config.outcome(&request.outcome_type) else {
            let reason = format!("Unsupported outcome type: {}", request.outcome_type);
            warn!(request_id = %request.request_id, outcome_type = %request.outcome_type, "Outcome type unknown or disabled");
            return self.unsupported(run, reason);
        };
        let Some(executor) = self.executors.get(&request.outcome_type).cloned() else {
            let reason = format!("No executor registered for outcome type: {}", request.outcome_type);
            warn!(request_id = %request.request_id, outcome_type = %request.outcome_type, "No executor registered");
            return self.unsupported(run, reason);
        };
        run.effort = outcome_config.default_effort().to_string();

        if cancel.is_cancelled() {
            return self.cancelled(run, Vec::new());
        }

        run.advance(EngineState::Executing, None);
        run.timestamps = run.timestamps.clone().started();
        let escalation = Arc::new(self.escalation.with_override(&request.escalation_policy));
        let mut ctx = ExecutionContext::new(
            request.request_id.clone(),
            Arc::clone(&self.gate),
            Arc::clone(&escalation),
            cancel.child_token(),
        );
        let max_latency = effective_latency(request, outcome_config);
        let budget = Duration::try_from_secs_f64(max_latency).unwrap_or(Duration::MAX);
        debug!(
            request_id = %request.request_id,
            executor = executor.name(),
            max_latency_seconds = max_latency,
            "Invoking executor"
        );

        let finished = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = tokio::time::timeout(budget, executor.execute(request, outcome_config, &mut ctx)) => Some(result),
        };

        match finished {
            None => self.cancelled(run, ctx.into_tool_calls()),
            Some(Err(_elapsed)) => {
                warn!(
                    request_id = %request.request_id,
                    max_latency_seconds = max_latency,
                    "Execution exceeded latency bound"
                );
                if escalation.has_rule(EscalationTrigger::Timeout) {
                    let mut input = HandoffInput::new(request, Some(EscalationTrigger::Timeout));
                    input.actions_taken = ctx.actions_taken().to_vec();
                    let metrics = run.metrics(ResourceUsage::default(), ctx.into_tool_calls());
                    self.escalate(run, input, metrics)
                } else {
                    let error = format!("Execution exceeded max latency of {max_latency}s");
                    let metrics = run
                        .metrics(ResourceUsage::default(), ctx.into_tool_calls())
                        .with_error(error.clone())
                        .timed_out();
                    self.fail(run, None, metrics, FailureCategory::Timeout, error)
                }
            }
            Some(Ok(Err(ExecutionError::Cancelled))) if cancel.is_cancelled() => {
                self.cancelled(run, ctx.into_tool_calls())
            }
            Some(Ok(Err(e))) => {
                warn!(
                    request_id = %request.request_id,
                    retriable = e.is_retriable(),
                    error = %e,
                    "Executor faulted"
                );
                let error = e.to_string();
                let metrics = run
                    .metrics(ResourceUsage::default(), ctx.into_tool_calls())
                    .with_error(error.clone());
                self.fail(run, None, metrics, FailureCategory::ExecutionError, error)
            }
            Some(Ok(Ok(outcome))) => self.conclude(run, outcome, ctx),
        }
    }

    /// Wait for every spawned delivery and report to finish.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    // ── Terminal paths ───────────────────────────────────────────────────

    fn conclude(
        &self,
        mut run: Run<'_>,
        outcome: ExecutionOutcome,
        ctx: ExecutionContext,
    ) -> OutcomeResponse {
        let request = run.request;
        let usage = outcome.usage();
        match outcome {
            ExecutionOutcome::Escalated(signal) => {
                info!(request_id = %request.request_id, trigger = ?signal.trigger, "Executor requested escalation");
                let mut input = HandoffInput::new(request, signal.trigger);
                input.detail = signal.detail;
                input.context = signal.context;
                input.transcript = signal.transcript;
                input.actions_taken = ctx.actions_taken().to_vec();
                let metrics = run.metrics(usage, ctx.into_tool_calls());
                self.escalate(run, input, metrics)
            }
            ExecutionOutcome::Failed { reason, partial } => {
                warn!(request_id = %request.request_id, reason = %reason, "Executor reported failure");
                let metrics = run
                    .metrics(usage, ctx.into_tool_calls())
                    .with_error(reason.clone());
                let partial = partial.map(|p| payload(request, p));
                self.fail(run, partial, metrics, FailureCategory::ExecutionError, reason)
            }
            ExecutionOutcome::Completed(result) => {
                let fired = result
                    .signals
                    .as_ref()
                    .and_then(|signals| ctx.should_escalate(signals));
                if let Some(trigger) = fired {
                    let mut input = HandoffInput::new(request, Some(trigger));
                    if let Some(signals) = &result.signals {
                        input.context = signals.context.clone();
                        if !signals.message.is_empty() {
                            input.transcript =
                                vec![TranscriptEntry::new("customer", signals.message.clone())];
                        }
                    }
                    input.actions_taken = ctx.actions_taken().to_vec();
                    let metrics = run.metrics(usage, ctx.into_tool_calls());
                    return self.escalate(run, input, metrics);
                }

                run.advance(EngineState::Evaluating, None);
                let report = self
                    .criteria
                    .evaluate(request, &result.result, &result.metrics);
                let metrics = run.metrics(usage, ctx.into_tool_calls());
                self.evaluated(run, payload(request, result), report, metrics)
            }
        }
    }

    fn evaluated(
        &self,
        mut run: Run<'_>,
        payload: OutcomePayload,
        report: CriteriaReport,
        metrics: DeliveryMetrics,
    ) -> OutcomeResponse {
        let request = run.request;
        let unmet: Vec<&str> = report
            .required
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.metric.as_str())
            .collect();
        let failure = (!report.overall_success)
            .then(|| format!("Required criteria not met: {}", unmet.join(", ")));

        match &failure {
            None => run.advance(EngineState::Completed, None),
            Some(reason) => run.advance(EngineState::Failed, Some(reason.as_str())),
        }
        let timestamps = run.timestamps.clone();
        let response = OutcomeResponse::evaluated(
            request,
            payload,
            report,
            metrics,
            &self.config.execution_engine,
            timestamps,
        );
        info!(
            request_id = %request.request_id,
            status = %response.status,
            path = %run.machine.summary(),
            "Outcome evaluated"
        );
        self.spawn_report(
            request,
            &response,
            failure.map(|reason| (FailureCategory::CriteriaNotMet, reason)),
        );
        response
    }

    fn fail(
        &self,
        mut run: Run<'_>,
        partial: Option<OutcomePayload>,
        metrics: DeliveryMetrics,
        category: FailureCategory,
        reason: String,
    ) -> OutcomeResponse {
        let request = run.request;
        run.advance(EngineState::Failed, Some(reason.as_str()));
        let response = OutcomeResponse::failed(
            request,
            partial,
            metrics,
            &self.config.execution_engine,
            run.timestamps.clone(),
        );
        info!(
            request_id = %request.request_id,
            status = %response.status,
            category = ?category,
            path = %run.machine.summary(),
            "Outcome failed"
        );
        self.spawn_report(request, &response, Some((category, reason)));
        response
    }

    fn unsupported(&self, run: Run<'_>, reason: String) -> OutcomeResponse {
        let metrics = run.metrics(ResourceUsage::default(), Vec::new()).with_error(reason.clone());
        self.fail(run, None, metrics, FailureCategory::UnsupportedOutcome, reason)
    }

    fn escalate(
        &self,
        mut run: Run<'_>,
        input: HandoffInput<'_>,
        metrics: DeliveryMetrics,
    ) -> OutcomeResponse {
        let request = run.request;
        let reason = input.trigger.map(|t| t.to_string());
        run.advance(EngineState::Escalating, reason.as_deref());
        let payload = self.handoff.build_and_deliver(&self.tasks, input);
        run.advance(EngineState::Escalated, None);
        info!(
            request_id = %request.request_id,
            handoff_id = %payload.handoff_id,
            reason = %payload.escalation_reason.details,
            path = %run.machine.summary(),
            "Outcome escalated to human"
        );
        OutcomeResponse::escalated(
            request,
            payload.record(),
            metrics,
            &self.config.execution_engine,
            run.timestamps.clone(),
        )
    }

    fn cancelled(&self, mut run: Run<'_>, tool_calls: Vec<ToolCallRecord>) -> OutcomeResponse {
        let request = run.request;
        if let Err(e) = run.machine.cancel() {
            error!(request_id = %request.request_id, error = %e, "Illegal state transition");
        }
        info!(
            request_id = %request.request_id,
            path = %run.machine.summary(),
            "Outcome cancelled"
        );
        let metrics = run.metrics(ResourceUsage::default(), tool_calls);
        OutcomeResponse::cancelled(
            request,
            metrics,
            &self.config.execution_engine,
            run.timestamps.clone(),
        )
    }

    /// Queue a conversion event for a `completed` or `failed` response.
    fn spawn_report(
        &self,
        request: &OutcomeRequest,
        response: &OutcomeResponse,
        failure: Option<(FailureCategory, String)>,
    ) {
        if !self.reporter.auto_report() {
            return;
        }
        let event = match failure {
            None => ConversionsReporter::success_event(request, response),
            Some((category, details)) => {
                ConversionsReporter::failure_event(request, response, category, details)
            }
        };
        let reporter = Arc::clone(&self.reporter);
        self.tasks.spawn(async move {
            reporter.send(&event).await;
        });
    }
}

/// The request's latency bound if it is a positive number, else the outcome
/// type's.
fn effective_latency(request: &OutcomeRequest, config: &OutcomeTypeConfig) -> f64 {
    request
        .delivery_constraints
        .max_latency_seconds
        .filter(|s| s.is_finite() && *s > 0.0)
        .unwrap_or_else(|| config.max_latency())
}

fn payload(request: &OutcomeRequest, result: ExecutionResult) -> OutcomePayload {
    OutcomePayload {
        outcome_type: request.outcome_type.clone(),
        result: result.result,
        artifacts: result.artifacts,
    }
}
