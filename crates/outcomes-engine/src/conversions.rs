//! Conversions Reporter: outcome success/failure events for the marketplace.
//!
//! Events are POSTed as JSON with bearer auth. Any 2xx is an acknowledgement;
//! everything else (transport errors included) is retried with exponential
//! backoff per [`RetryPolicy`](outcomes_protocol::RetryPolicy), then dropped
//! with an error log. With no endpoint or key configured, reporting is a
//! no-op returning [`ReportOutcome::Skipped`].
//!
//! Reporting never fails the caller: every path returns a [`ReportOutcome`].

use chrono::{DateTime, Utc};
use outcomes_protocol::ids::{prefixed_id, EVENT_PREFIX};
use outcomes_protocol::{ConversionsConfig, CriteriaReport, OutcomeRequest, OutcomeResponse};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::errors::ReportError;

// ── Event envelope ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "outcome.success")]
    Success,
    #[serde(rename = "outcome.failure")]
    Failure,
}

/// Why a terminal response counts as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Executor delivered but required criteria were not met.
    CriteriaNotMet,
    /// Executor faulted or reported failure.
    ExecutionError,
    /// Latency bound exceeded.
    Timeout,
    /// Outcome type unknown, disabled, or without an executor.
    UnsupportedOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessData {
    pub success: bool,
    pub success_criteria_results: Option<CriteriaReport>,
    pub overall_success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureData {
    pub success: bool,
    pub failure_category: FailureCategory,
    pub failure_details: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventData {
    Success(SuccessData),
    Failure(FailureData),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub event_time: DateTime<Utc>,
    pub request_id: String,
    pub response_id: String,
    pub data: EventData,
}

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Acknowledged by the endpoint.
    Delivered { attempts: u32 },
    /// Endpoint or key unset.
    Skipped,
    /// Every attempt failed.
    Dropped { attempts: u32 },
}

// ── Reporter ─────────────────────────────────────────────────────────────────

pub struct ConversionsReporter {
    client: reqwest::Client,
    config: ConversionsConfig,
}

impl ConversionsReporter {
    pub fn new(config: ConversionsConfig, client: reqwest::Client) -> Self {
        Self { client, config }
    }

    /// Whether terminal responses should be reported automatically.
    pub fn auto_report(&self) -> bool {
        self.config.auto_report
    }

    pub fn success_event(request: &OutcomeRequest, response: &OutcomeResponse) -> ConversionEvent {
        ConversionEvent {
            event_id: prefixed_id(EVENT_PREFIX),
            event_type: EventType::Success,
            event_time: Utc::now(),
            request_id: request.request_id.clone(),
            response_id: response.response_id.clone(),
            data: EventData::Success(SuccessData {
                success: true,
                success_criteria_results: response.success_criteria_results.clone(),
                overall_success: true,
            }),
        }
    }

    pub fn failure_event(
        request: &OutcomeRequest,
        response: &OutcomeResponse,
        category: FailureCategory,
        details: impl Into<String>,
    ) -> ConversionEvent {
        ConversionEvent {
            event_id: prefixed_id(EVENT_PREFIX),
            event_type: EventType::Failure,
            event_time: Utc::now(),
            request_id: request.request_id.clone(),
            response_id: response.response_id.clone(),
            data: EventData::Failure(FailureData {
                success: false,
                failure_category: category,
                failure_details: details.into(),
            }),
        }
    }

    pub async fn report_success(
        &self,
        request: &OutcomeRequest,
        response: &OutcomeResponse,
    ) -> ReportOutcome {
        self.send(&Self::success_event(request, response)).await
    }

    pub async fn report_failure(
        &self,
        request: &OutcomeRequest,
        response: &OutcomeResponse,
        category: FailureCategory,
        reason: &str,
    ) -> ReportOutcome {
        self.send(&Self::failure_event(request, response, category, reason))
            .await
    }

    /// Deliver one event with retry.
    pub async fn send(&self, event: &ConversionEvent) -> ReportOutcome {
        let (Some(endpoint), Some(api_key)) = (self.config.endpoint(), self.config.api_key())
        else {
            warn!(
                event_id = %event.event_id,
                request_id = %event.request_id,
                "Conversions API not configured, skipping report"
            );
            return ReportOutcome::Skipped;
        };

        let policy = &self.config.retry;
        let max_attempts = policy.max_retries + 1;
        for attempt in 1..=max_attempts {
            debug!(event_id = %event.event_id, attempt, "Posting conversion event");
            match self.post(endpoint, api_key, event).await {
                Ok(()) => {
                    info!(
                        event_id = %event.event_id,
                        event_type = ?event.event_type,
                        request_id = %event.request_id,
                        attempts = attempt,
                        "Conversion event reported"
                    );
                    return ReportOutcome::Delivered { attempts: attempt };
                }
                Err(e) if attempt < max_attempts => {
                    let backoff = policy.delay_for(attempt);
                    warn!(
                        attempt,
                        max_retries = policy.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Conversion report failed — retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    error!(
                        event_id = %event.event_id,
                        request_id = %event.request_id,
                        attempts = attempt,
                        error = %e,
                        "Conversion report dropped after exhausting retries"
                    );
                }
            }
        }
        ReportOutcome::Dropped {
            attempts: max_attempts,
        }
    }

    async fn post(
        &self,
        endpoint: &str,
        api_key: &str,
        event: &ConversionEvent,
    ) -> Result<(), ReportError> {
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(api_key)
            .timeout(self.config.timeout())
            .json(event)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ReportError::Status {
                status: status.as_u16(),
            })
        }
    }
}
