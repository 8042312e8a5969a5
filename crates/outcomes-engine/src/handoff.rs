//! Handoff Builder: structured escalation payloads and destination delivery
//!
//! ```text
//! HandoffInput ──build──→ HandoffPayload ──record()──→ EscalationRecord (response)
//!                              │
//!                              └─ spawn on TaskTracker ─→ registry[destination.kind].deliver()
//!                                                          (unknown kind: logged, skipped)
//! ```
//!
//! Building is synchronous and never fails. Delivery runs in the background;
//! its errors are logged and never reach the response.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outcomes_protocol::ids::{prefixed_id, HANDOFF_PREFIX};
use outcomes_protocol::{
    Destination, DestinationKind, EscalationConfig, EscalationRecord, EscalationTrigger,
    HandoffContent, HandoffReason, JsonMap, OutcomeRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::errors::DeliveryError;
use crate::executor::TranscriptEntry;

const DEFAULT_ISSUE: &str = "Unknown";
const DEFAULT_SENTIMENT: &str = "neutral";
const DEFAULT_RECOMMENDED_ACTION: &str = "Review and resolve";

// ── Payload ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffSummary {
    pub issue: String,
    pub attempted_resolution: Vec<String>,
    pub customer_sentiment: String,
    pub recommended_action: String,
}

/// Everything a human needs to pick the request up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffPayload {
    pub handoff_id: String,
    pub request_id: String,
    pub escalation_reason: HandoffReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<HandoffSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Vec<TranscriptEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_context: Option<Value>,
    pub destination: Option<Destination>,
    pub timestamp: DateTime<Utc>,
}

impl HandoffPayload {
    /// The response-facing view. Destination credentials are stripped.
    pub fn record(&self) -> EscalationRecord {
        EscalationRecord {
            handoff_id: self.handoff_id.clone(),
            reason: self.escalation_reason.clone(),
            destination: self.destination.as_ref().map(Destination::redacted),
            summary_provided: self.summary.is_some(),
            transcript_provided: self.transcript.is_some(),
            customer_context_provided: self.customer_context.is_some(),
        }
    }
}

/// What the engine knows at the moment it escalates.
#[derive(Debug, Clone)]
pub struct HandoffInput<'a> {
    pub request: &'a OutcomeRequest,
    pub trigger: Option<EscalationTrigger>,
    pub detail: Option<String>,
    pub context: JsonMap,
    pub transcript: Vec<TranscriptEntry>,
    /// Actions recorded on the execution context.
    pub actions_taken: Vec<String>,
}

impl<'a> HandoffInput<'a> {
    pub fn new(request: &'a OutcomeRequest, trigger: Option<EscalationTrigger>) -> Self {
        Self {
            request,
            trigger,
            detail: None,
            context: JsonMap::new(),
            transcript: Vec::new(),
            actions_taken: Vec::new(),
        }
    }
}

// ── Delivery ─────────────────────────────────────────────────────────────────

/// Sends a handoff to one kind of destination.
#[async_trait]
pub trait HandoffDelivery: Send + Sync {
    async fn deliver(
        &self,
        destination: &Destination,
        payload: &HandoffPayload,
    ) -> Result<(), DeliveryError>;
}

/// Delivery capabilities keyed by destination kind.
#[derive(Clone, Default)]
pub struct DeliveryRegistry {
    deliveries: HashMap<DestinationKind, Arc<dyn HandoffDelivery>>,
}

impl DeliveryRegistry {
    /// Registry with no capabilities; every delivery is skipped.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in `webhook` and `zendesk` capabilities over `client`.
    pub fn with_defaults(client: reqwest::Client) -> Self {
        let mut registry = Self::empty();
        registry.register(
            DestinationKind::Webhook,
            Arc::new(WebhookDelivery::new(client.clone())),
        );
        registry.register(DestinationKind::Zendesk, Arc::new(ZendeskDelivery::new(client)));
        registry
    }

    /// Add or replace the capability for `kind`. Custom kinds register as
    /// `DestinationKind::Other("<type>")`.
    pub fn register(&mut self, kind: DestinationKind, delivery: Arc<dyn HandoffDelivery>) {
        self.deliveries.insert(kind, delivery);
    }

    pub fn get(&self, kind: &DestinationKind) -> Option<&Arc<dyn HandoffDelivery>> {
        self.deliveries.get(kind)
    }
}

async fn post_json(
    client: &reqwest::Client,
    destination: &Destination,
    body: &impl Serialize,
) -> Result<(), DeliveryError> {
    let url = destination
        .setting("url")
        .ok_or_else(|| DeliveryError::missing_setting(destination.kind.as_str(), "url"))?;

    let mut request = client.post(url).timeout(destination.timeout()).json(body);
    if let Some(token) = destination.setting("token") {
        request = request.bearer_auth(token);
    }

    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(DeliveryError::Rejected {
        status: status.as_u16(),
        body,
    })
}

/// POSTs the payload as JSON to the destination's `url`, credentials removed.
pub struct WebhookDelivery {
    client: reqwest::Client,
}

impl WebhookDelivery {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HandoffDelivery for WebhookDelivery {
    async fn deliver(
        &self,
        destination: &Destination,
        payload: &HandoffPayload,
    ) -> Result<(), DeliveryError> {
        let mut body = payload.clone();
        body.destination = body.destination.as_ref().map(Destination::redacted);
        post_json(&self.client, destination, &body).await
    }
}

/// Creates a ticket at the destination's `url` (a Zendesk tickets endpoint).
pub struct ZendeskDelivery {
    client: reqwest::Client,
}

impl ZendeskDelivery {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn ticket(payload: &HandoffPayload) -> Value {
        let mut body = format!("{}\n", payload.escalation_reason.details);
        if let Some(summary) = &payload.summary {
            body.push_str(&format!(
                "\nIssue: {}\nSentiment: {}\nRecommended: {}\n",
                summary.issue, summary.customer_sentiment, summary.recommended_action
            ));
            if !summary.attempted_resolution.is_empty() {
                body.push_str(&format!(
                    "Attempted: {}\n",
                    summary.attempted_resolution.join(", ")
                ));
            }
        }
        if let Some(transcript) = &payload.transcript {
            body.push_str("\nTranscript:\n");
            for entry in transcript {
                body.push_str(&format!("{}: {}\n", entry.role, entry.content));
            }
        }

        let mut tags = vec!["outcomes-handoff".to_string()];
        if let Some(trigger) = payload.escalation_reason.trigger {
            tags.push(trigger.to_string());
        }

        json!({
            "ticket": {
                "subject": format!("Escalation for request {}", payload.request_id),
                "comment": { "body": body },
                "external_id": payload.handoff_id,
                "tags": tags,
            }
        })
    }
}

#[async_trait]
impl HandoffDelivery for ZendeskDelivery {
    async fn deliver(
        &self,
        destination: &Destination,
        payload: &HandoffPayload,
    ) -> Result<(), DeliveryError> {
        post_json(&self.client, destination, &Self::ticket(payload)).await
    }
}

// ── Builder ──────────────────────────────────────────────────────────────────

pub struct HandoffBuilder {
    content: HandoffContent,
    destinations: Vec<Destination>,
    registry: DeliveryRegistry,
}

impl HandoffBuilder {
    pub fn new(config: &EscalationConfig, registry: DeliveryRegistry) -> Self {
        Self {
            content: config.handoff_content,
            destinations: config.destinations.clone(),
            registry,
        }
    }

    /// Lowest `priority` wins; ties go to the earliest configured; a missing
    /// priority sorts last.
    pub fn select_destination(&self) -> Option<&Destination> {
        self.destinations
            .iter()
            .min_by_key(|d| d.priority.unwrap_or(u32::MAX))
    }

    /// Assemble the payload. Never fails.
    pub fn build(&self, input: HandoffInput<'_>) -> HandoffPayload {
        let HandoffInput {
            request,
            trigger,
            detail,
            context,
            transcript,
            actions_taken,
        } = input;

        let summary = self
            .content
            .include_summary
            .then(|| summarize(request, &context, actions_taken));
        let customer_context = self
            .content
            .include_customer_context
            .then(|| context.get("customer").cloned().unwrap_or_else(|| json!({})));

        HandoffPayload {
            handoff_id: prefixed_id(HANDOFF_PREFIX),
            request_id: request.request_id.clone(),
            escalation_reason: HandoffReason::new(trigger, detail),
            summary,
            transcript: self.content.include_transcript.then_some(transcript),
            customer_context,
            destination: self.select_destination().cloned(),
            timestamp: Utc::now(),
        }
    }

    /// Deliver to the payload's destination, if it has one and a capability
    /// is registered for its kind.
    pub async fn deliver(&self, payload: &HandoffPayload) -> Result<(), DeliveryError> {
        let Some(destination) = &payload.destination else {
            return Ok(());
        };
        let Some(delivery) = self.registry.get(&destination.kind) else {
            warn!(
                handoff_id = %payload.handoff_id,
                kind = %destination.kind,
                "No delivery capability for destination type, skipping"
            );
            return Ok(());
        };
        delivery.deliver(destination, payload).await?;
        info!(
            handoff_id = %payload.handoff_id,
            request_id = %payload.request_id,
            kind = %destination.kind,
            "Handoff delivered"
        );
        Ok(())
    }

    /// Build the payload and dispatch delivery on `tasks`. Returns as soon
    /// as the payload is built.
    pub fn build_and_deliver(
        self: &Arc<Self>,
        tasks: &TaskTracker,
        input: HandoffInput<'_>,
    ) -> HandoffPayload {
        let payload = self.build(input);
        if payload.destination.is_some() {
            let builder = Arc::clone(self);
            let background = payload.clone();
            tasks.spawn(async move {
                if let Err(e) = builder.deliver(&background).await {
                    warn!(
                        handoff_id = %background.handoff_id,
                        request_id = %background.request_id,
                        error = %e,
                        "Handoff delivery failed"
                    );
                }
            });
        } else {
            info!(
                handoff_id = %payload.handoff_id,
                request_id = %payload.request_id,
                "No escalation destination configured, delivery skipped"
            );
        }
        payload
    }
}

fn summarize(request: &OutcomeRequest, context: &JsonMap, actions_taken: Vec<String>) -> HandoffSummary {
    let text = |key: &str, default: &str| {
        context
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    };
    let attempted_resolution = match context.get("attempted_actions") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect(),
        _ => actions_taken,
    };

    HandoffSummary {
        issue: request.objective().unwrap_or(DEFAULT_ISSUE).to_string(),
        attempted_resolution,
        customer_sentiment: text("sentiment", DEFAULT_SENTIMENT),
        recommended_action: text("recommended_action", DEFAULT_RECOMMENDED_ACTION),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(destinations: Vec<Destination>) -> EscalationConfig {
        EscalationConfig {
            destinations,
            ..Default::default()
        }
    }

    fn request() -> OutcomeRequest {
        OutcomeRequest::new("req_1", "cs.resolve").with_specification("objective", "Track order ORD-1")
    }

    #[test]
    fn test_destination_priority_selection() {
        let builder = HandoffBuilder::new(
            &config(vec![
                Destination::new(DestinationKind::Webhook),
                Destination::new(DestinationKind::Zendesk).with_priority(2),
                Destination::new(DestinationKind::Webhook)
                    .with_priority(2)
                    .with_setting("url", "https://second"),
            ]),
            DeliveryRegistry::empty(),
        );
        let chosen = builder.select_destination().unwrap();
        assert_eq!(chosen.kind, DestinationKind::Zendesk);

        let builder = HandoffBuilder::new(
            &config(vec![
                Destination::new(DestinationKind::Zendesk),
                Destination::new(DestinationKind::Webhook).with_priority(10),
            ]),
            DeliveryRegistry::empty(),
        );
        assert_eq!(
            builder.select_destination().unwrap().kind,
            DestinationKind::Webhook
        );

        let builder = HandoffBuilder::new(&config(vec![]), DeliveryRegistry::empty());
        assert!(builder.select_destination().is_none());
    }

    #[test]
    fn test_build_includes_everything_by_default() {
        let builder = HandoffBuilder::new(&config(vec![]), DeliveryRegistry::empty());
        let req = request();
        let mut input = HandoffInput::new(&req, Some(EscalationTrigger::ExplicitRequest));
        input.context.insert("customer".into(), json!({"tier": "gold"}));
        input.context.insert("sentiment".into(), json!("frustrated"));
        input.transcript = vec![TranscriptEntry::new("customer", "I want a human")];
        input.actions_taken = vec!["orders.lookup".to_string()];

        let payload = builder.build(input);
        assert!(payload.handoff_id.starts_with("hoff_"));
        assert_eq!(
            payload.escalation_reason.details,
            EscalationTrigger::ExplicitRequest.reason_text()
        );
        let summary = payload.summary.as_ref().unwrap();
        assert_eq!(summary.issue, "Track order ORD-1");
        assert_eq!(summary.customer_sentiment, "frustrated");
        assert_eq!(summary.recommended_action, DEFAULT_RECOMMENDED_ACTION);
        assert_eq!(summary.attempted_resolution, ["orders.lookup"]);
        assert_eq!(payload.customer_context, Some(json!({"tier": "gold"})));
        assert_eq!(payload.transcript.as_ref().unwrap().len(), 1);
        assert!(payload.destination.is_none());

        let record = payload.record();
        assert!(record.summary_provided && record.transcript_provided && record.customer_context_provided);
    }

    #[test]
    fn test_content_flags_gate_sections() {
        let mut cfg = config(vec![]);
        cfg.handoff_content = HandoffContent {
            include_summary: false,
            include_transcript: false,
            include_customer_context: true,
        };
        let builder = HandoffBuilder::new(&cfg, DeliveryRegistry::empty());
        let payload = builder.build(HandoffInput::new(&request(), None));
        assert!(payload.summary.is_none());
        assert!(payload.transcript.is_none());
        assert_eq!(payload.customer_context, Some(json!({})));
        assert_eq!(payload.escalation_reason.details, "Human review required");

        let record = payload.record();
        assert!(!record.summary_provided);
        assert!(!record.transcript_provided);
        assert!(record.customer_context_provided);
    }

    #[test]
    fn test_attempted_actions_from_context_win() {
        let builder = HandoffBuilder::new(&config(vec![]), DeliveryRegistry::empty());
        let req = request();
        let mut input = HandoffInput::new(&req, None);
        input.context.insert("attempted_actions".into(), json!(["reset password", 3]));
        input.actions_taken = vec!["crm.lookup".to_string()];
        let summary = builder.build(input).summary.unwrap();
        assert_eq!(summary.attempted_resolution, ["reset password", "3"]);
    }

    #[test]
    fn test_record_strips_destination_token() {
        let builder = HandoffBuilder::new(
            &config(vec![Destination::new(DestinationKind::Webhook)
                .with_setting("url", "https://hooks.example.com")
                .with_setting("token", "s3cret")]),
            DeliveryRegistry::empty(),
        );
        let payload = builder.build(HandoffInput::new(&request(), None));
        assert_eq!(
            payload.destination.as_ref().unwrap().setting("token"),
            Some("s3cret")
        );
        let record = payload.record();
        assert!(record.destination.unwrap().setting("token").is_none());
    }

    #[tokio::test]
    async fn test_unknown_kind_is_a_no_op() {
        let builder = HandoffBuilder::new(
            &config(vec![Destination::new(DestinationKind::Other("pager".into()))]),
            DeliveryRegistry::with_defaults(reqwest::Client::new()),
        );
        let payload = builder.build(HandoffInput::new(&request(), None));
        assert!(builder.deliver(&payload).await.is_ok());
    }

    #[tokio::test]
    async fn test_webhook_without_url_is_missing_setting() {
        let builder = HandoffBuilder::new(
            &config(vec![Destination::new(DestinationKind::Webhook)]),
            DeliveryRegistry::with_defaults(reqwest::Client::new()),
        );
        let payload = builder.build(HandoffInput::new(&request(), None));
        assert!(matches!(
            builder.deliver(&payload).await,
            Err(DeliveryError::MissingSetting { .. })
        ));
    }

    #[test]
    fn test_zendesk_ticket_shape() {
        let builder = HandoffBuilder::new(&config(vec![]), DeliveryRegistry::empty());
        let req = request();
        let mut input = HandoffInput::new(&req, Some(EscalationTrigger::OutOfScope));
        input.transcript = vec![TranscriptEntry::new("customer", "refund $400 please")];
        let payload = builder.build(input);
        let ticket = ZendeskDelivery::ticket(&payload);
        assert_eq!(ticket["ticket"]["external_id"], payload.handoff_id.as_str());
        assert_eq!(ticket["ticket"]["tags"], json!(["outcomes-handoff", "out_of_scope"]));
        let body = ticket["ticket"]["comment"]["body"].as_str().unwrap();
        assert!(body.contains("customer: refund $400 please"));
        assert!(body.contains("Issue: Track order ORD-1"));
    }
}
