//! Handoff delivery to webhook and Zendesk destinations.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use outcomes_engine::{
    DeliveryError, DeliveryRegistry, EscalationSignal, ExecutionContext, ExecutionError,
    ExecutionOutcome, HandoffBuilder, HandoffInput, OutcomeEngine, OutcomeExecutor,
    TranscriptEntry,
};
use outcomes_protocol::{
    Destination, DestinationKind, EngineConfig, EscalationConfig, EscalationTrigger,
    OutcomeRequest, OutcomeStatus, OutcomeTypeConfig,
};

fn request() -> OutcomeRequest {
    OutcomeRequest::new("req_hand", "cs.resolve")
        .with_specification("objective", "Customer cannot log in")
}

fn builder(destination: Destination) -> HandoffBuilder {
    let config = EscalationConfig {
        destinations: vec![destination],
        ..Default::default()
    };
    HandoffBuilder::new(&config, DeliveryRegistry::with_defaults(reqwest::Client::new()))
}

#[tokio::test]
async fn test_webhook_receives_payload_with_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/escalations"))
        .and(header("authorization", "Bearer hook-secret"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let builder = builder(
        Destination::new(DestinationKind::Webhook)
            .with_setting("url", format!("{}/hooks/escalations", server.uri()))
            .with_setting("token", "hook-secret"),
    );
    let req = request();
    let mut input = HandoffInput::new(&req, Some(EscalationTrigger::ExplicitRequest));
    input.context.insert("sentiment".into(), json!("frustrated"));
    let payload = builder.build(input);
    builder.deliver(&payload).await.unwrap();

    let received = server.received_requests().await.unwrap();
    let body: Value = received[0].body_json().unwrap();
    assert_eq!(body["handoff_id"], payload.handoff_id.as_str());
    assert_eq!(body["request_id"], "req_hand");
    assert_eq!(body["summary"]["issue"], "Customer cannot log in");
    assert_eq!(body["summary"]["customer_sentiment"], "frustrated");
    assert!(body["destination"].get("token").is_none());
}

#[tokio::test]
async fn test_zendesk_creates_ticket() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/tickets.json"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let builder = builder(
        Destination::new(DestinationKind::Zendesk)
            .with_setting("url", format!("{}/api/v2/tickets.json", server.uri())),
    );
    let req = request();
    let mut input = HandoffInput::new(&req, Some(EscalationTrigger::MaxAttempts));
    input.transcript = vec![TranscriptEntry::new("customer", "still locked out")];
    let payload = builder.build(input);
    builder.deliver(&payload).await.unwrap();

    let received = server.received_requests().await.unwrap();
    let body: Value = received[0].body_json().unwrap();
    assert_eq!(body["ticket"]["external_id"], payload.handoff_id.as_str());
    assert_eq!(body["ticket"]["tags"], json!(["outcomes-handoff", "max_attempts"]));
}

#[tokio::test]
async fn test_rejected_delivery_surfaces_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_string("bad ticket"))
        .mount(&server)
        .await;

    let builder = builder(
        Destination::new(DestinationKind::Webhook).with_setting("url", server.uri()),
    );
    let payload = builder.build(HandoffInput::new(&request(), None));
    match builder.deliver(&payload).await {
        Err(DeliveryError::Rejected { status, body }) => {
            assert_eq!(status, 422);
            assert_eq!(body, "bad ticket");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_stalled_destination_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let builder = builder(
        Destination::new(DestinationKind::Webhook)
            .with_setting("url", server.uri())
            .with_setting("timeout_seconds", 1),
    );
    let payload = builder.build(HandoffInput::new(&request(), None));
    let result = tokio::time::timeout(Duration::from_secs(10), builder.deliver(&payload))
        .await
        .expect("delivery should give up on its own");
    match result {
        Err(DeliveryError::Transport(e)) => assert!(e.is_timeout(), "{e}"),
        other => panic!("unexpected {other:?}"),
    }
}

struct AskForHuman;

#[async_trait::async_trait]
impl OutcomeExecutor for AskForHuman {
    fn name(&self) -> &str {
        "ask-for-human"
    }

    async fn execute(
        &self,
        _request: &OutcomeRequest,
        _config: &OutcomeTypeConfig,
        ctx: &mut ExecutionContext,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        ctx.record_action("crm.lookup");
        Ok(ExecutionOutcome::Escalated(
            EscalationSignal::new(EscalationTrigger::ExplicitRequest)
                .with_context("customer", json!({"id": "cus_42", "tier": "gold"})),
        ))
    }
}

#[tokio::test]
async fn test_engine_escalation_delivers_in_background() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = EngineConfig::default();
    config.outcomes = vec![OutcomeTypeConfig::new("cs.resolve")];
    config.conversions.auto_report = false;
    config.escalation.destinations = vec![
        Destination::new(DestinationKind::Other("pagerduty".into())).with_priority(5),
        Destination::new(DestinationKind::Webhook)
            .with_priority(1)
            .with_setting("url", format!("{}/hooks", server.uri()))
            .with_setting("token", "hook-secret"),
    ];
    let engine = OutcomeEngine::new(config).with_executor("cs.resolve", Arc::new(AskForHuman));

    let response = engine.execute(&request()).await;
    assert_eq!(response.status, OutcomeStatus::Escalated);
    let record = response.escalation.as_ref().unwrap();
    let destination = record.destination.as_ref().unwrap();
    assert_eq!(destination.kind, DestinationKind::Webhook);
    assert!(destination.setting("token").is_none());

    engine.drain().await;
    let received = server.received_requests().await.unwrap();
    let body: Value = received[0].body_json().unwrap();
    assert_eq!(body["handoff_id"], record.handoff_id.as_str());
    assert_eq!(body["customer_context"], json!({"id": "cus_42", "tier": "gold"}));
    assert_eq!(body["summary"]["attempted_resolution"], json!(["crm.lookup"]));
}
