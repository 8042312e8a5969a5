//! Cross-module checks on the public protocol surface.

use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};

use outcomes_protocol::{
    CriteriaEvaluator, DeliveryMetrics, EngineConfig, EngineIdentity, EscalationEvaluator,
    EscalationSignals, EscalationTrigger, OutcomeRequest, OutcomeResponse, OutcomeStatus,
    PermissionGate, ResourceUsage, Timestamps, ToolCallError,
};

fn marketplace_request() -> OutcomeRequest {
    serde_json::from_value(json!({
        "request_id": "req_8f2a",
        "outcome_type": "cs.resolve",
        "specification": {"objective": "Refund a damaged order", "order_id": "ORD-1182"},
        "success_criteria": {
            "required": [{"metric": "resolved", "operator": "eq", "value": true}],
            "optional": [{"metric": "csat", "operator": "gte", "value": 4}]
        },
        "delivery_constraints": {"max_latency_seconds": 45},
        "metadata": {"requested_at": "2025-03-02T08:15:00Z", "channel": "chat"}
    }))
    .unwrap()
}

fn engine_config() -> EngineConfig {
    serde_json::from_value(json!({
        "execution_engine": {"id": "acme", "name": "Acme", "version": "1.0.0"},
        "outcomes": [{"type": "cs.resolve"}],
        "tools": {
            "allowed": ["orders.*", "crm.*"],
            "denied": ["orders.delete_*", "crm.*.write"],
            "limits": {"orders.process_refund": {"max_amount": 50}}
        },
        "escalation": {
            "triggers": [
                {"type": "confidence_threshold", "threshold": 0.9},
                {"type": "max_attempts", "attempts": 1}
            ]
        }
    }))
    .unwrap()
}

#[test]
fn test_deny_wins_for_every_overlapping_name() {
    let gate = PermissionGate::from_policy(&engine_config().tools);
    for name in [
        "orders.delete_all",
        "orders.delete_one",
        "crm.contacts.write",
        "crm.x.write",
    ] {
        assert!(!gate.is_allowed(name), "{name} should be denied");
    }
    for name in ["orders.lookup", "crm.contacts.read"] {
        assert!(gate.is_allowed(name), "{name} should be allowed");
    }
}

#[test]
fn test_refund_limit_rejects_single_call() {
    let gate = PermissionGate::from_policy(&engine_config().tools);
    let over = gate.check_call("orders.process_refund", &json!({"amount": 75}));
    assert!(matches!(over, Err(ToolCallError::LimitExceeded { .. })));
    // The next call is judged on its own merits.
    assert!(gate
        .check_call("orders.process_refund", &json!({"amount": 20}))
        .is_ok());
}

#[test]
fn test_first_configured_rule_wins() {
    let evaluator = EscalationEvaluator::from_config(&engine_config().escalation);
    let signals = EscalationSignals::new(0.85).with_attempt_count(2);
    assert_eq!(
        evaluator.evaluate(&signals),
        Some(EscalationTrigger::ConfidenceThreshold)
    );
}

#[test]
fn test_required_unmet_maps_to_failed_response() {
    let request = marketplace_request();
    let result = json!({"resolved": false, "csat": 5});
    let report = CriteriaEvaluator::new().evaluate(&request, &result, &Default::default());
    assert!(!report.overall_success);
    assert!(report.optional[0].passed);

    let response = OutcomeResponse::evaluated(
        &request,
        outcomes_protocol::OutcomePayload {
            outcome_type: request.outcome_type.clone(),
            result,
            artifacts: vec![],
        },
        report,
        DeliveryMetrics::new(Duration::from_secs(2), ResourceUsage::default()),
        &EngineIdentity::default(),
        Timestamps::new(request.requested_at().unwrap_or_else(Utc::now)).started(),
    );
    assert_eq!(response.status, OutcomeStatus::Failed);
    assert!(response.outcome.is_some());
    assert!(response.escalation.is_none());

    let wire: Value = serde_json::to_value(&response).unwrap();
    assert_eq!(wire["request_id"], "req_8f2a");
    assert_eq!(wire["timestamps"]["requested_at"], "2025-03-02T08:15:00Z");
    assert!(wire["timestamps"].get("failed_at").is_some());
    assert!(wire["timestamps"].get("completed_at").is_none());
    assert!(wire["response_id"].as_str().unwrap().starts_with("resp_"));
}

#[test]
fn test_response_survives_the_wire() {
    let request = marketplace_request();
    let response = OutcomeResponse::failed(
        &request,
        None,
        DeliveryMetrics::new(Duration::from_secs(45), ResourceUsage::new(900, 0.01))
            .with_error("executor exceeded 45s")
            .timed_out(),
        &engine_config().execution_engine,
        Timestamps::new(Utc::now()).started(),
    );
    let json = serde_json::to_string(&response).unwrap();
    let parsed: OutcomeResponse = serde_json::from_str(&json).unwrap();
    assert!(parsed.is_consistent());
    assert!(parsed.delivery_metrics.timed_out);
    assert_eq!(parsed.execution_engine.id, "acme");
}
