//! Conversions reporter against a fake marketplace endpoint.

use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use outcomes_engine::{ConversionsReporter, FailureCategory, ReportOutcome};
use outcomes_protocol::{
    ConversionsConfig, DeliveryMetrics, EngineIdentity, OutcomeRequest, OutcomeResponse,
    ResourceUsage, RetryPolicy, Timestamps,
};

fn reporter(server: &MockServer, max_retries: u32) -> ConversionsReporter {
    let config = ConversionsConfig {
        api_endpoint: format!("{}/v1/conversions", server.uri()),
        api_key: "test-key".to_string(),
        retry: RetryPolicy {
            max_retries,
            initial_backoff_ms: 5,
            max_backoff_ms: 20,
            multiplier: 2.0,
        },
        ..Default::default()
    };
    ConversionsReporter::new(config, reqwest::Client::new())
}

fn request() -> OutcomeRequest {
    OutcomeRequest::new("req_conv", "cs.resolve")
}

fn failed_response() -> OutcomeResponse {
    OutcomeResponse::failed(
        &request(),
        None,
        DeliveryMetrics::new(Duration::from_millis(800), ResourceUsage::new(1200, 0.03)),
        &EngineIdentity::default(),
        Timestamps::new(Utc::now()),
    )
}

#[tokio::test]
async fn test_retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/conversions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/conversions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = reporter(&server, 3)
        .report_failure(
            &request(),
            &failed_response(),
            FailureCategory::ExecutionError,
            "upstream 503",
        )
        .await;

    assert_eq!(outcome, ReportOutcome::Delivered { attempts: 3 });
}

#[tokio::test]
async fn test_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let outcome = reporter(&server, 2)
        .report_success(&request(), &failed_response())
        .await;

    assert_eq!(outcome, ReportOutcome::Dropped { attempts: 3 });
}

#[tokio::test]
async fn test_client_errors_are_retried_too() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let outcome = reporter(&server, 1)
        .report_success(&request(), &failed_response())
        .await;
    assert_eq!(outcome, ReportOutcome::Dropped { attempts: 2 });
}

#[tokio::test]
async fn test_sends_bearer_auth_and_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let response = failed_response();
    let outcome = reporter(&server, 0)
        .report_failure(&request(), &response, FailureCategory::Timeout, "exceeded 45s")
        .await;
    assert_eq!(outcome, ReportOutcome::Delivered { attempts: 1 });

    let received = server.received_requests().await.unwrap();
    let event: Value = received[0].body_json().unwrap();
    assert!(event["event_id"].as_str().unwrap().starts_with("evt_"));
    assert_eq!(event["event_type"], "outcome.failure");
    assert_eq!(event["request_id"], "req_conv");
    assert_eq!(event["response_id"], response.response_id.as_str());
    assert_eq!(event["data"]["success"], false);
    assert_eq!(event["data"]["failure_category"], "timeout");
    assert_eq!(event["data"]["failure_details"], "exceeded 45s");
}

#[tokio::test]
async fn test_no_endpoint_is_a_no_op() {
    let reporter = ConversionsReporter::new(
        ConversionsConfig {
            api_key: "test-key".to_string(),
            ..Default::default()
        },
        reqwest::Client::new(),
    );
    let outcome = reporter
        .report_success(&request(), &failed_response())
        .await;
    assert_eq!(outcome, ReportOutcome::Skipped);
}
