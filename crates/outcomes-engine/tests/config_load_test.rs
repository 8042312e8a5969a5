//! Loading `outcomes.yml` from disk.

use std::io::Write;

use outcomes_engine::config::load_config;
use outcomes_protocol::{
    DestinationKind, EscalationTrigger, LogFormat, PermissionGate, TriggerRule,
};
use serde_json::json;

const CONFIG: &str = r#"
provider:
  id: acme-support
  name: Acme Support Engine
  version: 2.1.0
  capabilities: [cs.resolve]

outcomes:
  - type: cs.resolve
    config:
      max_latency_seconds: 45
      default_effort: thorough
  - type: cs.legacy
    enabled: false

tools:
  allowed: ["orders.*", "crm.*"]
  denied: ["orders.delete_*"]
  limits:
    orders.process_refund:
      max_amount: 50

escalation:
  triggers:
    - type: confidence_threshold
      threshold: 0.8
    - type: explicit_request
      patterns: ["human", "manager"]
    - type: timeout
  destinations:
    - type: zendesk
      priority: 1
      url: https://acme.zendesk.com/api/v2/tickets.json
      token: ${OUTCOMES_LOAD_TEST_ZENDESK_TOKEN}

conversions:
  api_endpoint: https://marketplace.example.com/v1/conversions
  api_key: ${OUTCOMES_LOAD_TEST_UNSET_KEY}
  retry:
    max_retries: 5

logging:
  level: debug
  format: json
"#;

#[test]
fn test_load_with_env_substitution_and_provider_alias() {
    std::env::set_var("OUTCOMES_LOAD_TEST_ZENDESK_TOKEN", "zd-live-token");

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    let config = load_config(file.path()).unwrap();

    assert_eq!(config.execution_engine.id, "acme-support");
    assert_eq!(config.execution_engine.version, "2.1.0");

    let outcome = config.outcome("cs.resolve").unwrap();
    assert_eq!(outcome.max_latency(), 45.0);
    assert_eq!(outcome.default_effort(), "thorough");
    assert!(config.outcome("cs.legacy").is_none());

    let destination = &config.escalation.destinations[0];
    assert_eq!(destination.kind, DestinationKind::Zendesk);
    assert_eq!(destination.setting("token"), Some("zd-live-token"));

    assert!(matches!(
        config.escalation.triggers[2],
        TriggerRule::Timeout
    ));
    assert_eq!(
        config.escalation.triggers[1].trigger(),
        Some(EscalationTrigger::ExplicitRequest)
    );

    // Unset variable stays a placeholder, which counts as "no key".
    assert_eq!(config.conversions.api_key, "${OUTCOMES_LOAD_TEST_UNSET_KEY}");
    assert!(!config.conversions.is_configured());
    assert_eq!(config.conversions.retry.max_retries, 5);
    assert_eq!(config.conversions.retry.initial_backoff_ms, 500);

    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_missing_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yml");
    let err = load_config(&path).unwrap_err();
    assert!(format!("{err:#}").contains("absent.yml"));
}

#[test]
fn test_invalid_threshold_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        b"escalation:\n  triggers:\n    - type: confidence_threshold\n      threshold: 1.5\n",
    )
    .unwrap();
    let err = load_config(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("1.5"));
}

#[test]
fn test_non_numeric_tool_limits_do_not_block_loading() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        br#"
tools:
  allowed: ["orders.*"]
  limits:
    orders.process_refund: { max_amount: 50 }
    orders.apply_discount: { max_percent: 20, allowed_codes: ["SORRY10", "LOYALTY15"] }
"#,
    )
    .unwrap();
    let config = load_config(file.path()).unwrap();

    let gate = PermissionGate::from_policy(&config.tools);
    assert_eq!(gate.limits_for("orders.apply_discount").len(), 1);
    assert!(gate
        .check_call("orders.apply_discount", &json!({"percent": 25, "code": "SORRY10"}))
        .is_err());
    assert!(gate
        .check_call("orders.apply_discount", &json!({"percent": 10, "code": "SORRY10"}))
        .is_ok());
    assert!(config
        .warnings()
        .iter()
        .any(|w| w.contains("allowed_codes")));
}
