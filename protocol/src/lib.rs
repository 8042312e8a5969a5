//! Outcomes Protocol: deterministic rules for outcome execution
//!
//! This crate holds every part of the outcomes engine that makes a decision
//! without touching the network:
//!
//! - **Wire types**: [`OutcomeRequest`] in, [`OutcomeResponse`] out, with the
//!   field presence rules enforced by the response constructors.
//! - **Engine configuration**: [`EngineConfig`] and its sections, as parsed
//!   from `outcomes.yml`.
//! - **Permission gate**: allow/deny wildcard patterns and per-tool numeric
//!   limits ([`PermissionGate`]).
//! - **Escalation**: ordered trigger rules evaluated against live signals
//!   ([`EscalationEvaluator`]), with a small closed condition grammar.
//! - **Success criteria**: required/optional metric checks against an
//!   execution result ([`CriteriaEvaluator`]).
//! - **State machine**: the legal lifecycle of one request
//!   ([`StateMachine`]).
//!
//! The async runtime (executors, handoff delivery, conversions reporting)
//! lives in the `outcomes-engine` crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use outcomes_protocol::{EscalationEvaluator, EscalationSignals, TriggerRule};
//!
//! let evaluator = EscalationEvaluator::new(vec![
//!     TriggerRule::ConfidenceThreshold { threshold: 0.9 },
//!     TriggerRule::MaxAttempts { attempts: 1 },
//! ]);
//! let signals = EscalationSignals::new(0.85).with_attempt_count(2);
//! // First rule wins even though both fire.
//! assert_eq!(
//!     evaluator.evaluate(&signals),
//!     Some(outcomes_protocol::EscalationTrigger::ConfidenceThreshold)
//! );
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod criteria;
pub mod error;
pub mod escalation;
pub mod ids;
pub mod permission;
pub mod request;
pub mod response;
pub mod state_machine;

/// Free-form JSON object used for specifications, metadata and context maps.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

// Re-export configuration types
pub use config::{
    ConversionsConfig, Destination, DestinationKind, EngineConfig, EngineIdentity,
    EscalationConfig, HandoffContent, LogFormat, LoggingConfig, OutcomeTypeConfig, RetryPolicy,
    ToolPolicy,
};

// Re-export evaluators
pub use criteria::CriteriaEvaluator;
pub use escalation::{
    Comparison, Condition, EscalationEvaluator, EscalationSignals, EscalationTrigger, TriggerRule,
};
pub use permission::{PermissionGate, ToolPattern};

// Re-export error types
pub use error::{ConfigError, ToolCallError};

// Re-export wire types
pub use request::{
    Criterion, DeliveryConstraints, EscalationPolicyOverride, Operator, OutcomeRequest,
    SuccessCriteria,
};
pub use response::{
    Artifact, CostBreakdown, CriteriaReport, CriterionResult, DeliveryMetrics, EscalationRecord,
    HandoffReason, OutcomePayload, OutcomeResponse, OutcomeStatus, ResourceUsage, Timestamps,
    ToolCallOutcome, ToolCallRecord,
};

// Re-export lifecycle types
pub use state_machine::{EngineState, IllegalTransition, StateMachine, TransitionRecord};
