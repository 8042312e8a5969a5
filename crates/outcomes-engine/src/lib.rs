//! Outcomes Engine: async runtime for outcome-based execution
//!
//! Drives [`OutcomeRequest`](outcomes_protocol::OutcomeRequest)s through the
//! lifecycle defined in `outcomes-protocol`:
//!
//! - [`engine`]: the [`OutcomeEngine`] state machine driver (timeouts,
//!   cancellation, escalation, criteria).
//! - [`executor`]: the [`OutcomeExecutor`] trait, the three-way
//!   [`ExecutionOutcome`], and the per-execution [`ExecutionContext`] with
//!   its tool-call hooks.
//! - [`handoff`]: handoff payload assembly and destination delivery.
//! - [`conversions`]: success/failure event reporting with retry.
//! - [`config`]: YAML loading with `${VAR}` substitution.
//! - [`replay`]: an executor that replays a recorded script.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use outcomes_engine::{OutcomeEngine, ReplayExecutor};
//!
//! let config = outcomes_engine::config::load_config("outcomes.yml".as_ref())?;
//! let engine = OutcomeEngine::new(config)
//!     .with_executor("cs.resolve", Arc::new(ReplayExecutor::from_file("script.json".as_ref())?));
//! let response = engine.execute(&request).await;
//! engine.drain().await;
//! ```

pub mod config;
pub mod conversions;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod handoff;
pub mod replay;

pub use conversions::{ConversionEvent, ConversionsReporter, FailureCategory, ReportOutcome};
pub use engine::OutcomeEngine;
pub use errors::{DeliveryError, ExecutionError, ReportError};
pub use executor::{
    EscalationSignal, ExecutionContext, ExecutionOutcome, ExecutionResult, OutcomeExecutor,
    ToolHooks, TranscriptEntry,
};
pub use handoff::{
    DeliveryRegistry, HandoffBuilder, HandoffDelivery, HandoffInput, HandoffPayload,
    HandoffSummary, WebhookDelivery, ZendeskDelivery,
};
pub use replay::{ReplayExecutor, ReplayScript};
