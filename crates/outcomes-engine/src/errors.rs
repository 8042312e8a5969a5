//! Engine error taxonomy.
//!
//! | Type             | Raised by            | Effect on the response                 |
//! |------------------|----------------------|----------------------------------------|
//! | `ExecutionError` | executors            | `failed`, message in `delivery_metrics.error` |
//! | `DeliveryError`  | handoff destinations | none (logged)                          |
//! | `ReportError`    | conversions reporter | none (retried, then logged)            |
//!
//! Tool-call rejections ([`ToolCallError`]) are scoped to a single call and
//! only become an `ExecutionError` if the executor chooses to give up.

use outcomes_protocol::ToolCallError;
use thiserror::Error;

/// Fault raised by an executor. Always converted to a terminal `failed`
/// response at the engine boundary.
#[derive(Debug, Error)]
pub enum ExecutionError {
    // ── Retriable ─────────────────────────────────────────────────────────
    /// A backend the executor depends on failed (network, 5xx, crash).
    #[error("Execution fault: {0}")]
    Fault(String),

    /// A tool ran and returned an error.
    #[error("Tool failure [{tool}]: {message}")]
    ToolFailure { tool: String, message: String },

    // ── Non-retriable ─────────────────────────────────────────────────────
    /// The executor gave up after a tool call was rejected by the gate.
    #[error(transparent)]
    ToolRejected(#[from] ToolCallError),

    /// The request's specification is missing something the executor needs.
    #[error("Invalid specification: {0}")]
    InvalidSpecification(String),

    /// The executor observed its cancellation token.
    #[error("Cancelled")]
    Cancelled,

    /// Any other error that doesn't fit the above categories.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ExecutionError {
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault(message.into())
    }

    pub fn tool_failure(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFailure {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn invalid_specification(message: impl Into<String>) -> Self {
        Self::InvalidSpecification(message.into())
    }

    /// Whether an executor may sensibly try again after this error.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Fault(_) | Self::ToolFailure { .. })
    }
}

/// Failure to hand a payload to a destination.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Delivery transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Destination rejected handoff with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Destination '{kind}' is missing required setting '{setting}'")]
    MissingSetting { kind: String, setting: String },
}

impl DeliveryError {
    pub fn missing_setting(kind: impl Into<String>, setting: impl Into<String>) -> Self {
        Self::MissingSetting {
            kind: kind.into(),
            setting: setting.into(),
        }
    }
}

/// A single failed attempt to post a conversion event.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Endpoint returned HTTP {status}")]
    Status { status: u16 },
}
