//! Protocol error types
//!
//! Two concerns live here: tool-call rejections (scoped to a single call,
//! never fatal to the request) and configuration validation errors.

use thiserror::Error;

/// Rejection of a single tool call by the permission gate.
///
/// Surfaced to the executor as the result of that one call; the request
/// keeps running.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolCallError {
    /// Tool matched a deny pattern or no allow pattern.
    #[error("Tool {tool} not permitted")]
    Denied { tool: String },

    /// A numeric argument violated one of the tool's configured limits.
    #[error("Tool {tool}: {argument} = {actual} violates {limit} of {bound}")]
    LimitExceeded {
        tool: String,
        limit: String,
        argument: String,
        bound: f64,
        actual: f64,
    },
}

impl ToolCallError {
    /// Create a denied error
    pub fn denied(tool: impl Into<String>) -> Self {
        Self::Denied { tool: tool.into() }
    }

    /// Name of the tool that was rejected.
    pub fn tool(&self) -> &str {
        match self {
            Self::Denied { tool } | Self::LimitExceeded { tool, .. } => tool,
        }
    }
}

/// Errors found while validating an [`EngineConfig`](crate::EngineConfig).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The same outcome type is enabled more than once.
    #[error("Outcome type '{outcome_type}' is enabled more than once")]
    DuplicateOutcomeType { outcome_type: String },

    /// A confidence threshold outside `[0, 1]`.
    #[error("Confidence threshold {threshold} is outside [0, 1]")]
    ThresholdOutOfRange { threshold: f64 },

    /// Latency bound that is zero, negative or not finite.
    #[error("max_latency_seconds for '{outcome_type}' must be positive, got {value}")]
    InvalidLatency { outcome_type: String, value: f64 },

    /// Retry policy that would never back off.
    #[error("Retry multiplier must be >= 1.0, got {multiplier}")]
    InvalidRetryMultiplier { multiplier: f64 },
}
