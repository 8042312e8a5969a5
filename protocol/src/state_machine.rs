//! Engine State Machine: the legal lifecycle of one outcome request.
//!
//! Every `execute` call drives its own [`StateMachine`] so that:
//! 1. Every state transition is checked against the transition table and logged.
//! 2. No transition ever leaves a terminal state.
//! 3. The transition log explains how a response reached its status.
//!
//! ```text
//! Received → Validating → Executing → Escalating → Escalated
//!                                   ↘ Evaluating → Completed | Failed
//!
//! (any non-terminal) → Failed | Cancelled
//! ```

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::response::OutcomeStatus;

/// The set of engine states for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Request accepted by the engine.
    Received,
    /// Resolving the outcome type and its executor.
    Validating,
    /// Executor running, bounded by the latency timeout.
    Executing,
    /// Building and dispatching a human handoff.
    Escalating,
    /// Checking success criteria against the result.
    Evaluating,
    /// Terminal: required criteria passed.
    Completed,
    /// Terminal: rejected, faulted, timed out, or criteria unmet.
    Failed,
    /// Terminal: handed to a human.
    Escalated,
    /// Terminal: caller cancelled.
    Cancelled,
}

impl EngineState {
    /// Whether this is a terminal state (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Escalated | Self::Cancelled
        )
    }

    /// The response status a terminal state maps to.
    pub fn terminal_status(self) -> Option<OutcomeStatus> {
        match self {
            Self::Completed => Some(OutcomeStatus::Completed),
            Self::Failed => Some(OutcomeStatus::Failed),
            Self::Escalated => Some(OutcomeStatus::Escalated),
            Self::Cancelled => Some(OutcomeStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::Validating => write!(f, "validating"),
            Self::Executing => write!(f, "executing"),
            Self::Escalating => write!(f, "escalating"),
            Self::Evaluating => write!(f, "evaluating"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Escalated => write!(f, "escalated"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Legal transitions between engine states.
///
/// ```text
/// Received → Validating
/// Validating → Executing
/// Executing → Escalating | Evaluating
/// Escalating → Escalated
/// Evaluating → Completed
/// ```
fn is_legal_transition(from: EngineState, to: EngineState) -> bool {
    use EngineState::*;

    if from.is_terminal() {
        return false;
    }
    // Any non-terminal state can fail or be cancelled.
    if matches!(to, Failed | Cancelled) {
        return true;
    }

    matches!(
        (from, to),
        (Received, Validating)
            | (Validating, Executing)
            | (Executing, Escalating)
            | (Executing, Evaluating)
            | (Escalating, Escalated)
            | (Evaluating, Completed)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: EngineState,
    pub to: EngineState,
    /// Milliseconds since the state machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone)]
pub struct IllegalTransition {
    pub from: EngineState,
    pub to: EngineState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal state transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Per-request state machine.
pub struct StateMachine {
    request_id: String,
    current: EngineState,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    /// Create a new state machine starting at `Received`.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            current: EngineState::Received,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> EngineState {
        self.current
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Attempt to advance to the next state.
    pub fn advance(
        &mut self,
        to: EngineState,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        let record = TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        tracing::debug!(
            request_id = %self.request_id,
            from = %self.current,
            to = %to,
            reason = reason.unwrap_or(""),
            "State transition"
        );

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    /// Transition to `Failed` from any non-terminal state.
    pub fn fail(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(EngineState::Failed, Some(reason))
    }

    /// Transition to `Cancelled` from any non-terminal state.
    pub fn cancel(&mut self) -> Result<(), IllegalTransition> {
        self.advance(EngineState::Cancelled, Some("cancelled by caller"))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// `received → ... → <current>` with elapsed time.
    pub fn summary(&self) -> String {
        let mut path = vec![EngineState::Received.to_string()];
        path.extend(self.transitions.iter().map(|t| t.to.to_string()));
        format!(
            "{} ({}ms, {} transitions)",
            path.join(" → "),
            self.created_at.elapsed().as_millis(),
            self.transitions.len(),
        )
    }
}
