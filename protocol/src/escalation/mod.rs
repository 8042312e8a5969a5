//! Escalation: deterministic hand-off-to-human decisions
//!
//! Evaluates an ordered list of trigger rules against the signals an
//! executor reports (confidence, attempt count, the customer's message, and
//! arbitrary context flags). No rule is ever reordered: operators control
//! priority purely by declaration order.
//!
//! ```text
//! rules: [r0, r1, r2, ...]        signals: {confidence, attempts, message, context}
//!           │
//!           ├─ r0 holds?  → Some(r0.trigger)
//!           ├─ r1 holds?  → Some(r1.trigger)
//!           ├─ ...
//!           └─ none hold  → None
//! ```

pub mod condition;
pub mod evaluator;
pub mod trigger;

pub use condition::{Comparison, Condition};
pub use evaluator::{EscalationEvaluator, EscalationSignals};
pub use trigger::{EscalationTrigger, TriggerRule};
