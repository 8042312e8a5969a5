//! Replay executor: drives the engine from a recorded script.
//!
//! A script lists the tool calls to attempt (each goes through the
//! permission gate exactly like a live executor's) and the outcome to return:
//!
//! ```json
//! {
//!   "tool_calls": [{"tool": "orders.lookup", "args": {"order_id": "ORD-1"}}],
//!   "delay_ms": 250,
//!   "outcome": {"status": "completed", "result": {"resolved": true}}
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use outcomes_protocol::{OutcomeRequest, OutcomeTypeConfig};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::errors::ExecutionError;
use crate::executor::{ExecutionContext, ExecutionOutcome, OutcomeExecutor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub tool_calls: Vec<ReplayToolCall>,
    /// Simulated work time before the outcome is returned.
    #[serde(default)]
    pub delay_ms: u64,
    pub outcome: ExecutionOutcome,
}

/// Executor that replays a [`ReplayScript`].
pub struct ReplayExecutor {
    script: ReplayScript,
}

impl ReplayExecutor {
    pub fn new(script: ReplayScript) -> Self {
        Self { script }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading replay script {}", path.display()))?;
        let script = serde_json::from_str(&raw)
            .with_context(|| format!("parsing replay script {}", path.display()))?;
        Ok(Self::new(script))
    }
}

#[async_trait]
impl OutcomeExecutor for ReplayExecutor {
    fn name(&self) -> &str {
        "replay"
    }

    async fn execute(
        &self,
        request: &OutcomeRequest,
        _config: &OutcomeTypeConfig,
        ctx: &mut ExecutionContext,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        ctx.begin_attempt();

        for call in &self.script.tool_calls {
            let replayed = ctx
                .invoke_tool(&call.tool, call.args.clone(), |args| async move {
                    Ok::<_, ExecutionError>(json!({ "replayed": true, "args": args }))
                })
                .await;
            // Rejections are scoped to the call; the script keeps going.
            if let Err(e) = replayed {
                info!(request_id = %request.request_id, tool = %call.tool, error = %e, "Replayed call rejected");
            }
        }

        if self.script.delay_ms > 0 {
            tokio::select! {
                _ = ctx.cancellation().cancelled() => return Err(ExecutionError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(self.script.delay_ms)) => {}
            }
        }

        Ok(self.script.outcome.clone())
    }
}
