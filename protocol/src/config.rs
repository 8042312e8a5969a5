//! Engine configuration types.
//!
//! These mirror the sections of `outcomes.yml`. Every section defaults when
//! absent, unknown keys are ignored, and rule/destination kinds this build
//! does not know deserialize into inert variants. Loading from disk (and
//! `${VAR}` substitution) lives in the engine crate.
//!
//! ```yaml
//! execution_engine:          # `provider:` is accepted as an alias
//!   id: acme-support
//!   name: Acme Support Engine
//!   version: 1.4.0
//! outcomes:
//!   - type: cs.resolve
//!     config:
//!       max_latency_seconds: 120
//!       default_effort: high
//! tools:
//!   allowed: ["orders.*", "crm.read_*"]
//!   denied: ["orders.delete_*"]
//!   limits:
//!     orders.process_refund: { max_amount: 50 }
//!     orders.apply_discount: { allowed_codes: [SORRY10] }  # not enforced
//! escalation:
//!   triggers:
//!     - type: confidence_threshold
//!       threshold: 0.7
//!   destinations:
//!     - type: webhook
//!       url: https://hooks.example.com/handoff
//!       priority: 1
//! conversions:
//!   api_endpoint: ${CONVERSIONS_ENDPOINT}
//!   api_key: ${CONVERSIONS_API_KEY}
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::escalation::TriggerRule;
use crate::JsonMap;

/// Latency bound applied when neither the request nor the outcome config
/// sets one.
pub const DEFAULT_MAX_LATENCY_SECS: f64 = 300.0;
/// Effort level reported when the outcome config does not set one.
pub const DEFAULT_EFFORT: &str = "standard";

// ── Root ────────────────────────────────────────────────────────────────

/// Process-wide engine configuration. Read-only once loaded; reloading
/// means building a new engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(alias = "provider")]
    pub execution_engine: EngineIdentity,
    pub outcomes: Vec<OutcomeTypeConfig>,
    /// Context source descriptors, passed through untouched.
    pub context_sources: JsonMap,
    pub tools: ToolPolicy,
    pub escalation: EscalationConfig,
    pub conversions: ConversionsConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// First *enabled* outcome definition for `outcome_type`.
    pub fn outcome(&self, outcome_type: &str) -> Option<&OutcomeTypeConfig> {
        self.outcomes
            .iter()
            .find(|o| o.enabled && o.outcome_type == outcome_type)
    }

    /// Reject values no engine could run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for outcome in self.outcomes.iter().filter(|o| o.enabled) {
            if !seen.insert(outcome.outcome_type.as_str()) {
                return Err(ConfigError::DuplicateOutcomeType {
                    outcome_type: outcome.outcome_type.clone(),
                });
            }
            if let Some(value) = outcome.config.get("max_latency_seconds").and_then(Value::as_f64) {
                if !(value.is_finite() && value > 0.0) {
                    return Err(ConfigError::InvalidLatency {
                        outcome_type: outcome.outcome_type.clone(),
                        value,
                    });
                }
            }
        }

        for rule in &self.escalation.triggers {
            if let TriggerRule::ConfidenceThreshold { threshold } = rule {
                if !(0.0..=1.0).contains(threshold) {
                    return Err(ConfigError::ThresholdOutOfRange {
                        threshold: *threshold,
                    });
                }
            }
        }

        let multiplier = self.conversions.retry.multiplier;
        if !(multiplier.is_finite() && multiplier >= 1.0) {
            return Err(ConfigError::InvalidRetryMultiplier { multiplier });
        }
        Ok(())
    }

    /// Non-fatal findings: configuration the engine will ignore at runtime.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for (index, rule) in self.escalation.triggers.iter().enumerate() {
            match rule {
                TriggerRule::Unrecognized => {
                    warnings.push(format!("escalation.triggers[{index}]: unknown rule type, ignored"));
                }
                TriggerRule::OutOfScope { conditions } => {
                    for condition in conditions.iter().filter(|c| !c.is_recognized()) {
                        warnings.push(format!(
                            "escalation.triggers[{index}]: condition {:?} not understood, always false",
                            condition.to_string()
                        ));
                    }
                }
                _ => {}
            }
        }

        for (index, dest) in self.escalation.destinations.iter().enumerate() {
            if let DestinationKind::Other(kind) = &dest.kind {
                warnings.push(format!(
                    "escalation.destinations[{index}]: unknown type {kind:?}, delivery skipped"
                ));
            }
        }

        for pattern in self.tools.allowed.iter().chain(&self.tools.denied) {
            if pattern.matches('*').count() > 1 {
                warnings.push(format!("tools: pattern {pattern:?} has more than one '*', never matches"));
            }
        }

        let mut tools: Vec<_> = self.tools.limits.iter().collect();
        tools.sort_by_key(|(tool, _)| tool.as_str());
        for (tool, limits) in tools {
            for (name, value) in limits.iter().filter(|(_, v)| !v.is_number()) {
                warnings.push(format!(
                    "tools.limits.{tool}.{name}: non-numeric value {value}, not enforced"
                ));
            }
        }

        if self.conversions.auto_report && !self.conversions.is_configured() {
            warnings.push("conversions: endpoint or api_key unset, reporting disabled".to_string());
        }

        warnings
    }
}

// ── Identity ────────────────────────────────────────────────────────────

/// Opaque identity strings echoed into every response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineIdentity {
    pub id: String,
    pub name: String,
    pub version: String,
    pub model: String,
    pub model_version: String,
    pub harness: String,
    pub harness_version: String,
    pub vendor: String,
    pub capabilities: Vec<String>,
}

impl Default for EngineIdentity {
    fn default() -> Self {
        Self {
            id: "unknown".to_string(),
            name: "Unknown Engine".to_string(),
            version: "0.0.0".to_string(),
            model: String::new(),
            model_version: String::new(),
            harness: String::new(),
            harness_version: String::new(),
            vendor: String::new(),
            capabilities: Vec::new(),
        }
    }
}

// ── Outcomes ────────────────────────────────────────────────────────────

/// One supported outcome type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeTypeConfig {
    #[serde(rename = "type")]
    pub outcome_type: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Executor settings. `max_latency_seconds` and `default_effort` are
    /// read by the engine; everything else is for the executor.
    #[serde(default)]
    pub config: JsonMap,
}

impl OutcomeTypeConfig {
    pub fn new(outcome_type: impl Into<String>) -> Self {
        Self {
            outcome_type: outcome_type.into(),
            enabled: true,
            config: JsonMap::new(),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Configured latency bound in seconds.
    pub fn max_latency(&self) -> f64 {
        self.config
            .get("max_latency_seconds")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_MAX_LATENCY_SECS)
    }

    pub fn default_effort(&self) -> &str {
        self.config
            .get("default_effort")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_EFFORT)
    }
}

fn enabled_by_default() -> bool {
    true
}

// ── Tools ───────────────────────────────────────────────────────────────

/// Tool allow/deny patterns and per-tool limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPolicy {
    pub allowed: Vec<String>,
    pub denied: Vec<String>,
    /// Exact tool name → limit name → value. Only numeric values are
    /// enforced; others (e.g. `allowed_codes: [...]`) are left to the
    /// executor.
    pub limits: HashMap<String, JsonMap>,
}

impl ToolPolicy {
    /// Numeric limits for `tool`, keyed by limit name.
    pub fn numeric_limits(&self, tool: &str) -> BTreeMap<String, f64> {
        self.limits
            .get(tool)
            .into_iter()
            .flatten()
            .filter_map(|(name, value)| value.as_f64().map(|bound| (name.clone(), bound)))
            .collect()
    }
}

// ── Escalation ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub enabled: bool,
    /// Evaluated in declaration order; first match wins.
    pub triggers: Vec<TriggerRule>,
    pub destinations: Vec<Destination>,
    pub handoff_content: HandoffContent,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            triggers: Vec::new(),
            destinations: Vec::new(),
            handoff_content: HandoffContent::default(),
        }
    }
}

/// What a handoff payload carries beyond the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffContent {
    pub include_summary: bool,
    pub include_transcript: bool,
    pub include_customer_context: bool,
}

impl Default for HandoffContent {
    fn default() -> Self {
        Self {
            include_summary: true,
            include_transcript: true,
            include_customer_context: true,
        }
    }
}

/// Per-request bound on handoff delivery when a destination sets no
/// `timeout_seconds`.
pub const DEFAULT_DELIVERY_TIMEOUT_SECS: f64 = 10.0;

/// Setting keys never echoed back in responses.
const SECRET_SETTINGS: &[&str] = &["token", "api_key", "password", "secret"];

/// A handoff destination. Kind-specific settings (`url`, `token`, ...) are
/// kept as a flat map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    #[serde(rename = "type", default)]
    pub kind: DestinationKind,
    /// Lower wins. Absent sorts after every explicit priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(flatten)]
    pub settings: JsonMap,
}

impl Destination {
    pub fn new(kind: DestinationKind) -> Self {
        Self {
            kind,
            priority: None,
            settings: JsonMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// String setting by key.
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(Value::as_str)
    }

    /// `timeout_seconds` if positive, else [`DEFAULT_DELIVERY_TIMEOUT_SECS`].
    pub fn timeout(&self) -> Duration {
        let secs = self
            .settings
            .get("timeout_seconds")
            .and_then(Value::as_f64)
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(DEFAULT_DELIVERY_TIMEOUT_SECS);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(Duration::from_secs_f64(DEFAULT_DELIVERY_TIMEOUT_SECS))
    }

    /// Copy with credentials stripped, for echoing into responses.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.settings.retain(|k, _| !SECRET_SETTINGS.contains(&k.as_str()));
        copy
    }
}

/// Destination kinds. Unknown strings are preserved in `Other` and treated
/// as a no-op at delivery time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DestinationKind {
    Zendesk,
    Webhook,
    Other(String),
}

impl Default for DestinationKind {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl DestinationKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Zendesk => "zendesk",
            Self::Webhook => "webhook",
            Self::Other(kind) => kind,
        }
    }
}

impl From<String> for DestinationKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "zendesk" => Self::Zendesk,
            "webhook" => Self::Webhook,
            _ => Self::Other(kind),
        }
    }
}

impl From<DestinationKind> for String {
    fn from(kind: DestinationKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Conversions ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionsConfig {
    pub api_endpoint: String,
    pub api_key: String,
    pub auto_report: bool,
    pub retry: RetryPolicy,
    pub timeout_seconds: u64,
}

impl Default for ConversionsConfig {
    fn default() -> Self {
        Self {
            api_endpoint: String::new(),
            api_key: String::new(),
            auto_report: true,
            retry: RetryPolicy::default(),
            timeout_seconds: 10,
        }
    }
}

/// An unresolved `${VAR}` placeholder counts as unset.
fn resolved(value: &str) -> Option<&str> {
    let value = value.trim();
    let placeholder = value.starts_with("${") && value.ends_with('}');
    (!value.is_empty() && !placeholder).then_some(value)
}

impl ConversionsConfig {
    pub fn endpoint(&self) -> Option<&str> {
        resolved(&self.api_endpoint)
    }

    pub fn api_key(&self) -> Option<&str> {
        resolved(&self.api_key)
    }

    /// Both endpoint and credential are set.
    pub fn is_configured(&self) -> bool {
        self.endpoint().is_some() && self.api_key().is_some()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Exponential backoff for event delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), capped at `max_backoff_ms`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let ms = self.initial_backoff_ms as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(ms.min(self.max_backoff_ms as f64) as u64)
    }
}

// ── Logging ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}
