//! Loading `outcomes.yml`.
//!
//! String values that are exactly `${VAR}` are replaced with the
//! environment variable's value before deserialization; unset variables are
//! left as written (so `api_key: ${CONVERSIONS_API_KEY}` reads as "not
//! configured" rather than failing). Partial substitution inside a longer
//! string is not performed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use outcomes_protocol::EngineConfig;
use serde_yaml::Value;
use tracing::{debug, warn};

/// Config file used when neither `--config` nor `OUTCOMES_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "outcomes.yml";
/// Environment variable naming the config file.
pub const ENV_CONFIG_PATH: &str = "OUTCOMES_CONFIG";

/// `OUTCOMES_CONFIG` if set, else `outcomes.yml`.
pub fn default_config_path() -> PathBuf {
    std::env::var(ENV_CONFIG_PATH)
        .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into())
        .into()
}

/// Read, substitute, parse and validate a config file.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config =
        parse_config(&raw).with_context(|| format!("loading config {}", path.display()))?;
    debug!(
        path = %path.display(),
        outcomes = config.outcomes.len(),
        engine = %config.execution_engine.id,
        "Loaded engine config"
    );
    Ok(config)
}

/// Parse config YAML with environment substitution from the process env.
pub fn parse_config(raw: &str) -> Result<EngineConfig> {
    let mut value: Value = serde_yaml::from_str(raw).context("parsing YAML")?;
    // An empty file parses as null; treat it as all defaults.
    if value.is_null() {
        value = Value::Mapping(Default::default());
    }
    expand_env_vars(&mut value, &|name: &str| std::env::var(name).ok());

    let config: EngineConfig =
        serde_yaml::from_value(value).context("config does not match the expected shape")?;
    config.validate()?;
    for warning in config.warnings() {
        warn!("{warning}");
    }
    Ok(config)
}

/// Replace whole-string `${VAR}` values in place using `lookup`.
pub fn expand_env_vars(value: &mut Value, lookup: &dyn Fn(&str) -> Option<String>) {
    match value {
        Value::String(s) => {
            if let Some(resolved) = placeholder(s).and_then(lookup) {
                *s = resolved;
            }
        }
        Value::Sequence(items) => {
            for item in items {
                expand_env_vars(item, lookup);
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                expand_env_vars(item, lookup);
            }
        }
        Value::Tagged(tagged) => expand_env_vars(&mut tagged.value, lookup),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn placeholder(s: &str) -> Option<&str> {
    let name = s.trim().strip_prefix("${")?.strip_suffix('}')?;
    (!name.is_empty()).then_some(name)
}
