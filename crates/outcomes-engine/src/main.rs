//! `outcomes-engine` command-line entry point.
//!
//! ```bash
//! # Validate a config file (OUTCOMES_CONFIG is the default path)
//! outcomes-engine check-config --config outcomes.yml
//!
//! # Ask the permission gate about one call
//! outcomes-engine check-tool orders.process_refund --args '{"amount": 75}'
//!
//! # Drive a request through the engine with a recorded executor script
//! outcomes-engine run --request request.json --replay script.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use outcomes_engine::config::{default_config_path, load_config};
use outcomes_engine::{OutcomeEngine, ReplayExecutor};
use outcomes_protocol::{EngineConfig, LogFormat, LoggingConfig, OutcomeRequest, PermissionGate};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse and validate a config file, printing any warnings
    CheckConfig {
        /// Config file (overrides OUTCOMES_CONFIG)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Check a tool call against the configured permission gate
    CheckTool {
        /// Config file (overrides OUTCOMES_CONFIG)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Tool name, e.g. `orders.process_refund`
        tool: String,

        /// Call arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Execute a request with a replay executor and print the response
    Run {
        /// Config file (overrides OUTCOMES_CONFIG)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Outcome request JSON
        #[arg(long)]
        request: PathBuf,

        /// Replay script JSON (tool calls + recorded outcome)
        #[arg(long)]
        replay: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::CheckConfig { config } => {
            let config = load(config)?;
            for warning in config.warnings() {
                println!("warning: {warning}");
            }
            println!(
                "ok: {} outcome type(s), {} escalation destination(s), conversions {}",
                config.outcomes.iter().filter(|o| o.enabled).count(),
                config.escalation.destinations.len(),
                if config.conversions.is_configured() {
                    "configured"
                } else {
                    "not configured"
                }
            );
        }
        Command::CheckTool { config, tool, args } => {
            let config = load(config)?;
            let call_args: serde_json::Value =
                serde_json::from_str(&args).context("--args must be a JSON value")?;
            let gate = PermissionGate::from_policy(&config.tools);
            match gate.check_call(&tool, &call_args) {
                Ok(()) => println!("allowed: {tool}"),
                Err(e) => {
                    println!("rejected: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Run {
            config,
            request,
            replay,
        } => {
            let config = load(config)?;
            let request = read_request(&request)?;
            let executor = ReplayExecutor::from_file(&replay)?;
            let engine = OutcomeEngine::new(config)
                .with_executor(request.outcome_type.clone(), Arc::new(executor));

            let response = engine.execute(&request).await;
            engine.drain().await;
            info!(
                request_id = %response.request_id,
                status = %response.status,
                "Run finished"
            );
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}

/// Load config and install the tracing subscriber it asks for.
fn load(path: Option<PathBuf>) -> Result<EngineConfig> {
    let path = path.unwrap_or_else(default_config_path);
    // Subscriber first, so warnings raised while loading are visible.
    let logging = peek_logging(&path);
    init_tracing(&logging.level, logging.format);
    load_config(&path)
}

#[derive(Deserialize, Default)]
struct LoggingSection {
    #[serde(default)]
    logging: LoggingConfig,
}

fn peek_logging(path: &Path) -> LoggingConfig {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_yaml::from_str::<LoggingSection>(&raw).ok())
        .map(|section| section.logging)
        .unwrap_or_default()
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn read_request(path: &Path) -> Result<OutcomeRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading request {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing request {}", path.display()))
}
