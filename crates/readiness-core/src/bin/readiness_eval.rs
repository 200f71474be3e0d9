//! Readiness Evaluation CLI Tool
//!
//! Drives the rule engine from JSON files. Engine state is read from and
//! written back to a state file so that consecutive invocations form a
//! sequence of ticks.
//!
//! Usage:
//!   readiness-eval tick --rules <rules.json> --observations <batch.json> [--at <time>]
//!   readiness-eval ack <alert-id> [--note <text>]
//!   readiness-eval resolve <alert-id> --reason <text>
//!   readiness-eval units --people <people.json>
//!   readiness-eval score --observations <batch.json>

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use readiness_core::scoring::{group_observations, score_entities};
use readiness_core::*;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "readiness-eval")]
#[command(author = "Mycelix Health")]
#[command(version = "0.1.0")]
#[command(about = "Score health telemetry and evaluate alert rules", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine state file (created on first tick)
    #[arg(short, long, global = true, default_value = "readiness-state.json")]
    state: PathBuf,

    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output file (stdout if not specified)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Log output format (logs go to stderr)
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one tick of observations against a rule set
    Tick {
        /// Rule set (JSON array of alert rules)
        #[arg(short, long)]
        rules: PathBuf,

        /// Observation batch (JSON array)
        #[arg(long)]
        observations: PathBuf,

        /// Tick time (RFC 3339); defaults to the latest observation
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Acknowledge an alert
    Ack {
        alert_id: String,

        /// Operator note
        #[arg(short, long)]
        note: Option<String>,

        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Resolve an alert
    Resolve {
        alert_id: String,

        /// Resolution reason
        #[arg(short, long)]
        reason: String,

        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Summarize units from person snapshots and the alerts in state
    Units {
        /// Person snapshots (JSON array)
        #[arg(short, long)]
        people: PathBuf,
    },

    /// Derive scores for an observation batch without touching state
    Score {
        /// Observation batch (JSON array)
        #[arg(long)]
        observations: PathBuf,

        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let config = match &cli.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };

    let result: serde_json::Value = match cli.command {
        Commands::Tick { rules, observations, at } => {
            let rules: Vec<AlertRule> = read_json(&rules)?;
            let batch: Vec<Observation> = read_json(&observations)?;
            let at = at
                .or_else(|| batch.iter().map(|o| o.timestamp).max())
                .unwrap_or_else(Utc::now);

            let mut state = load_state(&cli.state)?;
            let report = RuleEngine::new(config).tick(&mut state, at, &batch, &rules);
            save_state(&cli.state, &state)?;

            info!(
                transitions = report.transitions.len(),
                rule_errors = report.rule_errors.len(),
                "tick complete"
            );
            serde_json::to_value(report)?
        }
        Commands::Ack { alert_id, note, at } => {
            let mut state = load_state(&cli.state)?;
            let transition = state.acknowledge(&alert_id, note, at.unwrap_or_else(Utc::now))?;
            save_state(&cli.state, &state)?;
            serde_json::to_value(transition)?
        }
        Commands::Resolve { alert_id, reason, at } => {
            let mut state = load_state(&cli.state)?;
            let transition = state.resolve(&alert_id, reason, at.unwrap_or_else(Utc::now))?;
            save_state(&cli.state, &state)?;
            serde_json::to_value(transition)?
        }
        Commands::Units { people } => {
            let people: Vec<PersonHealth> = read_json(&people)?;
            let state = load_state(&cli.state)?;
            let alerts: Vec<AlertInstance> = state.alerts.into_values().collect();
            serde_json::to_value(summarize_units(&people, &alerts))?
        }
        Commands::Score { observations, at } => {
            let batch: Vec<Observation> = read_json(&observations)?;
            let at = at
                .or_else(|| batch.iter().map(|o| o.timestamp).max())
                .unwrap_or_else(Utc::now);

            let scores: std::collections::BTreeMap<String, EntityScores> =
                score_entities(&group_observations(&batch), at, config.indoors)
                    .into_iter()
                    .map(|(entity, scored)| (entity, scored.scores))
                    .collect();
            serde_json::to_value(scores)?
        }
    };

    let output_str = serde_json::to_string_pretty(&result)?;
    if let Some(output_path) = cli.output {
        fs::write(&output_path, &output_str)?;
        eprintln!("Output written to: {}", output_path.display());
    } else {
        println!("{}", output_str);
    }

    Ok(())
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    Ok(serde_json::from_str(&content)?)
}

fn load_state(path: &Path) -> Result<EngineState, Box<dyn std::error::Error>> {
    if !path.exists() {
        debug!(path = %path.display(), "no state file, starting fresh");
        return Ok(EngineState::new());
    }
    read_json(path)
}

fn save_state(path: &Path, state: &EngineState) -> Result<(), Box<dyn std::error::Error>> {
    fs::write(path, serde_json::to_string_pretty(state)?)?;
    Ok(())
}
