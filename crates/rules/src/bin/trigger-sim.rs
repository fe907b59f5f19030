//! trigger-sim — run one trigger evaluation batch against an in-memory store.
//!
//! Loads a fixture (stored triggers, history, lookup tables, open alerts,
//! plus the batch scope and readings), evaluates it with [`TriggerEngine`]
//! and prints the resulting alert candidates as JSON on stdout.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use cellwatch_core::config::{load_dotenv, Config};
use cellwatch_rules::fixture::SimulationFixture;
use cellwatch_rules::memory::MemoryStore;
use cellwatch_rules::store::Collaborators;
use cellwatch_rules::{EvaluateOptions, TriggerEngine};

// ── CLI ─────────────────────────────────────────────────────────────

/// Evaluate a telemetry batch fixture against its triggers.
#[derive(Parser, Debug)]
#[command(name = "trigger-sim", version, about)]
struct Cli {
    /// Path to a YAML or JSON fixture.
    #[arg(long, env = "TRIGGER_SIM_FIXTURE")]
    fixture: PathBuf,

    /// Ignore alerts that are already open.
    #[arg(long, default_value_t = false)]
    skip_existing_check: bool,

    /// Do not write candidates to the in-memory alert store.
    #[arg(long, default_value_t = false)]
    no_persist: bool,

    /// Pretty-print the JSON output.
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_summary();

    let fixture = SimulationFixture::from_path(&cli.fixture)?;
    info!(
        path = %cli.fixture.display(),
        triggers = fixture.seed.triggers.len(),
        balls = fixture.inputs.ball_readings.len(),
        "loaded fixture"
    );

    let store = Arc::new(MemoryStore::from_seed(fixture.seed));
    let engine = TriggerEngine::new(Collaborators::uniform(store), config.engine.clone());

    let writer = |candidate: &cellwatch_rules::alert::AlertCandidate| {
        info!(trigger_id = %candidate.trigger_id, title = %candidate.title, "alert candidate");
    };
    let options = EvaluateOptions {
        alert_writer: Some(&writer),
        skip_existing_check: cli.skip_existing_check,
        persist_alerts: Some(!cli.no_persist),
        local_history: fixture.local_history.as_ref(),
    };

    let outcome = engine.evaluate(&fixture.scope, &fixture.inputs, options).await?;
    info!(
        considered = outcome.triggers_considered,
        matched = outcome.triggers_matched,
        suppressed = outcome.suppressed_open,
        persisted = outcome.persisted,
        "evaluation finished"
    );

    let json = if cli.pretty {
        serde_json::to_string_pretty(&outcome)?
    } else {
        serde_json::to_string(&outcome)?
    };
    println!("{}", json);
    Ok(())
}
