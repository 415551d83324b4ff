//! Replays a file of recorded detections through the gate offline.
//!
//! Each line of the input is one JSON detection payload. Decisions are
//! printed as JSON lines, followed by the stats report. With `--state` the
//! gate starts from, and writes back to, a state file, so a replay can be
//! split across runs.

use std::{
    io::{BufRead, BufReader},
    path::PathBuf,
    sync::Arc,
};

use chrono::Utc;
use clap::Parser;
use thiserror::Error;

use crate::{
    config::AppConfig,
    engine::{dedup::DedupBuffer, orchestrator::DecisionOrchestrator, rarity::RarityClassifier},
    ingest::parse_payload,
    models::{GateDecision, SpeciesTableError},
    persistence::{JsonFileStateStore, error::PersistenceError, traits::StateStore},
};

/// Errors that abort a replay.
#[derive(Error, Debug)]
pub enum Error {
    /// Reading the events file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    /// The species table could not be loaded.
    #[error("Species table error: {0}")]
    SpeciesTable(#[from] SpeciesTableError),
    /// Writing the state file failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    /// A decision could not be printed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Arguments of the `replay` subcommand.
#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// Path to a file with one JSON detection per line.
    #[arg(short, long)]
    events: PathBuf,
    /// State file to start from and write back to.
    #[arg(short, long)]
    state: Option<PathBuf>,
    /// Configuration directory. Defaults to `configs`.
    #[arg(short, long)]
    config_dir: Option<String>,
    /// Station assigned to detections that do not name one.
    #[arg(long, default_value = "replay")]
    station: String,
}

/// Feeds every line of `reader` through the duplicate buffer and the
/// orchestrator. Event time doubles as the arrival clock, so the result only
/// depends on the input.
pub fn replay_lines<R: BufRead>(
    reader: R,
    station: &str,
    orchestrator: &mut DecisionOrchestrator,
    dedup: &mut DedupBuffer,
) -> Result<Vec<GateDecision>, std::io::Error> {
    let mut decisions = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let mut inbound = parse_payload(line.as_bytes(), station, Utc::now());
        if let Ok(event) = inbound.validate() {
            inbound.received_at = event.timestamp;
            for ready in dedup.drain_ready(event.timestamp) {
                decisions.push(orchestrator.decide(&ready));
            }
        }
        if let Some(inbound) = dedup.offer(inbound) {
            decisions.push(orchestrator.decide(&inbound));
        }
    }

    for held in dedup.drain_all() {
        decisions.push(orchestrator.decide(&held));
    }
    Ok(decisions)
}

/// Runs the `replay` subcommand.
pub async fn execute(args: ReplayArgs) -> Result<(), Error> {
    let config = AppConfig::new(args.config_dir.as_deref())?;
    let classifier = Arc::new(RarityClassifier::load_from(
        &config.species_path,
        config.gate.cooldowns.clone(),
    )?);

    let store = args.state.as_ref().map(JsonFileStateStore::new);
    let state = match &store {
        Some(store) => store.load().await,
        None => Default::default(),
    };

    let started = Utc::now();
    let mut orchestrator =
        DecisionOrchestrator::from_state(&config.gate, classifier, state, started);
    let mut dedup = DedupBuffer::new(config.gate.dedup_window_secs);

    tracing::info!(events = %args.events.display(), "Starting replay...");
    let file = std::fs::File::open(&args.events)?;
    let decisions =
        replay_lines(BufReader::new(file), &args.station, &mut orchestrator, &mut dedup)?;
    tracing::info!(count = decisions.len(), "Replay finished.");

    for decision in &decisions {
        println!("{}", serde_json::to_string(decision)?);
    }
    let report = orchestrator.flush_stats(Utc::now());
    println!("{}", serde_json::to_string(&report)?);

    if let Some(store) = store {
        store.save(&orchestrator.snapshot(Utc::now())).await?;
        tracing::info!(path = %store.path().display(), "Replay state saved.");
    }

    Ok(())
}
