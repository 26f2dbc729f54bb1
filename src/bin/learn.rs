use anyhow::{Context, Result};
use serde::Deserialize;

use pitch_edge::cli;
use pitch_edge::config::EngineConfig;
use pitch_edge::engine::Engine;
use pitch_edge::learning::{LoggedMatch, NarrativeLearning};
use pitch_edge::rating_db;

#[derive(Debug, Deserialize)]
struct LearnBatch {
    #[serde(default)]
    results: Vec<LoggedMatch>,
    #[serde(default)]
    narrative: Vec<NarrativeLearning>,
}

fn main() -> Result<()> {
    cli::init();

    let path = cli::input_path("tests/fixtures/learn_batch.json");
    let batch: LearnBatch = cli::read_json(&path)?;

    let config = EngineConfig::from_env();
    let db_path = cli::db_path_arg().or_else(|| config.ratings_db.clone());
    let store = rating_db::open_store(db_path.as_deref()).context("open ratings store")?;
    let engine = Engine::new(store, config)?;

    for entry in batch.results {
        engine.log_match_result(entry)?;
    }
    let power = engine.run_power_rating_update()?;
    if power.updated {
        println!(
            "Power ratings: applied {} of {} results ({} skipped)",
            power.applied_count, power.batch_size, power.skipped
        );
    } else {
        println!(
            "Power ratings: deferred, {} results pending (minimum {})",
            engine.pending_results(),
            engine.config().learning.min_batch
        );
    }

    if !batch.narrative.is_empty() {
        let narrative = engine.apply_narrative_learnings(&batch.narrative)?;
        println!(
            "Narrative ratings: applied {} ({} skipped)",
            narrative.applied, narrative.skipped
        );
    }

    if cli::has_flag("--show") {
        println!("{}", serde_json::to_string_pretty(&engine.get_ratings())?);
    }
    Ok(())
}
