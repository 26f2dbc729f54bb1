use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use pitch_edge::calibration::{self, Outcome, Prob3, classify_outcome};
use pitch_edge::cli;
use pitch_edge::config::EngineConfig;
use pitch_edge::context::MatchContext;
use pitch_edge::engine::Engine;
use pitch_edge::rating_db;
use pitch_edge::ratings::{MemoryRatingStore, RatingStore};

const DEFAULT_BACKTEST_TRIALS: u32 = 5_000;
const DEFAULT_BINS: usize = 10;

#[derive(Debug, Deserialize)]
struct BacktestCase {
    #[serde(default)]
    id: Option<String>,
    context: MatchContext,
    actual_home: u32,
    actual_away: u32,
}

fn main() -> Result<()> {
    cli::init();

    let path = cli::input_path("tests/fixtures/backtest_cases.json");
    let cases: Vec<BacktestCase> = cli::read_json(&path)?;

    let mut config = EngineConfig::from_env();
    config.sim.trials = cli::parse_arg::<u32>("--trials")
        .unwrap_or(DEFAULT_BACKTEST_TRIALS)
        .max(1);
    config.sim.seed = cli::parse_arg::<u64>("--seed").or(config.sim.seed).or(Some(0));
    let bins = cli::parse_arg::<usize>("--bins").unwrap_or(DEFAULT_BINS);

    // Stored ratings are only applied when asked for, so runs compare the raw model by default.
    let (predictions, outcomes) = if cli::has_flag("--with-ratings") {
        let db_path = cli::db_path_arg().or_else(|| config.ratings_db.clone());
        let store = rating_db::open_store(db_path.as_deref()).context("open ratings store")?;
        run_cases(&Engine::new(store, config)?, &cases)
    } else {
        run_cases(&Engine::new(MemoryRatingStore::new(), config)?, &cases)
    };

    let metrics = calibration::evaluate_probs(&predictions, &outcomes);
    println!("Backtest over {} matches:", metrics.samples);
    println!(
        "  brier={:.4} log_loss={:.4} accuracy={:.3}",
        metrics.brier, metrics.log_loss, metrics.accuracy
    );
    let baseline = calibration::evaluate_probs(&vec![Prob3::uniform(); outcomes.len()], &outcomes);
    println!(
        "  uniform baseline: brier={:.4} log_loss={:.4}",
        baseline.brier, baseline.log_loss
    );

    for (label, class) in [
        ("home", Outcome::Home),
        ("draw", Outcome::Draw),
        ("away", Outcome::Away),
    ] {
        println!("Reliability ({label}):");
        for bin in calibration::calibration_bins(&predictions, &outcomes, class, bins) {
            if bin.count == 0 {
                continue;
            }
            println!(
                "  {:.2}-{:.2}  n={:<4} predicted {:>5.1}%  observed {:>5.1}%",
                bin.bucket_start,
                bin.bucket_end,
                bin.count,
                bin.avg_pred * 100.0,
                bin.actual_rate * 100.0
            );
        }
    }
    Ok(())
}

fn run_cases<S: RatingStore>(
    engine: &Engine<S>,
    cases: &[BacktestCase],
) -> (Vec<Prob3>, Vec<Outcome>) {
    let mut predictions = Vec::with_capacity(cases.len());
    let mut outcomes = Vec::with_capacity(cases.len());
    for (idx, case) in cases.iter().enumerate() {
        let id = case.id.clone().unwrap_or_else(|| format!("case-{idx}"));
        match engine.simulate(&case.context) {
            Ok(dist) => {
                predictions.push(dist.match_result);
                outcomes.push(classify_outcome(case.actual_home, case.actual_away));
            }
            Err(err) => warn!(case = %id, error = %err, "skipping backtest case"),
        }
    }
    (predictions, outcomes)
}
