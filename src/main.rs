use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use pitch_edge::aggregate::OutcomeDistribution;
use pitch_edge::cli;
use pitch_edge::config::EngineConfig;
use pitch_edge::context::MatchContext;
use pitch_edge::engine::Engine;
use pitch_edge::rating_db;
use pitch_edge::trial::{TimelineEvent, TimelineKind};
use pitch_edge::value::{MarketOdds, ValueBet};

#[derive(Debug, Deserialize)]
struct SimulateCase {
    context: MatchContext,
    #[serde(default)]
    odds: Vec<MarketOdds>,
}

#[derive(Debug, Serialize)]
struct SimulateReport<'a> {
    context: &'a MatchContext,
    distribution: &'a OutcomeDistribution,
    value: &'a [ValueBet],
    #[serde(skip_serializing_if = "Option::is_none")]
    timeline: Option<&'a [TimelineEvent]>,
}

fn main() -> Result<()> {
    cli::init();

    let path = cli::input_path("tests/fixtures/simulate_case.json");
    let case: SimulateCase = cli::read_json(&path)?;

    let mut config = EngineConfig::from_env();
    if let Some(trials) = cli::parse_arg::<u32>("--trials") {
        config.sim.trials = trials.max(1);
    }
    if let Some(seed) = cli::parse_arg::<u64>("--seed") {
        config.sim.seed = Some(seed);
    }
    if let Some(min_edge) = cli::parse_arg::<f64>("--min-edge") {
        config.value.min_edge_pct = min_edge;
    }
    let db_path: Option<PathBuf> = cli::db_path_arg().or_else(|| config.ratings_db.clone());
    let store = rating_db::open_store(db_path.as_deref()).context("open ratings store")?;

    let engine = Engine::new(store, config)?;
    info!(
        home = %case.context.home_team,
        away = %case.context.away_team,
        trials = engine.config().sim.trials,
        "simulating"
    );
    let dist = engine.simulate(&case.context)?;

    let value = if case.odds.is_empty() {
        Vec::new()
    } else if cli::has_flag("--all") {
        engine.value(&dist, &case.odds)?
    } else {
        engine.value_bets(&dist, &case.odds)?
    };

    let timeline = if cli::has_flag("--timeline") {
        Some(engine.build_timeline(&case.context)?)
    } else {
        None
    };

    if cli::has_flag("--json") {
        let report = SimulateReport {
            context: &case.context,
            distribution: &dist,
            value: &value,
            timeline: timeline.as_deref(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_distribution(&case.context, &dist);
    if !case.odds.is_empty() {
        print_value(&value, engine.config().value.min_edge_pct);
    }
    if let Some(events) = &timeline {
        print_timeline(events);
    }
    Ok(())
}

fn print_distribution(ctx: &MatchContext, dist: &OutcomeDistribution) {
    println!(
        "{} vs {}  ({} trials)",
        ctx.home_team, ctx.away_team, dist.trials
    );
    println!(
        "  1X2       home {:>5.1}%  draw {:>5.1}%  away {:>5.1}%",
        dist.match_result.home * 100.0,
        dist.match_result.draw * 100.0,
        dist.match_result.away * 100.0
    );
    println!(
        "  xG        home {:.2}  away {:.2}  cards {:.2}",
        dist.expected_home_goals, dist.expected_away_goals, dist.expected_cards
    );
    for t in &dist.totals {
        if t.push > 0.0 {
            println!(
                "  O/U {:<5} over {:>5.1}%  under {:>5.1}%  push {:>5.1}%",
                t.line,
                t.over * 100.0,
                t.under * 100.0,
                t.push * 100.0
            );
        } else {
            println!(
                "  O/U {:<5} over {:>5.1}%  under {:>5.1}%",
                t.line,
                t.over * 100.0,
                t.under * 100.0
            );
        }
    }
    println!(
        "  BTTS      yes {:>5.1}%  no {:>5.1}%",
        dist.btts.yes * 100.0,
        dist.btts.no * 100.0
    );
    for band in &dist.handicaps {
        println!(
            "  AH {} {:+}  cover {:>5.1}%",
            band.side.label(),
            band.line,
            band.cover * 100.0
        );
    }
    let scores = dist
        .correct_scores
        .iter()
        .map(|s| format!("{}-{} {:.1}%", s.home, s.away, s.probability * 100.0))
        .collect::<Vec<_>>()
        .join(", ");
    println!("  Scores    {scores}");
    for (label, market) in [("Corners", &dist.corners), ("Cards", &dist.bookings)] {
        if let Some(m) = market {
            println!("  {label:<9} mean {:.2}", m.mean);
            for t in &m.lines {
                println!(
                    "    {:<5} over {:>5.1}%  under {:>5.1}%",
                    t.line,
                    t.over * 100.0,
                    t.under * 100.0
                );
            }
        }
    }
}

fn print_value(bets: &[ValueBet], min_edge: f64) {
    if bets.is_empty() {
        println!("No value above {min_edge:.1}% edge.");
        return;
    }
    println!("Value:");
    for b in bets {
        println!(
            "  {:<18} odds {:>6.2}  sim {:>5.1}%  implied {:>5.1}%  edge {:>+6.1}%  {:?}",
            b.market.to_string(),
            b.odds,
            b.simulated_prob * 100.0,
            b.implied_prob * 100.0,
            b.edge_pct,
            b.tier
        );
    }
}

fn print_timeline(events: &[TimelineEvent]) {
    println!("Timeline:");
    if events.is_empty() {
        println!("  (no goals or cards)");
    }
    for e in events {
        match e.kind {
            TimelineKind::Goal => println!(
                "  {:>3}'  goal {:<4} {}  {}-{}",
                e.minute,
                e.side.label(),
                e.cause.map(|c| c.label()).unwrap_or(""),
                e.home_score,
                e.away_score
            ),
            TimelineKind::Card => println!("  {:>3}'  card {}", e.minute, e.side.label()),
        }
    }
}
