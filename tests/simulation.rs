use std::path::PathBuf;

use pitch_edge::aggregate::{OutcomeDistribution, aggregate};
use pitch_edge::config::{EngineConfig, SimConfig};
use pitch_edge::context::{MatchContext, RefereeDisposition, Side, Sport};
use pitch_edge::engine::Engine;
use pitch_edge::ratings::{MatchupProfile, MemoryRatingStore};
use pitch_edge::value::MarketOdds;

const MC_MARGIN: f64 = 0.01;

#[derive(serde::Deserialize)]
struct SimulateCase {
    context: MatchContext,
    odds: Vec<MarketOdds>,
}

fn fixture_case() -> SimulateCase {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("simulate_case.json");
    let raw = std::fs::read_to_string(path).expect("read fixture");
    serde_json::from_str(&raw).expect("parse fixture")
}

fn run(ctx: &MatchContext, seed: u64, trials: u32) -> OutcomeDistribution {
    aggregate(ctx, &MatchupProfile::neutral(), &SimConfig::seeded(seed), trials).unwrap()
}

fn assert_sums_to_one(label: &str, parts: &[f64]) {
    let sum: f64 = parts.iter().sum();
    assert!((sum - 1.0).abs() < 1e-6, "{label} sums to {sum}");
}

#[test]
fn reference_fixture_lands_in_expected_bands() {
    let ctx = MatchContext::new(Sport::Football, "Home", "Away", 1.8, 1.1);
    let dist = run(&ctx, 2026, 25_000);

    // Reference bands widened by MC_MARGIN, about three standard errors at 25k trials.
    // Post-goal momentum favours the side that scores more often, so the home
    // share sits at the top of its band.
    let within = |lo: f64, hi: f64, v: f64| (lo - MC_MARGIN..=hi + MC_MARGIN).contains(&v);
    let r = dist.match_result;
    assert!(within(0.45, 0.55, r.home), "home {}", r.home);
    assert!(within(0.20, 0.28, r.draw), "draw {}", r.draw);
    assert!(within(0.20, 0.28, r.away), "away {}", r.away);

    let over = dist.totals_line(2.5).unwrap().over;
    assert!(within(0.55, 0.65, over), "over 2.5 {over}");
    assert!(dist.expected_home_goals > dist.expected_away_goals);
}

#[test]
fn every_market_partition_sums_to_one() {
    let case = fixture_case();
    let dist = run(&case.context, 5, 6_000);

    let r = dist.match_result;
    assert_sums_to_one("1x2", &[r.home, r.draw, r.away]);
    assert_sums_to_one("btts", &[dist.btts.yes, dist.btts.no]);
    assert_eq!(dist.totals.len(), case.context.totals_lines.len());
    for t in &dist.totals {
        assert_sums_to_one("totals", &[t.over, t.under, t.push]);
    }
    assert!(dist.totals_line(3.0).unwrap().push > 0.0);
    assert_eq!(dist.totals_line(2.5).unwrap().push, 0.0);
    for band in &dist.handicaps {
        assert_sums_to_one("handicap", &[band.cover, band.fail]);
    }
    for market in [dist.corners.as_ref(), dist.bookings.as_ref()] {
        let market = market.expect("secondary market simulated");
        for t in &market.lines {
            assert_sums_to_one("secondary", &[t.over, t.under, t.push]);
        }
    }
    let top: f64 = dist.correct_scores.iter().map(|s| s.probability).sum();
    assert!(top <= 1.0 + 1e-9);
}

#[test]
fn handicap_bands_mirror_each_other() {
    let ctx = MatchContext::new(Sport::Football, "Home", "Away", 1.6, 1.3);
    let dist = run(&ctx, 9, 8_000);
    let home_minus = dist.handicap(Side::Home, -0.5).unwrap().cover;
    let away_plus = dist.handicap(Side::Away, 0.5).unwrap().cover;
    assert!((home_minus - dist.match_result.home).abs() < 1e-12);
    assert!((home_minus + away_plus - 1.0).abs() < 1e-12);
}

#[test]
fn raising_home_rate_raises_home_win() {
    let low = MatchContext::new(Sport::Football, "Home", "Away", 1.8, 1.1);
    let high = MatchContext::new(Sport::Football, "Home", "Away", 2.4, 1.1);
    let a = run(&low, 31, 20_000);
    let b = run(&high, 31, 20_000);
    assert!(b.match_result.home > a.match_result.home);
    assert!(b.totals_line(2.5).unwrap().over >= a.totals_line(2.5).unwrap().over);
}

#[test]
fn same_seed_same_distribution() {
    let case = fixture_case();
    let parallel = run(&case.context, 77, 5_500);
    let again = run(&case.context, 77, 5_500);
    assert_eq!(parallel, again);

    let sequential = aggregate(
        &case.context,
        &MatchupProfile::neutral(),
        &SimConfig {
            parallel: false,
            ..SimConfig::seeded(77)
        },
        5_500,
    )
    .unwrap();
    assert_eq!(parallel, sequential);
}

#[test]
fn strict_referee_books_more_cards() {
    let mut ctx = MatchContext::new(Sport::Football, "Home", "Away", 1.4, 1.2);
    ctx.referee = RefereeDisposition::Lenient;
    let lenient = run(&ctx, 3, 6_000);
    ctx.referee = RefereeDisposition::Strict;
    let strict = run(&ctx, 3, 6_000);
    assert!(strict.expected_cards > lenient.expected_cards * 2.0);
}

#[test]
fn hockey_uses_its_own_clock_and_skips_corners() {
    let mut ctx = MatchContext::new(Sport::IceHockey, "Oilers", "Flames", 3.4, 2.8);
    ctx.totals_lines = vec![5.5, 6.5];
    ctx.corners_rate = 9.0;
    ctx.corner_lines = vec![8.5];
    let dist = run(&ctx, 12, 6_000);
    assert!(dist.corners.is_none());
    assert!(dist.totals_line(5.5).is_some());
    let goals = dist.expected_home_goals + dist.expected_away_goals;
    assert!(goals > 4.5 && goals < 7.5, "hockey goals {goals}");
}

#[test]
fn engine_values_the_fixture_quotes() {
    let case = fixture_case();
    let config = EngineConfig {
        sim: SimConfig {
            trials: 5_000,
            ..SimConfig::seeded(4)
        },
        ..EngineConfig::default()
    };
    let engine = Engine::new(MemoryRatingStore::new(), config).unwrap();
    let dist = engine.simulate(&case.context).unwrap();
    let all = engine.value(&dist, &case.odds).unwrap();
    assert_eq!(all.len(), case.odds.len());
    assert!(all.windows(2).all(|w| w[0].edge_pct >= w[1].edge_pct));

    let picks = engine.value_bets(&dist, &case.odds).unwrap();
    assert!(picks.iter().all(|b| b.edge_pct > 7.0));
    assert!(picks.len() <= all.len());
}

#[test]
fn invalid_rates_are_rejected_before_simulating() {
    let ctx = MatchContext::new(Sport::Football, "Home", "Away", 0.0, 1.1);
    assert!(aggregate(&ctx, &MatchupProfile::neutral(), &SimConfig::seeded(1), 100).is_err());
    let ctx = MatchContext::new(Sport::Football, "Home", "Away", 1.2, f64::NAN);
    assert!(aggregate(&ctx, &MatchupProfile::neutral(), &SimConfig::seeded(1), 100).is_err());
}
