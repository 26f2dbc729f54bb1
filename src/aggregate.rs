use std::collections::{BTreeMap, HashMap};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::calibration::Prob3;
use crate::config::SimConfig;
use crate::context::{MatchContext, Side};
use crate::error::{SimError, SimResult};
use crate::ratings::MatchupProfile;
use crate::trial::{TrialEngine, TrialResult};

/// Trials per RNG stream. Fixed so results do not depend on the thread count.
const CHUNK_TRIALS: u32 = 1_000;
const PARTITION_TOLERANCE: f64 = 1e-9;
pub const HANDICAP_BANDS: [f64; 4] = [-1.5, -0.5, 0.5, 1.5];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TotalsLine {
    pub line: f64,
    pub over: f64,
    pub under: f64,
    /// Non-zero only on whole-number lines.
    pub push: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BttsMarket {
    pub yes: f64,
    pub no: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HandicapBand {
    pub side: Side,
    pub line: f64,
    pub cover: f64,
    pub fail: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreProbability {
    pub home: u32,
    pub away: u32,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecondaryMarket {
    pub mean: f64,
    pub lines: Vec<TotalsLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeDistribution {
    pub trials: u32,
    pub match_result: Prob3,
    pub totals: Vec<TotalsLine>,
    pub btts: BttsMarket,
    pub handicaps: Vec<HandicapBand>,
    /// Most frequent exact scores, highest first.
    pub correct_scores: Vec<ScoreProbability>,
    pub expected_home_goals: f64,
    pub expected_away_goals: f64,
    pub expected_cards: f64,
    pub corners: Option<SecondaryMarket>,
    pub bookings: Option<SecondaryMarket>,
    #[serde(skip)]
    score_table: BTreeMap<(u32, u32), f64>,
}

impl OutcomeDistribution {
    pub fn totals_line(&self, line: f64) -> Option<&TotalsLine> {
        find_line(&self.totals, line)
    }

    pub fn handicap(&self, side: Side, line: f64) -> Option<&HandicapBand> {
        self.handicaps
            .iter()
            .find(|b| b.side == side && (b.line - line).abs() < 1e-9)
    }

    /// Probability of an exact score; zero if it never occurred in any trial.
    pub fn score_probability(&self, home: u32, away: u32) -> f64 {
        self.score_table.get(&(home, away)).copied().unwrap_or(0.0)
    }
}

pub(crate) fn find_line(lines: &[TotalsLine], line: f64) -> Option<&TotalsLine> {
    lines.iter().find(|l| (l.line - line).abs() < 1e-9)
}

/// Runs `trial_count` trials and turns the tallies into market probabilities.
pub fn aggregate(
    ctx: &MatchContext,
    profile: &MatchupProfile,
    sim: &SimConfig,
    trial_count: u32,
) -> SimResult<OutcomeDistribution> {
    ctx.validate()?;
    if trial_count == 0 {
        return Err(SimError::InvalidTrialCount);
    }

    let engine = TrialEngine::new(ctx, profile, sim);
    let seed = sim.seed.unwrap_or_else(|| rand::thread_rng().r#gen());
    let chunks = trial_count.div_ceil(CHUNK_TRIALS);

    let run_chunk = |idx: u32| {
        let start = idx * CHUNK_TRIALS;
        let n = CHUNK_TRIALS.min(trial_count - start);
        let mut rng = chunk_rng(seed, idx);
        let mut tally = Tally::new(ctx);
        for _ in 0..n {
            tally.record(&engine.run_trial(&mut rng, false));
        }
        tally
    };

    let tally = if sim.parallel {
        (0..chunks)
            .into_par_iter()
            .map(&run_chunk)
            .reduce(|| Tally::new(ctx), Tally::merge)
    } else {
        (0..chunks).map(&run_chunk).fold(Tally::new(ctx), Tally::merge)
    };
    debug_assert_eq!(tally.trials, trial_count as u64);

    let dist = tally.into_distribution(sim.top_scores);
    debug!(
        home = %ctx.home_team,
        away = %ctx.away_team,
        trials = trial_count,
        p_home = dist.match_result.home,
        p_draw = dist.match_result.draw,
        p_away = dist.match_result.away,
        "simulation aggregated"
    );
    Ok(dist)
}

fn chunk_rng(seed: u64, chunk: u32) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(chunk as u64);
    rng
}

/// Integer counts from a run of trials; merging is order-independent.
#[derive(Debug, Clone)]
struct Tally<'a> {
    ctx: &'a MatchContext,
    trials: u64,
    home: u64,
    draw: u64,
    away: u64,
    btts: u64,
    totals: Vec<LineCounts>,
    // [side][band] cover counts.
    handicap_cover: [[u64; 4]; 2],
    scores: HashMap<(u32, u32), u64>,
    home_goals: u64,
    away_goals: u64,
    cards: u64,
    corners: SecondaryCounts,
    bookings: SecondaryCounts,
}

#[derive(Debug, Clone, Copy, Default)]
struct LineCounts {
    over: u64,
    push: u64,
}

#[derive(Debug, Clone, Default)]
struct SecondaryCounts {
    trials: u64,
    sum: u64,
    lines: Vec<LineCounts>,
}

impl SecondaryCounts {
    fn new(line_count: usize) -> Self {
        Self {
            trials: 0,
            sum: 0,
            lines: vec![LineCounts::default(); line_count],
        }
    }

    fn record(&mut self, value: u32, lines: &[f64]) {
        self.trials += 1;
        self.sum += value as u64;
        for (counts, line) in self.lines.iter_mut().zip(lines) {
            counts.add(value, *line);
        }
    }

    fn merge(&mut self, other: SecondaryCounts) {
        self.trials += other.trials;
        self.sum += other.sum;
        for (a, b) in self.lines.iter_mut().zip(other.lines) {
            a.over += b.over;
            a.push += b.push;
        }
    }

    fn into_market(self, name: &str, lines: &[f64]) -> Option<SecondaryMarket> {
        if self.trials == 0 {
            return None;
        }
        let n = self.trials as f64;
        Some(SecondaryMarket {
            mean: self.sum as f64 / n,
            lines: totals_from_counts(name, &self.lines, lines, self.trials),
        })
    }
}

impl LineCounts {
    fn add(&mut self, total: u32, line: f64) {
        let total = total as f64;
        if total > line {
            self.over += 1;
        } else if total == line {
            self.push += 1;
        }
    }
}

impl<'a> Tally<'a> {
    fn new(ctx: &'a MatchContext) -> Self {
        Self {
            ctx,
            trials: 0,
            home: 0,
            draw: 0,
            away: 0,
            btts: 0,
            totals: vec![LineCounts::default(); ctx.totals_lines.len()],
            handicap_cover: [[0; 4]; 2],
            scores: HashMap::new(),
            home_goals: 0,
            away_goals: 0,
            cards: 0,
            corners: SecondaryCounts::new(ctx.corner_lines.len()),
            bookings: SecondaryCounts::new(ctx.card_lines.len()),
        }
    }

    fn record(&mut self, r: &TrialResult) {
        let ctx = self.ctx;
        self.trials += 1;
        let (h, a) = (r.home_score, r.away_score);
        match h.cmp(&a) {
            std::cmp::Ordering::Greater => self.home += 1,
            std::cmp::Ordering::Equal => self.draw += 1,
            std::cmp::Ordering::Less => self.away += 1,
        }
        if h > 0 && a > 0 {
            self.btts += 1;
        }
        for (counts, line) in self.totals.iter_mut().zip(&ctx.totals_lines) {
            counts.add(h + a, *line);
        }
        for (band, line) in HANDICAP_BANDS.iter().enumerate() {
            if h as f64 + line > a as f64 {
                self.handicap_cover[Side::Home.index()][band] += 1;
            }
            if a as f64 + line > h as f64 {
                self.handicap_cover[Side::Away.index()][band] += 1;
            }
        }
        *self.scores.entry((h, a)).or_insert(0) += 1;
        self.home_goals += h as u64;
        self.away_goals += a as u64;
        self.cards += (r.home_cards + r.away_cards) as u64;
        if let Some(c) = r.corners {
            self.corners.record(c, &ctx.corner_lines);
        }
        if let Some(b) = r.bookings {
            self.bookings.record(b, &ctx.card_lines);
        }
    }

    fn merge(mut self, other: Tally<'a>) -> Tally<'a> {
        self.trials += other.trials;
        self.home += other.home;
        self.draw += other.draw;
        self.away += other.away;
        self.btts += other.btts;
        for (a, b) in self.totals.iter_mut().zip(other.totals) {
            a.over += b.over;
            a.push += b.push;
        }
        for side in 0..2 {
            for band in 0..HANDICAP_BANDS.len() {
                self.handicap_cover[side][band] += other.handicap_cover[side][band];
            }
        }
        for (score, count) in other.scores {
            *self.scores.entry(score).or_insert(0) += count;
        }
        self.home_goals += other.home_goals;
        self.away_goals += other.away_goals;
        self.cards += other.cards;
        self.corners.merge(other.corners);
        self.bookings.merge(other.bookings);
        self
    }

    fn into_distribution(self, top_n: usize) -> OutcomeDistribution {
        let ctx = self.ctx;
        let n = self.trials as f64;

        let mut result = [self.home as f64 / n, self.draw as f64 / n, self.away as f64 / n];
        ensure_partition("1x2", &mut result);

        let mut btts = [self.btts as f64 / n, (self.trials - self.btts) as f64 / n];
        ensure_partition("btts", &mut btts);

        let mut handicaps = Vec::with_capacity(HANDICAP_BANDS.len() * 2);
        for side in [Side::Home, Side::Away] {
            for (band, line) in HANDICAP_BANDS.iter().enumerate() {
                let cover = self.handicap_cover[side.index()][band];
                let mut parts = [cover as f64 / n, (self.trials - cover) as f64 / n];
                ensure_partition("asian handicap", &mut parts);
                handicaps.push(HandicapBand {
                    side,
                    line: *line,
                    cover: parts[0],
                    fail: parts[1],
                });
            }
        }

        let mut ranked: Vec<((u32, u32), u64)> = self.scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let score_table: BTreeMap<(u32, u32), f64> = ranked
            .iter()
            .map(|(score, count)| (*score, *count as f64 / n))
            .collect();
        let correct_scores = ranked
            .iter()
            .take(top_n)
            .map(|((home, away), count)| ScoreProbability {
                home: *home,
                away: *away,
                probability: *count as f64 / n,
            })
            .collect();

        OutcomeDistribution {
            trials: self.trials as u32,
            match_result: Prob3 {
                home: result[0],
                draw: result[1],
                away: result[2],
            },
            totals: totals_from_counts("totals", &self.totals, &ctx.totals_lines, self.trials),
            btts: BttsMarket {
                yes: btts[0],
                no: btts[1],
            },
            handicaps,
            correct_scores,
            expected_home_goals: self.home_goals as f64 / n,
            expected_away_goals: self.away_goals as f64 / n,
            expected_cards: self.cards as f64 / n,
            corners: self.corners.into_market("corners", &ctx.corner_lines),
            bookings: self.bookings.into_market("bookings", &ctx.card_lines),
            score_table,
        }
    }
}

fn totals_from_counts(
    name: &str,
    counts: &[LineCounts],
    lines: &[f64],
    trials: u64,
) -> Vec<TotalsLine> {
    let n = trials as f64;
    counts
        .iter()
        .zip(lines)
        .map(|(c, line)| {
            let under = trials - c.over - c.push;
            let mut parts = [c.over as f64 / n, under as f64 / n, c.push as f64 / n];
            ensure_partition(name, &mut parts);
            TotalsLine {
                line: *line,
                over: parts[0],
                under: parts[1],
                push: parts[2],
            }
        })
        .collect()
}

/// Checks a market partition sums to 1. Panics in debug builds; renormalises with a warning otherwise.
pub(crate) fn ensure_partition(market: &str, parts: &mut [f64]) {
    let sum: f64 = parts.iter().sum();
    let ok = (sum - 1.0).abs() <= PARTITION_TOLERANCE;
    debug_assert!(ok, "{market} probabilities sum to {sum}");
    if ok {
        return;
    }
    warn!(market, sum, "renormalising probability partition");
    if sum > 0.0 {
        for p in parts.iter_mut() {
            *p /= sum;
        }
    }
}
