use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::CalibrationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prob3 {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

impl Prob3 {
    pub fn uniform() -> Self {
        Self {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        }
    }

    pub fn get(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }
}

pub fn classify_outcome(home_goals: u32, away_goals: u32) -> Outcome {
    if home_goals > away_goals {
        Outcome::Home
    } else if home_goals < away_goals {
        Outcome::Away
    } else {
        Outcome::Draw
    }
}

pub fn evaluate_probs(predictions: &[Prob3], outcomes: &[Outcome]) -> Metrics {
    if predictions.is_empty() || outcomes.is_empty() || predictions.len() != outcomes.len() {
        return Metrics {
            samples: 0,
            brier: 0.0,
            log_loss: 0.0,
            accuracy: 0.0,
        };
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let y = one_hot(*outcome);
        brier_sum +=
            (p.home - y.home).powi(2) + (p.draw - y.draw).powi(2) + (p.away - y.away).powi(2);

        let actual_prob = p.get(*outcome).clamp(1e-12, 1.0);
        log_loss_sum += -actual_prob.ln();

        if argmax(*p) == *outcome {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

/// Reliability table for one class: predicted probability bins vs observed frequency.
pub fn calibration_bins(
    predictions: &[Prob3],
    outcomes: &[Outcome],
    class: Outcome,
    bins: usize,
) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let class_prob = p.get(class).clamp(0.0, 1.0);
        let idx = ((class_prob * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += class_prob;
        if *outcome == class {
            actual_sum[idx] += 1.0;
        }
    }

    (0..bins)
        .map(|i| {
            let count = counts[i];
            let (avg_pred, actual_rate) = if count > 0 {
                (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
            } else {
                (0.0, 0.0)
            };
            CalibrationBin {
                bucket_start: i as f64 / bins as f64,
                bucket_end: (i + 1) as f64 / bins as f64,
                count,
                avg_pred,
                actual_rate,
            }
        })
        .collect()
}

fn argmax(p: Prob3) -> Outcome {
    if p.home >= p.draw && p.home >= p.away {
        Outcome::Home
    } else if p.draw >= p.away {
        Outcome::Draw
    } else {
        Outcome::Away
    }
}

fn one_hot(outcome: Outcome) -> Prob3 {
    match outcome {
        Outcome::Home => Prob3 {
            home: 1.0,
            draw: 0.0,
            away: 0.0,
        },
        Outcome::Draw => Prob3 {
            home: 0.0,
            draw: 1.0,
            away: 0.0,
        },
        Outcome::Away => Prob3 {
            home: 0.0,
            draw: 0.0,
            away: 1.0,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetResult {
    Win,
    Loss,
    Push,
}

/// One graded pick: the confidence it was published with and how it settled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceRecord {
    pub confidence: f64,
    pub result: BetResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceBucket {
    /// Inclusive lower bound.
    pub lower: f64,
    /// Exclusive upper bound, except for the top bucket.
    pub upper: f64,
    pub wins: u32,
    pub losses: u32,
    pub pushes: u32,
    /// `wins / (wins + losses)`; `None` when every pick pushed.
    pub accuracy: Option<f64>,
}

impl ConfidenceBucket {
    pub fn samples(&self) -> u32 {
        self.wins + self.losses + self.pushes
    }

    pub fn label(&self) -> String {
        format!("{:.1}-{:.1}", self.lower, self.upper)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationReport {
    pub total_records: usize,
    pub skipped: usize,
    /// Buckets that reached the minimum sample size, lowest confidence first.
    pub buckets: Vec<ConfidenceBucket>,
    /// True when no bucket had enough samples to report.
    pub insufficient: bool,
}

/// Accuracy by stated-confidence bucket. Pure over `history`, so reruns are identical.
pub fn run_confidence_calibration(
    history: &[ConfidenceRecord],
    cfg: &CalibrationConfig,
) -> CalibrationReport {
    let width = cfg.bucket_width;
    let span = cfg.max_confidence - cfg.min_confidence;
    let bucket_count = ((span / width).ceil() as usize).max(1);

    let mut tallies = vec![(0u32, 0u32, 0u32); bucket_count];
    let mut skipped = 0usize;

    for record in history {
        let c = record.confidence;
        if !c.is_finite() || c < cfg.min_confidence || c > cfg.max_confidence {
            skipped += 1;
            continue;
        }
        let idx = (((c - cfg.min_confidence) / width).floor() as usize).min(bucket_count - 1);
        let t = &mut tallies[idx];
        match record.result {
            BetResult::Win => t.0 += 1,
            BetResult::Loss => t.1 += 1,
            BetResult::Push => t.2 += 1,
        }
    }
    if skipped > 0 {
        warn!(skipped, "confidence records outside the bucket range were ignored");
    }

    let buckets: Vec<ConfidenceBucket> = tallies
        .into_iter()
        .enumerate()
        .map(|(i, (wins, losses, pushes))| {
            let lower = cfg.min_confidence + i as f64 * width;
            let decided = wins + losses;
            ConfidenceBucket {
                lower,
                upper: (lower + width).min(cfg.max_confidence),
                wins,
                losses,
                pushes,
                accuracy: (decided > 0).then(|| wins as f64 / decided as f64),
            }
        })
        .filter(|b| b.samples() >= cfg.min_samples)
        .collect();

    CalibrationReport {
        total_records: history.len(),
        skipped,
        insufficient: buckets.is_empty(),
        buckets,
    }
}
