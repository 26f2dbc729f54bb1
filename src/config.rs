use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::event_model::DEFAULT_EVENT_CEILING;

pub const DEFAULT_TRIALS: u32 = 25_000;

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub trials: u32,
    /// Base seed for trial streams; `None` draws one from OS entropy per run.
    pub seed: Option<u64>,
    pub parallel: bool,
    /// Upper bound on the summed probability of all non-empty events in a slice.
    pub event_ceiling: f64,
    pub top_scores: usize,
    /// Standard deviation of the per-trial multiplicative noise on scoring rates.
    pub rate_jitter: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            trials: DEFAULT_TRIALS,
            seed: None,
            parallel: true,
            event_ceiling: DEFAULT_EVENT_CEILING,
            top_scores: 10,
            rate_jitter: 0.10,
        }
    }
}

impl SimConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            trials: env_parse::<u32>("SIM_TRIALS")
                .unwrap_or(d.trials)
                .clamp(1, 2_000_000),
            seed: env_parse::<u64>("SIM_SEED"),
            parallel: env_bool("SIM_PARALLEL", d.parallel),
            event_ceiling: env_parse::<f64>("SIM_EVENT_CEILING")
                .filter(|v| v.is_finite())
                .unwrap_or(d.event_ceiling)
                .clamp(0.50, 0.99),
            top_scores: env_parse::<usize>("SIM_TOP_SCORES")
                .unwrap_or(d.top_scores)
                .clamp(1, 100),
            rate_jitter: env_parse::<f64>("SIM_RATE_JITTER")
                .filter(|v| v.is_finite())
                .unwrap_or(d.rate_jitter)
                .clamp(0.0, 0.50),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValueConfig {
    /// Edges below this percentage are dropped by callers that filter.
    pub min_edge_pct: f64,
}

impl Default for ValueConfig {
    fn default() -> Self {
        Self { min_edge_pct: 7.0 }
    }
}

impl ValueConfig {
    pub fn from_env() -> Self {
        Self {
            min_edge_pct: env_parse::<f64>("VALUE_MIN_EDGE_PCT")
                .filter(|v| v.is_finite())
                .unwrap_or(Self::default().min_edge_pct)
                .clamp(-100.0, 500.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LearningConfig {
    pub min_batch: usize,
    pub power_rate: f64,
    pub narrative_rate: f64,
    /// Floor on `confidence / 10` so low-confidence picks still move ratings.
    pub min_weight: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            min_batch: 20,
            power_rate: 0.008,
            narrative_rate: 0.05,
            min_weight: 0.1,
        }
    }
}

impl LearningConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            min_batch: env_parse::<usize>("LEARN_MIN_BATCH")
                .unwrap_or(d.min_batch)
                .clamp(1, 10_000),
            power_rate: env_parse::<f64>("LEARN_POWER_RATE")
                .filter(|v| v.is_finite())
                .unwrap_or(d.power_rate)
                .clamp(0.0, 0.10),
            narrative_rate: env_parse::<f64>("LEARN_NARRATIVE_RATE")
                .filter(|v| v.is_finite())
                .unwrap_or(d.narrative_rate)
                .clamp(0.0, 0.25),
            min_weight: d.min_weight,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    pub bucket_width: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
    pub min_samples: u32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            bucket_width: 1.0,
            min_confidence: 1.0,
            max_confidence: 10.0,
            min_samples: 5,
        }
    }
}

impl CalibrationConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            bucket_width: env_parse::<f64>("CALIBRATION_BUCKET_WIDTH")
                .filter(|v| v.is_finite())
                .unwrap_or(d.bucket_width)
                .clamp(0.1, 9.0),
            min_samples: env_parse::<u32>("CALIBRATION_MIN_SAMPLES")
                .unwrap_or(d.min_samples)
                .clamp(1, 1000),
            ..d
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub sim: SimConfig,
    pub value: ValueConfig,
    pub learning: LearningConfig,
    pub calibration: CalibrationConfig,
    pub ratings_db: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            sim: SimConfig::from_env(),
            value: ValueConfig::from_env(),
            learning: LearningConfig::from_env(),
            calibration: CalibrationConfig::from_env(),
            ratings_db: env::var("RATINGS_DB_PATH")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| {
            let t = v.trim().to_ascii_lowercase();
            !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
        })
        .unwrap_or(default)
}
