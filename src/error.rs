use thiserror::Error;

/// Rejections raised before any simulation or valuation work starts.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("expected rate for {side} must be a positive finite number, got {value}")]
    InvalidRate { side: &'static str, value: f64 },

    #[error("{field} must be a non-negative finite number, got {value}")]
    InvalidSecondaryRate { field: &'static str, value: f64 },

    #[error("decimal odds for {market} must be finite and greater than 1.0, got {odds}")]
    InvalidOdds { market: String, odds: f64 },

    #[error("no market odds supplied")]
    EmptyMarkets,

    #[error("unknown market key {0:?}")]
    UnknownMarket(String),

    #[error("market {0} was not simulated for this match")]
    MarketNotSimulated(String),

    #[error("invalid match context: {0}")]
    InvalidContext(String),

    #[error("trial count must be at least 1")]
    InvalidTrialCount,

    #[error("rating store: {0}")]
    Store(#[from] anyhow::Error),
}

pub type SimResult<T> = Result<T, SimError>;
