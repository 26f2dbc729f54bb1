use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::aggregate::{OutcomeDistribution, find_line};
use crate::context::Side;
use crate::error::{SimError, SimResult};

/// A priced selection. Text form is used in JSON inputs, e.g. `over_2.5`, `ah_home_-1.5`, `cs_2-1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Market {
    Home,
    Draw,
    Away,
    Over(f64),
    Under(f64),
    BttsYes,
    BttsNo,
    Handicap { side: Side, line: f64 },
    CorrectScore { home: u32, away: u32 },
    CornersOver(f64),
    CornersUnder(f64),
    CardsOver(f64),
    CardsUnder(f64),
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Market::Home => write!(f, "home"),
            Market::Draw => write!(f, "draw"),
            Market::Away => write!(f, "away"),
            Market::Over(l) => write!(f, "over_{l}"),
            Market::Under(l) => write!(f, "under_{l}"),
            Market::BttsYes => write!(f, "btts_yes"),
            Market::BttsNo => write!(f, "btts_no"),
            Market::Handicap { side, line } => write!(f, "ah_{}_{:+}", side.label(), line),
            Market::CorrectScore { home, away } => write!(f, "cs_{home}-{away}"),
            Market::CornersOver(l) => write!(f, "corners_over_{l}"),
            Market::CornersUnder(l) => write!(f, "corners_under_{l}"),
            Market::CardsOver(l) => write!(f, "cards_over_{l}"),
            Market::CardsUnder(l) => write!(f, "cards_under_{l}"),
        }
    }
}

impl FromStr for Market {
    type Err = SimError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let key = raw.trim().to_ascii_lowercase();
        let unknown = || SimError::UnknownMarket(raw.to_string());
        let line = |s: &str| -> Result<f64, SimError> {
            s.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(unknown)
        };

        let market = match key.as_str() {
            "home" | "1" => Market::Home,
            "draw" | "x" => Market::Draw,
            "away" | "2" => Market::Away,
            "btts_yes" => Market::BttsYes,
            "btts_no" => Market::BttsNo,
            _ => {
                if let Some(rest) = key.strip_prefix("corners_over_") {
                    Market::CornersOver(line(rest)?)
                } else if let Some(rest) = key.strip_prefix("corners_under_") {
                    Market::CornersUnder(line(rest)?)
                } else if let Some(rest) = key.strip_prefix("cards_over_") {
                    Market::CardsOver(line(rest)?)
                } else if let Some(rest) = key.strip_prefix("cards_under_") {
                    Market::CardsUnder(line(rest)?)
                } else if let Some(rest) = key.strip_prefix("over_") {
                    Market::Over(line(rest)?)
                } else if let Some(rest) = key.strip_prefix("under_") {
                    Market::Under(line(rest)?)
                } else if let Some(rest) = key.strip_prefix("ah_home_") {
                    Market::Handicap {
                        side: Side::Home,
                        line: line(rest)?,
                    }
                } else if let Some(rest) = key.strip_prefix("ah_away_") {
                    Market::Handicap {
                        side: Side::Away,
                        line: line(rest)?,
                    }
                } else if let Some(rest) = key.strip_prefix("cs_") {
                    let (h, a) = rest.split_once('-').ok_or_else(unknown)?;
                    Market::CorrectScore {
                        home: h.trim().parse().map_err(|_| unknown())?,
                        away: a.trim().parse().map_err(|_| unknown())?,
                    }
                } else {
                    return Err(unknown());
                }
            }
        };
        Ok(market)
    }
}

impl TryFrom<String> for Market {
    type Error = SimError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Market> for String {
    fn from(value: Market) -> Self {
        value.to_string()
    }
}

impl OutcomeDistribution {
    /// Simulated probability for a market; lines that were not simulated are an error.
    pub fn probability(&self, market: &Market) -> SimResult<f64> {
        let missing = || SimError::MarketNotSimulated(market.to_string());
        match *market {
            Market::Home => Ok(self.match_result.home),
            Market::Draw => Ok(self.match_result.draw),
            Market::Away => Ok(self.match_result.away),
            Market::Over(l) => self.totals_line(l).map(|t| t.over).ok_or_else(missing),
            Market::Under(l) => self.totals_line(l).map(|t| t.under).ok_or_else(missing),
            Market::BttsYes => Ok(self.btts.yes),
            Market::BttsNo => Ok(self.btts.no),
            Market::Handicap { side, line } => self
                .handicap(side, line)
                .map(|b| b.cover)
                .ok_or_else(missing),
            Market::CorrectScore { home, away } => Ok(self.score_probability(home, away)),
            Market::CornersOver(l) => self
                .corners
                .as_ref()
                .and_then(|m| find_line(&m.lines, l))
                .map(|t| t.over)
                .ok_or_else(missing),
            Market::CornersUnder(l) => self
                .corners
                .as_ref()
                .and_then(|m| find_line(&m.lines, l))
                .map(|t| t.under)
                .ok_or_else(missing),
            Market::CardsOver(l) => self
                .bookings
                .as_ref()
                .and_then(|m| find_line(&m.lines, l))
                .map(|t| t.over)
                .ok_or_else(missing),
            Market::CardsUnder(l) => self
                .bookings
                .as_ref()
                .and_then(|m| find_line(&m.lines, l))
                .map(|t| t.under)
                .ok_or_else(missing),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketOdds {
    pub market: Market,
    pub odds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueTier {
    Strong,
    Solid,
    Marginal,
    NoValue,
}

impl ValueTier {
    pub fn from_edge(edge_pct: f64) -> Self {
        if edge_pct >= 15.0 {
            ValueTier::Strong
        } else if edge_pct >= 7.0 {
            ValueTier::Solid
        } else if edge_pct > 0.0 {
            ValueTier::Marginal
        } else {
            ValueTier::NoValue
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueBet {
    pub market: Market,
    pub odds: f64,
    pub simulated_prob: f64,
    pub implied_prob: f64,
    /// Signed percentage: `simulated_prob * odds - 1`, times 100.
    pub edge_pct: f64,
    pub tier: ValueTier,
}

pub fn edge_pct(simulated_prob: f64, odds: f64) -> f64 {
    (simulated_prob * odds - 1.0) * 100.0
}

pub fn value_bet(market: Market, odds: f64, simulated_prob: f64) -> SimResult<ValueBet> {
    if !odds.is_finite() || odds <= 1.0 {
        return Err(SimError::InvalidOdds {
            market: market.to_string(),
            odds,
        });
    }
    let edge = edge_pct(simulated_prob, odds);
    Ok(ValueBet {
        market,
        odds,
        simulated_prob,
        implied_prob: 1.0 / odds,
        edge_pct: edge,
        tier: ValueTier::from_edge(edge),
    })
}

/// One entry per quoted market, best edge first. No threshold is applied here.
pub fn calculate_value(
    distribution: &OutcomeDistribution,
    market_odds: &[MarketOdds],
) -> SimResult<Vec<ValueBet>> {
    if market_odds.is_empty() {
        return Err(SimError::EmptyMarkets);
    }
    let mut bets = market_odds
        .iter()
        .map(|q| value_bet(q.market, q.odds, distribution.probability(&q.market)?))
        .collect::<SimResult<Vec<_>>>()?;
    bets.sort_by(|a, b| b.edge_pct.total_cmp(&a.edge_pct));
    Ok(bets)
}

/// Keeps bets whose edge is strictly above `min_edge_pct`.
pub fn filter_min_edge(bets: Vec<ValueBet>, min_edge_pct: f64) -> Vec<ValueBet> {
    bets.into_iter()
        .filter(|b| b.edge_pct > min_edge_pct)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::config::SimConfig;
    use crate::context::{MatchContext, Sport};
    use crate::ratings::MatchupProfile;

    #[test]
    fn even_money_edges() {
        let bet = value_bet(Market::Home, 2.2, 0.5).unwrap();
        assert!((bet.edge_pct - 10.0).abs() < 1e-9);
        assert!((bet.implied_prob - 1.0 / 2.2).abs() < 1e-12);
        assert_eq!(bet.tier, ValueTier::Solid);

        let bet = value_bet(Market::Home, 1.8, 0.5).unwrap();
        assert!(bet.edge_pct < 0.0);
        assert_eq!(bet.tier, ValueTier::NoValue);
    }

    #[test]
    fn degenerate_odds_are_rejected() {
        for odds in [1.0, 0.5, -2.0, f64::INFINITY, f64::NAN] {
            assert!(matches!(
                value_bet(Market::Draw, odds, 0.3),
                Err(SimError::InvalidOdds { .. })
            ));
        }
    }

    #[test]
    fn market_keys_parse_and_print() {
        for key in [
            "home",
            "draw",
            "away",
            "over_2.5",
            "under_3",
            "btts_yes",
            "btts_no",
            "ah_home_-1.5",
            "ah_away_+0.5",
            "cs_2-1",
            "corners_over_9.5",
            "cards_under_4.5",
        ] {
            let m: Market = key.parse().unwrap();
            assert_eq!(m.to_string(), key);
        }
        assert_eq!("X".parse::<Market>().unwrap(), Market::Draw);
        assert!(matches!(
            "winner_by_ko".parse::<Market>(),
            Err(SimError::UnknownMarket(_))
        ));
        assert!("over_abc".parse::<Market>().is_err());
        assert!("cs_2".parse::<Market>().is_err());
    }

    #[test]
    fn market_odds_deserialize_from_text_keys() {
        let quotes: Vec<MarketOdds> = serde_json::from_str(
            r#"[{"market":"home","odds":2.1},{"market":"ah_away_+1.5","odds":1.4}]"#,
        )
        .unwrap();
        assert_eq!(quotes[0].market, Market::Home);
        assert_eq!(
            quotes[1].market,
            Market::Handicap {
                side: Side::Away,
                line: 1.5
            }
        );
    }

    fn distribution() -> OutcomeDistribution {
        let ctx = MatchContext::new(Sport::Football, "Home", "Away", 1.7, 1.0);
        aggregate(&ctx, &MatchupProfile::neutral(), &SimConfig::seeded(8), 4_000).unwrap()
    }

    #[test]
    fn results_are_sorted_by_edge() {
        let dist = distribution();
        let quotes = vec![
            MarketOdds {
                market: Market::Away,
                odds: 2.0,
            },
            MarketOdds {
                market: Market::Home,
                odds: 3.5,
            },
            MarketOdds {
                market: Market::Draw,
                odds: 3.3,
            },
        ];
        let bets = calculate_value(&dist, &quotes).unwrap();
        assert_eq!(bets.len(), 3);
        assert!(bets.windows(2).all(|w| w[0].edge_pct >= w[1].edge_pct));
        assert_eq!(bets[0].market, Market::Home);
        for b in &bets {
            assert!((b.simulated_prob - dist.probability(&b.market).unwrap()).abs() < 1e-12);
        }
    }

    #[test]
    fn empty_and_unsimulated_markets_fail() {
        let dist = distribution();
        assert!(matches!(
            calculate_value(&dist, &[]),
            Err(SimError::EmptyMarkets)
        ));
        let quotes = [MarketOdds {
            market: Market::Over(4.5),
            odds: 5.0,
        }];
        assert!(matches!(
            calculate_value(&dist, &quotes),
            Err(SimError::MarketNotSimulated(_))
        ));
        let quotes = [MarketOdds {
            market: Market::CornersOver(9.5),
            odds: 1.9,
        }];
        assert!(calculate_value(&dist, &quotes).is_err());
    }

    #[test]
    fn threshold_is_applied_by_caller() {
        let bets = vec![
            value_bet(Market::Home, 2.2, 0.5).unwrap(),
            value_bet(Market::Draw, 4.0, 0.26).unwrap(),
            value_bet(Market::Away, 3.0, 0.3).unwrap(),
        ];
        let kept = filter_min_edge(bets.clone(), 7.0);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].market, Market::Home);
        assert_eq!(filter_min_edge(bets, -50.0).len(), 3);
    }
}
