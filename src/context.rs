use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Side::Home => 0,
            Side::Away => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalCause {
    OpenPlay,
    SetPiece,
    Counter,
}

impl GoalCause {
    pub const ALL: [GoalCause; 3] = [GoalCause::OpenPlay, GoalCause::SetPiece, GoalCause::Counter];

    pub(crate) fn index(self) -> usize {
        match self {
            GoalCause::OpenPlay => 0,
            GoalCause::SetPiece => 1,
            GoalCause::Counter => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GoalCause::OpenPlay => "open play",
            GoalCause::SetPiece => "set piece",
            GoalCause::Counter => "counter-attack",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefereeDisposition {
    Strict,
    Lenient,
    #[default]
    Neutral,
}

impl RefereeDisposition {
    pub fn card_multiplier(self) -> f64 {
        match self {
            RefereeDisposition::Strict => 1.9,
            RefereeDisposition::Lenient => 0.6,
            RefereeDisposition::Neutral => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sport {
    Football,
    IceHockey,
}

/// Sport-level defaults for the time-slice model.
#[derive(Debug, Clone, Copy)]
pub struct SportProfile {
    pub total_time: u32,
    pub slice_width: u32,
    /// Share of a side's goals by cause: open play, set piece, counter.
    pub cause_split: [f64; 3],
    /// Per-slice card (or penalty) probability for one side before adjustments.
    pub card_baseline: f64,
    pub supports_corners: bool,
    pub supports_bookings: bool,
}

impl Sport {
    pub fn profile(self) -> SportProfile {
        match self {
            Sport::Football => SportProfile {
                total_time: 90,
                slice_width: 5,
                cause_split: [0.65, 0.20, 0.15],
                card_baseline: 0.08,
                supports_corners: true,
                supports_bookings: true,
            },
            // Set pieces here are power plays.
            Sport::IceHockey => SportProfile {
                total_time: 60,
                slice_width: 5,
                cause_split: [0.55, 0.30, 0.15],
                card_baseline: 0.12,
                supports_corners: false,
                supports_bookings: true,
            },
        }
    }
}

fn default_totals_lines() -> Vec<f64> {
    vec![2.5]
}

/// Everything one simulation run needs to know about the fixture. Read-only once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchContext {
    pub sport: Sport,
    pub home_team: String,
    pub away_team: String,
    pub mu_home: f64,
    pub mu_away: f64,
    #[serde(default)]
    pub corners_rate: f64,
    #[serde(default)]
    pub cards_rate: f64,
    /// Overrides the sport's regulation length.
    #[serde(default)]
    pub total_time: Option<u32>,
    #[serde(default)]
    pub home_tags: Vec<String>,
    #[serde(default)]
    pub away_tags: Vec<String>,
    #[serde(default)]
    pub referee: RefereeDisposition,
    #[serde(default = "default_totals_lines")]
    pub totals_lines: Vec<f64>,
    #[serde(default)]
    pub corner_lines: Vec<f64>,
    #[serde(default)]
    pub card_lines: Vec<f64>,
}

impl MatchContext {
    pub fn new(
        sport: Sport,
        home_team: impl Into<String>,
        away_team: impl Into<String>,
        mu_home: f64,
        mu_away: f64,
    ) -> Self {
        Self {
            sport,
            home_team: home_team.into(),
            away_team: away_team.into(),
            mu_home,
            mu_away,
            corners_rate: 0.0,
            cards_rate: 0.0,
            total_time: None,
            home_tags: Vec::new(),
            away_tags: Vec::new(),
            referee: RefereeDisposition::Neutral,
            totals_lines: default_totals_lines(),
            corner_lines: Vec::new(),
            card_lines: Vec::new(),
        }
    }

    pub fn profile(&self) -> SportProfile {
        self.sport.profile()
    }

    pub fn total_time(&self) -> u32 {
        self.total_time.unwrap_or_else(|| self.profile().total_time)
    }

    pub fn slice_width(&self) -> u32 {
        self.profile().slice_width
    }

    pub fn slice_count(&self) -> u32 {
        self.total_time().div_ceil(self.slice_width())
    }

    pub fn mu(&self, side: Side) -> f64 {
        match side {
            Side::Home => self.mu_home,
            Side::Away => self.mu_away,
        }
    }

    pub fn team(&self, side: Side) -> &str {
        match side {
            Side::Home => &self.home_team,
            Side::Away => &self.away_team,
        }
    }

    pub fn tags(&self, side: Side) -> &[String] {
        match side {
            Side::Home => &self.home_tags,
            Side::Away => &self.away_tags,
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        for (side, value) in [("home", self.mu_home), ("away", self.mu_away)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(SimError::InvalidRate { side, value });
            }
        }
        for (field, value) in [
            ("corners_rate", self.corners_rate),
            ("cards_rate", self.cards_rate),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SimError::InvalidSecondaryRate { field, value });
            }
        }
        if self.home_team.trim().is_empty() || self.away_team.trim().is_empty() {
            return Err(SimError::InvalidContext(
                "team identifiers must not be empty".to_string(),
            ));
        }
        if let Some(t) = self.total_time
            && t < self.slice_width()
        {
            return Err(SimError::InvalidContext(format!(
                "total time {t} is shorter than one {}-unit slice",
                self.slice_width()
            )));
        }
        for (name, lines) in [
            ("totals", &self.totals_lines),
            ("corner", &self.corner_lines),
            ("card", &self.card_lines),
        ] {
            if let Some(bad) = lines.iter().find(|l| !l.is_finite() || **l < 0.0) {
                return Err(SimError::InvalidContext(format!(
                    "{name} line {bad} must be a non-negative number"
                )));
            }
        }
        Ok(())
    }
}
