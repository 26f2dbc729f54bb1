use rand::Rng;
use serde::Serialize;

use crate::config::SimConfig;
use crate::context::{GoalCause, MatchContext, Side};
use crate::event_model::{EventKind, EventModel, select_event};
use crate::ratings::MatchupProfile;
use crate::sampling::{rate_jitter, sample_poisson};

pub const MOMENTUM_BOOST: f64 = 1.5;
pub const MOMENTUM_SUPPRESS: f64 = 0.7;
pub const MOMENTUM_DECAY: f64 = 0.2;

/// State of one trial between slices. Transitions consume the state and return the next one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameState {
    pub elapsed: u32,
    pub home_score: u32,
    pub away_score: u32,
    pub home_momentum: f64,
    pub away_momentum: f64,
    pub home_cards: u32,
    pub away_cards: u32,
}

impl GameState {
    pub fn kickoff() -> Self {
        Self {
            elapsed: 0,
            home_score: 0,
            away_score: 0,
            home_momentum: 1.0,
            away_momentum: 1.0,
            home_cards: 0,
            away_cards: 0,
        }
    }

    pub fn momentum(&self, side: Side) -> f64 {
        match side {
            Side::Home => self.home_momentum,
            Side::Away => self.away_momentum,
        }
    }

    pub fn score(&self, side: Side) -> u32 {
        match side {
            Side::Home => self.home_score,
            Side::Away => self.away_score,
        }
    }

    /// Moves both momentum values one step toward 1.0 without crossing it.
    pub fn decayed(self) -> Self {
        Self {
            home_momentum: decay_toward_neutral(self.home_momentum),
            away_momentum: decay_toward_neutral(self.away_momentum),
            ..self
        }
    }

    pub fn after_goal(self, side: Side) -> Self {
        match side {
            Side::Home => Self {
                home_score: self.home_score + 1,
                home_momentum: MOMENTUM_BOOST,
                away_momentum: MOMENTUM_SUPPRESS,
                ..self
            },
            Side::Away => Self {
                away_score: self.away_score + 1,
                away_momentum: MOMENTUM_BOOST,
                home_momentum: MOMENTUM_SUPPRESS,
                ..self
            },
        }
    }

    pub fn after_card(self, side: Side) -> Self {
        match side {
            Side::Home => Self {
                home_cards: self.home_cards + 1,
                ..self
            },
            Side::Away => Self {
                away_cards: self.away_cards + 1,
                ..self
            },
        }
    }

    pub fn resolve(self, event: EventKind) -> Self {
        match event {
            EventKind::Goal { side, .. } => self.after_goal(side),
            EventKind::Card { side } => self.after_card(side),
            EventKind::NoEvent => self,
        }
    }

    pub fn advanced(self, width: u32) -> Self {
        Self {
            elapsed: self.elapsed + width,
            ..self
        }
    }
}

fn decay_toward_neutral(m: f64) -> f64 {
    if m > 1.0 {
        (m - MOMENTUM_DECAY).max(1.0)
    } else if m < 1.0 {
        (m + MOMENTUM_DECAY).min(1.0)
    } else {
        m
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineKind {
    Goal,
    Card,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEvent {
    pub minute: u32,
    pub kind: TimelineKind,
    pub side: Side,
    pub cause: Option<GoalCause>,
    pub home_score: u32,
    pub away_score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialResult {
    pub home_score: u32,
    pub away_score: u32,
    pub home_cards: u32,
    pub away_cards: u32,
    /// Total corners, drawn only when the sport has corners and a rate was given.
    pub corners: Option<u32>,
    /// Total bookings from the secondary-metric rate.
    pub bookings: Option<u32>,
    /// Empty unless the trial was run with a timeline.
    pub timeline: Vec<TimelineEvent>,
}

/// Runs single realisations of one fixture.
#[derive(Debug, Clone)]
pub struct TrialEngine<'a> {
    ctx: &'a MatchContext,
    model: EventModel,
    rate_jitter: f64,
}

impl<'a> TrialEngine<'a> {
    pub fn new(ctx: &'a MatchContext, profile: &MatchupProfile, sim: &SimConfig) -> Self {
        Self {
            ctx,
            model: EventModel::new(ctx, profile, sim.event_ceiling),
            rate_jitter: sim.rate_jitter,
        }
    }

    pub fn run_trial(&self, rng: &mut impl Rng, record_timeline: bool) -> TrialResult {
        let home_scale = rate_jitter(rng, self.rate_jitter);
        let away_scale = rate_jitter(rng, self.rate_jitter);
        let model = self.model.with_rate_scale(home_scale, away_scale);

        let width = self.ctx.slice_width();
        let total = self.ctx.total_time();
        let mut state = GameState::kickoff();
        let mut timeline = Vec::new();

        while state.elapsed < total {
            state = state.decayed();
            let candidates = model.probabilities(&state);
            let event = select_event(&candidates, rng.r#gen());
            let slice_start = state.elapsed;
            state = state.resolve(event);

            if record_timeline
                && let Some((kind, side, cause)) = timeline_entry(event)
            {
                let minute = (slice_start + rng.gen_range(1..=width)).min(total);
                timeline.push(TimelineEvent {
                    minute,
                    kind,
                    side,
                    cause,
                    home_score: state.home_score,
                    away_score: state.away_score,
                });
            }

            state = state.advanced(width);
        }

        let sport = self.ctx.profile();
        let corners = (sport.supports_corners && self.ctx.corners_rate > 0.0)
            .then(|| sample_poisson(rng, self.ctx.corners_rate));
        let bookings = (sport.supports_bookings && self.ctx.cards_rate > 0.0)
            .then(|| sample_poisson(rng, self.ctx.cards_rate));

        TrialResult {
            home_score: state.home_score,
            away_score: state.away_score,
            home_cards: state.home_cards,
            away_cards: state.away_cards,
            corners,
            bookings,
            timeline,
        }
    }

    /// One illustrative match, as an ordered list of goals and cards.
    pub fn build_timeline(&self, rng: &mut impl Rng) -> Vec<TimelineEvent> {
        self.run_trial(rng, true).timeline
    }
}

fn timeline_entry(event: EventKind) -> Option<(TimelineKind, Side, Option<GoalCause>)> {
    match event {
        EventKind::Goal { side, cause } => Some((TimelineKind::Goal, side, Some(cause))),
        EventKind::Card { side } => Some((TimelineKind::Card, side, None)),
        EventKind::NoEvent => None,
    }
}
