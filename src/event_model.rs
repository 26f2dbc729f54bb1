use crate::context::{GoalCause, MatchContext, Side};
use crate::ratings::{
    COUNTER_ATTACK_LETHALITY, COUNTER_VULNERABILITY, DISCIPLINE_RISK, MatchupProfile,
    OPEN_PLAY_THREAT, SET_PIECE_THREAT, SET_PIECE_VULNERABILITY,
};
use crate::trial::GameState;

pub const DEFAULT_EVENT_CEILING: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Goal { side: Side, cause: GoalCause },
    Card { side: Side },
    NoEvent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventCandidate {
    pub kind: EventKind,
    pub probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternTarget {
    Goal(GoalCause),
    Cards,
}

/// Whose bucket a tag scales: the tagged side's own, or its opponent's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beneficiary {
    Own,
    Opponent,
}

#[derive(Debug, Clone, Copy)]
pub struct TacticalPattern {
    pub keyword: &'static str,
    pub target: PatternTarget,
    pub applies_to: Beneficiary,
    pub factor: f64,
}

// First match wins, so the "vulnerable" phrasings must precede the plain ones.
pub const TACTICAL_PATTERNS: &[TacticalPattern] = &[
    TacticalPattern {
        keyword: "vulnerable-to-counter",
        target: PatternTarget::Goal(GoalCause::Counter),
        applies_to: Beneficiary::Opponent,
        factor: 1.6,
    },
    TacticalPattern {
        keyword: "vulnerable-to-set-piece",
        target: PatternTarget::Goal(GoalCause::SetPiece),
        applies_to: Beneficiary::Opponent,
        factor: 1.5,
    },
    TacticalPattern {
        keyword: "vulnerable-to-press",
        target: PatternTarget::Goal(GoalCause::OpenPlay),
        applies_to: Beneficiary::Opponent,
        factor: 1.2,
    },
    TacticalPattern {
        keyword: "high-line",
        target: PatternTarget::Goal(GoalCause::Counter),
        applies_to: Beneficiary::Opponent,
        factor: 1.3,
    },
    TacticalPattern {
        keyword: "counter-oriented",
        target: PatternTarget::Goal(GoalCause::Counter),
        applies_to: Beneficiary::Own,
        factor: 1.5,
    },
    TacticalPattern {
        keyword: "set-piece-threat",
        target: PatternTarget::Goal(GoalCause::SetPiece),
        applies_to: Beneficiary::Own,
        factor: 1.4,
    },
    TacticalPattern {
        keyword: "aerial-dominance",
        target: PatternTarget::Goal(GoalCause::SetPiece),
        applies_to: Beneficiary::Own,
        factor: 1.25,
    },
    TacticalPattern {
        keyword: "high-press",
        target: PatternTarget::Goal(GoalCause::OpenPlay),
        applies_to: Beneficiary::Own,
        factor: 1.15,
    },
    TacticalPattern {
        keyword: "possession",
        target: PatternTarget::Goal(GoalCause::OpenPlay),
        applies_to: Beneficiary::Own,
        factor: 1.1,
    },
    TacticalPattern {
        keyword: "aggressive",
        target: PatternTarget::Cards,
        applies_to: Beneficiary::Own,
        factor: 1.3,
    },
];

/// Lower-case with spaces and underscores folded to dashes.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '_' { '-' } else { c })
        .collect()
}

pub fn match_pattern(tag: &str) -> Option<&'static TacticalPattern> {
    let tag = normalize_tag(tag);
    TACTICAL_PATTERNS.iter().find(|p| tag.contains(p.keyword))
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SideBuckets {
    goals: [f64; 3],
    card: f64,
}

/// Per-slice event probabilities for one fixture, before momentum and the ceiling.
///
/// Built once per simulation; `probabilities` applies the slice-specific state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventModel {
    sides: [SideBuckets; 2],
    ceiling: f64,
    zero_rate: bool,
}

impl EventModel {
    pub fn new(ctx: &MatchContext, profile: &MatchupProfile, ceiling: f64) -> Self {
        let sport = ctx.profile();
        let slices = ctx.slice_count().max(1) as f64;

        let rated = |side: Side| {
            let own = &profile.side(side).power;
            let opp = &profile.side(side.opponent()).power;
            (ctx.mu(side).max(0.0) * own.attack_factor / opp.defense_factor).max(0.0)
        };
        let rates = [rated(Side::Home), rated(Side::Away)];
        let total_rate = rates[0] + rates[1];
        let zero_rate = !(total_rate > 0.0) || !total_rate.is_finite();

        let tactics = tactical_multipliers(ctx);
        let base = if zero_rate { 0.0 } else { total_rate / slices };

        let mut sides = [SideBuckets {
            goals: [0.0; 3],
            card: 0.0,
        }; 2];
        for side in [Side::Home, Side::Away] {
            let i = side.index();
            let share = if zero_rate {
                0.0
            } else {
                base * rates[i] / total_rate
            };
            let own = &profile.side(side).narrative;
            let opp = &profile.side(side.opponent()).narrative;
            let narrative = [
                1.0 + own.get(OPEN_PLAY_THREAT),
                (1.0 + own.get(SET_PIECE_THREAT)) * (1.0 + opp.get(SET_PIECE_VULNERABILITY)),
                (1.0 + own.get(COUNTER_ATTACK_LETHALITY)) * (1.0 + opp.get(COUNTER_VULNERABILITY)),
            ];
            for cause in GoalCause::ALL {
                let c = cause.index();
                sides[i].goals[c] = share * sport.cause_split[c] * tactics[i][c] * narrative[c];
            }
            sides[i].card = sport.card_baseline
                * ctx.referee.card_multiplier()
                * tactics[i][3]
                * (1.0 + own.get(DISCIPLINE_RISK));
        }

        Self {
            sides,
            ceiling,
            zero_rate,
        }
    }

    /// Copy with each side's goal buckets scaled, used for per-trial rate noise.
    pub fn with_rate_scale(&self, home: f64, away: f64) -> Self {
        let mut next = *self;
        for (i, scale) in [home, away].into_iter().enumerate() {
            for g in &mut next.sides[i].goals {
                *g *= scale;
            }
        }
        next
    }

    pub fn goal_probability(&self, side: Side, cause: GoalCause) -> f64 {
        self.sides[side.index()].goals[cause.index()]
    }

    pub fn card_probability(&self, side: Side) -> f64 {
        self.sides[side.index()].card
    }

    pub fn probabilities(&self, state: &GameState) -> Vec<EventCandidate> {
        if self.zero_rate {
            return vec![EventCandidate {
                kind: EventKind::NoEvent,
                probability: 1.0,
            }];
        }

        let mut out = Vec::with_capacity(9);
        for side in [Side::Home, Side::Away] {
            let momentum = state.momentum(side);
            for cause in GoalCause::ALL {
                out.push(EventCandidate {
                    kind: EventKind::Goal { side, cause },
                    probability: self.goal_probability(side, cause) * momentum,
                });
            }
        }
        for side in [Side::Home, Side::Away] {
            out.push(EventCandidate {
                kind: EventKind::Card { side },
                probability: self.card_probability(side),
            });
        }

        let sum: f64 = out.iter().map(|c| c.probability).sum();
        if sum > self.ceiling {
            let scale = self.ceiling / sum;
            for c in &mut out {
                c.probability *= scale;
            }
        }
        let used: f64 = out.iter().map(|c| c.probability).sum();
        out.push(EventCandidate {
            kind: EventKind::NoEvent,
            probability: (1.0 - used).max(0.0),
        });
        out
    }
}

pub fn compute_event_probabilities(
    state: &GameState,
    ctx: &MatchContext,
    profile: &MatchupProfile,
    ceiling: f64,
) -> Vec<EventCandidate> {
    EventModel::new(ctx, profile, ceiling).probabilities(state)
}

/// Walks the cumulative distribution with a single uniform draw.
pub fn select_event(candidates: &[EventCandidate], u: f64) -> EventKind {
    let mut acc = 0.0;
    for c in candidates {
        acc += c.probability;
        if u < acc {
            return c.kind;
        }
    }
    EventKind::NoEvent
}

// Index 0..3 are goal causes, 3 is cards.
fn tactical_multipliers(ctx: &MatchContext) -> [[f64; 4]; 2] {
    let mut out = [[1.0; 4]; 2];
    for side in [Side::Home, Side::Away] {
        let mut applied: Vec<&'static str> = Vec::new();
        for tag in ctx.tags(side) {
            let Some(pattern) = match_pattern(tag) else {
                continue;
            };
            if applied.contains(&pattern.keyword) {
                continue;
            }
            applied.push(pattern.keyword);
            let target_side = match pattern.applies_to {
                Beneficiary::Own => side,
                Beneficiary::Opponent => side.opponent(),
            };
            let slot = match pattern.target {
                PatternTarget::Goal(cause) => cause.index(),
                PatternTarget::Cards => 3,
            };
            out[target_side.index()][slot] *= pattern.factor;
        }
    }
    out
}
