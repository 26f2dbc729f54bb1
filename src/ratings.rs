use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::context::{MatchContext, Side};
use crate::learning::LoggedMatch;

pub const FACTOR_MIN: f64 = 0.7;
pub const FACTOR_MAX: f64 = 1.3;
pub const TRAIT_MIN: f64 = -0.5;
pub const TRAIT_MAX: f64 = 0.5;

// Narrative traits read by the event model.
pub const OPEN_PLAY_THREAT: &str = "open_play_threat";
pub const SET_PIECE_THREAT: &str = "set_piece_threat";
pub const COUNTER_ATTACK_LETHALITY: &str = "counter_attack_lethality";
pub const SET_PIECE_VULNERABILITY: &str = "set_piece_vulnerability";
pub const COUNTER_VULNERABILITY: &str = "counter_vulnerability";
pub const DISCIPLINE_RISK: &str = "discipline_risk";

/// Store key for a team: trimmed and lower-cased.
pub fn team_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerRating {
    pub attack_factor: f64,
    pub defense_factor: f64,
    pub matches_seen: u32,
}

impl Default for PowerRating {
    fn default() -> Self {
        Self::neutral()
    }
}

impl PowerRating {
    pub fn neutral() -> Self {
        Self {
            attack_factor: 1.0,
            defense_factor: 1.0,
            matches_seen: 0,
        }
    }

    pub fn clamped(self) -> Self {
        Self {
            attack_factor: clamp_factor(self.attack_factor),
            defense_factor: clamp_factor(self.defense_factor),
            matches_seen: self.matches_seen,
        }
    }

    /// New record after one observed match.
    pub fn nudged(self, attack_delta: f64, defense_delta: f64) -> Self {
        Self {
            attack_factor: self.attack_factor + attack_delta,
            defense_factor: self.defense_factor + defense_delta,
            matches_seen: self.matches_seen.saturating_add(1),
        }
        .clamped()
    }
}

fn clamp_factor(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(FACTOR_MIN, FACTOR_MAX)
    } else {
        1.0
    }
}

fn clamp_trait(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(TRAIT_MIN, TRAIT_MAX)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrativeRating {
    pub traits: BTreeMap<String, f64>,
}

impl NarrativeRating {
    pub fn get(&self, trait_name: &str) -> f64 {
        self.traits.get(trait_name).copied().unwrap_or(0.0)
    }

    pub fn with_value(&self, trait_name: &str, value: f64) -> Self {
        let mut next = self.clone();
        next.traits.insert(trait_name.to_string(), clamp_trait(value));
        next
    }

    pub fn adjusted(&self, trait_name: &str, delta: f64) -> Self {
        self.with_value(trait_name, self.get(trait_name) + delta)
    }

    pub fn clamped(mut self) -> Self {
        for v in self.traits.values_mut() {
            *v = clamp_trait(*v);
        }
        self
    }
}

/// Point-in-time copy of every stored rating.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RatingSnapshot {
    pub power: BTreeMap<String, PowerRating>,
    pub narrative: BTreeMap<String, NarrativeRating>,
}

/// Keyed storage for power and narrative ratings.
///
/// Reads of an unknown team return the neutral record. Writes replace the
/// whole record for a team so readers never see half an update.
pub trait RatingStore: Send + Sync {
    fn power(&self, team: &str) -> PowerRating;
    fn narrative(&self, team: &str) -> NarrativeRating;
    fn put_power(&self, team: &str, rating: PowerRating) -> Result<()>;
    fn put_narrative(&self, team: &str, rating: NarrativeRating) -> Result<()>;
    fn snapshot(&self) -> RatingSnapshot;

    fn put_batch(
        &self,
        power: &[(String, PowerRating)],
        narrative: &[(String, NarrativeRating)],
    ) -> Result<()> {
        for (team, rating) in power {
            self.put_power(team, *rating)?;
        }
        for (team, rating) in narrative {
            self.put_narrative(team, rating.clone())?;
        }
        Ok(())
    }

    /// Results still waiting for a power update, oldest first. Empty for stores
    /// that keep no durable queue.
    fn load_pending(&self) -> Result<Vec<LoggedMatch>> {
        Ok(Vec::new())
    }

    fn queue_pending(&self, _entry: &LoggedMatch) -> Result<()> {
        Ok(())
    }

    /// Writes power ratings and drops the `consumed` oldest queued results together.
    fn apply_power_batch(&self, power: &[(String, PowerRating)], _consumed: usize) -> Result<()> {
        self.put_batch(power, &[])
    }
}

#[derive(Debug, Default)]
pub struct MemoryRatingStore {
    power: RwLock<HashMap<String, PowerRating>>,
    narrative: RwLock<HashMap<String, NarrativeRating>>,
}

impl MemoryRatingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: RatingSnapshot) -> Self {
        let store = Self::new();
        {
            let mut power = store.power.write().expect("rating store lock poisoned");
            for (team, rating) in snapshot.power {
                power.insert(team_key(&team), rating.clamped());
            }
        }
        {
            let mut narrative = store.narrative.write().expect("rating store lock poisoned");
            for (team, rating) in snapshot.narrative {
                narrative.insert(team_key(&team), rating.clamped());
            }
        }
        store
    }
}

impl RatingStore for MemoryRatingStore {
    fn power(&self, team: &str) -> PowerRating {
        let guard = self.power.read().expect("rating store lock poisoned");
        guard.get(&team_key(team)).copied().unwrap_or_default()
    }

    fn narrative(&self, team: &str) -> NarrativeRating {
        let guard = self.narrative.read().expect("rating store lock poisoned");
        guard.get(&team_key(team)).cloned().unwrap_or_default()
    }

    fn put_power(&self, team: &str, rating: PowerRating) -> Result<()> {
        let mut guard = self.power.write().expect("rating store lock poisoned");
        guard.insert(team_key(team), rating.clamped());
        Ok(())
    }

    fn put_narrative(&self, team: &str, rating: NarrativeRating) -> Result<()> {
        let mut guard = self.narrative.write().expect("rating store lock poisoned");
        guard.insert(team_key(team), rating.clamped());
        Ok(())
    }

    fn snapshot(&self) -> RatingSnapshot {
        let power = self.power.read().expect("rating store lock poisoned");
        let narrative = self.narrative.read().expect("rating store lock poisoned");
        RatingSnapshot {
            power: power.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            narrative: narrative
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

/// Ratings for one side, resolved once per simulation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamProfile {
    pub power: PowerRating,
    pub narrative: NarrativeRating,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchupProfile {
    pub home: TeamProfile,
    pub away: TeamProfile,
}

impl MatchupProfile {
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn resolve(store: &(impl RatingStore + ?Sized), ctx: &MatchContext) -> Self {
        let load = |team: &str| TeamProfile {
            power: store.power(team),
            narrative: store.narrative(team),
        };
        Self {
            home: load(&ctx.home_team),
            away: load(&ctx.away_team),
        }
    }

    pub fn side(&self, side: Side) -> &TeamProfile {
        match side {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Sport;

    #[test]
    fn unknown_team_reads_neutral() {
        let store = MemoryRatingStore::new();
        assert_eq!(store.power("Nobody FC"), PowerRating::neutral());
        assert_eq!(store.narrative("Nobody FC").get(SET_PIECE_THREAT), 0.0);
        assert!(store.snapshot().power.is_empty());
    }

    #[test]
    fn keys_are_case_insensitive() {
        let store = MemoryRatingStore::new();
        let rating = PowerRating {
            attack_factor: 1.1,
            defense_factor: 0.9,
            matches_seen: 4,
        };
        store.put_power("  Aston Villa ", rating).unwrap();
        assert_eq!(store.power("aston villa"), rating);
        assert!(store.snapshot().power.contains_key("aston villa"));
    }

    #[test]
    fn writes_are_clamped_to_bounds() {
        let store = MemoryRatingStore::new();
        store
            .put_power(
                "x",
                PowerRating {
                    attack_factor: 2.0,
                    defense_factor: 0.1,
                    matches_seen: 1,
                },
            )
            .unwrap();
        let p = store.power("x");
        assert_eq!(p.attack_factor, FACTOR_MAX);
        assert_eq!(p.defense_factor, FACTOR_MIN);

        let n = NarrativeRating::default().with_value(SET_PIECE_THREAT, 0.9);
        assert_eq!(n.get(SET_PIECE_THREAT), TRAIT_MAX);
        let n = n.adjusted(SET_PIECE_THREAT, -3.0);
        assert_eq!(n.get(SET_PIECE_THREAT), TRAIT_MIN);
    }

    #[test]
    fn nudged_counts_matches() {
        let p = PowerRating::neutral().nudged(0.01, -0.02);
        assert_eq!(p.matches_seen, 1);
        assert!((p.attack_factor - 1.01).abs() < 1e-12);
        assert!((p.defense_factor - 0.98).abs() < 1e-12);
    }

    #[test]
    fn matchup_resolves_both_sides() {
        let store = MemoryRatingStore::new();
        store
            .put_narrative(
                "Home",
                NarrativeRating::default().with_value(COUNTER_ATTACK_LETHALITY, 0.2),
            )
            .unwrap();
        let ctx = MatchContext::new(Sport::Football, "HOME", "Away", 1.2, 1.0);
        let profile = MatchupProfile::resolve(&store, &ctx);
        assert_eq!(profile.home.narrative.get(COUNTER_ATTACK_LETHALITY), 0.2);
        assert_eq!(profile.away, TeamProfile::default());
    }

    #[test]
    fn snapshot_round_trips_into_new_store() {
        let store = MemoryRatingStore::new();
        store.put_power("a", PowerRating::neutral().nudged(0.1, 0.1)).unwrap();
        let copy = MemoryRatingStore::from_snapshot(store.snapshot());
        assert_eq!(copy.snapshot(), store.snapshot());
    }

    #[test]
    fn concurrent_readers_never_see_torn_records() {
        let store = MemoryRatingStore::new();
        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..2_000u32 {
                    let v = 0.7 + f64::from(i % 60) * 0.01;
                    let rating = PowerRating {
                        attack_factor: v,
                        defense_factor: v,
                        matches_seen: i,
                    };
                    store
                        .put_batch(&[("a".to_string(), rating), ("b".to_string(), rating)], &[])
                        .unwrap();
                }
            });
            s.spawn(|| {
                for _ in 0..2_000 {
                    for (team, p) in store.snapshot().power {
                        assert_eq!(p.attack_factor, p.defense_factor, "torn record for {team}");
                    }
                    let p = store.power("b");
                    assert_eq!(p.attack_factor, p.defense_factor);
                }
            });
        });
    }
}
