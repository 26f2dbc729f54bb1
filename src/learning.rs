use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LearningConfig;
use crate::ratings::{NarrativeRating, PowerRating, RatingStore, team_key};

/// A settled (or not yet settled) prediction waiting to feed the power ratings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedMatch {
    pub team_home: String,
    pub team_away: String,
    /// Expected goals the model gave each side.
    pub predicted_home: f64,
    pub predicted_away: f64,
    #[serde(default)]
    pub actual_home: Option<u32>,
    #[serde(default)]
    pub actual_away: Option<u32>,
    /// Stated confidence on the 1-10 scale.
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PowerUpdateReport {
    pub updated: bool,
    pub batch_size: usize,
    pub applied_count: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeLearning {
    pub team: String,
    #[serde(rename = "trait")]
    pub trait_name: String,
    pub direction: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct NarrativeUpdateReport {
    pub applied: usize,
    pub skipped: usize,
}

/// Pending learning batch plus the single-writer lock for rating updates.
#[derive(Debug, Default)]
pub struct LearningLoop {
    pending: Mutex<Vec<LoggedMatch>>,
    update_lock: Mutex<()>,
}

impl LearningLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks up the results the store still holds from earlier sessions.
    pub fn resume(store: &(impl RatingStore + ?Sized)) -> Result<Self> {
        let pending = store.load_pending()?;
        if !pending.is_empty() {
            info!(pending = pending.len(), "resumed pending learning batch");
        }
        Ok(Self {
            pending: Mutex::new(pending),
            update_lock: Mutex::new(()),
        })
    }

    /// Queues a result in memory and in the store's durable queue.
    pub fn log_match_result(
        &self,
        store: &(impl RatingStore + ?Sized),
        entry: LoggedMatch,
    ) -> Result<()> {
        let mut pending = self.pending.lock().expect("learning batch lock poisoned");
        store.queue_pending(&entry)?;
        pending.push(entry);
        debug!(pending = pending.len(), "logged match result");
        Ok(())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("learning batch lock poisoned").len()
    }

    /// Applies the pending batch once it reaches `cfg.min_batch`; smaller batches stay queued.
    pub fn run_power_rating_update(
        &self,
        store: &(impl RatingStore + ?Sized),
        cfg: &LearningConfig,
    ) -> Result<PowerUpdateReport> {
        let _writer = self.update_lock.lock().expect("learning update lock poisoned");

        let batch = {
            let mut pending = self.pending.lock().expect("learning batch lock poisoned");
            if pending.len() < cfg.min_batch {
                info!(
                    pending = pending.len(),
                    min_batch = cfg.min_batch,
                    "power rating update deferred"
                );
                return Ok(PowerUpdateReport {
                    updated: false,
                    batch_size: pending.len(),
                    applied_count: 0,
                    skipped: 0,
                });
            }
            std::mem::take(&mut *pending)
        };

        let mut working: BTreeMap<String, PowerRating> = BTreeMap::new();
        let mut applied = 0usize;
        let mut skipped = 0usize;

        for entry in &batch {
            let Some((home_goals, away_goals)) = usable_result(entry) else {
                warn!(
                    home = %entry.team_home,
                    away = %entry.team_away,
                    "skipping malformed learning entry"
                );
                skipped += 1;
                continue;
            };

            let weight = (entry.confidence / 10.0).max(cfg.min_weight);
            let step = cfg.power_rate * weight;
            let home_error = f64::from(home_goals) - entry.predicted_home;
            let away_error = f64::from(away_goals) - entry.predicted_away;

            for (team, own_error, conceded_error) in [
                (&entry.team_home, home_error, away_error),
                (&entry.team_away, away_error, home_error),
            ] {
                let key = team_key(team);
                let current = working
                    .get(&key)
                    .copied()
                    .unwrap_or_else(|| store.power(&key));
                working.insert(key, current.nudged(step * own_error, -step * conceded_error));
            }
            applied += 1;
        }

        let updates: Vec<(String, PowerRating)> = working.into_iter().collect();
        if let Err(err) = store.apply_power_batch(&updates, batch.len()) {
            // Put the batch back so nothing is lost if the store write failed.
            let mut pending = self.pending.lock().expect("learning batch lock poisoned");
            let newer = std::mem::replace(&mut *pending, batch);
            pending.extend(newer);
            return Err(err);
        }

        info!(
            batch_size = batch.len(),
            applied,
            skipped,
            teams = updates.len(),
            "power ratings updated"
        );
        Ok(PowerUpdateReport {
            updated: true,
            batch_size: batch.len(),
            applied_count: applied,
            skipped,
        })
    }

    /// Moves each named trait by `cfg.narrative_rate * direction`.
    pub fn apply_narrative_learnings(
        &self,
        store: &(impl RatingStore + ?Sized),
        learnings: &[NarrativeLearning],
        cfg: &LearningConfig,
    ) -> Result<NarrativeUpdateReport> {
        let _writer = self.update_lock.lock().expect("learning update lock poisoned");

        let mut working: BTreeMap<String, NarrativeRating> = BTreeMap::new();
        let mut report = NarrativeUpdateReport::default();

        for learning in learnings {
            let key = team_key(&learning.team);
            let trait_name = learning.trait_name.trim().to_lowercase();
            if key.is_empty() || trait_name.is_empty() || !(-1..=1).contains(&learning.direction)
            {
                warn!(
                    team = %learning.team,
                    trait_name = %learning.trait_name,
                    direction = learning.direction,
                    "skipping malformed narrative learning"
                );
                report.skipped += 1;
                continue;
            }
            let current = working
                .remove(&key)
                .unwrap_or_else(|| store.narrative(&key));
            let delta = cfg.narrative_rate * f64::from(learning.direction);
            working.insert(key, current.adjusted(&trait_name, delta));
            report.applied += 1;
        }

        let updates: Vec<(String, NarrativeRating)> = working.into_iter().collect();
        store.put_batch(&[], &updates)?;
        info!(
            applied = report.applied,
            skipped = report.skipped,
            teams = updates.len(),
            "narrative ratings updated"
        );
        Ok(report)
    }
}

fn usable_result(entry: &LoggedMatch) -> Option<(u32, u32)> {
    let rates_ok = [entry.predicted_home, entry.predicted_away]
        .iter()
        .all(|r| r.is_finite() && *r > 0.0);
    let names_ok = !entry.team_home.trim().is_empty() && !entry.team_away.trim().is_empty();
    if !rates_ok || !names_ok || !entry.confidence.is_finite() {
        return None;
    }
    Some((entry.actual_home?, entry.actual_away?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratings::{FACTOR_MAX, FACTOR_MIN, MemoryRatingStore, SET_PIECE_THREAT, TRAIT_MAX};

    fn settled(home: &str, away: &str, ah: u32, aa: u32, confidence: f64) -> LoggedMatch {
        LoggedMatch {
            team_home: home.to_string(),
            team_away: away.to_string(),
            predicted_home: 1.5,
            predicted_away: 1.0,
            actual_home: Some(ah),
            actual_away: Some(aa),
            confidence,
        }
    }

    #[test]
    fn below_minimum_batch_is_deferred() {
        let store = MemoryRatingStore::new();
        let learner = LearningLoop::new();
        for _ in 0..10 {
            learner.log_match_result(&store, settled("A", "B", 3, 0, 8.0)).unwrap();
        }
        let report = learner
            .run_power_rating_update(&store, &LearningConfig::default())
            .unwrap();
        assert!(!report.updated);
        assert_eq!(report.batch_size, 10);
        assert_eq!(learner.pending_len(), 10);
        assert!(store.snapshot().power.is_empty());
    }

    #[test]
    fn overperformance_raises_attack_and_lowers_opponent_defense() {
        let store = MemoryRatingStore::new();
        let learner = LearningLoop::new();
        for _ in 0..20 {
            learner.log_match_result(&store, settled("A", "B", 3, 1, 10.0)).unwrap();
        }
        let report = learner
            .run_power_rating_update(&store, &LearningConfig::default())
            .unwrap();
        assert!(report.updated);
        assert_eq!(report.applied_count, 20);
        assert_eq!(learner.pending_len(), 0);

        let a = store.power("a");
        let b = store.power("b");
        assert_eq!(a.matches_seen, 20);
        // 20 * 0.008 * 1.5 = 0.24
        assert!((a.attack_factor - 1.24).abs() < 1e-9);
        assert!(b.defense_factor < 1.0);
        assert!(b.attack_factor == 1.0);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let store = MemoryRatingStore::new();
        let learner = LearningLoop::new();
        for _ in 0..18 {
            learner.log_match_result(&store, settled("A", "B", 1, 1, 5.0)).unwrap();
        }
        let mut unsettled = settled("C", "D", 0, 0, 5.0);
        unsettled.actual_home = None;
        learner.log_match_result(&store, unsettled).unwrap();
        let mut bad_rate = settled("C", "D", 0, 0, 5.0);
        bad_rate.predicted_away = 0.0;
        learner.log_match_result(&store, bad_rate).unwrap();

        let report = learner
            .run_power_rating_update(&store, &LearningConfig::default())
            .unwrap();
        assert!(report.updated);
        assert_eq!(report.batch_size, 20);
        assert_eq!(report.applied_count, 18);
        assert_eq!(report.skipped, 2);
        assert!(!store.snapshot().power.contains_key("c"));
    }

    #[test]
    fn zero_confidence_still_moves_ratings() {
        let store = MemoryRatingStore::new();
        let learner = LearningLoop::new();
        let cfg = LearningConfig {
            min_batch: 1,
            ..LearningConfig::default()
        };
        learner.log_match_result(&store, settled("A", "B", 2, 1, 0.0)).unwrap();
        learner.run_power_rating_update(&store, &cfg).unwrap();
        assert!(store.power("a").attack_factor > 1.0);
    }

    #[test]
    fn ratings_stay_bounded_under_repeated_blowouts() {
        let store = MemoryRatingStore::new();
        let learner = LearningLoop::new();
        let cfg = LearningConfig::default();
        for _ in 0..50 {
            for _ in 0..cfg.min_batch {
                learner.log_match_result(&store, settled("A", "B", 9, 0, 10.0)).unwrap();
            }
            learner.run_power_rating_update(&store, &cfg).unwrap();
        }
        let a = store.power("a");
        let b = store.power("b");
        assert_eq!(a.attack_factor, FACTOR_MAX);
        assert_eq!(b.attack_factor, FACTOR_MIN);
        assert!(b.defense_factor >= FACTOR_MIN);
    }

    #[test]
    fn narrative_steps_and_clamps() {
        let store = MemoryRatingStore::new();
        let learner = LearningLoop::new();
        let cfg = LearningConfig::default();
        let up = NarrativeLearning {
            team: "Brentford".to_string(),
            trait_name: SET_PIECE_THREAT.to_string(),
            direction: 1,
        };
        learner
            .apply_narrative_learnings(&store, std::slice::from_ref(&up), &cfg)
            .unwrap();
        assert!((store.narrative("brentford").get(SET_PIECE_THREAT) - 0.05).abs() < 1e-12);

        let many = vec![up; 30];
        learner.apply_narrative_learnings(&store, &many, &cfg).unwrap();
        assert_eq!(store.narrative("brentford").get(SET_PIECE_THREAT), TRAIT_MAX);
    }

    #[test]
    fn invalid_direction_is_skipped() {
        let store = MemoryRatingStore::new();
        let learner = LearningLoop::new();
        let report = learner
            .apply_narrative_learnings(
                &store,
                &[NarrativeLearning {
                    team: "X".to_string(),
                    trait_name: SET_PIECE_THREAT.to_string(),
                    direction: 3,
                }],
                &LearningConfig::default(),
            )
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.applied, 0);
        assert!(store.snapshot().narrative.is_empty());
    }
}
