use std::path::{Path, PathBuf};

use pitch_edge::calibration::{BetResult, ConfidenceRecord};
use pitch_edge::config::EngineConfig;
use pitch_edge::engine::Engine;
use pitch_edge::learning::{LoggedMatch, NarrativeLearning};
use pitch_edge::rating_db::SqliteRatingStore;
use pitch_edge::ratings::{
    FACTOR_MAX, FACTOR_MIN, MemoryRatingStore, RatingStore, SET_PIECE_THREAT, TRAIT_MAX, TRAIT_MIN,
};

#[derive(serde::Deserialize)]
struct LearnBatch {
    results: Vec<LoggedMatch>,
    narrative: Vec<NarrativeLearning>,
}

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn memory_engine() -> Engine<MemoryRatingStore> {
    Engine::new(MemoryRatingStore::new(), EngineConfig::default()).unwrap()
}

fn sqlite_engine(db: &Path) -> Engine<SqliteRatingStore> {
    Engine::new(SqliteRatingStore::open(db).unwrap(), EngineConfig::default()).unwrap()
}

fn logged(home: &str, away: &str, actual: (u32, u32), confidence: f64) -> LoggedMatch {
    LoggedMatch {
        team_home: home.to_string(),
        team_away: away.to_string(),
        predicted_home: 1.4,
        predicted_away: 1.1,
        actual_home: Some(actual.0),
        actual_away: Some(actual.1),
        confidence,
    }
}

#[test]
fn ten_results_are_deferred_and_change_nothing() {
    let engine = memory_engine();
    engine.store().put_power("Arsenal", Default::default()).unwrap();
    let before = engine.get_ratings();

    for _ in 0..10 {
        engine.log_match_result(logged("Arsenal", "Chelsea", (4, 0), 9.0)).unwrap();
    }
    let report = engine.run_power_rating_update().unwrap();
    assert!(!report.updated);
    assert_eq!(report.applied_count, 0);
    assert_eq!(engine.get_ratings(), before);
    assert_eq!(engine.pending_results(), 10);

    // The deferred entries count toward the next batch.
    for _ in 0..10 {
        engine.log_match_result(logged("Arsenal", "Chelsea", (4, 0), 9.0)).unwrap();
    }
    let report = engine.run_power_rating_update().unwrap();
    assert!(report.updated);
    assert_eq!(report.batch_size, 20);
    assert!(engine.store().power("arsenal").attack_factor > 1.0);
}

#[test]
fn deferred_results_carry_over_between_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("ratings.sqlite");

    {
        let engine = sqlite_engine(&db);
        for _ in 0..10 {
            engine.log_match_result(logged("Burnley", "Wolves", (3, 0), 8.0)).unwrap();
        }
        let report = engine.run_power_rating_update().unwrap();
        assert!(!report.updated);
        assert_eq!(report.batch_size, 10);
    }

    {
        let engine = sqlite_engine(&db);
        assert_eq!(engine.pending_results(), 10);
        for _ in 0..10 {
            engine.log_match_result(logged("Burnley", "Wolves", (3, 0), 8.0)).unwrap();
        }
        let report = engine.run_power_rating_update().unwrap();
        assert!(report.updated);
        assert_eq!(report.batch_size, 20);
        assert_eq!(report.applied_count, 20);
        assert_eq!(engine.pending_results(), 0);
    }

    // Applied results leave the queue with the update; a third session starts clean.
    let engine = sqlite_engine(&db);
    assert_eq!(engine.pending_results(), 0);
    assert_eq!(engine.store().power("burnley").matches_seen, 20);
}

#[test]
fn ratings_stay_in_bounds_after_many_batches() {
    let engine = memory_engine();
    let scores = [(0, 5), (6, 0), (1, 1), (0, 0), (7, 2)];
    for round in 0..40 {
        for i in 0..20 {
            let (h, a) = scores[(round + i) % scores.len()];
            let entry = logged("Leeds", "Everton", (h, a), (i % 11) as f64);
            engine.log_match_result(entry).unwrap();
        }
        engine.run_power_rating_update().unwrap();
    }
    for rating in engine.get_ratings().power.values() {
        assert!((FACTOR_MIN..=FACTOR_MAX).contains(&rating.attack_factor));
        assert!((FACTOR_MIN..=FACTOR_MAX).contains(&rating.defense_factor));
    }

    let up = vec![
        NarrativeLearning {
            team: "Leeds".to_string(),
            trait_name: SET_PIECE_THREAT.to_string(),
            direction: 1,
        };
        40
    ];
    let down = vec![
        NarrativeLearning {
            team: "Everton".to_string(),
            trait_name: SET_PIECE_THREAT.to_string(),
            direction: -1,
        };
        40
    ];
    engine.apply_narrative_learnings(&up).unwrap();
    engine.apply_narrative_learnings(&down).unwrap();
    let snapshot = engine.get_ratings();
    for rating in snapshot.narrative.values() {
        for value in rating.traits.values() {
            assert!((TRAIT_MIN..=TRAIT_MAX).contains(value));
        }
    }
    assert_eq!(snapshot.narrative["leeds"].get(SET_PIECE_THREAT), TRAIT_MAX);
    assert_eq!(snapshot.narrative["everton"].get(SET_PIECE_THREAT), TRAIT_MIN);
}

#[test]
fn learned_ratings_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("ratings.sqlite");
    let raw = std::fs::read_to_string(fixture_path("learn_batch.json")).unwrap();
    let batch: LearnBatch = serde_json::from_str(&raw).unwrap();

    let snapshot = {
        let engine = sqlite_engine(&db);
        for entry in batch.results.clone() {
            engine.log_match_result(entry).unwrap();
        }
        let report = engine.run_power_rating_update().unwrap();
        assert!(report.updated);
        assert_eq!(report.batch_size, batch.results.len());
        assert_eq!(report.skipped, 1);
        engine.apply_narrative_learnings(&batch.narrative).unwrap();
        engine.get_ratings()
    };
    assert!(snapshot.power.contains_key("brentford"));
    assert!(!snapshot.power.contains_key("luton"));

    let reopened = SqliteRatingStore::open(&db).unwrap();
    assert_eq!(reopened.snapshot(), snapshot);
    assert!((reopened.narrative("Brentford").get(SET_PIECE_THREAT) - 0.05).abs() < 1e-12);
}

#[test]
fn calibration_is_idempotent_over_fixture_history() {
    let raw = std::fs::read_to_string(fixture_path("calibration_history.json")).unwrap();
    let history: Vec<ConfidenceRecord> = serde_json::from_str(&raw).unwrap();
    let engine = memory_engine();

    let first = engine.run_confidence_calibration(&history);
    let second = engine.run_confidence_calibration(&history);
    assert_eq!(first, second);

    assert_eq!(first.skipped, 1);
    assert_eq!(first.buckets.len(), 2);
    let six = first.buckets[0];
    assert_eq!(six.label(), "6.0-7.0");
    assert_eq!((six.wins, six.losses, six.pushes), (3, 2, 1));
    assert_eq!(six.accuracy, Some(0.6));
    let eight = first.buckets[1];
    assert_eq!((eight.wins, eight.losses), (4, 1));
    assert_eq!(eight.accuracy, Some(0.8));
}

#[test]
fn push_only_history_reports_no_accuracy() {
    let history: Vec<_> = (0..6)
        .map(|_| ConfidenceRecord {
            confidence: 7.5,
            result: BetResult::Push,
        })
        .collect();
    let engine = memory_engine();
    let report = engine.run_confidence_calibration(&history);
    assert_eq!(report.buckets.len(), 1);
    assert_eq!(report.buckets[0].accuracy, None);
}
