use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, Transaction, params};
use tracing::{debug, warn};

use crate::learning::LoggedMatch;
use crate::ratings::{
    MemoryRatingStore, NarrativeRating, PowerRating, RatingSnapshot, RatingStore, team_key,
};

const CACHE_DIR: &str = "pitch_edge";
const DB_FILE: &str = "ratings.sqlite";

pub fn default_db_path() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR).join(DB_FILE));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR).join(DB_FILE))
}

/// Opens the store at `path`, then the default cache location, then an in-memory db.
pub fn open_store(path: Option<&Path>) -> Result<SqliteRatingStore> {
    match path.map(Path::to_path_buf).or_else(default_db_path) {
        Some(path) => SqliteRatingStore::open(&path),
        None => {
            warn!("no ratings db path available; ratings will not persist");
            SqliteRatingStore::open_in_memory()
        }
    }
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS power_ratings (
            team TEXT PRIMARY KEY,
            attack_factor REAL NOT NULL,
            defense_factor REAL NOT NULL,
            matches_seen INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS narrative_ratings (
            team TEXT NOT NULL,
            trait TEXT NOT NULL,
            value REAL NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (team, trait)
        );
        CREATE INDEX IF NOT EXISTS idx_narrative_team ON narrative_ratings(team);

        CREATE TABLE IF NOT EXISTS pending_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            team_home TEXT NOT NULL,
            team_away TEXT NOT NULL,
            predicted_home REAL,
            predicted_away REAL,
            actual_home INTEGER,
            actual_away INTEGER,
            confidence REAL,
            logged_at TEXT NOT NULL
        );
        "#,
    )
    .context("create ratings schema")?;
    Ok(())
}

/// Rating store persisted to SQLite.
///
/// Every rating row is loaded into memory on open; reads are served from memory
/// and writes go to disk first, then replace the cached record. Results waiting
/// for a power update live in `pending_results` until the update that consumes
/// them commits.
pub struct SqliteRatingStore {
    conn: Mutex<Connection>,
    cache: MemoryRatingStore,
}

impl SqliteRatingStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create ratings dir {}", parent.display()))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .context("enable wal")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        let snapshot = load_snapshot(&conn)?;
        debug!(
            power = snapshot.power.len(),
            narrative = snapshot.narrative.len(),
            "loaded stored ratings"
        );
        Ok(Self {
            conn: Mutex::new(conn),
            cache: MemoryRatingStore::from_snapshot(snapshot),
        })
    }

    /// One transaction: upsert ratings and drop the `consumed` oldest pending rows.
    fn write(
        &self,
        power: &[(String, PowerRating)],
        narrative: &[(String, NarrativeRating)],
        consumed: usize,
    ) -> Result<()> {
        let power: Vec<(String, PowerRating)> = power
            .iter()
            .map(|(team, rating)| (team_key(team), rating.clamped()))
            .collect();
        let narrative: Vec<(String, NarrativeRating)> = narrative
            .iter()
            .map(|(team, rating)| (team_key(team), rating.clone().clamped()))
            .collect();

        {
            let mut conn = self.conn.lock().expect("ratings db lock poisoned");
            let tx = conn.transaction().context("begin ratings transaction")?;
            let now = Utc::now().to_rfc3339();
            for (team, rating) in &power {
                upsert_power(&tx, team, rating, &now)?;
            }
            for (team, rating) in &narrative {
                replace_narrative(&tx, team, rating, &now)?;
            }
            if consumed > 0 {
                tx.execute(
                    r#"
                    DELETE FROM pending_results WHERE id IN (
                        SELECT id FROM pending_results ORDER BY id LIMIT ?1
                    )
                    "#,
                    params![consumed as i64],
                )
                .context("clear consumed pending results")?;
            }
            tx.commit().context("commit ratings transaction")?;
        }

        for (team, rating) in power {
            self.cache.put_power(&team, rating)?;
        }
        for (team, rating) in narrative {
            self.cache.put_narrative(&team, rating)?;
        }
        Ok(())
    }
}

impl RatingStore for SqliteRatingStore {
    fn power(&self, team: &str) -> PowerRating {
        self.cache.power(team)
    }

    fn narrative(&self, team: &str) -> NarrativeRating {
        self.cache.narrative(team)
    }

    fn put_power(&self, team: &str, rating: PowerRating) -> Result<()> {
        self.put_batch(&[(team.to_string(), rating)], &[])
    }

    fn put_narrative(&self, team: &str, rating: NarrativeRating) -> Result<()> {
        self.put_batch(&[], &[(team.to_string(), rating)])
    }

    fn put_batch(
        &self,
        power: &[(String, PowerRating)],
        narrative: &[(String, NarrativeRating)],
    ) -> Result<()> {
        self.write(power, narrative, 0)
    }

    fn load_pending(&self) -> Result<Vec<LoggedMatch>> {
        let conn = self.conn.lock().expect("ratings db lock poisoned");
        load_pending(&conn)
    }

    fn queue_pending(&self, entry: &LoggedMatch) -> Result<()> {
        let conn = self.conn.lock().expect("ratings db lock poisoned");
        conn.execute(
            r#"
            INSERT INTO pending_results (
                team_home, team_away, predicted_home, predicted_away,
                actual_home, actual_away, confidence, logged_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                entry.team_home,
                entry.team_away,
                entry.predicted_home,
                entry.predicted_away,
                entry.actual_home,
                entry.actual_away,
                entry.confidence,
                Utc::now().to_rfc3339(),
            ],
        )
        .with_context(|| {
            format!("queue result {} vs {}", entry.team_home, entry.team_away)
        })?;
        Ok(())
    }

    fn apply_power_batch(&self, power: &[(String, PowerRating)], consumed: usize) -> Result<()> {
        self.write(power, &[], consumed)
    }

    fn snapshot(&self) -> RatingSnapshot {
        self.cache.snapshot()
    }
}

fn load_snapshot(conn: &Connection) -> Result<RatingSnapshot> {
    let mut snapshot = RatingSnapshot::default();

    let mut stmt = conn
        .prepare("SELECT team, attack_factor, defense_factor, matches_seen FROM power_ratings")
        .context("prepare load power ratings")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                PowerRating {
                    attack_factor: row.get(1)?,
                    defense_factor: row.get(2)?,
                    matches_seen: row.get::<_, u32>(3)?,
                },
            ))
        })
        .context("query power ratings")?;
    for row in rows {
        let (team, rating) = row.context("decode power rating row")?;
        snapshot.power.insert(team, rating);
    }

    let mut stmt = conn
        .prepare("SELECT team, trait, value FROM narrative_ratings ORDER BY team, trait")
        .context("prepare load narrative ratings")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })
        .context("query narrative ratings")?;
    for row in rows {
        let (team, trait_name, value) = row.context("decode narrative rating row")?;
        snapshot
            .narrative
            .entry(team)
            .or_default()
            .traits
            .insert(trait_name, value);
    }

    Ok(snapshot)
}

fn load_pending(conn: &Connection) -> Result<Vec<LoggedMatch>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT team_home, team_away, predicted_home, predicted_away,
                   actual_home, actual_away, confidence
            FROM pending_results
            ORDER BY id
            "#,
        )
        .context("prepare load pending results")?;
    let rows = stmt
        .query_map([], |row| {
            // SQLite stores NaN as NULL; NaN keeps the entry malformed so the update skips it.
            Ok(LoggedMatch {
                team_home: row.get(0)?,
                team_away: row.get(1)?,
                predicted_home: row.get::<_, Option<f64>>(2)?.unwrap_or(f64::NAN),
                predicted_away: row.get::<_, Option<f64>>(3)?.unwrap_or(f64::NAN),
                actual_home: row.get(4)?,
                actual_away: row.get(5)?,
                confidence: row.get::<_, Option<f64>>(6)?.unwrap_or(f64::NAN),
            })
        })
        .context("query pending results")?;
    let pending = rows
        .map(|row| row.context("decode pending result row"))
        .collect::<Result<Vec<_>>>()?;
    Ok(pending)
}

fn upsert_power(tx: &Transaction<'_>, team: &str, r: &PowerRating, now: &str) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO power_ratings (team, attack_factor, defense_factor, matches_seen, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(team) DO UPDATE SET
            attack_factor = excluded.attack_factor,
            defense_factor = excluded.defense_factor,
            matches_seen = excluded.matches_seen,
            updated_at = excluded.updated_at
        "#,
        params![team, r.attack_factor, r.defense_factor, r.matches_seen as i64, now],
    )
    .with_context(|| format!("upsert power rating for {team}"))?;
    Ok(())
}

fn replace_narrative(
    tx: &Transaction<'_>,
    team: &str,
    r: &NarrativeRating,
    now: &str,
) -> Result<()> {
    tx.execute(
        "DELETE FROM narrative_ratings WHERE team = ?1",
        params![team],
    )
    .with_context(|| format!("clear narrative ratings for {team}"))?;
    for (trait_name, value) in &r.traits {
        tx.execute(
            "INSERT INTO narrative_ratings (team, trait, value, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![team, trait_name, value, now],
        )
        .with_context(|| format!("insert narrative rating {team}/{trait_name}"))?;
    }
    Ok(())
}
