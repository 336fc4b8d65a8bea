//! CycleStore: SQLite persistence for cycles and knowledge.
//!
//! Records are kept as JSON documents alongside a few indexed columns, so a
//! loaded value is exactly the value that was saved.

use super::{Difficulty, Domain, LearningCycle, LearningError};
use crate::knowledge::{ExpiredFact, Fact};

use chrono::SecondsFormat;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Wraps a dedicated SQLite connection pool for learning history.
pub struct CycleStore {
    pool: SqlitePool,
}

impl CycleStore {
    /// Connect to (or create) the database at the given path.
    ///
    /// Runs the embedded schema, enables WAL mode, and configures a small pool
    /// (one writer, one reader).
    pub async fn connect(path: &Path) -> Result<Arc<Self>, LearningError> {
        let url = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&url)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;

        Ok(Arc::new(Self { pool }))
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace a completed cycle.
    pub async fn save_cycle(&self, cycle: &LearningCycle) -> Result<(), LearningError> {
        let body = serde_json::to_string(cycle)?;
        sqlx::query(
            "INSERT OR REPLACE INTO learning_cycles (id, domain, difficulty, completed_at, body)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&cycle.id)
        .bind(cycle.challenge.domain.to_string())
        .bind(cycle.challenge.difficulty.to_string())
        .bind(timestamp(&cycle.completed_at))
        .bind(&body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_cycle(&self, id: &str) -> Result<Option<LearningCycle>, LearningError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT body FROM learning_cycles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(body,)| serde_json::from_str(&body))
            .transpose()
            .map_err(LearningError::from)
    }

    /// All cycles in completion order.
    pub async fn load_cycles(&self) -> Result<Vec<LearningCycle>, LearningError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT body FROM learning_cycles ORDER BY completed_at, rowid")
                .fetch_all(&self.pool)
                .await?;
        decode_all(rows)
    }

    /// Insert or replace a batch of facts in one transaction.
    pub async fn save_facts(&self, facts: &[Fact]) -> Result<(), LearningError> {
        let mut transaction = self.pool.begin().await?;
        for fact in facts {
            let body = serde_json::to_string(fact)?;
            sqlx::query(
                "INSERT OR REPLACE INTO facts (fact_id, fact_type, domain, challenge_key, recorded_at, body)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&fact.fact_id)
            .bind(&fact.fact_type)
            .bind(&fact.domain)
            .bind(&fact.challenge_key)
            .bind(timestamp(&fact.timestamp))
            .bind(&body)
            .execute(&mut *transaction)
            .await?;
        }
        transaction.commit().await?;
        Ok(())
    }

    /// Facts matching an optional type filter, oldest first.
    pub async fn load_facts(&self, fact_type: Option<&str>) -> Result<Vec<Fact>, LearningError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT body FROM facts WHERE (?1 IS NULL OR fact_type = ?1) ORDER BY recorded_at, rowid",
        )
        .bind(fact_type)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    pub async fn save_expired(&self, expired: &ExpiredFact) -> Result<(), LearningError> {
        let body = serde_json::to_string(expired)?;
        sqlx::query(
            "INSERT OR REPLACE INTO expired_facts (invalidation_id, fact_id, reason, expired_at, body)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&expired.invalidation_id)
        .bind(&expired.original.fact_id)
        .bind(&expired.reason)
        .bind(timestamp(&expired.expired_at))
        .bind(&body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_expired(&self) -> Result<Vec<ExpiredFact>, LearningError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT body FROM expired_facts ORDER BY expired_at, rowid")
                .fetch_all(&self.pool)
                .await?;
        decode_all(rows)
    }

    pub async fn cycle_count(&self) -> Result<i64, LearningError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM learning_cycles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Stored cycle counts per domain and difficulty.
    pub async fn cycle_mix(&self) -> Result<BTreeMap<(Domain, Difficulty), i64>, LearningError> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT domain, difficulty, COUNT(*) FROM learning_cycles GROUP BY domain, difficulty",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut mix = BTreeMap::new();
        for (domain, difficulty, count) in rows {
            let key = (Domain::from_str_lossy(&domain), Difficulty::from_str_lossy(&difficulty));
            *mix.entry(key).or_insert(0) += count;
        }
        Ok(mix)
    }
}

impl std::fmt::Debug for CycleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleStore").finish_non_exhaustive()
    }
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn timestamp(at: &chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_all<T: serde::de::DeserializeOwned>(rows: Vec<(String,)>) -> Result<Vec<T>, LearningError> {
    rows.into_iter()
        .map(|(body,)| serde_json::from_str(&body).map_err(LearningError::from))
        .collect()
}

/// Embedded schema. All tables use `IF NOT EXISTS` so re-running is safe.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS learning_cycles (
    id TEXT PRIMARY KEY,
    domain TEXT NOT NULL,
    difficulty TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    body TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_learning_cycles_completed ON learning_cycles(completed_at);

CREATE TABLE IF NOT EXISTS facts (
    fact_id TEXT PRIMARY KEY,
    fact_type TEXT NOT NULL,
    domain TEXT NOT NULL,
    challenge_key TEXT,
    recorded_at TEXT NOT NULL,
    body TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_facts_key ON facts(fact_type, domain, challenge_key);

CREATE TABLE IF NOT EXISTS expired_facts (
    invalidation_id TEXT PRIMARY KEY,
    fact_id TEXT NOT NULL,
    reason TEXT NOT NULL,
    expired_at TEXT NOT NULL,
    body TEXT NOT NULL
);
"#;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
