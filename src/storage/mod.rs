//! History store.
//!
//! Append-only record of detected +EV bets, queryable by time. The SQLite
//! implementation keeps the full bet as a JSON column next to a few indexed
//! fields; the in-memory one backs tests and runs without a database.
//!
//! Nothing is cleared implicitly. `reset` is an explicit operation the
//! binary calls only when `history.reset_on_start` is set.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::pricing::ev::EvBet;
use crate::types::SharplineError;

/// One stored bet with its write metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedBet {
    pub id: i64,
    pub recorded_at: DateTime<Utc>,
    pub is_prop: bool,
    pub bet: EvBet,
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one bet.
    async fn record(&self, bet: &EvBet, is_prop: bool, at: DateTime<Utc>) -> Result<(), SharplineError>;

    /// Every bet recorded at or after `since`, oldest first.
    async fn recent(&self, since: DateTime<Utc>) -> Result<Vec<RecordedBet>, SharplineError>;

    /// Remove all history.
    async fn reset(&self) -> Result<(), SharplineError>;
}

fn storage_err(e: impl Display) -> SharplineError {
    SharplineError::Storage(e.to_string())
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    /// Open (creating if needed) the database at `url` and ensure the schema.
    pub async fn connect(url: &str) -> Result<Self, SharplineError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(storage_err)?
            .create_if_missing(true);

        // Each in-memory connection is its own database; keep exactly one alive.
        let in_memory = url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(storage_err)?;

        let store = Self { pool };
        store.migrate().await?;
        info!(url, "History store ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), SharplineError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ev_history (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                recorded_at INTEGER NOT NULL,
                is_prop     INTEGER NOT NULL,
                sport_key   TEXT    NOT NULL,
                event_id    TEXT    NOT NULL,
                book        TEXT    NOT NULL,
                market      TEXT    NOT NULL,
                outcome     TEXT    NOT NULL,
                ev_percent  REAL    NOT NULL,
                bet_json    TEXT    NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_ev_history_recorded_at ON ev_history (recorded_at)")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn record(&self, bet: &EvBet, is_prop: bool, at: DateTime<Utc>) -> Result<(), SharplineError> {
        let json = serde_json::to_string(bet).map_err(storage_err)?;
        sqlx::query(
            r#"
            INSERT INTO ev_history
                (recorded_at, is_prop, sport_key, event_id, book, market, outcome, ev_percent, bet_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(at.timestamp_micros())
        .bind(is_prop)
        .bind(&bet.sport_key)
        .bind(&bet.event_id)
        .bind(&bet.book)
        .bind(&bet.market)
        .bind(&bet.outcome)
        .bind(bet.ev_percent)
        .bind(json)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(book = %bet.book, ev = bet.ev_percent, is_prop, "Recorded EV bet");
        Ok(())
    }

    async fn recent(&self, since: DateTime<Utc>) -> Result<Vec<RecordedBet>, SharplineError> {
        let rows: Vec<(i64, i64, bool, String)> = sqlx::query_as(
            r#"
            SELECT id, recorded_at, is_prop, bet_json
            FROM ev_history
            WHERE recorded_at >= ?
            ORDER BY recorded_at ASC, id ASC
            "#,
        )
        .bind(since.timestamp_micros())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.into_iter()
            .map(|(id, micros, is_prop, json)| {
                let recorded_at = DateTime::<Utc>::from_timestamp_micros(micros)
                    .ok_or_else(|| storage_err(format!("bad timestamp {micros} in row {id}")))?;
                let bet = serde_json::from_str(&json).map_err(storage_err)?;
                Ok(RecordedBet { id, recorded_at, is_prop, bet })
            })
            .collect()
    }

    async fn reset(&self) -> Result<(), SharplineError> {
        let result = sqlx::query("DELETE FROM ev_history")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        info!(removed = result.rows_affected(), "History reset");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryHistoryStore {
    rows: Mutex<Vec<RecordedBet>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn record(&self, bet: &EvBet, is_prop: bool, at: DateTime<Utc>) -> Result<(), SharplineError> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let id = rows.len() as i64 + 1;
        rows.push(RecordedBet {
            id,
            recorded_at: at,
            is_prop,
            bet: bet.clone(),
        });
        Ok(())
    }

    async fn recent(&self, since: DateTime<Utc>) -> Result<Vec<RecordedBet>, SharplineError> {
        let mut found: Vec<RecordedBet> = self
            .rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.recorded_at >= since)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn reset(&self) -> Result<(), SharplineError> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
