//! Statistics persistence, grounded in `tg/stats/stats_db.py` but
//! re-expressed against `rusqlite` rather than a Supabase client.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Europe::Moscow;
use rusqlite::Connection;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::stats::collector::{ChannelStats, Msg};

#[derive(Debug, Error)]
pub enum StatsDbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("timestamp column is not valid rfc3339: {0}")]
    InvalidTimestamp(String),
}

/// A statistics row at read time, timestamp already converted to Moscow time.
#[derive(Debug, Clone)]
pub struct StatsRow {
    pub created_at: DateTime<chrono_tz::Tz>,
    pub username: String,
    pub reach: i64,
    pub subscribers: i64,
}

/// A message row at read time, same timestamp treatment as `StatsRow`.
#[derive(Debug, Clone)]
pub struct MsgRow {
    pub username: String,
    pub link: String,
    pub reach: i64,
    pub likes: i64,
    pub replies: i64,
    pub forwards: i64,
    pub datetime: DateTime<chrono_tz::Tz>,
    pub text: String,
}

/// Thin adapter over three logical tables: `channels(username)`,
/// `stats(created_at, username, reach, subscribers)`, and
/// `msgs(username, link, reach, likes, replies, forwards, datetime, text)`.
pub struct StatsDb {
    conn: Mutex<Connection>,
    channels_table: String,
    stats_table: String,
    msgs_table: String,
}

impl StatsDb {
    pub fn open<P: AsRef<Path>>(
        path: P,
        channels_table: impl Into<String>,
        stats_table: impl Into<String>,
        msgs_table: impl Into<String>,
    ) -> Result<Self, StatsDbError> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
            channels_table: channels_table.into(),
            stats_table: stats_table.into(),
            msgs_table: msgs_table.into(),
        };
        Ok(db)
    }

    /// Creates the three tables if absent. Idempotent; safe to call on every
    /// startup.
    pub async fn ensure_schema(&self) -> Result<(), StatsDbError> {
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (username TEXT PRIMARY KEY)",
                self.channels_table
            ),
            [],
        )?;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    created_at TEXT NOT NULL,
                    username TEXT NOT NULL,
                    reach INTEGER NOT NULL,
                    subscribers INTEGER NOT NULL
                )",
                self.stats_table
            ),
            [],
        )?;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    username TEXT NOT NULL,
                    link TEXT NOT NULL,
                    reach INTEGER NOT NULL,
                    likes INTEGER NOT NULL,
                    replies INTEGER NOT NULL,
                    forwards INTEGER NOT NULL,
                    datetime TEXT NOT NULL,
                    text TEXT NOT NULL
                )",
                self.msgs_table
            ),
            [],
        )?;
        debug!("Stats DB schema ensured");
        Ok(())
    }

    /// Reads the full channel list.
    pub async fn channels(&self) -> Result<Vec<String>, StatsDbError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!("SELECT username FROM {}", self.channels_table))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StatsDbError::from)
    }

    /// Newest-first, timestamps converted to Moscow time.
    pub async fn load_stats(&self) -> Result<Vec<StatsRow>, StatsDbError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT created_at, username, reach, subscribers FROM {} ORDER BY created_at DESC",
            self.stats_table
        ))?;
        let rows = stmt.query_map([], |row| {
            let created_at: String = row.get(0)?;
            Ok((created_at, row.get::<_, String>(1)?, row.get::<_, i64>(2)?, row.get::<_, i64>(3)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (created_at, username, reach, subscribers) = row?;
            let created_at = parse_to_moscow(&created_at)?;
            out.push(StatsRow { created_at, username, reach, subscribers });
        }
        Ok(out)
    }

    /// Newest-first, timestamps converted to Moscow time.
    pub async fn load_msgs(&self) -> Result<Vec<MsgRow>, StatsDbError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT username, link, reach, likes, replies, forwards, datetime, text FROM {} ORDER BY datetime DESC",
            self.msgs_table
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (username, link, reach, likes, replies, forwards, datetime, text) = row?;
            let datetime = parse_to_moscow(&datetime)?;
            out.push(MsgRow { username, link, reach, likes, replies, forwards, datetime, text });
        }
        Ok(out)
    }

    /// The subset of `stats` rows at the maximum `created_at`.
    pub async fn last_stats(&self) -> Result<Vec<StatsRow>, StatsDbError> {
        let all = self.load_stats().await?;
        let Some(max) = all.iter().map(|r| r.created_at).max() else {
            return Ok(Vec::new());
        };
        Ok(all.into_iter().filter(|r| r.created_at == max).collect())
    }

    /// Defaults to 365 days when empty.
    pub async fn time_since_last_update(&self) -> Result<chrono::Duration, StatsDbError> {
        let all = self.load_stats().await?;
        match all.iter().map(|r| r.created_at).max() {
            Some(max) => Ok(Utc::now() - max.with_timezone(&Utc)),
            None => Ok(chrono::Duration::days(365)),
        }
    }

    /// Append-only insert.
    pub async fn save_new_stats(&self, rows: &[ChannelStats]) -> Result<(), StatsDbError> {
        let conn = self.conn.lock().await;
        let now = Utc::now().to_rfc3339();
        for row in rows {
            conn.execute(
                &format!(
                    "INSERT INTO {} (created_at, username, reach, subscribers) VALUES (?1, ?2, ?3, ?4)",
                    self.stats_table
                ),
                rusqlite::params![now, row.username, row.reach, row.subscribers as i64],
            )?;
        }
        info!("Saved {} new stats rows", rows.len());
        Ok(())
    }

    /// Replace-all semantics (delete every row, then insert the new batch),
    /// matching the original's `delete().neq(...)` followed by `insert`.
    pub async fn save_msgs(&self, msgs: &[Msg]) -> Result<(), StatsDbError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute(&format!("DELETE FROM {}", self.msgs_table), [])?;
        for msg in msgs {
            tx.execute(
                &format!(
                    "INSERT INTO {} (username, link, reach, likes, replies, forwards, datetime, text)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    self.msgs_table
                ),
                rusqlite::params![
                    msg.username,
                    msg.link,
                    msg.reach,
                    msg.likes,
                    msg.replies,
                    msg.forwards,
                    msg.datetime.to_rfc3339(),
                    msg.text,
                ],
            )?;
        }
        tx.commit()?;
        info!("Replaced msgs table with {} rows", msgs.len());
        Ok(())
    }
}

fn parse_to_moscow(raw: &str) -> Result<DateTime<chrono_tz::Tz>, StatsDbError> {
    let parsed = DateTime::parse_from_rfc3339(raw).map_err(|_| StatsDbError::InvalidTimestamp(raw.to_string()))?;
    Ok(Moscow.from_utc_datetime(&parsed.naive_utc()))
}
