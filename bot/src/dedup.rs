//! Persistent record of already relayed reports, backed by SQLite.
//!
//! Entries carry no payload: a key is either live (expiry in the future)
//! or absent. Expired rows are invisible to lookups and get replaced by
//! the next [`DedupStore::remember`] of the same key.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Retention of relayed keys.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Key/expiry store used to relay each report once.
pub struct DedupStore {
    pool: SqlitePool,
}

impl DedupStore {
    /// Open (or create) the store at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migration fails.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create store directory {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .pragma("trusted_schema", "OFF");

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open dedup store at {}", path.display()))?;

        sqlx::raw_sql(include_str!("../migrations/001_dedup_schema.sql"))
            .execute(&pool)
            .await
            .context("failed to apply dedup schema migration")?;

        Ok(Self { pool })
    }

    /// Whether `key` has a live entry right now.
    ///
    /// # Errors
    ///
    /// Returns an error if the database read fails.
    pub async fn seen(&self, key: &[u8]) -> anyhow::Result<bool> {
        self.seen_at(key, Utc::now()).await
    }

    /// Whether `key` has an entry expiring after `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database read fails.
    pub async fn seen_at(&self, key: &[u8], now: DateTime<Utc>) -> anyhow::Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM dedup WHERE key = ?1 AND expires_at > ?2")
                .bind(key)
                .bind(now.timestamp_millis())
                .fetch_optional(&self.pool)
                .await
                .context("failed to query dedup store")?;
        Ok(row.is_some())
    }

    /// Record `key` for `ttl` from now. See [`DedupStore::remember_at`].
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn remember(&self, key: &[u8], ttl: Duration) -> anyhow::Result<bool> {
        self.remember_at(key, ttl, Utc::now()).await
    }

    /// Record `key` as live until `now + ttl`.
    ///
    /// A live entry keeps its original expiry; an expired one is replaced.
    /// Returns whether a row was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn remember_at(
        &self,
        key: &[u8],
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let now_ms = now.timestamp_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now_ms.saturating_add(ttl_ms);

        let result = sqlx::query(
            "INSERT INTO dedup (key, expires_at) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET expires_at = excluded.expires_at
             WHERE dedup.expires_at <= ?3",
        )
        .bind(key)
        .bind(expires_at)
        .bind(now_ms)
        .execute(&self.pool)
        .await
        .context("failed to write dedup entry")?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every entry expired at `now`. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM dedup WHERE expires_at <= ?1")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await
            .context("failed to purge dedup store")?;
        Ok(result.rows_affected())
    }

    /// Delete every entry expired by now.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn purge_expired(&self) -> anyhow::Result<u64> {
        self.purge_expired_at(Utc::now()).await
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
