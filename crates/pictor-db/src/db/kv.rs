//! Shared key-value store with per-key expiry.
//!
//! The URL cache and the rate limiter talk to this contract only. Every
//! operation is a single statement against the backing store, so counters and
//! conditional inserts stay correct across any number of service instances.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("Key-value store unavailable: {0}")]
    Unavailable(String),

    #[error("Stored value for key {key} is not a counter")]
    NotACounter { key: String },
}

impl From<sqlx::Error> for KvError {
    fn from(err: sqlx::Error) -> Self {
        KvError::Unavailable(err.to_string())
    }
}

pub type KvResult<T> = Result<T, KvError>;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// Unconditionally store `value` with an expiry of `ttl` from now.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()>;

    /// Atomically increment the counter at `key` and return the new count.
    ///
    /// If the key was absent or expired it restarts at 1 and its expiry is
    /// armed to `ttl`. An existing live expiry is never extended, so repeated
    /// calls describe a fixed window.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> KvResult<i64>;

    /// Remaining lifetime of `key`; `None` if absent or without expiry.
    async fn ttl(&self, key: &str) -> KvResult<Option<Duration>>;

    /// Store `value` only if `key` is absent or expired. Returns true if written.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> KvResult<bool>;
}

/// Postgres implementation over the `kv_entries` table
#[derive(Clone)]
pub struct PgKeyValueStore {
    pool: PgPool,
}

impl PgKeyValueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete rows whose expiry has passed. Reads already ignore them; this
    /// only reclaims space.
    #[tracing::instrument(skip(self), fields(db.table = "kv_entries", db.operation = "delete"))]
    pub async fn purge_expired(&self) -> KvResult<u64> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl KeyValueStore for PgKeyValueStore {
    #[tracing::instrument(skip(self), fields(db.table = "kv_entries", db.operation = "select"))]
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT value FROM kv_entries \
             WHERE key = $1 AND (expires_at IS NULL OR expires_at > NOW())",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    #[tracing::instrument(skip(self, value), fields(db.table = "kv_entries", db.operation = "upsert"))]
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()> {
        sqlx::query(
            "INSERT INTO kv_entries (key, value, expires_at) \
             VALUES ($1, $2, NOW() + make_interval(secs => $3)) \
             ON CONFLICT (key) DO UPDATE \
             SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "kv_entries", db.operation = "increment"))]
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> KvResult<i64> {
        let count: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES ($1, '1', NOW() + make_interval(secs => $2))
            ON CONFLICT (key) DO UPDATE SET
                value = CASE
                    WHEN kv_entries.expires_at IS NOT NULL AND kv_entries.expires_at <= NOW()
                        THEN '1'
                    ELSE (kv_entries.value::BIGINT + 1)::TEXT
                END,
                expires_at = CASE
                    WHEN kv_entries.expires_at IS NULL OR kv_entries.expires_at <= NOW()
                        THEN EXCLUDED.expires_at
                    ELSE kv_entries.expires_at
                END
            WHERE kv_entries.value ~ '^[0-9]+$'
               OR (kv_entries.expires_at IS NOT NULL AND kv_entries.expires_at <= NOW())
            RETURNING value::BIGINT
            "#,
        )
        .bind(key)
        .bind(ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        count.ok_or_else(|| KvError::NotACounter {
            key: key.to_string(),
        })
    }

    #[tracing::instrument(skip(self), fields(db.table = "kv_entries", db.operation = "select"))]
    async fn ttl(&self, key: &str) -> KvResult<Option<Duration>> {
        let remaining: Option<Option<f64>> = sqlx::query_scalar(
            "SELECT EXTRACT(EPOCH FROM (expires_at - NOW()))::FLOAT8 FROM kv_entries \
             WHERE key = $1 AND (expires_at IS NULL OR expires_at > NOW())",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(remaining
            .flatten()
            .filter(|secs| *secs > 0.0)
            .map(Duration::from_secs_f64))
    }

    #[tracing::instrument(skip(self, value), fields(db.table = "kv_entries", db.operation = "insert_if_absent"))]
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> KvResult<bool> {
        let written: Option<String> = sqlx::query_scalar(
            "INSERT INTO kv_entries (key, value, expires_at) \
             VALUES ($1, $2, NOW() + make_interval(secs => $3)) \
             ON CONFLICT (key) DO UPDATE \
             SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at \
             WHERE kv_entries.expires_at IS NOT NULL AND kv_entries.expires_at <= NOW() \
             RETURNING key",
        )
        .bind(key)
        .bind(value)
        .bind(ttl.map(|t| t.as_secs_f64()))
        .fetch_optional(&self.pool)
        .await?;
        Ok(written.is_some())
    }
}
