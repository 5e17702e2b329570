//! Scalar sync metadata stored in the local cache.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};

const LAST_SYNC_KEY: &str = "last_sync";

/// Watermark repository
pub struct SyncMetaRepository;

impl SyncMetaRepository {
    /// Current watermark; 0 when never synced
    pub async fn last_sync(pool: &SqlitePool) -> DbResult<i64> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM meta WHERE key = ?")
            .bind(LAST_SYNC_KEY)
            .fetch_optional(pool)
            .await?;

        match value {
            Some(value) => value.trim().parse::<i64>().map_err(|e| {
                DbError::Serialization(format!("Invalid {} value '{}': {}", LAST_SYNC_KEY, value, e))
            }),
            None => Ok(0),
        }
    }

    /// Move the watermark forward to `timestamp`. A smaller value leaves it
    /// unchanged. Returns the stored watermark.
    pub async fn advance_last_sync(pool: &SqlitePool, timestamp: i64) -> DbResult<i64> {
        let current = Self::last_sync(pool).await?;
        if timestamp <= current {
            return Ok(current);
        }

        sqlx::query(
            "INSERT INTO meta (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(LAST_SYNC_KEY)
        .bind(timestamp.to_string())
        .execute(pool)
        .await?;

        debug!("Watermark advanced from {} to {}", current, timestamp);
        Ok(timestamp)
    }
}
