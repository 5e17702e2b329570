//! Per-note push state of the local cache.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::{DbError, DbResult};

/// Where a note's latest local write stands relative to the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    LocalOnly,
    RemotePending,
    RemoteConfirmed,
    RemoteFailed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::LocalOnly => write!(f, "local_only"),
            SyncState::RemotePending => write!(f, "remote_pending"),
            SyncState::RemoteConfirmed => write!(f, "remote_confirmed"),
            SyncState::RemoteFailed => write!(f, "remote_failed"),
        }
    }
}

impl std::str::FromStr for SyncState {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local_only" => Ok(SyncState::LocalOnly),
            "remote_pending" => Ok(SyncState::RemotePending),
            "remote_confirmed" => Ok(SyncState::RemoteConfirmed),
            "remote_failed" => Ok(SyncState::RemoteFailed),
            _ => Err(DbError::InvalidSyncState(s.to_string())),
        }
    }
}

/// A note still waiting for remote confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingNote {
    pub note_id: String,
    pub state: SyncState,
    /// Failed push attempts so far
    pub attempts: i64,
    pub last_error: Option<String>,
    pub updated_at: i64,
}

/// Pending push repository
pub struct PendingRepository;

impl PendingRepository {
    /// Record the state of a note. `RemoteConfirmed` clears the entry;
    /// `RemoteFailed` counts one more attempt.
    pub async fn mark(
        pool: &SqlitePool,
        note_id: &str,
        state: SyncState,
        error: Option<&str>,
    ) -> DbResult<()> {
        if state == SyncState::RemoteConfirmed {
            Self::clear(pool, note_id).await?;
            return Ok(());
        }

        let attempts = i64::from(state == SyncState::RemoteFailed);
        let now = Utc::now().timestamp_millis();

        sqlx::query(
            "INSERT INTO pending_notes (note_id, state, attempts, last_error, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(note_id) DO UPDATE SET
                state = excluded.state,
                attempts = pending_notes.attempts + excluded.attempts,
                last_error = COALESCE(excluded.last_error, pending_notes.last_error),
                updated_at = excluded.updated_at",
        )
        .bind(note_id)
        .bind(state.to_string())
        .bind(attempts)
        .bind(error)
        .bind(now)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn clear(pool: &SqlitePool, note_id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM pending_notes WHERE note_id = ?")
            .bind(note_id)
            .execute(pool)
            .await?;

        Ok(())
    }

    pub async fn get(pool: &SqlitePool, note_id: &str) -> DbResult<Option<PendingNote>> {
        let row = sqlx::query_as::<_, PendingRow>(
            "SELECT note_id, state, attempts, last_error, updated_at
             FROM pending_notes WHERE note_id = ?",
        )
        .bind(note_id)
        .fetch_optional(pool)
        .await?;

        row.map(PendingNote::try_from).transpose()
    }

    /// Every unconfirmed note, oldest write first
    pub async fn list(pool: &SqlitePool) -> DbResult<Vec<PendingNote>> {
        let rows = sqlx::query_as::<_, PendingRow>(
            "SELECT note_id, state, attempts, last_error, updated_at
             FROM pending_notes ORDER BY updated_at, note_id",
        )
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(PendingNote::try_from).collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PendingRow {
    note_id: String,
    state: String,
    attempts: i64,
    last_error: Option<String>,
    updated_at: i64,
}

impl TryFrom<PendingRow> for PendingNote {
    type Error = DbError;

    fn try_from(row: PendingRow) -> Result<Self, Self::Error> {
        Ok(PendingNote {
            note_id: row.note_id,
            state: row.state.parse()?,
            attempts: row.attempts,
            last_error: row.last_error,
            updated_at: row.updated_at,
        })
    }
}
