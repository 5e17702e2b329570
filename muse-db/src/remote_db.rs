//! Authoritative note table behind the remote endpoint.

use std::path::{Path, PathBuf};

use sqlx::SqlitePool;
use tracing::info;

use crate::{
    error::{DbError, DbResult},
    sqlite_runtime::create_file_pool,
};

/// Remote store pool wrapper
#[derive(Debug, Clone)]
pub struct RemoteDbPool {
    pool: SqlitePool,
}

impl RemoteDbPool {
    /// Open the table at its default location (`<data dir>/muse/remote.sqlite3`)
    pub async fn new() -> DbResult<Self> {
        Self::open(&Self::db_path()?).await
    }

    /// Open (creating if needed) the table at `db_path` and run migrations
    pub async fn open(db_path: &Path) -> DbResult<Self> {
        info!("Initializing remote note table at: {}", db_path.display());

        let pool = create_file_pool(db_path, 5).await?;

        Self::run_migrations(&pool).await?;

        info!("Remote note table initialized successfully");
        Ok(Self { pool })
    }

    /// Get the inner SQLx pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get database file path
    pub fn db_path() -> DbResult<PathBuf> {
        let data_dir = dirs::data_dir().ok_or(DbError::NoConfigDir)?;
        Ok(data_dir.join("muse").join("remote.sqlite3"))
    }

    pub(crate) async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
        sqlx::migrate!("./migrations/remote")
            .run(pool)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;

        info!("Remote table migrations completed");
        Ok(())
    }

    /// Close the pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Create a RemoteDbPool from an existing, already migrated SqlitePool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}
