//! Client-side cache database: notes, tags, the sync watermark and
//! pending pushes.

use std::path::{Path, PathBuf};

use sqlx::SqlitePool;
use tracing::info;

use crate::{
    error::{DbError, DbResult},
    sqlite_runtime::create_file_pool,
};

/// Local cache pool wrapper
#[derive(Debug, Clone)]
pub struct LocalDbPool {
    pool: SqlitePool,
}

impl LocalDbPool {
    /// Open the cache at its default location (`<data dir>/muse/local.sqlite3`)
    pub async fn new() -> DbResult<Self> {
        Self::open(&Self::db_path()?).await
    }

    /// Open (creating if needed) the cache at `db_path` and run migrations
    pub async fn open(db_path: &Path) -> DbResult<Self> {
        info!("Initializing local note cache at: {}", db_path.display());

        let pool = create_file_pool(db_path, 4).await?;

        Self::run_migrations(&pool).await?;

        info!("Local note cache initialized successfully");
        Ok(Self { pool })
    }

    /// Get the inner SQLx pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get database file path
    pub fn db_path() -> DbResult<PathBuf> {
        let data_dir = dirs::data_dir().ok_or(DbError::NoConfigDir)?;
        Ok(data_dir.join("muse").join("local.sqlite3"))
    }

    pub(crate) async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
        sqlx::migrate!("./migrations/local")
            .run(pool)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;

        info!("Local cache migrations completed");
        Ok(())
    }

    /// Close the pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Create a LocalDbPool from an existing, already migrated SqlitePool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}
