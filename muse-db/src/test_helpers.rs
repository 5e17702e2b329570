//! Test helpers for the local cache and remote table databases.

use crate::{
    error::DbResult, local_db::LocalDbPool, remote_db::RemoteDbPool,
    sqlite_runtime::create_in_memory_pool,
};

/// Create an in-memory local cache for testing
pub async fn create_test_local_pool() -> DbResult<LocalDbPool> {
    let pool = create_in_memory_pool().await?;
    LocalDbPool::run_migrations(&pool).await?;
    Ok(LocalDbPool::from_pool(pool))
}

/// Create an in-memory remote table for testing
pub async fn create_test_remote_pool() -> DbResult<RemoteDbPool> {
    let pool = create_in_memory_pool().await?;
    RemoteDbPool::run_migrations(&pool).await?;
    Ok(RemoteDbPool::from_pool(pool))
}
