//! Sync engine error types.

use muse_core::ValidationError;
use muse_db::DbError;

use crate::remote::RemoteError;

/// Errors surfaced by the sync engine.
///
/// Remote failures of saves and deletes are downgraded inside the engine;
/// `Remote` only reaches callers of the lower level helpers.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Invalid note: {0}")]
    Validation(#[from] ValidationError),

    #[error("Local store error: {0}")]
    Store(#[from] DbError),

    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),
}

pub type SyncResult<T> = Result<T, SyncError>;
