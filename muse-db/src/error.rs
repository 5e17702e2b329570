//! Database error types.

/// Database operation errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// SQL error from sqlx
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    /// Tag not found
    #[error("Tag not found: {0}")]
    TagNotFound(String),

    /// Data directory not found
    #[error("Config/data directory not found")]
    NoConfigDir,

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON column could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid enum value stored in a text column
    #[error("Invalid sync state: {0}")]
    InvalidSyncState(String),
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

/// Result type alias for database operations
pub type DbResult<T> = Result<T, DbError>;
