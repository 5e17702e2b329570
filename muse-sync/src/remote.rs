//! Interface to the authoritative note store.

use muse_core::Note;

/// Which notes a scan returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFilter {
    /// Full scan, used for cold-start population
    All,
    /// Notes with `updated_at` strictly greater than the timestamp
    ModifiedAfter(i64),
}

impl ScanFilter {
    pub fn matches(&self, note: &Note) -> bool {
        match self {
            ScanFilter::All => true,
            ScanFilter::ModifiedAfter(ts) => note.updated_at > *ts,
        }
    }
}

/// Result of a scan
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub notes: Vec<Note>,
    /// Scan time computed by the remote. Absent for full scans.
    pub sync_timestamp: Option<i64>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// A 4xx answer: the remote refused this request and will refuse it again.
    pub fn is_rejection(&self) -> bool {
        matches!(self, RemoteError::Status { status, .. } if (400..500).contains(status))
    }
}

/// Remote note store: upsert, point read, delete and filtered scan.
///
/// Every note mutation applied through this interface also updates the
/// remote tag counts.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upsert; returns the persisted shape
    async fn put(&self, note: &Note) -> Result<Note, RemoteError>;

    async fn get(&self, id: &str) -> Result<Option<Note>, RemoteError>;

    /// Deleting an unknown id succeeds
    async fn delete(&self, id: &str) -> Result<(), RemoteError>;

    async fn scan(&self, filter: ScanFilter) -> Result<ScanPage, RemoteError>;
}
