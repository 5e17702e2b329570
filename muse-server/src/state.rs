//! Shared state of the note endpoint.

use muse_db::RemoteDbPool;
use tokio::sync::{Mutex, MutexGuard};

pub struct AppState {
    pub db: RemoteDbPool,
    api_key: Option<String>,
    /// Serializes note mutations and incremental scans, so a scan's sync
    /// timestamp is never overtaken by a write stamped before it.
    write_lock: Mutex<()>,
}

impl AppState {
    pub fn new(db: RemoteDbPool, api_key: Option<String>) -> Self {
        Self {
            db,
            api_key: api_key.filter(|key| !key.is_empty()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Accepts any key when none is configured.
    pub fn is_authorized(&self, presented: Option<&str>) -> bool {
        match self.api_key() {
            Some(expected) => presented == Some(expected),
            None => true,
        }
    }

    pub async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }
}
