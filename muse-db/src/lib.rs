//! muse-db: SQLite storage for the note/tag cache and the remote note table.
//!
//! This crate provides:
//! - the client-side cache (`LocalDbPool`) and the authoritative table (`RemoteDbPool`)
//! - note, tag, watermark and pending-push repositories
//! - the tag reference-counting lifecycle shared by both sides
//! - the remote tag counter applied to every remote note mutation

pub mod counter;
pub mod error;
pub mod lifecycle;
pub mod local_db;
pub mod meta;
pub mod notes;
pub mod pending;
pub mod remote_db;
mod sqlite_runtime;
pub mod tags;

// Re-export commonly used types
pub use counter::RemoteTagCounter;
pub use error::{DbError, DbResult};
pub use lifecycle::{ReconcileSummary, TagLifecycle};
pub use local_db::LocalDbPool;
pub use meta::SyncMetaRepository;
pub use notes::NoteRepository;
pub use pending::{PendingNote, PendingRepository, SyncState};
pub use remote_db::RemoteDbPool;
pub use tags::TagRepository;

// Re-export test helpers when running tests or when test-helpers feature is enabled
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
