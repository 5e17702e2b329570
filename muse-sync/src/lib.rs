//! muse-sync: keeps the local note cache in step with the remote store.
//!
//! - [`RemoteStore`]: the four operations the engine needs from the remote
//! - [`HttpRemoteStore`]: that interface over the JSON note endpoint
//! - [`SyncEngine`]: local-first saves and deletes, push/pull sync passes

pub mod engine;
pub mod error;
pub mod http;
pub mod remote;

pub use engine::{Confirmation, DeleteOutcome, SyncEngine, SyncReport, WriteOutcome};
pub use error::{SyncError, SyncResult};
pub use http::HttpRemoteStore;
pub use remote::{RemoteError, RemoteStore, ScanFilter, ScanPage};
