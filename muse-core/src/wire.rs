//! JSON envelopes of the remote note endpoint.

use serde::{Deserialize, Serialize};

use crate::models::Note;

/// Body of `POST /notes`.
///
/// Serialized as `{"action": "saveNote", "note": {...}}` or
/// `{"action": "syncNotes", "note": {"lastSync": 0}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum NoteAction {
    SaveNote { note: Note },
    SyncNotes { note: SyncCursor },
}

/// Incremental pull cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    #[serde(default)]
    pub last_sync: i64,
}

/// Response of a `syncNotes` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub notes: Vec<Note>,
    pub sync_timestamp: i64,
}

/// Body of `DELETE /notes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
