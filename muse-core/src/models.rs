//! Note and tag entities shared by the local cache, the sync engine and the
//! remote endpoint.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest accepted tag name, in characters.
pub const TAG_NAME_MAX_LEN: usize = 64;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A note as persisted locally and remotely.
///
/// Deserialization always goes through [`RawNote`], so legacy payloads that
/// carry a scalar `tag` instead of `tagIds` are normalized on ingest. The
/// scalar field is never written back out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawNote")]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub tag_ids: Vec<String>,
    /// Display names for `tag_ids`, keyed by tag id. Only a hint for
    /// creating tags the receiver has not seen yet.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tag_names: BTreeMap<String, String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Note {
    /// Time-based note id. Unique enough for a single client.
    pub fn generate_id(now_ms: i64) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("note_{}_{}", now_ms, &suffix[..8])
    }

    /// Tag ids as a set; duplicates never count twice.
    pub fn tag_set(&self) -> BTreeSet<&str> {
        self.tag_ids.iter().map(String::as_str).collect()
    }

    pub fn has_tag(&self, tag_id: &str) -> bool {
        self.tag_ids.iter().any(|id| id == tag_id)
    }

    /// Name hint for one of this note's tag ids.
    pub fn name_hint(&self, tag_id: &str) -> Option<&str> {
        self.tag_names.get(tag_id).map(String::as_str)
    }

    /// Reject notes without a body.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_content(&self.content)
    }
}

/// Permissive ingest shape for notes coming from storage or the network.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNote {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tag_ids: Option<Vec<String>>,
    /// Legacy single-tag field, replaced by `tag_ids`.
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub tag_names: BTreeMap<String, String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl From<RawNote> for Note {
    fn from(raw: RawNote) -> Self {
        normalize_note(raw)
    }
}

/// Fold the legacy `tag` field into `tag_ids` and drop it.
///
/// - `tag_ids` present: kept as-is (minus duplicates and blanks), `tag` ignored
/// - only `tag` present: `tag_ids = [tag]`, or `[]` when blank
/// - neither: `tag_ids = []`
///
/// Name hints for ids the note does not reference are dropped.
pub fn normalize_note(raw: RawNote) -> Note {
    let RawNote {
        id,
        title,
        content,
        tag_ids,
        tag,
        tag_names,
        created_at,
        updated_at,
    } = raw;

    let candidates = match (tag_ids, tag) {
        (Some(ids), _) => ids,
        (None, Some(tag)) => vec![tag],
        (None, None) => Vec::new(),
    };

    let mut seen = BTreeSet::new();
    let tag_ids: Vec<String> = candidates
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect();

    let tag_names = tag_names
        .into_iter()
        .filter(|(id, name)| !name.trim().is_empty() && tag_ids.contains(id))
        .collect();

    Note {
        id,
        title,
        content,
        tag_ids,
        tag_names,
        created_at,
        updated_at,
    }
}

/// A tag with its reference count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub note_count: i64,
}

impl Tag {
    pub fn generate_id() -> String {
        format!("tag_{}", Uuid::new_v4())
    }
}

/// Split a comma-separated tag string into names.
///
/// Entries are trimmed, empty ones dropped, and repeated names (exact,
/// case-sensitive match) collapsed to their first occurrence.
pub fn parse_tag_names(input: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    input
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_string()))
        .map(str::to_string)
        .collect()
}

/// Caller-facing input of a save: what the editor hands over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteDraft {
    /// Existing note id when editing; `None` creates a new note.
    pub id: Option<String>,
    pub title: String,
    pub content: String,
    /// Raw comma-separated tag names.
    pub tags: String,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = tags.into();
        self
    }

    pub fn tag_names(&self) -> Vec<String> {
        parse_tag_names(&self.tags)
    }

    /// Validate the draft and return its parsed tag names.
    pub fn validate(&self) -> Result<Vec<String>, ValidationError> {
        validate_content(&self.content)?;

        let names = self.tag_names();
        if let Some(name) = names
            .iter()
            .find(|name| name.chars().count() > TAG_NAME_MAX_LEN)
        {
            return Err(ValidationError::TagNameTooLong {
                name: name.clone(),
                max: TAG_NAME_MAX_LEN,
            });
        }

        Ok(names)
    }
}

fn validate_content(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::MissingContent);
    }
    Ok(())
}

/// Input rejected before any store mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("note content is required")]
    MissingContent,

    #[error("tag name '{name}' is longer than {max} characters")]
    TagNameTooLong { name: String, max: usize },
}
