//! Note table operations, shared by the local cache and the remote table.

use std::collections::BTreeMap;

use muse_core::{Note, RawNote, normalize_note};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

const NOTE_COLUMNS: &str =
    "id, title, content, tag_ids, legacy_tag, tag_names, created_at, updated_at";

/// Note repository for database operations
pub struct NoteRepository;

impl NoteRepository {
    /// All notes, most recently updated first
    pub async fn list(pool: &SqlitePool) -> DbResult<Vec<Note>> {
        let rows = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes ORDER BY updated_at DESC, id"
        ))
        .fetch_all(pool)
        .await?;

        Self::load_rows(pool, rows).await
    }

    /// Get a note by id
    pub async fn get(pool: &SqlitePool, id: &str) -> DbResult<Option<Note>> {
        let row = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::load_row(pool, row).await?)),
            None => Ok(None),
        }
    }

    /// Insert or replace a note by id
    pub async fn put(pool: &SqlitePool, note: &Note) -> DbResult<()> {
        let tag_ids = serde_json::to_string(&note.tag_ids)?;
        let tag_names = serde_json::to_string(&note.tag_names)?;

        sqlx::query(
            "INSERT INTO notes (id, title, content, tag_ids, legacy_tag, tag_names, created_at, updated_at)
             VALUES (?, ?, ?, ?, NULL, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                tag_ids = excluded.tag_ids,
                legacy_tag = NULL,
                tag_names = excluded.tag_names,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
        )
        .bind(&note.id)
        .bind(&note.title)
        .bind(&note.content)
        .bind(tag_ids)
        .bind(tag_names)
        .bind(note.created_at)
        .bind(note.updated_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Remove a note. Returns false when it did not exist.
    pub async fn remove(pool: &SqlitePool, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM notes WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Notes with `updated_at` strictly greater than `after`, oldest first
    pub async fn list_modified_after(pool: &SqlitePool, after: i64) -> DbResult<Vec<Note>> {
        let rows = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE updated_at > ? ORDER BY updated_at, id"
        ))
        .bind(after)
        .fetch_all(pool)
        .await?;

        Self::load_rows(pool, rows).await
    }

    /// Notes whose tag ids contain `tag_id`
    pub async fn list_by_tag(pool: &SqlitePool, tag_id: &str) -> DbResult<Vec<Note>> {
        Self::normalize_legacy(pool).await?;

        let rows = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes
             WHERE EXISTS (SELECT 1 FROM json_each(notes.tag_ids) WHERE json_each.value = ?)
             ORDER BY updated_at DESC, id"
        ))
        .bind(tag_id)
        .fetch_all(pool)
        .await?;

        Self::load_rows(pool, rows).await
    }

    /// Rewrite every reference to `old_id` as `new_id`. Returns the number of
    /// notes changed.
    pub async fn replace_tag_id(pool: &SqlitePool, old_id: &str, new_id: &str) -> DbResult<u64> {
        let mut changed = 0;

        for mut note in Self::list_by_tag(pool, old_id).await? {
            let mut tag_ids = Vec::with_capacity(note.tag_ids.len());
            for id in note.tag_ids.drain(..) {
                let id = if id == old_id { new_id.to_string() } else { id };
                if !tag_ids.contains(&id) {
                    tag_ids.push(id);
                }
            }
            note.tag_ids = tag_ids;

            if let Some(name) = note.tag_names.remove(old_id) {
                note.tag_names.entry(new_id.to_string()).or_insert(name);
            }

            Self::put(pool, &note).await?;
            changed += 1;
        }

        debug!("Rewrote tag {} as {} in {} notes", old_id, new_id, changed);
        Ok(changed)
    }

    /// Normalize every row still carrying a legacy scalar tag. Returns the
    /// number of rows rewritten.
    pub async fn normalize_legacy(pool: &SqlitePool) -> DbResult<usize> {
        let rows = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE tag_ids IS NULL"
        ))
        .fetch_all(pool)
        .await?;

        let count = rows.len();
        Self::load_rows(pool, rows).await?;
        Ok(count)
    }

    async fn load_rows(pool: &SqlitePool, rows: Vec<NoteRow>) -> DbResult<Vec<Note>> {
        let mut notes = Vec::with_capacity(rows.len());
        for row in rows {
            notes.push(Self::load_row(pool, row).await?);
        }
        Ok(notes)
    }

    /// Decode a row; legacy rows are normalized and written back so the
    /// conversion happens once.
    async fn load_row(pool: &SqlitePool, row: NoteRow) -> DbResult<Note> {
        let legacy = row.tag_ids.is_none();
        let note = row.into_note()?;

        if legacy {
            debug!("Normalizing legacy tag field of note {}", note.id);
            Self::put(pool, &note).await?;
        }

        Ok(note)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NoteRow {
    id: String,
    title: String,
    content: String,
    tag_ids: Option<String>,
    legacy_tag: Option<String>,
    tag_names: String,
    created_at: i64,
    updated_at: i64,
}

impl NoteRow {
    fn into_note(self) -> DbResult<Note> {
        let tag_ids = match self.tag_ids.as_deref() {
            Some(json) => Some(serde_json::from_str::<Vec<String>>(json)?),
            None => None,
        };
        let tag_names: BTreeMap<String, String> = if self.tag_names.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&self.tag_names)?
        };

        Ok(normalize_note(RawNote {
            id: self.id,
            title: self.title,
            content: self.content,
            tag_ids,
            tag: self.legacy_tag,
            tag_names,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::create_test_local_pool;

    fn note(id: &str, tags: &[&str], updated_at: i64) -> Note {
        Note {
            id: id.to_string(),
            title: format!("title {id}"),
            content: "body".to_string(),
            tag_ids: tags.iter().map(|t| t.to_string()).collect(),
            tag_names: BTreeMap::new(),
            created_at: 1,
            updated_at,
        }
    }

    #[tokio::test]
    async fn test_put_get_replace_remove() {
        let db = create_test_local_pool().await.unwrap();
        let pool = db.pool();

        NoteRepository::put(pool, &note("n1", &["a"], 10)).await.unwrap();
        let mut edited = note("n1", &["b"], 20);
        edited.title = "edited".to_string();
        NoteRepository::put(pool, &edited).await.unwrap();

        let stored = NoteRepository::get(pool, "n1").await.unwrap().unwrap();
        assert_eq!(stored, edited);
        assert_eq!(NoteRepository::list(pool).await.unwrap().len(), 1);

        assert!(NoteRepository::remove(pool, "n1").await.unwrap());
        assert!(!NoteRepository::remove(pool, "n1").await.unwrap());
        assert!(NoteRepository::get(pool, "n1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_modified_after_is_exclusive() {
        let db = create_test_local_pool().await.unwrap();
        let pool = db.pool();

        for (id, ts) in [("n1", 10), ("n2", 20), ("n3", 30)] {
            NoteRepository::put(pool, &note(id, &[], ts)).await.unwrap();
        }

        let ids: Vec<String> = NoteRepository::list_modified_after(pool, 20)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec!["n3"]);
        assert_eq!(NoteRepository::list_modified_after(pool, 0).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_legacy_row_normalized_once() {
        let db = create_test_local_pool().await.unwrap();
        let pool = db.pool();

        sqlx::query(
            "INSERT INTO notes (id, title, content, tag_ids, legacy_tag, created_at, updated_at)
             VALUES ('old', 't', 'c', NULL, 'x', 1, 2)",
        )
        .execute(pool)
        .await
        .unwrap();

        let note = NoteRepository::get(pool, "old").await.unwrap().unwrap();
        assert_eq!(note.tag_ids, vec!["x".to_string()]);

        let (tag_ids, legacy): (Option<String>, Option<String>) =
            sqlx::query_as("SELECT tag_ids, legacy_tag FROM notes WHERE id = 'old'")
                .fetch_one(pool)
                .await
                .unwrap();
        assert_eq!(tag_ids.as_deref(), Some(r#"["x"]"#));
        assert!(legacy.is_none());

        assert_eq!(NoteRepository::normalize_legacy(pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_by_tag_and_replace_tag_id() {
        let db = create_test_local_pool().await.unwrap();
        let pool = db.pool();

        let mut tagged = note("n1", &["old", "keep"], 1);
        tagged.tag_names.insert("old".to_string(), "work".to_string());
        NoteRepository::put(pool, &tagged).await.unwrap();
        NoteRepository::put(pool, &note("n2", &["keep"], 2)).await.unwrap();

        assert_eq!(NoteRepository::list_by_tag(pool, "old").await.unwrap().len(), 1);
        assert_eq!(NoteRepository::list_by_tag(pool, "keep").await.unwrap().len(), 2);

        let changed = NoteRepository::replace_tag_id(pool, "old", "new").await.unwrap();
        assert_eq!(changed, 1);

        let rewritten = NoteRepository::get(pool, "n1").await.unwrap().unwrap();
        assert_eq!(rewritten.tag_ids, vec!["new".to_string(), "keep".to_string()]);
        assert_eq!(rewritten.name_hint("new"), Some("work"));
        assert!(NoteRepository::list_by_tag(pool, "old").await.unwrap().is_empty());
    }
}
