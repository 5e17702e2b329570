//! Authoritative tag counting for mutations that reach the remote table.
//!
//! Whatever tag counts the writing client kept locally, the remote table
//! re-derives its own counts from the notes it actually stores.

use muse_core::{Note, now_millis};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::{error::DbResult, lifecycle::TagLifecycle, notes::NoteRepository};

/// Applies note writes and deletes to the remote table and its tags
pub struct RemoteTagCounter;

impl RemoteTagCounter {
    /// Upsert a note and reconcile the remote tag counts against the stored
    /// copy. Returns the persisted shape, with `tag_names` filled in.
    pub async fn apply_save(pool: &SqlitePool, mut note: Note) -> DbResult<Note> {
        let tags = TagLifecycle::new(pool);
        tags.canonicalize(&mut note).await?;

        let now = now_millis();
        let existing = if note.id.is_empty() {
            note.id = Note::generate_id(now);
            None
        } else {
            NoteRepository::get(pool, &note.id).await?
        };

        let old_tag_ids = match &existing {
            Some(stored) => {
                note.created_at = stored.created_at;
                note.updated_at = now.max(stored.updated_at + 1);
                stored.tag_ids.clone()
            }
            None => {
                if note.created_at <= 0 {
                    note.created_at = now;
                }
                note.updated_at = now;
                Vec::new()
            }
        };

        let summary = tags
            .reconcile(&old_tag_ids, &note.tag_ids, &note.tag_names)
            .await;
        if !summary.is_clean() {
            warn!(
                "Tag counts for note {} may have drifted ({} failed updates)",
                note.id, summary.failures
            );
        }

        note.tag_names = tags.describe(&note.tag_ids).await?;
        NoteRepository::put(pool, &note).await?;

        debug!(
            "Stored note {} at {} (+{} -{} tags)",
            note.id, note.updated_at, summary.incremented, summary.decremented
        );
        Ok(note)
    }

    /// Remove a note and release its tags. Returns false when the note did
    /// not exist.
    pub async fn apply_delete(pool: &SqlitePool, id: &str) -> DbResult<bool> {
        let Some(stored) = NoteRepository::get(pool, id).await? else {
            debug!("Delete of unknown note {} ignored", id);
            return Ok(false);
        };

        let summary = TagLifecycle::new(pool)
            .reconcile(&stored.tag_ids, &[], &Default::default())
            .await;
        if !summary.is_clean() {
            warn!(
                "Tag counts for deleted note {} may have drifted ({} failed updates)",
                id, summary.failures
            );
        }

        NoteRepository::remove(pool, id).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{tags::TagRepository, test_helpers::create_test_remote_pool};

    fn incoming(id: &str, tags: &[(&str, &str)]) -> Note {
        Note {
            id: id.to_string(),
            title: "t".to_string(),
            content: "body".to_string(),
            tag_ids: tags.iter().map(|(id, _)| id.to_string()).collect(),
            tag_names: tags
                .iter()
                .map(|(id, name)| (id.to_string(), name.to_string()))
                .collect::<BTreeMap<_, _>>(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn test_save_assigns_id_and_stamps_times() {
        let db = create_test_remote_pool().await.unwrap();
        let pool = db.pool();

        let saved = RemoteTagCounter::apply_save(pool, incoming("", &[("t1", "work")]))
            .await
            .unwrap();
        assert!(saved.id.starts_with("note_"));
        assert!(saved.created_at > 0);
        assert_eq!(saved.created_at, saved.updated_at);
        assert_eq!(saved.name_hint("t1"), Some("work"));

        let mut edit = saved.clone();
        edit.created_at = 1;
        edit.updated_at = 1;
        let resaved = RemoteTagCounter::apply_save(pool, edit).await.unwrap();
        assert_eq!(resaved.created_at, saved.created_at);
        assert!(resaved.updated_at > saved.updated_at);

        let tag = TagRepository::get(pool, "t1").await.unwrap().unwrap();
        assert_eq!(tag.note_count, 1);
    }

    #[tokio::test]
    async fn test_two_clients_share_one_tag_by_name() {
        let db = create_test_remote_pool().await.unwrap();
        let pool = db.pool();

        RemoteTagCounter::apply_save(pool, incoming("n1", &[("tag_a", "work")]))
            .await
            .unwrap();
        let second = RemoteTagCounter::apply_save(pool, incoming("n2", &[("tag_b", "work")]))
            .await
            .unwrap();

        assert_eq!(second.tag_ids, vec!["tag_a".to_string()]);
        let tags = TagRepository::list(pool).await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].note_count, 2);
    }

    #[tokio::test]
    async fn test_delete_releases_tags() {
        let db = create_test_remote_pool().await.unwrap();
        let pool = db.pool();

        RemoteTagCounter::apply_save(pool, incoming("n1", &[("t1", "work"), ("t2", "urgent")]))
            .await
            .unwrap();
        RemoteTagCounter::apply_save(pool, incoming("n2", &[("t1", "work")]))
            .await
            .unwrap();

        assert!(RemoteTagCounter::apply_delete(pool, "n1").await.unwrap());
        assert!(!RemoteTagCounter::apply_delete(pool, "n1").await.unwrap());

        assert_eq!(TagRepository::get(pool, "t1").await.unwrap().unwrap().note_count, 1);
        assert!(TagRepository::get(pool, "t2").await.unwrap().is_none());
    }
}
