//! Tag reference counting.
//!
//! A tag lives exactly as long as at least one note references it: it is
//! created the first time a note uses its name and deleted when its count
//! reaches zero. The same rules run against the local cache and the remote
//! table, so both sides keep `note_count` equal to the number of referencing
//! notes.

use std::collections::{BTreeMap, BTreeSet};

use muse_core::{Note, Tag};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::{
    error::{DbError, DbResult},
    notes::NoteRepository,
    tags::TagRepository,
};

/// Counts applied by one [`TagLifecycle::reconcile`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub incremented: usize,
    pub decremented: usize,
    /// Tag updates that failed and were skipped
    pub failures: usize,
}

impl ReconcileSummary {
    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }
}

/// Tag lifecycle operations over one note/tag table pair
#[derive(Debug, Clone, Copy)]
pub struct TagLifecycle<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TagLifecycle<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Exact, case-sensitive lookup by name
    pub async fn lookup(&self, name: &str) -> DbResult<Option<Tag>> {
        TagRepository::find_by_name(self.pool, name).await
    }

    /// Create a tag with a zero count unless the name is taken, then return
    /// whichever tag owns the name.
    pub async fn create_if_absent(&self, name: &str) -> DbResult<Tag> {
        let id = Tag::generate_id();
        if TagRepository::insert_if_absent(self.pool, &id, name, 0).await? {
            info!("Created tag '{}' ({})", name, id);
        }

        self.lookup(name)
            .await?
            .ok_or_else(|| DbError::TagNotFound(name.to_string()))
    }

    pub async fn get_or_create_tag(&self, name: &str) -> DbResult<Tag> {
        match self.lookup(name).await? {
            Some(tag) => Ok(tag),
            None => self.create_if_absent(name).await,
        }
    }

    /// Map tag names to ids, creating missing tags. Returns the ids in input
    /// order together with their names.
    pub async fn resolve_names(
        &self,
        names: &[String],
    ) -> DbResult<(Vec<String>, BTreeMap<String, String>)> {
        let mut ids = Vec::with_capacity(names.len());
        let mut hints = BTreeMap::new();

        for name in names {
            let tag = self.get_or_create_tag(name).await?;
            if !ids.contains(&tag.id) {
                ids.push(tag.id.clone());
            }
            hints.insert(tag.id, tag.name);
        }

        Ok((ids, hints))
    }

    /// Count one more note for `tag_id`.
    ///
    /// An unknown id is created with a count of 1, named by `name_hint` (or
    /// its id). When another tag already owns that name, that tag takes the
    /// incoming id first, in the tag table and in every note.
    pub async fn increment(&self, tag_id: &str, name_hint: Option<&str>) -> DbResult<Tag> {
        if let Some(mut tag) = TagRepository::get(self.pool, tag_id).await? {
            tag.note_count += 1;
            TagRepository::set_count(self.pool, tag_id, tag.note_count).await?;
            debug!("Tag '{}' count is now {}", tag.name, tag.note_count);
            return Ok(tag);
        }

        let name = name_hint
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(tag_id);

        if let Some(existing) = self.lookup(name).await? {
            info!("Adopting id {} for tag '{}' (was {})", tag_id, name, existing.id);
            TagRepository::rekey(self.pool, &existing.id, tag_id).await?;
            NoteRepository::replace_tag_id(self.pool, &existing.id, tag_id).await?;

            let note_count = existing.note_count + 1;
            TagRepository::set_count(self.pool, tag_id, note_count).await?;
            return Ok(Tag {
                id: tag_id.to_string(),
                name: existing.name,
                note_count,
            });
        }

        let tag = Tag {
            id: tag_id.to_string(),
            name: name.to_string(),
            note_count: 1,
        };
        TagRepository::put(self.pool, &tag).await?;
        info!("Created tag '{}' ({}) on first reference", tag.name, tag.id);
        Ok(tag)
    }

    /// Count one note less for `tag_id`, deleting the tag when nothing
    /// references it anymore. Returns the remaining tag, if any.
    pub async fn decrement(&self, tag_id: &str) -> DbResult<Option<Tag>> {
        let Some(mut tag) = TagRepository::get(self.pool, tag_id).await? else {
            debug!("Decrement of unknown tag {} ignored", tag_id);
            return Ok(None);
        };

        tag.note_count -= 1;
        if tag.note_count <= 0 {
            TagRepository::remove(self.pool, tag_id).await?;
            info!("Deleted tag '{}' ({}): no notes left", tag.name, tag.id);
            return Ok(None);
        }

        TagRepository::set_count(self.pool, tag_id, tag.note_count).await?;
        debug!("Tag '{}' count is now {}", tag.name, tag.note_count);
        Ok(Some(tag))
    }

    /// Apply the membership change of one note from `old` to `new` tag ids.
    ///
    /// Only ids whose membership changed are touched, decrements first.
    /// Individual failures are logged and counted, never returned.
    pub async fn reconcile(
        &self,
        old: &[String],
        new: &[String],
        hints: &BTreeMap<String, String>,
    ) -> ReconcileSummary {
        let old: BTreeSet<&str> = old.iter().map(String::as_str).collect();
        let new_set: BTreeSet<&str> = new.iter().map(String::as_str).collect();
        let mut summary = ReconcileSummary::default();

        for tag_id in old.difference(&new_set) {
            match self.decrement(tag_id).await {
                Ok(_) => summary.decremented += 1,
                Err(e) => {
                    warn!("Failed to decrement tag {}: {}", tag_id, e);
                    summary.failures += 1;
                }
            }
        }

        let mut seen = BTreeSet::new();
        for tag_id in new.iter().map(String::as_str) {
            if old.contains(tag_id) || !seen.insert(tag_id) {
                continue;
            }
            let hint = hints.get(tag_id).map(String::as_str);
            match self.increment(tag_id, hint).await {
                Ok(_) => summary.incremented += 1,
                Err(e) => {
                    warn!("Failed to increment tag {}: {}", tag_id, e);
                    summary.failures += 1;
                }
            }
        }

        summary
    }

    /// Replace tag ids this table does not know by the id it already uses for
    /// the hinted name. Returns the number of ids replaced.
    pub async fn canonicalize(&self, note: &mut Note) -> DbResult<usize> {
        let mut replaced = 0;
        let mut tag_ids = Vec::with_capacity(note.tag_ids.len());
        let mut tag_names = BTreeMap::new();

        for id in std::mem::take(&mut note.tag_ids) {
            let hint = note.tag_names.get(&id).cloned();
            let mut resolved = id.clone();

            if TagRepository::get(self.pool, &id).await?.is_none()
                && let Some(name) = hint.as_deref()
                && let Some(existing) = self.lookup(name).await?
            {
                debug!("Tag id {} canonicalized to {} by name '{}'", id, existing.id, name);
                resolved = existing.id;
                replaced += 1;
            }

            if !tag_ids.contains(&resolved) {
                if let Some(name) = hint {
                    tag_names.insert(resolved.clone(), name);
                }
                tag_ids.push(resolved);
            }
        }

        note.tag_ids = tag_ids;
        note.tag_names = tag_names;
        Ok(replaced)
    }

    /// Names of the known tags among `tag_ids`
    pub async fn describe(&self, tag_ids: &[String]) -> DbResult<BTreeMap<String, String>> {
        let mut names = BTreeMap::new();
        for id in tag_ids {
            if let Some(tag) = TagRepository::get(self.pool, id).await? {
                names.insert(tag.id, tag.name);
            }
        }
        Ok(names)
    }

    /// Rebuild every count from the notes. Orphaned tags are deleted and
    /// referenced but missing tags created. Returns the number of tags changed.
    pub async fn recount(&self) -> DbResult<usize> {
        NoteRepository::normalize_legacy(self.pool).await?;

        let mut expected: BTreeMap<String, i64> = BTreeMap::new();
        let mut hints: BTreeMap<String, String> = BTreeMap::new();
        for note in NoteRepository::list(self.pool).await? {
            for id in note.tag_set() {
                *expected.entry(id.to_string()).or_default() += 1;
                if let Some(name) = note.name_hint(id) {
                    hints
                        .entry(id.to_string())
                        .or_insert_with(|| name.to_string());
                }
            }
        }

        let mut changed = 0;
        for tag in TagRepository::list(self.pool).await? {
            match expected.remove(&tag.id) {
                Some(count) if count == tag.note_count => {}
                Some(count) => {
                    warn!(
                        "Tag '{}' count drifted: stored {}, actual {}",
                        tag.name, tag.note_count, count
                    );
                    TagRepository::set_count(self.pool, &tag.id, count).await?;
                    changed += 1;
                }
                None => {
                    warn!("Tag '{}' has no notes left, deleting", tag.name);
                    TagRepository::remove(self.pool, &tag.id).await?;
                    changed += 1;
                }
            }
        }

        for (id, count) in expected {
            let name = hints.get(&id).cloned().unwrap_or_else(|| id.clone());
            if !TagRepository::insert_if_absent(self.pool, &id, &name, count).await? {
                TagRepository::put(
                    self.pool,
                    &Tag {
                        id: id.clone(),
                        name: id.clone(),
                        note_count: count,
                    },
                )
                .await?;
            }
            warn!("Tag {} was referenced but missing, recreated", id);
            changed += 1;
        }

        if changed > 0 {
            info!("Recount repaired {} tags", changed);
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::create_test_local_pool;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn note(id: &str, tag_ids: Vec<String>) -> Note {
        Note {
            id: id.to_string(),
            title: String::new(),
            content: "body".to_string(),
            tag_ids,
            tag_names: BTreeMap::new(),
            created_at: 1,
            updated_at: 1,
        }
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let db = create_test_local_pool().await.unwrap();
        let tags = TagLifecycle::new(db.pool());

        assert!(tags.lookup("work").await.unwrap().is_none());
        let first = tags.get_or_create_tag("work").await.unwrap();
        let second = tags.get_or_create_tag("work").await.unwrap();
        let third = tags.create_if_absent("work").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.id, third.id);
        assert_eq!(first.note_count, 0);
        assert_eq!(TagRepository::list(db.pool()).await.unwrap().len(), 1);

        let other = tags.get_or_create_tag("Work").await.unwrap();
        assert_ne!(other.id, first.id);
    }

    #[tokio::test]
    async fn test_resolve_names_dedupes_ids() {
        let db = create_test_local_pool().await.unwrap();
        let tags = TagLifecycle::new(db.pool());

        let (tag_ids, names) = tags
            .resolve_names(&ids(&["work", "urgent", "work"]))
            .await
            .unwrap();
        assert_eq!(tag_ids.len(), 2);
        assert_eq!(names.get(&tag_ids[0]).map(String::as_str), Some("work"));
        assert_eq!(names.get(&tag_ids[1]).map(String::as_str), Some("urgent"));
    }

    #[tokio::test]
    async fn test_increment_unknown_id_creates_with_count_one() {
        let db = create_test_local_pool().await.unwrap();
        let tags = TagLifecycle::new(db.pool());

        let tag = tags.increment("tag_x", Some("ideas")).await.unwrap();
        assert_eq!(tag.note_count, 1);
        assert_eq!(tag.name, "ideas");

        let tag = tags.increment("tag_y", None).await.unwrap();
        assert_eq!(tag.name, "tag_y");
    }

    #[tokio::test]
    async fn test_decrement_to_zero_deletes_and_absent_is_noop() {
        let db = create_test_local_pool().await.unwrap();
        let tags = TagLifecycle::new(db.pool());

        tags.increment("t1", Some("work")).await.unwrap();
        tags.increment("t1", None).await.unwrap();

        let remaining = tags.decrement("t1").await.unwrap().unwrap();
        assert_eq!(remaining.note_count, 1);
        assert!(tags.decrement("t1").await.unwrap().is_none());
        assert!(TagRepository::get(db.pool(), "t1").await.unwrap().is_none());

        assert!(tags.decrement("t1").await.unwrap().is_none());
        assert!(tags.decrement("never").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reconcile_touches_only_changed_ids() {
        let db = create_test_local_pool().await.unwrap();
        let tags = TagLifecycle::new(db.pool());

        tags.increment("keep", Some("keep")).await.unwrap();
        tags.increment("drop", Some("drop")).await.unwrap();

        let hints = BTreeMap::from([("add".to_string(), "add".to_string())]);
        let summary = tags
            .reconcile(&ids(&["keep", "drop"]), &ids(&["keep", "add", "add"]), &hints)
            .await;

        assert_eq!(
            summary,
            ReconcileSummary {
                incremented: 1,
                decremented: 1,
                failures: 0
            }
        );
        let pool = db.pool();
        assert_eq!(TagRepository::get(pool, "keep").await.unwrap().unwrap().note_count, 1);
        assert!(TagRepository::get(pool, "drop").await.unwrap().is_none());
        assert_eq!(TagRepository::get(pool, "add").await.unwrap().unwrap().note_count, 1);
    }

    #[tokio::test]
    async fn test_increment_adopts_incoming_id_for_known_name() {
        let db = create_test_local_pool().await.unwrap();
        let pool = db.pool();
        let tags = TagLifecycle::new(pool);

        let local = tags.get_or_create_tag("work").await.unwrap();
        tags.increment(&local.id, None).await.unwrap();
        NoteRepository::put(pool, &note("n1", vec![local.id.clone()]))
            .await
            .unwrap();

        let adopted = tags.increment("tag_remote", Some("work")).await.unwrap();
        assert_eq!(adopted.id, "tag_remote");
        assert_eq!(adopted.note_count, 2);

        assert!(TagRepository::get(pool, &local.id).await.unwrap().is_none());
        let rewritten = NoteRepository::get(pool, "n1").await.unwrap().unwrap();
        assert_eq!(rewritten.tag_ids, ids(&["tag_remote"]));
    }

    #[tokio::test]
    async fn test_canonicalize_maps_unknown_ids_by_name() {
        let db = create_test_local_pool().await.unwrap();
        let tags = TagLifecycle::new(db.pool());
        let work = tags.get_or_create_tag("work").await.unwrap();

        let mut incoming = note("n1", ids(&["tag_client", "tag_new", work.id.as_str()]));
        incoming.tag_names = BTreeMap::from([
            ("tag_client".to_string(), "work".to_string()),
            ("tag_new".to_string(), "fresh".to_string()),
        ]);

        let replaced = tags.canonicalize(&mut incoming).await.unwrap();
        assert_eq!(replaced, 1);
        assert_eq!(incoming.tag_ids, vec![work.id.clone(), "tag_new".to_string()]);
        assert_eq!(incoming.name_hint(&work.id), Some("work"));
        assert_eq!(incoming.name_hint("tag_new"), Some("fresh"));
    }

    #[tokio::test]
    async fn test_recount_repairs_drift() {
        let db = create_test_local_pool().await.unwrap();
        let pool = db.pool();
        let tags = TagLifecycle::new(pool);

        let mut first = note("n1", ids(&["t_work", "t_missing"]));
        first.tag_names.insert("t_missing".to_string(), "lost".to_string());
        NoteRepository::put(pool, &first).await.unwrap();
        NoteRepository::put(pool, &note("n2", ids(&["t_work"]))).await.unwrap();

        TagRepository::insert_if_absent(pool, "t_work", "work", 5).await.unwrap();
        TagRepository::insert_if_absent(pool, "t_orphan", "orphan", 1).await.unwrap();

        assert_eq!(tags.recount().await.unwrap(), 3);

        let all = TagRepository::list(pool).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(TagRepository::get(pool, "t_work").await.unwrap().unwrap().note_count, 2);
        let lost = TagRepository::get(pool, "t_missing").await.unwrap().unwrap();
        assert_eq!((lost.name.as_str(), lost.note_count), ("lost", 1));

        assert_eq!(tags.recount().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_describe_skips_unknown_ids() {
        let db = create_test_local_pool().await.unwrap();
        let tags = TagLifecycle::new(db.pool());
        let work = tags.get_or_create_tag("work").await.unwrap();

        let names = tags
            .describe(&[work.id.clone(), "ghost".to_string()])
            .await
            .unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names.get(&work.id).map(String::as_str), Some("work"));
    }
}
