//! Local-first note engine.
//!
//! Every write lands in the local cache first and is then offered to the
//! remote store. Remote failures never undo a local write: the note stays
//! pending and is pushed again by the next [`SyncEngine::sync_notes`] pass,
//! which then pulls everything modified after the local watermark.

use std::{sync::Arc, time::Duration};

use muse_core::{Note, NoteDraft, Tag, now_millis};
use muse_db::{
    LocalDbPool, NoteRepository, PendingNote, PendingRepository, SyncMetaRepository, SyncState,
    TagLifecycle, TagRepository,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::SyncResult,
    remote::{RemoteError, RemoteStore, ScanFilter},
};

/// Answer to "really delete this note?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Affirmed,
    Declined,
}

impl Confirmation {
    /// `y` or `yes` (any case) affirms; anything else declines.
    pub fn from_answer(answer: &str) -> Self {
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Confirmation::Affirmed,
            _ => Confirmation::Declined,
        }
    }
}

/// Result of a save
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// The remote shape when confirmed, the local one otherwise
    pub note: Note,
    pub state: SyncState,
    pub committed_locally: bool,
    pub committed_remotely: bool,
    pub remote_error: Option<String>,
}

/// Result of a delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub note_id: String,
    /// Whether the note was in the local cache
    pub existed: bool,
    pub committed_locally: bool,
    pub committed_remotely: bool,
}

/// Result of a sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Pending notes confirmed by the remote
    pub pushed: usize,
    /// Remote notes merged into the cache
    pub pulled: usize,
    /// Watermark after the pass
    pub watermark: i64,
    pub completed: bool,
    /// Another pass was already running
    pub skipped: bool,
    pub error: Option<String>,
}

pub struct SyncEngine {
    local: LocalDbPool,
    remote: Arc<dyn RemoteStore>,
    sync_guard: Mutex<()>,
}

impl SyncEngine {
    pub fn new(local: LocalDbPool, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            local,
            remote,
            sync_guard: Mutex::new(()),
        }
    }

    pub fn local(&self) -> &LocalDbPool {
        &self.local
    }

    /// Create or edit a note.
    ///
    /// Only validation and local storage errors are returned. A failed remote
    /// write leaves the note in `RemoteFailed` for the next sync pass.
    pub async fn save_note(&self, draft: NoteDraft) -> SyncResult<WriteOutcome> {
        let names = draft.validate()?;
        let pool = self.local.pool();
        let tags = TagLifecycle::new(pool);

        let (tag_ids, tag_names) = tags.resolve_names(&names).await?;

        let existing = match draft.id.as_deref().filter(|id| !id.trim().is_empty()) {
            Some(id) => NoteRepository::get(pool, id).await?,
            None => None,
        };
        let old_tag_ids = existing
            .as_ref()
            .map(|note| note.tag_ids.clone())
            .unwrap_or_default();

        let summary = tags.reconcile(&old_tag_ids, &tag_ids, &tag_names).await;
        debug!(
            "Save reconciled tags: +{} -{} ({} failed)",
            summary.incremented, summary.decremented, summary.failures
        );

        let now = now_millis();
        let note = match existing {
            Some(stored) => Note {
                id: stored.id,
                title: draft.title,
                content: draft.content,
                tag_ids,
                tag_names,
                created_at: stored.created_at,
                updated_at: now.max(stored.updated_at),
            },
            None => Note {
                id: draft
                    .id
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or_else(|| Note::generate_id(now)),
                title: draft.title,
                content: draft.content,
                tag_ids,
                tag_names,
                created_at: now,
                updated_at: now,
            },
        };

        NoteRepository::put(pool, &note).await?;
        PendingRepository::mark(pool, &note.id, SyncState::LocalOnly, None).await?;
        info!("Saved note {} locally", note.id);

        self.push_note(note).await
    }

    /// Offer a locally stored note to the remote store.
    async fn push_note(&self, note: Note) -> SyncResult<WriteOutcome> {
        let pool = self.local.pool();
        PendingRepository::mark(pool, &note.id, SyncState::RemotePending, None).await?;

        match self.remote.put(&note).await {
            Ok(remote_note) => match self.apply_remote_note(remote_note).await {
                Ok(note) => Ok(WriteOutcome {
                    note,
                    state: SyncState::RemoteConfirmed,
                    committed_locally: true,
                    committed_remotely: true,
                    remote_error: None,
                }),
                Err(e) => {
                    warn!(
                        "Note {} saved remotely but the local copy was not updated: {}",
                        note.id, e
                    );
                    Ok(WriteOutcome {
                        note,
                        state: SyncState::RemotePending,
                        committed_locally: true,
                        committed_remotely: true,
                        remote_error: None,
                    })
                }
            },
            Err(e) => {
                warn!("Remote save of note {} failed, will retry: {}", note.id, e);
                let message = e.to_string();
                PendingRepository::mark(pool, &note.id, SyncState::RemoteFailed, Some(&message))
                    .await?;
                Ok(WriteOutcome {
                    note,
                    state: SyncState::RemoteFailed,
                    committed_locally: true,
                    committed_remotely: false,
                    remote_error: Some(message),
                })
            }
        }
    }

    /// Delete a note once the caller has confirmed it.
    ///
    /// Local deletion and tag decrements stand whatever the remote answers;
    /// a failed remote delete is logged and not retried.
    pub async fn delete_note(
        &self,
        id: &str,
        confirmation: Confirmation,
    ) -> SyncResult<DeleteOutcome> {
        if confirmation == Confirmation::Declined {
            debug!("Delete of note {} declined", id);
            return Ok(DeleteOutcome {
                note_id: id.to_string(),
                existed: false,
                committed_locally: false,
                committed_remotely: false,
            });
        }

        let pool = self.local.pool();
        let existed = match NoteRepository::get(pool, id).await? {
            Some(note) => {
                TagLifecycle::new(pool)
                    .reconcile(&note.tag_ids, &[], &Default::default())
                    .await;
                NoteRepository::remove(pool, id).await?
            }
            None => false,
        };
        info!("Deleted note {} locally (existed: {})", id, existed);

        let committed_remotely = match self.remote.delete(id).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Remote delete of note {} failed: {}", id, e);
                false
            }
        };

        Ok(DeleteOutcome {
            note_id: id.to_string(),
            existed,
            committed_locally: true,
            committed_remotely,
        })
    }

    /// Push pending notes, then pull everything modified after the watermark.
    ///
    /// Transport failures and server errors end the pass early and are
    /// reported, not returned; the watermark only moves after a complete pull. Overlapping calls are
    /// skipped.
    pub async fn sync_notes(&self) -> SyncResult<SyncReport> {
        let pool = self.local.pool();
        let Ok(_guard) = self.sync_guard.try_lock() else {
            debug!("Sync already in progress, skipping");
            return Ok(SyncReport {
                watermark: SyncMetaRepository::last_sync(pool).await?,
                skipped: true,
                ..Default::default()
            });
        };

        let watermark = SyncMetaRepository::last_sync(pool).await?;
        let mut report = SyncReport {
            watermark,
            ..Default::default()
        };

        match self.push_pending().await? {
            Ok(pushed) => report.pushed = pushed,
            Err((pushed, e)) => {
                warn!("Sync aborted while pushing pending notes: {}", e);
                report.pushed = pushed;
                report.error = Some(e.to_string());
                return Ok(report);
            }
        }

        let page = match self.remote.scan(ScanFilter::ModifiedAfter(watermark)).await {
            Ok(page) => page,
            Err(e) => {
                warn!("Sync aborted while pulling notes: {}", e);
                report.error = Some(e.to_string());
                return Ok(report);
            }
        };

        let next = page.sync_timestamp.unwrap_or_else(|| {
            page.notes
                .iter()
                .map(|note| note.updated_at)
                .max()
                .unwrap_or(watermark)
        });

        for note in page.notes {
            if self.merge_remote_note(note).await? {
                report.pulled += 1;
            }
        }

        report.watermark = SyncMetaRepository::advance_last_sync(pool, next).await?;
        report.completed = true;
        info!(
            "Sync complete: pushed {}, pulled {}, watermark {}",
            report.pushed, report.pulled, report.watermark
        );
        Ok(report)
    }

    /// Full scan merged into the cache. The watermark is left alone.
    pub async fn refresh_all(&self) -> SyncResult<SyncReport> {
        let pool = self.local.pool();
        let Ok(_guard) = self.sync_guard.try_lock() else {
            return Ok(SyncReport {
                watermark: SyncMetaRepository::last_sync(pool).await?,
                skipped: true,
                ..Default::default()
            });
        };

        let mut report = SyncReport {
            watermark: SyncMetaRepository::last_sync(pool).await?,
            ..Default::default()
        };

        match self.remote.scan(ScanFilter::All).await {
            Ok(page) => {
                for note in page.notes {
                    if self.merge_remote_note(note).await? {
                        report.pulled += 1;
                    }
                }
                report.completed = true;
                info!("Full refresh merged {} notes", report.pulled);
            }
            Err(e) => {
                warn!("Full refresh failed: {}", e);
                report.error = Some(e.to_string());
            }
        }

        Ok(report)
    }

    /// Push every pending note in write order. A rejected note stays
    /// `RemoteFailed` and the rest are still pushed; any other remote failure
    /// stops the push, returning how many were confirmed before it.
    async fn push_pending(&self) -> SyncResult<Result<usize, (usize, RemoteError)>> {
        let pool = self.local.pool();
        let mut pushed = 0;

        for pending in PendingRepository::list(pool).await? {
            let Some(note) = NoteRepository::get(pool, &pending.note_id).await? else {
                PendingRepository::clear(pool, &pending.note_id).await?;
                continue;
            };

            match self.remote.put(&note).await {
                Ok(remote_note) => {
                    self.apply_remote_note(remote_note).await?;
                    pushed += 1;
                }
                Err(e) => {
                    PendingRepository::mark(
                        pool,
                        &note.id,
                        SyncState::RemoteFailed,
                        Some(&e.to_string()),
                    )
                    .await?;
                    if e.is_rejection() {
                        warn!("Remote rejected note {}, skipping: {}", note.id, e);
                        continue;
                    }
                    return Ok(Err((pushed, e)));
                }
            }
        }

        Ok(Ok(pushed))
    }

    /// Merge one pulled note into the cache. Returns false when the note was
    /// skipped because an unpushed local edit is at least as new.
    pub async fn merge_remote_note(&self, note: Note) -> SyncResult<bool> {
        let pool = self.local.pool();
        if note.id.is_empty() {
            warn!("Ignoring remote note without id");
            return Ok(false);
        }

        if let Some(pending) = PendingRepository::get(pool, &note.id).await?
            && let Some(local) = NoteRepository::get(pool, &note.id).await?
            && local.updated_at >= note.updated_at
        {
            debug!(
                "Keeping local note {} ({:?}, {} >= {})",
                note.id, pending.state, local.updated_at, note.updated_at
            );
            return Ok(false);
        }

        self.apply_remote_note(note).await?;
        Ok(true)
    }

    /// Store a remote note as authoritative, reconciling local tag counts
    /// against the previous local copy.
    async fn apply_remote_note(&self, note: Note) -> SyncResult<Note> {
        let pool = self.local.pool();
        let old_tag_ids = NoteRepository::get(pool, &note.id)
            .await?
            .map(|local| local.tag_ids)
            .unwrap_or_default();

        let summary = TagLifecycle::new(pool)
            .reconcile(&old_tag_ids, &note.tag_ids, &note.tag_names)
            .await;
        debug!(
            "Merged note {} (+{} -{} tags)",
            note.id, summary.incremented, summary.decremented
        );

        NoteRepository::put(pool, &note).await?;
        PendingRepository::mark(pool, &note.id, SyncState::RemoteConfirmed, None).await?;
        Ok(note)
    }

    /// Run [`Self::sync_notes`] every `every` until `shutdown` resolves.
    pub async fn run_periodic<F>(&self, every: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Periodic sync stopped");
                    return;
                }
                _ = interval.tick() => {
                    match self.sync_notes().await {
                        Ok(report) if report.completed => {
                            debug!("Periodic sync: {:?}", report);
                        }
                        Ok(report) => {
                            debug!("Periodic sync incomplete: {:?}", report);
                        }
                        Err(e) => warn!("Periodic sync failed: {}", e),
                    }
                }
            }
        }
    }

    /// Rebuild local tag counts from the cached notes.
    pub async fn repair(&self) -> SyncResult<usize> {
        Ok(TagLifecycle::new(self.local.pool()).recount().await?)
    }

    pub async fn list_notes(&self) -> SyncResult<Vec<Note>> {
        Ok(NoteRepository::list(self.local.pool()).await?)
    }

    pub async fn get_note(&self, id: &str) -> SyncResult<Option<Note>> {
        Ok(NoteRepository::get(self.local.pool(), id).await?)
    }

    pub async fn list_tags(&self) -> SyncResult<Vec<Tag>> {
        Ok(TagRepository::list(self.local.pool()).await?)
    }

    /// Notes carrying the tag named `name`; empty when no such tag exists.
    pub async fn notes_for_tag(&self, name: &str) -> SyncResult<Vec<Note>> {
        let pool = self.local.pool();
        match TagRepository::find_by_name(pool, name).await? {
            Some(tag) => Ok(NoteRepository::list_by_tag(pool, &tag.id).await?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn watermark(&self) -> SyncResult<i64> {
        Ok(SyncMetaRepository::last_sync(self.local.pool()).await?)
    }

    pub async fn pending(&self) -> SyncResult<Vec<PendingNote>> {
        Ok(PendingRepository::list(self.local.pool()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_from_answer() {
        assert_eq!(Confirmation::from_answer("y"), Confirmation::Affirmed);
        assert_eq!(Confirmation::from_answer(" YES \n"), Confirmation::Affirmed);
        assert_eq!(Confirmation::from_answer(""), Confirmation::Declined);
        assert_eq!(Confirmation::from_answer("nope"), Confirmation::Declined);
    }
}
