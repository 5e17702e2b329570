//! Plain-text rendering of notes, tags and sync results.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, Utc};
use muse_core::{Note, Tag};
use muse_db::PendingNote;
use muse_sync::{DeleteOutcome, SyncReport, WriteOutcome};

pub fn format_timestamp(millis: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(ts) if millis > 0 => ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
        _ => "never".to_string(),
    }
}

/// Tag names of a note, falling back to the raw id for unknown tags.
pub fn tag_label(note: &Note, names: &BTreeMap<String, String>) -> String {
    note.tag_ids
        .iter()
        .map(|id| {
            names
                .get(id)
                .or_else(|| note.tag_names.get(id))
                .cloned()
                .unwrap_or_else(|| id.clone())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn note_line(note: &Note, names: &BTreeMap<String, String>) -> String {
    let title = if note.title.trim().is_empty() {
        "(untitled)"
    } else {
        note.title.as_str()
    };
    let tags = tag_label(note, names);

    if tags.is_empty() {
        format!("{}  {}  {}", note.id, format_timestamp(note.updated_at), title)
    } else {
        format!(
            "{}  {}  {}  [{}]",
            note.id,
            format_timestamp(note.updated_at),
            title,
            tags
        )
    }
}

pub fn note_details(note: &Note, names: &BTreeMap<String, String>) -> String {
    format!(
        "id:      {}\ntitle:   {}\ntags:    {}\ncreated: {}\nupdated: {}\n\n{}",
        note.id,
        note.title,
        tag_label(note, names),
        format_timestamp(note.created_at),
        format_timestamp(note.updated_at),
        note.content
    )
}

pub fn tag_line(tag: &Tag) -> String {
    let noun = if tag.note_count == 1 { "note" } else { "notes" };
    format!("{:<24} {} {}", tag.name, tag.note_count, noun)
}

pub fn pending_line(pending: &PendingNote) -> String {
    match &pending.last_error {
        Some(error) => format!(
            "{}  {} after {} attempts: {}",
            pending.note_id, pending.state, pending.attempts, error
        ),
        None => format!("{}  {}", pending.note_id, pending.state),
    }
}

pub fn write_summary(outcome: &WriteOutcome) -> String {
    if outcome.committed_remotely {
        format!("Saved {} (synced)", outcome.note.id)
    } else {
        format!(
            "Saved {} locally; remote write failed ({}), will retry on next sync",
            outcome.note.id,
            outcome.remote_error.as_deref().unwrap_or("unknown error")
        )
    }
}

pub fn delete_summary(outcome: &DeleteOutcome) -> String {
    if !outcome.committed_locally {
        return "Aborted.".to_string();
    }
    let local = if outcome.existed {
        "Deleted"
    } else {
        "Not in local cache; requested remote delete of"
    };
    let remote = if outcome.committed_remotely {
        ""
    } else {
        " (remote delete failed)"
    };
    format!("{} {}{}", local, outcome.note_id, remote)
}

pub fn sync_summary(report: &SyncReport) -> String {
    if report.skipped {
        return "Sync already in progress".to_string();
    }
    match &report.error {
        Some(error) => format!(
            "Sync incomplete: {} (pushed {}, watermark {})",
            error,
            report.pushed,
            format_timestamp(report.watermark)
        ),
        None => format!(
            "Synced: pushed {}, pulled {}, up to {}",
            report.pushed,
            report.pulled,
            format_timestamp(report.watermark)
        ),
    }
}
