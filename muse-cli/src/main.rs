use std::{
    collections::BTreeMap,
    io::{self, Write},
    sync::Arc,
    time::Duration,
};

use clap::{Parser, Subcommand};
use muse_core::{Config, NoteDraft};
use muse_db::LocalDbPool;
use muse_sync::{Confirmation, HttpRemoteStore, SyncEngine};
use tracing::info;

mod render;

/// Local-first notes with tags, synced to a remote note endpoint
#[derive(Debug, Parser)]
#[command(name = "muse", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List cached notes
    List {
        /// Only notes carrying this tag
        #[arg(long)]
        tag: Option<String>,
    },
    /// List tags with their note counts
    Tags,
    /// Show one note
    Show { id: String },
    /// Create a note, or edit one with --id
    Save {
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long)]
        content: String,
        /// Comma-separated tag names
        #[arg(long, default_value = "")]
        tags: String,
        #[arg(long)]
        id: Option<String>,
    },
    /// Delete a note
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Push pending notes and pull remote changes
    Sync,
    /// Merge every remote note into the cache
    PullAll,
    /// Sync periodically until Ctrl-C
    Watch {
        /// Seconds between passes (defaults to [sync] interval_seconds)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Rebuild local tag counts from the cached notes
    Repair,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level().into()),
        )
        .with_writer(io::stderr)
        .init();

    let local = match &config.settings.storage.local_db_path {
        Some(path) => LocalDbPool::open(path).await?,
        None => LocalDbPool::new().await?,
    };
    let remote = HttpRemoteStore::from_config(&config)?;
    info!("Using remote endpoint {}", remote.notes_url());

    let engine = SyncEngine::new(local, Arc::new(remote));
    let result = run(&engine, &config, cli.command).await;
    engine.local().close().await;
    result
}

async fn run(
    engine: &SyncEngine,
    config: &Config,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::List { tag } => {
            let notes = match tag {
                Some(name) => engine.notes_for_tag(&name).await?,
                None => engine.list_notes().await?,
            };
            let names = tag_names(engine).await?;
            if notes.is_empty() {
                println!("No notes.");
            }
            for note in &notes {
                println!("{}", render::note_line(note, &names));
            }
        }
        Command::Tags => {
            let tags = engine.list_tags().await?;
            if tags.is_empty() {
                println!("No tags.");
            }
            for tag in &tags {
                println!("{}", render::tag_line(tag));
            }
        }
        Command::Show { id } => match engine.get_note(&id).await? {
            Some(note) => {
                let names = tag_names(engine).await?;
                println!("{}", render::note_details(&note, &names));
            }
            None => println!("Note {} not found", id),
        },
        Command::Save {
            title,
            content,
            tags,
            id,
        } => {
            let mut draft = NoteDraft::new(title, content).with_tags(tags);
            draft.id = id;
            let outcome = engine.save_note(draft).await?;
            println!("{}", render::write_summary(&outcome));
        }
        Command::Delete { id, yes } => {
            let confirmation = if yes {
                Confirmation::Affirmed
            } else {
                confirm(&format!("Delete note {}?", id))?
            };
            let outcome = engine.delete_note(&id, confirmation).await?;
            println!("{}", render::delete_summary(&outcome));
        }
        Command::Sync => {
            let report = engine.sync_notes().await?;
            println!("{}", render::sync_summary(&report));
            for pending in engine.pending().await? {
                println!("  pending: {}", render::pending_line(&pending));
            }
        }
        Command::PullAll => {
            let report = engine.refresh_all().await?;
            println!("{}", render::sync_summary(&report));
        }
        Command::Watch { interval } => {
            let every = interval
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or_else(|| config.sync_interval());
            println!("Syncing every {}s, Ctrl-C to stop", every.as_secs());
            engine
                .run_periodic(every, async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await;
        }
        Command::Repair => {
            let changed = engine.repair().await?;
            println!("Repaired {} tags", changed);
        }
    }

    Ok(())
}

async fn tag_names(engine: &SyncEngine) -> Result<BTreeMap<String, String>, Box<dyn std::error::Error>> {
    Ok(engine
        .list_tags()
        .await?
        .into_iter()
        .map(|tag| (tag.id, tag.name))
        .collect())
}

/// Ask a yes/no question on stdin; anything but yes declines.
fn confirm(question: &str) -> io::Result<Confirmation> {
    print!("{} [y/N]: ", question);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(Confirmation::from_answer(&input))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_save_and_delete() {
        let cli = Cli::parse_from([
            "muse", "save", "--title", "A", "--content", "body", "--tags", "work, urgent",
        ]);
        match cli.command {
            Command::Save { title, tags, id, .. } => {
                assert_eq!(title, "A");
                assert_eq!(tags, "work, urgent");
                assert!(id.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::parse_from(["muse", "delete", "note_1", "--yes"]);
        assert!(matches!(cli.command, Command::Delete { yes: true, .. }));

        let cli = Cli::parse_from(["muse", "pull-all"]);
        assert!(matches!(cli.command, Command::PullAll));
    }
}
