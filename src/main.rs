use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use watchpoint::Config;
use watchpoint::db::Database;
use watchpoint::models::{ContentId, ContentIdentity, PlaybackUnit, UnitId, UserId};
use watchpoint::services::{EpisodeNavigator, ProgressSync, ThumbnailLoader};
use watchpoint::store::{RemoteStore, RestStore, SqliteStore};
use watchpoint::utils::format_duration;

/// Inspect and edit stored watch progress
#[derive(Parser, Debug)]
#[command(name = "watchpoint")]
#[command(about = "Watch-progress sync tools")]
#[command(version)]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, env = "WATCHPOINT_CONFIG")]
    config: Option<PathBuf>,

    /// Use a local SQLite database instead of the remote store
    #[arg(long)]
    local: Option<PathBuf>,

    /// Principal for the local database
    #[arg(long, default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the position playback would resume from
    Resume {
        content: String,
        #[arg(long)]
        unit: Option<String>,
    },
    /// Print the most recent progress across all units of a title
    Latest { content: String },
    /// Record a position
    Save {
        content: String,
        position: f64,
        duration: f64,
        #[arg(long)]
        unit: Option<String>,
    },
    /// Forget the progress for a title or episode
    Clear {
        content: String,
        #[arg(long)]
        unit: Option<String>,
    },
    /// Print the preview frame of a thumbnail track at a timestamp
    Thumbs { track: String, seconds: f64 },
    /// Print the episode that follows `unit`
    Next {
        #[arg(long)]
        unit: String,
        /// JSON array of units
        #[arg(long)]
        units_json: PathBuf,
    },
}

fn identity(content: String, unit: Option<String>) -> ContentIdentity {
    match unit {
        Some(unit) => ContentIdentity::episode(content, unit),
        None => ContentIdentity::title(content),
    }
}

async fn open_store(args: &Args, config: &Config) -> Result<Arc<dyn RemoteStore>> {
    match &args.local {
        Some(path) => {
            let db = Database::connect(path).await?;
            db.migrate().await?;
            Ok(Arc::new(SqliteStore::new(
                db.get_connection(),
                Some(UserId::new(args.user.clone())),
            )))
        }
        None => {
            let store = RestStore::from_config(&config.store)
                .context("Remote store is not configured")?;
            Ok(Arc::new(store))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "watchpoint=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match &args.command {
        Command::Thumbs { track, seconds } => {
            let loader = ThumbnailLoader::from_config(&config.thumbnails);
            let index = loader.load(track).await;
            info!("Track has {} cues", index.len());
            match index.lookup(*seconds) {
                Some(cue) => match cue.region {
                    Some(r) => println!("{}#xywh={},{},{},{}", cue.image_url, r.x, r.y, r.w, r.h),
                    None => println!("{}", cue.image_url),
                },
                None => println!("no preview"),
            }
            return Ok(());
        }
        Command::Next { unit, units_json } => {
            let text = std::fs::read_to_string(units_json)
                .with_context(|| format!("Failed to read {}", units_json.display()))?;
            let units: Vec<PlaybackUnit> =
                serde_json::from_str(&text).context("Failed to parse units")?;
            let navigator = EpisodeNavigator::new(units);
            match navigator.next_after(&UnitId::new(unit.clone())) {
                Some(next) => println!("{} {}", next.id, next.label()),
                None => println!("no next unit"),
            }
            return Ok(());
        }
        _ => {}
    }

    let store = open_store(&args, &config).await?;
    let sync = ProgressSync::new(store, &config.progress, config.store.table.clone());

    match args.command {
        Command::Resume { content, unit } => {
            let identity = identity(content, unit);
            match sync.load(&identity).await {
                Some(record) if record.is_completed(sync.near_end_seconds()) => {
                    println!("{} finished", identity)
                }
                Some(record) => {
                    let percent = record
                        .progress_fraction()
                        .map(|f| format!(" ({:.0}%)", f * 100.0))
                        .unwrap_or_default();
                    println!("{} {}{}", identity, format_duration(record.position()), percent);
                }
                None => println!("{} not started", identity),
            }
        }
        Command::Latest { content } => {
            let latest = sync
                .load_latest_for_content(&ContentId::new(content.clone()))
                .await;
            match latest {
                Some(record) => println!(
                    "{} {} at {}",
                    record
                        .unit_id
                        .as_ref()
                        .map(|u| u.to_string())
                        .unwrap_or(content),
                    format_duration(record.position()),
                    record.updated_at
                ),
                None => println!("{} not started", content),
            }
        }
        Command::Save {
            content,
            position,
            duration,
            unit,
        } => {
            let identity = identity(content, unit);
            let outcome = sync.save(&identity, position, duration).await?;
            println!("{}: {:?}", identity, outcome);
        }
        Command::Clear { content, unit } => {
            let identity = identity(content, unit);
            println!("{}: {:?}", identity, sync.delete(&identity).await);
        }
        Command::Thumbs { .. } | Command::Next { .. } => {}
    }

    Ok(())
}
