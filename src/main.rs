use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use cognimark::config::{self, Settings};
use cognimark::health::{HealthChecker, HttpProber};
use cognimark::model::BookmarkRecord;
use cognimark::page_text::{self, HttpPageText};
use cognimark::progress;
use cognimark::provider::{self, BookmarkProvider};
use cognimark::router::Router;
use cognimark::search::SearchQuery;
use cognimark::service;
use cognimark::state::{RunOutcome, SyncState};
use cognimark::storage::{self, JsonFileStore, Storage};
use cognimark::sync::SyncEngine;
use cognimark::usage::{self, FREQUENT_LIMIT};

#[derive(Parser)]
#[command(name = "cognimark")]
#[command(about = "Local bookmark mirror with link health checks, search and snapshots", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (default: ~/.cognimark/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Storage file, overrides the settings
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the browser's bookmarks and merge them into local storage
    Sync {
        /// Browser name (chrome, brave, chromium, edge, firefox, waterfox) or a bookmark file path
        #[arg(short, long, default_value = "chrome")]
        source: String,
    },

    /// Probe every stored bookmark and record its health
    HealthCheck,

    /// Show health statistics
    Stats,

    /// Search stored bookmarks
    Search {
        query: String,

        /// Treat the query as a case-insensitive regular expression
        #[arg(long)]
        regex: bool,

        /// Also search captured page text
        #[arg(long)]
        full_text: bool,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Record a click on a bookmark and print its URL
    Open { id: String },

    /// Show the most clicked bookmarks
    Frequent,

    /// Fetch a bookmark's page text and store it as its snapshot
    Snapshot { id: String },

    /// Handle one JSON message, e.g. '{"action":"getStats"}'
    Message {
        json: String,

        /// Bookmark source used by triggerSync
        #[arg(short, long)]
        source: Option<String>,
    },

    /// List all detected browsers and their bookmark locations
    List,

    /// Keep the mirror in sync: startup sync, change watching, periodic alarms
    Daemon {
        #[arg(short, long, default_value = "chrome")]
        source: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    let settings_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::default_settings_path()?,
    };
    let settings = Settings::load(&settings_path)?;
    let storage_path = match &cli.storage {
        Some(path) => path.clone(),
        None => settings.storage_path()?,
    };
    let store: Arc<dyn Storage> = Arc::new(JsonFileStore::new(storage_path));
    let state = Arc::new(SyncState::new());

    match cli.command {
        Commands::Sync { source } => {
            let engine = sync_engine(&source, store, state)?;
            let spinner = progress::create_spinner("🔄 Syncing bookmarks...");
            match engine.sync().await {
                Ok(RunOutcome::Completed(report)) => {
                    progress::finish_with_success(
                        &spinner,
                        &format!(
                            "{} bookmarks (+{} / -{})",
                            report.bookmarks, report.added, report.removed
                        ),
                    );
                    info!("📊 {}", report.stats.summary_line());
                }
                Ok(RunOutcome::Skipped) => progress::finish_with_success(&spinner, "already running"),
                Err(e) => {
                    progress::finish_with_error(&spinner, "sync failed");
                    return Err(e);
                }
            }
        }

        Commands::HealthCheck => {
            let total = storage::load_bookmarks(store.as_ref()).await?.len();
            let pb = progress::create_health_progress_bar(total as u64);
            let checker = health_checker(&settings, store, state)?
                .with_observer(progress::health_observer(&pb));
            match checker.run().await {
                Ok(RunOutcome::Completed(summary)) => {
                    progress::finish_with_success(&pb, &summary.stats.summary_line());
                }
                Ok(RunOutcome::Skipped) => progress::finish_with_success(&pb, "already running"),
                Err(e) => {
                    progress::finish_with_error(&pb, "health check failed");
                    return Err(e);
                }
            }
        }

        Commands::Stats => {
            let (stats, last_sync) = storage::load_stats(store.as_ref()).await?;
            println!("📊 {}", stats.summary_line());
            match last_sync.and_then(DateTime::<Utc>::from_timestamp_millis) {
                Some(at) => println!(
                    "🕒 Last sync: {}",
                    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
                ),
                None => println!("🕒 Never synced"),
            }
        }

        Commands::Search {
            query,
            regex,
            full_text,
            limit,
        } => {
            let bookmarks = storage::load_bookmarks(store.as_ref()).await?;
            let found = SearchQuery::new(query)
                .regex(regex)
                .full_text(full_text)
                .filter(&bookmarks);
            info!("🔍 {} matches", found.len());
            for b in found.into_iter().take(limit) {
                print_bookmark(b);
            }
        }

        Commands::Open { id } => match usage::record_click(store.as_ref(), &id).await? {
            Some(record) => println!("{}", record.url),
            None => warn!("⚠️  Bookmark {} not found", id),
        },

        Commands::Frequent => {
            let bookmarks = storage::load_bookmarks(store.as_ref()).await?;
            for b in usage::top_frequent(&bookmarks, FREQUENT_LIMIT) {
                println!("{:>5}×  {}  {}", b.click_count, b.title, b.url);
            }
        }

        Commands::Snapshot { id } => {
            let pages = HttpPageText::new(store.clone(), settings.probe_timeout())?;
            let record = page_text::capture_snapshot(store.as_ref(), &pages, &id).await?;
            info!("✅ Stored {} characters for {}", record.snapshot.chars().count(), record.title);
        }

        Commands::Message { json, source } => {
            let message: serde_json::Value =
                serde_json::from_str(&json).context("message is not valid JSON")?;
            let sync = match source {
                Some(source) => Some(Arc::new(sync_engine(&source, store.clone(), state.clone())?)),
                None => None,
            };
            let health = Arc::new(health_checker(&settings, store.clone(), state)?);
            let pages = Arc::new(HttpPageText::new(store.clone(), settings.probe_timeout())?);
            let router = Router::new(store, sync, health, pages);
            let response = router.handle_value(message).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Commands::List => {
            info!("📋 Detected Browsers:");
            for (browser, path) in provider::detect_browsers() {
                match path {
                    Ok(path) => info!("  ✅ {} → {:?}", browser.name(), path),
                    Err(_) => info!("  ⚪ {} (not found)", browser.name()),
                }
            }
        }

        Commands::Daemon { source } => {
            let source = provider::open_source(&source)?;
            let watch_path = source.watch_path().map(|p| p.to_path_buf());
            let engine = Arc::new(SyncEngine::new(source, store.clone(), state.clone()));
            let health = Arc::new(health_checker(&settings, store, state)?);
            service::run_daemon(&settings, engine, health, watch_path).await?;
        }
    }

    Ok(())
}

fn sync_engine(source: &str, store: Arc<dyn Storage>, state: Arc<SyncState>) -> Result<SyncEngine> {
    let provider: Arc<dyn BookmarkProvider> = provider::open_source(source)?;
    Ok(SyncEngine::new(provider, store, state))
}

fn health_checker(
    settings: &Settings,
    store: Arc<dyn Storage>,
    state: Arc<SyncState>,
) -> Result<HealthChecker> {
    let prober = Arc::new(HttpProber::new(settings.probe_timeout())?);
    Ok(HealthChecker::new(
        store,
        prober,
        state,
        settings.health_check_config(),
    ))
}

fn print_bookmark(b: &BookmarkRecord) {
    println!("{} [{}] {}", b.health_status.icon(), b.id, b.title);
    println!("     {}", b.url);
    if !b.folder.is_empty() {
        println!("     📁 {}", b.folder);
    }
}
