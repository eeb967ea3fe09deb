//! spotan-ingest - Main entry point
//!
//! Reads extended streaming history files, resolves every played track
//! against the Spotify Web API and stores new streams in the local database.

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use spotan_common::config::{resolve_database_path, resolve_root_folder, TomlConfig};
use spotan_ingest::config::resolve_spotify_credentials;
use spotan_ingest::db::SqliteEntityStore;
use spotan_ingest::input::read_streaming_history;
use spotan_ingest::remote::SpotifyClient;
use spotan_ingest::services::{IngestionOrchestrator, IngestionSettings, StalenessPolicy};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for spotan-ingest
#[derive(Parser, Debug)]
#[command(name = "spotan-ingest")]
#[command(about = "Ingest Spotify extended streaming history into a local database")]
#[command(version)]
struct Args {
    /// endsong_*.json files to ingest
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "SPOTAN_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database
    #[arg(short, long, env = "SPOTAN_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Database file (overrides <root_folder>/spotan.db)
    #[arg(short, long, env = "SPOTAN_DATABASE")]
    database: Option<PathBuf>,

    /// Records processed concurrently
    #[arg(long, env = "SPOTAN_CONCURRENCY")]
    concurrency: Option<usize>,
}

/// Bare level names apply to this workspace's crates; anything else is
/// taken as a full filter directive.
fn log_filter(level: &str) -> String {
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("spotan_ingest={0},spotan_common={0}", level)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    // RUST_LOG wins over the config file
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_filter(&toml_config.logging.level))),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting spotan-ingest v{}", env!("CARGO_PKG_VERSION"));

    let concurrency = args.concurrency.unwrap_or(toml_config.ingest.concurrency);
    if concurrency == 0 {
        bail!("concurrency must be at least 1");
    }

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    let db_path = resolve_database_path(args.database.as_deref(), &toml_config, &root_folder);
    info!("Database: {}", db_path.display());

    let credentials =
        resolve_spotify_credentials(&toml_config).context("Spotify credentials required")?;

    let history = read_streaming_history(&args.files).context("Failed to read streaming history")?;
    info!("Read {} play records from {} file(s)", history.len(), args.files.len());

    let pool = spotan_common::db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;
    let store = Arc::new(SqliteEntityStore::new(pool));

    let requests_per_second = NonZeroU32::new(toml_config.spotify.requests_per_second)
        .context("spotify.requests_per_second must be at least 1")?;
    let client = SpotifyClient::new(
        credentials.client_id,
        credentials.client_secret,
        requests_per_second,
    )
    .context("Failed to create Spotify client")?;

    let settings = IngestionSettings {
        concurrency,
        staleness: StalenessPolicy::from_days(toml_config.ingest.stale_after_days),
    };

    let orchestrator = IngestionOrchestrator::load(store, Arc::new(client), settings)
        .await
        .context("Failed to load existing entities")?;

    let cancel_token = orchestrator.cancel_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Stopping after records already in progress");
        cancel_token.cancel();
    });

    let summary = orchestrator.run(history).await.context("Ingestion failed")?;

    info!(
        "Done: {} records, {} new streams, {} duplicates, {} skipped, {} failed{}",
        summary.total,
        summary.streams_added,
        summary.duplicates,
        summary.skipped,
        summary.failures,
        if summary.cancelled { " (cancelled)" } else { "" }
    );

    Ok(())
}

/// Ctrl+C / SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
