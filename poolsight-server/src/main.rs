//! Poolsight Server
//!
//! Indexes liquidity-pool events block by block and serves pool depths.

mod api;
mod config;
mod server;
mod shutdown;
mod source;
mod state;

use clap::Parser;
use config::file::StorageKind;
use config::{ConfigLoader, Overrides, get_database_url};
use poolsight_core::events::block_channel;
use poolsight_core::latest::LatestState;
use poolsight_core::metrics::IndexerMetrics;
use poolsight_core::processors::BlockWriter;
use poolsight_core::query::QueryService;
use poolsight_core::store::{EventStore, MemoryEventStore, PgEventStore};
use prometheus::Registry;
use server::{build_router, run_server};
use shutdown::spawn_shutdown_broadcast;
use source::BlockFileSource;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Heights between two progress lines at info level.
const PROGRESS_EVERY: i64 = 1_000;

/// Poolsight - liquidity pool depth indexer
#[derive(Parser, Debug)]
#[command(name = "poolsight-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./poolsight.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Override the JSON-lines block file to ingest
    #[arg(short, long)]
    blocks: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.json_logs);

    tracing::info!("Starting poolsight-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = ConfigLoader::new(
        &args.config,
        Overrides {
            listen: args.listen,
            blocks_path: args.blocks.clone(),
        },
    );
    let config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!(
        storage = ?config.storage,
        outbound_timeout = %config.indexer.outbound_timeout,
        "Configuration loaded from {:?}",
        args.config
    );

    let (store, db_pool): (Arc<dyn EventStore>, Option<PgPool>) = match config.storage {
        StorageKind::Postgres => {
            let db_pool = connect_database(args.migrate).await?;
            (Arc::new(PgEventStore::new(db_pool.clone())), Some(db_pool))
        }
        StorageKind::Memory => {
            tracing::warn!("Using in-memory storage, nothing survives a restart");
            (Arc::new(MemoryEventStore::new()), None)
        }
    };

    let registry = Registry::new();
    let metrics = IndexerMetrics::new(&registry)?;
    let latest = LatestState::new();

    let mut writer = BlockWriter::new(store.clone(), latest.clone(), &config.indexer, metrics);
    writer.restore().await.map_err(|e| {
        tracing::error!("Failed to restore committed state: {}", e);
        e
    })?;

    let state = AppState::new(QueryService::new(latest.clone(), store), registry);
    let shutdown_rx = spawn_shutdown_broadcast();

    // Ingestion: source -> channel -> writer
    let (block_tx, block_rx) = block_channel();
    let ingest = state.ingest.clone();
    let writer_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            if let Err(e) = writer.run(block_rx, shutdown_rx).await {
                tracing::error!(error = %e, "Block ingestion halted, serving last committed state");
                ingest.mark_halted();
            }
        }
    });

    let source_handle = match config.blocks_path {
        Some(path) => {
            let source = BlockFileSource::new(path);
            let shutdown_rx = shutdown_rx.clone();
            Some(tokio::spawn(async move {
                match source.run(block_tx, shutdown_rx).await {
                    Ok(sent) => tracing::info!(sent, "Block source finished"),
                    Err(e) => tracing::error!(error = %e, "Block source failed"),
                }
            }))
        }
        None => {
            tracing::info!("No block source configured, serving committed state only");
            drop(block_tx);
            None
        }
    };

    tokio::spawn(log_progress(latest, shutdown_rx.clone()));

    // Build the router
    let router = build_router(state);

    // Run the server
    tracing::info!("Starting HTTP server on {}", config.listen);
    let result = run_server(router, config.listen, shutdown_rx).await;

    if let Some(handle) = source_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Block source task panicked");
        }
    }
    if let Err(e) = writer_handle.await {
        tracing::error!(error = %e, "Block writer task panicked");
    }

    // Close database connections gracefully
    if let Some(db_pool) = db_pool {
        tracing::info!("Closing database connections...");
        db_pool.close().await;
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

async fn connect_database(migrate: bool) -> anyhow::Result<PgPool> {
    // Get database URL from environment
    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    Ok(db_pool)
}

/// Log committed heights as the writer publishes them.
async fn log_progress(latest: LatestState, mut shutdown_rx: watch::Receiver<bool>) {
    let mut watcher = latest.subscribe();
    let mut logged = latest.load().height;
    loop {
        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            height = watcher.changed() => {
                let Ok(height) = height else { break };
                tracing::debug!(height, "block published");
                if height / PROGRESS_EVERY > logged / PROGRESS_EVERY {
                    tracing::info!(height, "indexing progress");
                    logged = height;
                }
            }
        }
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
