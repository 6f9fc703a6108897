//! Giftflow Server
//!
//! Donation intake and payment reconciliation service.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, get_database_url};
use giftflow_core::processors::PendingSweeper;
use giftflow_core::store::{DonationStore, InMemoryDonationStore, PgDonationStore};
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Giftflow - donation payments with card and mobile-money rails
#[derive(Parser, Debug)]
#[command(name = "giftflow-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./giftflow.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Keep donations in memory instead of PostgreSQL (lost on exit)
    #[arg(long, default_value = "false")]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting giftflow-server v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    let listen_addr = loaded_config.server.listen;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let (store, db_pool) = if args.ephemeral {
        tracing::warn!("Running with the in-memory store, donations will not survive a restart");
        let store: Arc<dyn DonationStore> = Arc::new(InMemoryDonationStore::new());
        (store, None)
    } else {
        let pool = connect_database(args.migrate).await?;
        let store: Arc<dyn DonationStore> = Arc::new(PgDonationStore::new(pool.clone()));
        (store, Some(pool))
    };

    let state = AppState::build(store, &loaded_config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper_handle = loaded_config.sweeper.map(|sweeper_config| {
        let sweeper = PendingSweeper::new(Arc::clone(&state.engine), sweeper_config);
        tokio::spawn(sweeper.run(shutdown_rx.clone()))
    });
    if sweeper_handle.is_none() {
        tracing::info!("PendingSweeper disabled by configuration");
    }

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(state.clone(), config_loader);

    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    reload_notify.notify_one();
    let _ = shutdown_tx.send(true);
    if let Some(handle) = sweeper_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "PendingSweeper task failed");
        }
    }

    if let Some(pool) = db_pool {
        tracing::info!("Closing database connections...");
        pool.close().await;
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

async fn connect_database(migrate: bool) -> anyhow::Result<PgPool> {
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

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
