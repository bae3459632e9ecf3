//! Vitrine Binary Entry Point
//!
//! Runs the dashboard backend. Core functionality is provided by the
//! `vitrine` library crate.

use std::{net::SocketAddr, path::Path, time::Duration};

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vitrine::{
    cache::ResponseCache,
    config::{AppConfig, SeedConfig, parse_duration},
    generator::DataGenerator,
    server::{AppState, create_router},
    storage::{DataStore, SERVER_METRICS_TABLE, StorageBuilder, db::mask_url},
};

/// Vitrine - server-metrics dashboard backend
#[derive(Parser, Debug)]
#[command(name = "vitrine", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "VITRINE_CONFIG"
    )]
    config: String,

    /// Server bind address (overrides config file)
    #[arg(long, env = "VITRINE_SERVER_BIND")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "VITRINE_SERVER_PORT")]
    server_port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(long, env = "VITRINE_DB_URL")]
    db_url: Option<String>,

    /// Cache TTL, e.g. `5m` (overrides config file)
    #[arg(long, env = "VITRINE_CACHE_TTL", value_parser = parse_duration)]
    cache_ttl: Option<Duration>,

    /// Skip seeding synthetic data into an empty database
    #[arg(long)]
    no_seed: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vitrine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Vitrine - dashboard backend");

    let cli = Cli::parse();

    // A missing file falls back to defaults so the binary runs out of the box
    let mut config = if Path::new(&cli.config).exists() {
        tracing::info!("Loading configuration from: {}", cli.config);
        AppConfig::load(&cli.config)?
    } else {
        tracing::warn!("Config file {} not found, using defaults", cli.config);
        AppConfig::default()
    };

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(bind) = cli.server_bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    if let Some(url) = cli.db_url {
        config.database.url = url;
    }
    if let Some(ttl) = cli.cache_ttl {
        config.cache.ttl = ttl;
    }
    if cli.no_seed {
        config.seed.enabled = false;
    }
    config.validate()?;

    tracing::info!(
        "Server: {}:{}, Database: {}, Cache TTL: {}",
        config.server.bind,
        config.server.port,
        mask_url(&config.database.url),
        humantime::format_duration(config.cache.ttl),
    );

    let handles = StorageBuilder::new(&config.database.url)
        .pool_size(config.database.pool_size)
        .acquire_timeout(config.database.acquire_timeout)
        .build()
        .await?;

    if config.seed.enabled {
        seed_if_empty(&handles.data_store, &config.seed).await?;
    }

    let cache = ResponseCache::new(config.cache.max_entries);
    let sweeper = cache.spawn_sweeper(config.cache.sweep_interval);

    let app = create_router(AppState {
        data_store: handles.data_store.clone(),
        layout_store: handles.layout_store.clone(),
        cache,
        cache_ttl: config.cache.ttl,
    });

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    tracing::info!("Web server listening on: http://{}", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("Shutting down storage...");
    handles.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Populate the metrics table with synthetic servers when it is empty.
async fn seed_if_empty(
    store: &DataStore,
    seed: &SeedConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let existing = store.count(SERVER_METRICS_TABLE).await?;
    if existing > 0 {
        tracing::debug!("Skipping seed, {} rows already present", existing);
        return Ok(());
    }

    let mut generator = match seed.rng_seed {
        Some(s) => DataGenerator::with_seed(s),
        None => DataGenerator::new(),
    };
    let records = generator.generate_server_data(seed.server_count, seed.days, seed.interval_hours);
    let inserted = store.insert_records(SERVER_METRICS_TABLE, &records).await?;
    tracing::info!(
        "Seeded {} rows for {} servers over {} days",
        inserted,
        seed.server_count,
        seed.days
    );
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
