//! MVT Streamer - renders Mapbox Vector Tiles on demand from PostGIS.
//!
//! This binary opens the connection pool, runs the startup checks and serves
//! the tile API until interrupted.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mvt_streamer::{
    config::Config,
    engine::{PostgisManager, QueryOrchestrator},
    pool::ConnectionPool,
    server::{create_router, RouterConfig},
    tile::TileService,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    run(config).await
}

async fn run(config: Config) -> ExitCode {
    // validate() already checked both
    let (layout, zoom_range) = match (config.layout(), config.zoom_range()) {
        (Ok(layout), Ok(zoom_range)) => (layout, zoom_range),
        (Err(e), _) | (_, Err(e)) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cache_version = config.resolve_cache_version(&layout, zoom_range);

    info!("MVT Streamer v{}", mvt_streamer::VERSION);
    info!("Configuration:");
    info!(
        "  Table: {} (layer '{}', SRID {})",
        layout.table(),
        layout.layer(),
        layout.source_srid()
    );
    info!("  Zoom: {}-{}", zoom_range.min(), zoom_range.max());
    info!(
        "  Pool: {} connections, acquire timeout {}",
        config.pool_size,
        match config.pool_acquire_timeout_ms {
            Some(ms) => format!("{}ms", ms),
            None => "none".to_string(),
        }
    );
    info!(
        "  Cache: {} tiles, version '{}'{}",
        config.cache_capacity,
        cache_version,
        if config.cache_version.is_none() {
            " (derived)"
        } else {
            ""
        }
    );

    // Open and check every connection before serving anything
    let manager = PostgisManager::new(config.database_url.clone(), layout.clone());
    info!("Connecting to PostGIS...");
    let pool = match ConnectionPool::initialize(config.pool_size, &manager).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Startup check failed: {}", e);
            error!("Please check:");
            error!("  - DATABASE_URL points at a reachable PostgreSQL server");
            error!("  - The PostGIS extension is installed (CREATE EXTENSION postgis)");
            error!("  - The table '{}' exists and contains features", layout.table());
            return ExitCode::FAILURE;
        }
    };

    if config.check {
        pool.shutdown().await;
        info!("All checks passed");
        return ExitCode::SUCCESS;
    }

    let tile_service = Arc::new(
        TileService::new(
            pool,
            QueryOrchestrator::new(&layout),
            zoom_range,
            cache_version,
        )
        .with_cache_capacity(config.cache_capacity())
        .with_acquire_timeout(config.acquire_timeout()),
    );

    let router = create_router(Arc::clone(&tile_service), build_router_config(&config));

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            tile_service.shutdown().await;
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);
    info!("  curl http://{}/health", addr);
    info!(
        "  curl -o tile.pbf http://{}/tiles/{}/0/0.pbf",
        addr,
        zoom_range.min()
    );

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    tile_service.shutdown().await;

    match served {
        Ok(()) => {
            info!("Server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
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
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "mvt_streamer=debug,tower_http=debug"
    } else {
        "mvt_streamer=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_tracing(!config.no_tracing)
        .with_compression(!config.no_compression);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}
