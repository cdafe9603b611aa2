//! # MVT Streamer
//!
//! A vector tile server that renders Mapbox Vector Tiles on demand from a
//! PostGIS feature table.
//!
//! Every tile is one parameterized query: the engine computes the tile
//! envelope, selects intersecting features, simplifies them with a
//! zoom-dependent tolerance, clips them into tile space and encodes the
//! result. Rendered tiles (and empty tiles) are kept in a versioned LRU
//! cache, and a fixed-size connection pool bounds how many queries reach the
//! database at once.
//!
//! ## Features
//!
//! - **On-demand rendering**: `ST_AsMVT` output straight from the feature table
//! - **Versioned caching**: bump the cache version to invalidate every tile at once
//! - **Admission control**: requests queue for a pooled connection instead of
//!   overloading the database
//! - **Fail-fast startup**: every connection is checked for PostGIS and data
//!   before the server binds
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`engine`] - Spatial engine traits, the PostGIS backend and the tile query
//! - [`pool`] - Fixed-size connection pool with guard-based release
//! - [`tile`] - Coordinate validation, tolerance policy, cache and tile service
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mvt_streamer::{
//!     create_router, ConnectionPool, FeatureLayout, PostgisManager, QueryOrchestrator,
//!     RouterConfig, TileService, ZoomRange,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let layout = FeatureLayout::default();
//!     let manager = PostgisManager::new("postgres://localhost/tiles", layout.clone());
//!     let pool = ConnectionPool::initialize(4, &manager).await?;
//!
//!     let service = Arc::new(TileService::new(
//!         pool,
//!         QueryOrchestrator::new(&layout),
//!         ZoomRange::default(),
//!         "v1",
//!     ));
//!
//!     let router = create_router(Arc::clone(&service), RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(listener, router).await?;
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod pool;
pub mod server;
pub mod tile;

/// Crate version, reported by `/` and `/health`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export commonly used types
pub use config::Config;
pub use engine::{
    ConnectionManager, FeatureLayout, PostgisConnection, PostgisManager, QueryOrchestrator,
    SpatialConnection, TileOutcome, TileParams, TileQuery,
};
pub use error::{ConfigError, EngineError, PoolError, TileError};
pub use pool::{ConnectionPool, PooledConnection, DEFAULT_POOL_SIZE};
pub use server::{create_router, AppState, ErrorResponse, HealthResponse, RouterConfig};
pub use tile::{
    tolerance, TileCache, TileCacheKey, TileCoordinate, TileRequest, TileResponse, TileService,
    ZoomRange, DEFAULT_TILE_CACHE_CAPACITY,
};
