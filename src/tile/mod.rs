//! Tile service layer.
//!
//! This module turns raw `z/x/y` requests into rendered vector tiles.
//!
//! # Architecture
//!
//! The tile service sits between the HTTP layer and the spatial engine:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │  tolerance(z)   │  │
//! │  │  (versioned  │  │  (half a pixel  │  │
//! │  │   LRU)       │  │   in meters)    │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │    ConnectionPool → QueryOrchestrator   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: Main entry point for tile requests
//! - [`TileCache`]: LRU cache of rendered tiles and empty markers
//! - [`TileCacheKey`]: Composite key (z, x, y, version)
//! - [`TileCoordinate`]: A coordinate validated against a [`ZoomRange`]
//! - [`tolerance`]: Zoom-dependent simplification tolerance
//! - [`derive_cache_version`]: Default version derived from the layout

mod cache;
mod coord;
mod service;
mod simplify;
mod version;

pub use cache::{TileCache, TileCacheKey, DEFAULT_TILE_CACHE_CAPACITY};
pub use coord::{
    TileCoordinate, ZoomRange, DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM, MAX_SUPPORTED_ZOOM,
};
pub use service::{TileRequest, TileResponse, TileService, HEALTH_ACQUIRE_TIMEOUT};
pub use simplify::{ground_resolution, tolerance, EARTH_CIRCUMFERENCE_METERS, TILE_SIZE_PIXELS};
pub use version::{derive_cache_version, is_valid_cache_version, MAX_VERSION_LEN};
