//! Configuration management for the vector tile server.
//!
//! This module provides a configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use mvt_streamer::config::Config;
//!
//! let config = Config::parse();
//! config.validate()?;
//! println!("Listening on {}", config.bind_address());
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` - PostgreSQL connection string (required)
//! - `MIN_ZOOM` / `MAX_ZOOM` - Inclusive zoom range (default: 8-22)
//! - `POOL_SIZE` - Pooled engine connections (default: 4)
//! - `POOL_ACQUIRE_TIMEOUT_MS` - Bounded wait for a connection (default: unbounded)
//! - `CACHE_CAPACITY` - Max tiles to cache (default: 2048)
//! - `DEFAULT_CACHE_VERSION` - Cache version when `?v=` is omitted (default: derived)
//! - `MVT_HOST` - Server bind address (default: 0.0.0.0)
//! - `MVT_PORT` - Server port (default: 8000)
//! - `MVT_TABLE`, `MVT_ID_COLUMN`, `MVT_ATTRIBUTES`, `MVT_GEOMETRY_COLUMN`,
//!   `MVT_SOURCE_SRID`, `MVT_LAYER` - Feature table layout
//! - `MVT_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 86400)
//! - `MVT_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::num::NonZeroUsize;
use std::time::Duration;

use clap::Parser;

use crate::engine::{FeatureLayout, DEFAULT_SOURCE_SRID};
use crate::error::ConfigError;
use crate::pool::DEFAULT_POOL_SIZE;
use crate::server::DEFAULT_CACHE_MAX_AGE;
use crate::tile::{
    derive_cache_version, is_valid_cache_version, ZoomRange, DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM,
    DEFAULT_TILE_CACHE_CAPACITY, MAX_VERSION_LEN,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8000;

// =============================================================================
// CLI Arguments
// =============================================================================

/// MVT Streamer - renders Mapbox Vector Tiles on demand from PostGIS.
#[derive(Parser, Debug, Clone)]
#[command(name = "mvt-streamer")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "MVT_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "MVT_PORT")]
    pub port: u16,

    // =========================================================================
    // Engine Configuration
    // =========================================================================
    /// PostgreSQL connection string for the PostGIS database.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    /// Number of pooled engine connections.
    #[arg(long, default_value_t = DEFAULT_POOL_SIZE, env = "POOL_SIZE")]
    pub pool_size: usize,

    /// Give up waiting for a pooled connection after this many milliseconds.
    ///
    /// If not specified, requests wait until a connection frees up.
    #[arg(long, env = "POOL_ACQUIRE_TIMEOUT_MS")]
    pub pool_acquire_timeout_ms: Option<u64>,

    // =========================================================================
    // Feature Table Layout
    // =========================================================================
    /// Feature table, optionally schema-qualified.
    #[arg(long, default_value = "mexico_city", env = "MVT_TABLE")]
    pub table: String,

    /// Stable feature identifier column.
    #[arg(long, default_value = "gid", env = "MVT_ID_COLUMN")]
    pub id_column: String,

    /// Attribute columns carried into the tile (comma-separated).
    #[arg(
        long,
        default_value = "clave,uso_suelo",
        env = "MVT_ATTRIBUTES",
        value_delimiter = ','
    )]
    pub attributes: Vec<String>,

    /// Geometry column.
    #[arg(long, default_value = "geometry", env = "MVT_GEOMETRY_COLUMN")]
    pub geometry_column: String,

    /// SRID the geometries are stored in.
    #[arg(long, default_value_t = DEFAULT_SOURCE_SRID, env = "MVT_SOURCE_SRID")]
    pub source_srid: i32,

    /// Layer name inside the emitted tiles.
    #[arg(long, default_value = "cadastre", env = "MVT_LAYER")]
    pub layer: String,

    // =========================================================================
    // Tile Configuration
    // =========================================================================
    /// Lowest zoom level served.
    #[arg(long, default_value_t = DEFAULT_MIN_ZOOM, env = "MIN_ZOOM")]
    pub min_zoom: u8,

    /// Highest zoom level served.
    #[arg(long, default_value_t = DEFAULT_MAX_ZOOM, env = "MAX_ZOOM")]
    pub max_zoom: u8,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Maximum number of rendered tiles to cache.
    #[arg(long, default_value_t = DEFAULT_TILE_CACHE_CAPACITY, env = "CACHE_CAPACITY")]
    pub cache_capacity: usize,

    /// Cache version used when a request omits `?v=`.
    ///
    /// If not specified, one is derived from the table layout and zoom range.
    #[arg(long, env = "DEFAULT_CACHE_VERSION")]
    pub cache_version: Option<String>,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "MVT_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "MVT_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Runtime Flags
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,

    /// Disable gzip response compression.
    #[arg(long, default_value_t = false)]
    pub no_compression: bool,

    /// Run the startup checks against the database and exit.
    #[arg(long, default_value_t = false)]
    pub check: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.database_url.is_empty() {
            return Err(
                "Database URL is required. Set --database-url or DATABASE_URL".to_string(),
            );
        }

        if self.pool_size == 0 {
            return Err("pool_size must be greater than 0".to_string());
        }
        if self.pool_acquire_timeout_ms == Some(0) {
            return Err("pool_acquire_timeout_ms must be greater than 0".to_string());
        }
        if self.cache_capacity == 0 {
            return Err("cache_capacity must be greater than 0".to_string());
        }

        if let Some(version) = &self.cache_version {
            if !is_valid_cache_version(version) {
                return Err(format!(
                    "cache_version must be 1-{} characters of [A-Za-z0-9._-], got {:?}",
                    MAX_VERSION_LEN, version
                ));
            }
        }

        self.zoom_range().map_err(|e| e.to_string())?;
        self.layout().map_err(|e| e.to_string())?;

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The configured zoom range.
    pub fn zoom_range(&self) -> Result<ZoomRange, ConfigError> {
        ZoomRange::new(self.min_zoom, self.max_zoom)
    }

    /// The configured feature table layout.
    pub fn layout(&self) -> Result<FeatureLayout, ConfigError> {
        FeatureLayout::new(
            self.table.as_str(),
            self.id_column.as_str(),
            self.attributes
                .iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
            self.geometry_column.as_str(),
            self.layer.as_str(),
            self.source_srid,
        )
    }

    /// Bounded connection wait, if configured.
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.pool_acquire_timeout_ms.map(Duration::from_millis)
    }

    /// Tile cache capacity (call validate() first).
    pub fn cache_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.cache_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    /// The explicit cache version, or one derived from the layout.
    pub fn resolve_cache_version(
        &self,
        layout: &FeatureLayout,
        zoom_range: ZoomRange,
    ) -> String {
        match &self.cache_version {
            Some(version) => version.clone(),
            None => derive_cache_version(layout, zoom_range),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
