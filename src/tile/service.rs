//! Tile Service for orchestrating tile rendering.
//!
//! The TileService is the main entry point for tile requests. It orchestrates:
//! - Coordinate and version validation
//! - Cache lookups
//! - Connection borrowing from the pool
//! - Query execution on the spatial engine
//! - Result caching
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileService                             │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    get_tile()                           │    │
//! │  │  1. Validate coord    4. Borrow connection              │    │
//! │  │  2. Resolve version   5. Run query with zoom tolerance  │    │
//! │  │  3. Check cache       6. Release, cache & return        │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │    ┌───────────┐      ┌────────────────┐   ┌─────────────────┐  │
//! │    │ TileCache │      │ ConnectionPool │   │QueryOrchestrator│  │
//! │    └───────────┘      └────────────────┘   └─────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Engine failures are never cached: the next request for the same tile goes
//! back to the engine.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::{QueryOrchestrator, SpatialConnection, TileOutcome};
use crate::error::TileError;
use crate::pool::{ConnectionPool, PooledConnection};

use super::cache::{TileCache, TileCacheKey};
use super::coord::{TileCoordinate, ZoomRange};
use super::simplify::tolerance;
use super::version::is_valid_cache_version;

/// Longest a health check waits for a connection by default.
pub const HEALTH_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Tile Request
// =============================================================================

/// A request for a tile.
///
/// Coordinates are raw values straight off the wire; the service validates
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRequest {
    /// Zoom level
    pub z: i64,

    /// Tile column
    pub x: i64,

    /// Tile row
    pub y: i64,

    /// Cache version override. `None` (or empty) uses the service default.
    pub version: Option<String>,
}

impl TileRequest {
    /// Create a request under the default cache version.
    pub fn new(z: i64, x: i64, y: i64) -> Self {
        Self {
            z,
            x,
            y,
            version: None,
        }
    }

    /// Create a request with a cache version override.
    pub fn with_version(z: i64, x: i64, y: i64, version: impl Into<String>) -> Self {
        Self {
            z,
            x,
            y,
            version: Some(version.into()),
        }
    }
}

// =============================================================================
// Tile Response
// =============================================================================

/// Response from the tile service.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// The validated coordinate
    pub coord: TileCoordinate,

    /// Rendered payload or the empty marker
    pub outcome: TileOutcome,

    /// Whether this tile was served from cache
    pub cache_hit: bool,

    /// Cache version the tile belongs to
    pub version: Arc<str>,

    /// Cache key, formatted `version/z/x/y`
    pub cache_key: String,
}

// =============================================================================
// Tile Service
// =============================================================================

/// Service for rendering and caching vector tiles.
///
/// # Type Parameters
///
/// * `C` - The engine connection type held by the pool
///
/// # Example
///
/// ```ignore
/// use mvt_streamer::engine::{FeatureLayout, PostgisManager, QueryOrchestrator};
/// use mvt_streamer::pool::ConnectionPool;
/// use mvt_streamer::tile::{TileRequest, TileService, ZoomRange};
///
/// let layout = FeatureLayout::default();
/// let manager = PostgisManager::new(database_url, layout.clone());
/// let pool = ConnectionPool::initialize(4, &manager).await?;
/// let service = TileService::new(pool, QueryOrchestrator::new(&layout), ZoomRange::default(), "v1");
///
/// let response = service.get_tile(TileRequest::new(14, 3680, 7300)).await?;
/// println!("{} bytes, cache hit: {}", response.outcome.len(), response.cache_hit);
/// ```
pub struct TileService<C: SpatialConnection> {
    /// Engine connections
    pool: ConnectionPool<C>,

    /// Rendered tiles by version and coordinate
    cache: TileCache,

    /// Prepared tile query
    orchestrator: QueryOrchestrator,

    /// Zoom levels this service renders
    zoom_range: ZoomRange,

    /// Version used when a request does not override it
    default_version: Arc<str>,

    /// Bounded wait for a connection; `None` waits indefinitely
    acquire_timeout: Option<Duration>,
}

impl<C: SpatialConnection> TileService<C> {
    /// Create a new tile service with the default cache capacity.
    pub fn new(
        pool: ConnectionPool<C>,
        orchestrator: QueryOrchestrator,
        zoom_range: ZoomRange,
        default_version: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            pool,
            cache: TileCache::new(),
            orchestrator,
            zoom_range,
            default_version: default_version.into(),
            acquire_timeout: None,
        }
    }

    /// Replace the cache with an empty one of the given capacity.
    pub fn with_cache_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.cache = TileCache::with_capacity(capacity);
        self
    }

    /// Bound how long a request waits for a pooled connection.
    pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Get a tile, using cache when available.
    ///
    /// # Errors
    ///
    /// - [`TileError::OutOfRange`] for coordinates outside the zoom range or grid
    /// - [`TileError::InvalidVersion`] for a malformed version override
    /// - [`TileError::Pool`] if no connection could be borrowed
    /// - [`TileError::Engine`] if the query failed (nothing is cached)
    pub async fn get_tile(&self, request: TileRequest) -> Result<TileResponse, TileError> {
        let coord = TileCoordinate::validate(request.z, request.x, request.y, self.zoom_range)?;
        let version = self.resolve_version(request.version)?;

        let cache_key = TileCacheKey::for_coord(&coord, Arc::clone(&version));
        let key_string = cache_key.to_string();

        if let Some(outcome) = self.cache.get(&cache_key).await {
            debug!(key = %cache_key, "Tile cache hit");
            return Ok(TileResponse {
                coord,
                outcome,
                cache_hit: true,
                version,
                cache_key: key_string,
            });
        }

        let outcome = self.render(&coord).await?;
        self.cache.put(cache_key, outcome.clone()).await;

        Ok(TileResponse {
            coord,
            outcome,
            cache_hit: false,
            version,
            cache_key: key_string,
        })
    }

    /// Render a tile on the engine, bypassing the cache.
    ///
    /// The borrowed connection goes back to the pool before this returns,
    /// whether the query succeeded or not.
    pub async fn render(&self, coord: &TileCoordinate) -> Result<TileOutcome, TileError> {
        let mut conn = self.acquire().await?;
        let result = self
            .orchestrator
            .run(coord, tolerance(coord.z()), &mut *conn)
            .await;
        drop(conn);

        result.map_err(|e| {
            warn!(tile = %coord, error = %e, "Tile query failed");
            TileError::from(e)
        })
    }

    /// Borrow a connection and run a liveness query on it.
    ///
    /// Never waits longer than the acquire timeout, or
    /// [`HEALTH_ACQUIRE_TIMEOUT`] when none is configured.
    pub async fn health(&self) -> Result<(), TileError> {
        let timeout = self.acquire_timeout.unwrap_or(HEALTH_ACQUIRE_TIMEOUT);
        let mut conn = self.pool.acquire_timeout(timeout).await?;
        conn.ping().await?;
        Ok(())
    }

    /// Shut down the connection pool.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    /// Get tile cache statistics.
    ///
    /// Returns `(entry_count, capacity)`.
    pub async fn cache_stats(&self) -> (usize, usize) {
        (self.cache.len().await, self.cache.capacity())
    }

    /// Clear the tile cache.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    pub fn zoom_range(&self) -> ZoomRange {
        self.zoom_range
    }

    pub fn default_version(&self) -> &str {
        &self.default_version
    }

    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    async fn acquire(&self) -> Result<PooledConnection<C>, TileError> {
        let conn = match self.acquire_timeout {
            Some(timeout) => self.pool.acquire_timeout(timeout).await?,
            None => self.pool.acquire().await?,
        };
        Ok(conn)
    }

    fn resolve_version(&self, requested: Option<String>) -> Result<Arc<str>, TileError> {
        match requested {
            Some(v) if !v.is_empty() => {
                if is_valid_cache_version(&v) {
                    Ok(Arc::from(v))
                } else {
                    Err(TileError::InvalidVersion { version: v })
                }
            }
            _ => Ok(Arc::clone(&self.default_version)),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
