//! Router configuration for the vector tile server.
//!
//! This module defines the HTTP routes and applies middleware for CORS,
//! compression and request tracing.
//!
//! # Route Structure
//!
//! ```text
//! /                         - Service information
//! /health                   - Health check
//! /tiles/{z}/{x}/{y}[.pbf]  - Tile endpoint
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mvt_streamer::server::{create_router, RouterConfig};
//!
//! let service = Arc::new(TileService::new(pool, orchestrator, zoom_range, "v1"));
//!
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(service, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use http::header::CONTENT_TYPE;
use http::{HeaderName, Method};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    health_handler, index_handler, tile_handler, AppState, X_CACHE_KEY, X_CACHE_VERSION,
    X_TILE_CACHE_HIT,
};
use crate::engine::SpatialConnection;
use crate::tile::TileService;

/// Default Cache-Control max-age for tiles (one day).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 86_400;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,

    /// Whether to gzip responses the client accepts compressed
    pub enable_compression: bool,
}

impl RouterConfig {
    /// Create a new router configuration.
    ///
    /// By default:
    /// - CORS allows any origin
    /// - Cache max-age is one day (86400 seconds)
    /// - Tracing is enabled
    /// - Compression is enabled
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            enable_tracing: true,
            enable_compression: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Set the Cache-Control max-age in seconds.
    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Enable or disable gzip compression.
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.enable_compression = enabled;
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// The service is shared so the caller can still shut down its pool after
/// the server stops.
pub fn create_router<C>(tile_service: Arc<TileService<C>>, config: RouterConfig) -> Router
where
    C: SpatialConnection,
{
    let app_state = AppState::with_cache_max_age(tile_service, config.cache_max_age);
    let cors = build_cors_layer(&config);

    // Uses {filename} to capture "{y}", "{y}.pbf" and "{y}.mvt"
    let router = Router::new()
        .route("/", get(index_handler::<C>))
        .route("/health", get(health_handler::<C>))
        .route("/tiles/{z}/{x}/{filename}", get(tile_handler::<C>))
        .with_state(app_state)
        .layer(cors);

    let router = if config.enable_compression {
        router.layer(CompressionLayer::new().gzip(true))
    } else {
        router
    };

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .expose_headers([
            HeaderName::from_static(X_CACHE_VERSION),
            HeaderName::from_static(X_CACHE_KEY),
            HeaderName::from_static(X_TILE_CACHE_HIT),
        ])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
