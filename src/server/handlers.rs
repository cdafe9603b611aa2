//! HTTP request handlers for the vector tile API.
//!
//! This module contains the Axum handlers for serving tiles and health checks.
//!
//! # Endpoints
//!
//! - `GET /` - Service information
//! - `GET /tiles/{z}/{x}/{y}` - Serve a tile (`{y}`, `{y}.pbf` or `{y}.mvt`)
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::engine::{SpatialConnection, TileOutcome};
use crate::error::{PoolError, TileError};
use crate::tile::{TileRequest, TileResponse, TileService};

/// Media type of a Mapbox Vector Tile payload.
pub const MVT_CONTENT_TYPE: &str = "application/vnd.mapbox-vector-tile";

/// Seconds a client should wait before retrying after a 503.
const RETRY_AFTER_SECS: u32 = 1;

pub const X_CACHE_VERSION: &str = "x-cache-version";
pub const X_CACHE_KEY: &str = "x-cache-key";
pub const X_TILE_CACHE_HIT: &str = "x-tile-cache-hit";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the tile service.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<C: SpatialConnection> {
    /// The tile service for processing tile requests
    pub tile_service: Arc<TileService<C>>,

    /// Cache-Control max-age in seconds for non-empty tiles
    pub cache_max_age: u32,
}

impl<C: SpatialConnection> AppState<C> {
    /// Create a new application state with the default max-age (one day).
    pub fn new(tile_service: Arc<TileService<C>>) -> Self {
        Self::with_cache_max_age(tile_service, super::routes::DEFAULT_CACHE_MAX_AGE)
    }

    /// Create a new application state with custom cache max-age.
    pub fn with_cache_max_age(tile_service: Arc<TileService<C>>, cache_max_age: u32) -> Self {
        Self {
            tile_service,
            cache_max_age,
        }
    }
}

impl<C: SpatialConnection> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            tile_service: Arc::clone(&self.tile_service),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from: `/tiles/{z}/{x}/{filename}`
/// where filename is `{y}`, `{y}.pbf` or `{y}.mvt`.
///
/// Segments are kept as text so that integers too large for `i64` still
/// reach coordinate validation instead of failing in the extractor.
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    /// Zoom level
    pub z: String,

    /// Tile column
    pub x: String,

    /// Tile row with optional extension (e.g., "7300" or "7300.pbf")
    pub filename: String,
}

impl TilePathParams {
    /// Parse the zoom level.
    pub fn z(&self) -> Option<i64> {
        parse_coordinate(&self.z)
    }

    /// Parse the tile column.
    pub fn x(&self) -> Option<i64> {
        parse_coordinate(&self.x)
    }

    /// Parse the row from the filename, stripping any tile extension.
    pub fn y(&self) -> Option<i64> {
        let y_str = self
            .filename
            .strip_suffix(".pbf")
            .or_else(|| self.filename.strip_suffix(".mvt"))
            .unwrap_or(&self.filename);
        parse_coordinate(y_str)
    }
}

/// Parse a signed decimal coordinate.
///
/// Integers outside the `i64` range saturate to `i64::MIN`/`i64::MAX`; no
/// tile grid reaches that far, so validation rejects them as out of range.
/// Returns `None` for anything that is not an optionally signed run of digits.
fn parse_coordinate(segment: &str) -> Option<i64> {
    let (negative, digits) = match segment.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, segment.strip_prefix('+').unwrap_or(segment)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    match segment.parse::<i64>() {
        Ok(value) => Some(value),
        Err(_) if negative => Some(i64::MIN),
        Err(_) => Some(i64::MAX),
    }
}

/// Query parameters for tile requests.
#[derive(Debug, Default, Deserialize)]
pub struct TileQueryParams {
    /// Cache version override
    #[serde(default)]
    pub v: Option<String>,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "out_of_range", "engine_error")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "unhealthy"
    pub status: String,

    /// Service version
    pub version: String,

    /// Why the check failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Total pooled connections
    pub pool_size: usize,

    /// Connections idle at the time of the check
    pub idle_connections: usize,
}

/// Service information returned from `/`.
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub name: String,
    pub version: String,

    /// URL template for tiles
    pub tiles: String,

    pub min_zoom: u8,
    pub max_zoom: u8,

    /// Cache version used when `v` is omitted
    pub cache_version: String,

    pub cache_entries: usize,
    pub cache_capacity: usize,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert TileError to HTTP response.
///
/// This implementation logs errors appropriately based on their severity:
/// - 4xx errors are logged at WARN level (404 at DEBUG)
/// - 5xx errors are logged at ERROR level
impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            // 404 Not Found
            TileError::OutOfRange { .. } => {
                (StatusCode::NOT_FOUND, "out_of_range", self.to_string())
            }

            // 400 Bad Request
            TileError::InvalidVersion { .. } => {
                (StatusCode::BAD_REQUEST, "invalid_version", self.to_string())
            }

            // 503 Service Unavailable - transient, safe to retry
            TileError::Pool(PoolError::Closed) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "pool_closed",
                self.to_string(),
            ),
            TileError::Pool(PoolError::ExhaustedTimeout(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "pool_exhausted",
                self.to_string(),
            ),

            // 500 Internal Server Error
            TileError::Pool(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "pool_error",
                self.to_string(),
            ),
            TileError::Engine(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "engine_error",
                self.to_string(),
            ),
        };

        // Log errors based on severity
        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Tile not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        let mut response = (status, Json(error_response)).into_response();

        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
        }

        response
    }
}

/// Errors a handler can return.
pub enum HandlerError {
    /// The tile service rejected or failed the request
    Tile(TileError),

    /// The request could not be parsed
    BadRequest(String),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            HandlerError::Tile(err) => err.into_response(),
            HandlerError::BadRequest(message) => {
                debug!(status = 400, "Bad request: {}", message);
                let status = StatusCode::BAD_REQUEST;
                let body = ErrorResponse::with_status("bad_request", message, status);
                (status, Json(body)).into_response()
            }
        }
    }
}

impl From<TileError> for HandlerError {
    fn from(err: TileError) -> Self {
        HandlerError::Tile(err)
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /tiles/{z}/{x}/{y}` (also `{y}.pbf` and `{y}.mvt`)
///
/// # Query Parameters
///
/// - `v`: Cache version override (default: the server's cache version)
///
/// # Response
///
/// - `200 OK`: MVT payload
/// - `204 No Content`: Valid tile with no features
/// - `400 Bad Request`: Non-numeric coordinate or invalid `v`
/// - `404 Not Found`: Zoom outside the served range, or x/y outside the grid
/// - `500 Internal Server Error`: Engine failure
/// - `503 Service Unavailable`: Pool closed or exhausted (with `Retry-After`)
///
/// # Headers
///
/// - `Content-Type: application/vnd.mapbox-vector-tile` (200 only)
/// - `Cache-Control: public, max-age={cache_max_age}` (200 only)
/// - `X-Cache-Version`, `X-Cache-Key`, `X-Tile-Cache-Hit`
pub async fn tile_handler<C: SpatialConnection>(
    State(state): State<AppState<C>>,
    Path(params): Path<TilePathParams>,
    Query(query): Query<TileQueryParams>,
) -> Result<Response, HandlerError> {
    let z = params
        .z()
        .ok_or_else(|| HandlerError::BadRequest(format!("Invalid zoom level: {}", params.z)))?;
    let x = params
        .x()
        .ok_or_else(|| HandlerError::BadRequest(format!("Invalid tile column: {}", params.x)))?;
    let y = params
        .y()
        .ok_or_else(|| HandlerError::BadRequest(format!("Invalid tile row: {}", params.filename)))?;

    let request = TileRequest {
        z,
        x,
        y,
        version: query.v,
    };

    let response = state.tile_service.get_tile(request).await?;
    Ok(tile_response(response, state.cache_max_age))
}

fn tile_response(response: TileResponse, cache_max_age: u32) -> Response {
    let mut headers = HeaderMap::new();
    // Versions are validated to a header-safe alphabet, so these always parse
    if let Ok(value) = HeaderValue::from_str(&response.version) {
        headers.insert(HeaderName::from_static(X_CACHE_VERSION), value);
    }
    if let Ok(value) = HeaderValue::from_str(&response.cache_key) {
        headers.insert(HeaderName::from_static(X_CACHE_KEY), value);
    }
    headers.insert(
        HeaderName::from_static(X_TILE_CACHE_HIT),
        HeaderValue::from_static(if response.cache_hit { "true" } else { "false" }),
    );

    match response.outcome {
        TileOutcome::Empty => (StatusCode::NO_CONTENT, headers).into_response(),
        TileOutcome::Tile(data) => {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(MVT_CONTENT_TYPE),
            );
            headers.insert(header::CACHE_CONTROL, cache_control_value(cache_max_age));
            (StatusCode::OK, headers, Body::from(data)).into_response()
        }
    }
}

/// `Cache-Control` value for a rendered tile.
fn cache_control_value(max_age: u32) -> HeaderValue {
    HeaderValue::from_str(&format!("public, max-age={}", max_age))
        .expect("ASCII digits are a valid header value")
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// Always `200 OK`; the body carries the verdict:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "pool_size": 4,
///   "idle_connections": 4
/// }
/// ```
pub async fn health_handler<C: SpatialConnection>(
    State(state): State<AppState<C>>,
) -> Json<HealthResponse> {
    let service = &state.tile_service;
    let result = service.health().await;

    let (status, error) = match result {
        Ok(()) => ("healthy", None),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            ("unhealthy", Some(e.to_string()))
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: crate::VERSION.to_string(),
        error,
        pool_size: service.pool().size(),
        idle_connections: service.pool().idle(),
    })
}

/// Handle service information requests.
///
/// # Endpoint
///
/// `GET /`
pub async fn index_handler<C: SpatialConnection>(
    State(state): State<AppState<C>>,
) -> Json<InfoResponse> {
    let service = &state.tile_service;
    let (cache_entries, cache_capacity) = service.cache_stats().await;
    let zoom = service.zoom_range();

    Json(InfoResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: crate::VERSION.to_string(),
        tiles: "/tiles/{z}/{x}/{y}.pbf".to_string(),
        min_zoom: zoom.min(),
        max_zoom: zoom.max(),
        cache_version: service.default_version().to_string(),
        cache_entries,
        cache_capacity,
    })
}

// =============================================================================
// Tests
// =============================================================================
