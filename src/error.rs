use std::time::Duration;

use thiserror::Error;

/// Errors reported by the spatial query engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine rejected or failed to execute a query
    #[error("Query error: {0}")]
    Query(String),

    /// The connection to the engine is unusable
    #[error("Connection error: {0}")]
    Connection(String),

    /// A required engine capability is missing (extension, function, data)
    #[error("Missing capability: {0}")]
    Capability(String),
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::WorkerCrashed => EngineError::Connection(err.to_string()),
            _ => EngineError::Query(err.to_string()),
        }
    }
}

/// Errors raised by the connection pool.
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    /// The pool has been shut down
    #[error("Connection pool is closed")]
    Closed,

    /// No connection became available within the allowed wait
    #[error("Timed out after {0:?} waiting for a pooled connection")]
    ExhaustedTimeout(Duration),

    /// A connection could not be created or failed its capability check
    #[error("Startup check failed: {0}")]
    StartupCheckFailed(String),

    /// Pool size must be at least one
    #[error("Pool size must be greater than 0")]
    InvalidSize,
}

/// Errors that can occur when serving a tile.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Coordinate outside the configured zoom range or the 2^z grid
    #[error("Tile {z}/{x}/{y} is outside the supported range (zoom {min_zoom}-{max_zoom})")]
    OutOfRange {
        z: i64,
        x: i64,
        y: i64,
        min_zoom: u8,
        max_zoom: u8,
    },

    /// Requested cache version is not a safe token
    #[error("Invalid cache version {version:?}")]
    InvalidVersion { version: String },

    /// Could not obtain a pooled connection
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// The spatial engine failed to answer
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Errors in static configuration (layout identifiers, zoom range).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Identifier is not a plain SQL identifier
    #[error("Invalid identifier for {field}: {value:?}")]
    InvalidIdentifier { field: &'static str, value: String },

    /// Zoom range is empty or exceeds the supported maximum
    #[error("Invalid zoom range {min}-{max} (must satisfy min <= max <= {limit})")]
    InvalidZoomRange { min: u8, max: u8, limit: u8 },
}
