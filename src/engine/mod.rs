//! Spatial query engine abstraction.
//!
//! The tile pipeline never talks to a database directly. It borrows a
//! [`SpatialConnection`] from the pool and hands it a prepared [`TileQuery`].
//! Connections are created and vetted by a [`ConnectionManager`].
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! └────────────────────┬────────────────────┘
//!                      │ borrow
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │     ConnectionPool<SpatialConnection>   │
//! └────────────────────┬────────────────────┘
//!                      │ fetch_tile(query, params)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │     PostGIS (ST_TileEnvelope, ST_AsMVT) │
//! └─────────────────────────────────────────┘
//! ```

mod layout;
mod postgis;
mod query;

use async_trait::async_trait;

use crate::error::EngineError;

pub use layout::{FeatureLayout, DEFAULT_SOURCE_SRID, WEB_MERCATOR_SRID};
pub use postgis::{PostgisConnection, PostgisManager, REQUIRED_FUNCTIONS};
pub use query::{
    QueryOrchestrator, TileOutcome, TileParams, TileQuery, MVT_BUFFER, MVT_EXTENT,
};

// =============================================================================
// Connection Traits
// =============================================================================

/// A long-lived handle to the spatial query engine.
///
/// Connections are owned by the pool and lent to one request at a time, so
/// methods take `&mut self`.
#[async_trait]
pub trait SpatialConnection: Send + Sized + 'static {
    /// Execute a tile query and return the single bytea result.
    ///
    /// `Ok(None)` means the engine produced no payload (SQL NULL).
    async fn fetch_tile(
        &mut self,
        query: &TileQuery,
        params: &TileParams,
    ) -> Result<Option<Vec<u8>>, EngineError>;

    /// Run a trivial liveness query.
    async fn ping(&mut self) -> Result<(), EngineError>;

    /// Close the connection gracefully.
    async fn close(self) -> Result<(), EngineError>;
}

/// Creates connections and verifies they can serve tiles.
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    /// The connection type this manager creates.
    type Connection: SpatialConnection;

    /// Open a new connection.
    async fn connect(&self) -> Result<Self::Connection, EngineError>;

    /// Verify a fresh connection has everything the tile query needs.
    async fn check(&self, conn: &mut Self::Connection) -> Result<(), EngineError>;
}
