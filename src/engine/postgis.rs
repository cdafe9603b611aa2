//! PostGIS-backed spatial engine.
//!
//! Each pooled connection is a dedicated `sqlx::PgConnection`; pooling and
//! admission control are handled by [`crate::pool::ConnectionPool`], not by
//! sqlx.

use async_trait::async_trait;
use sqlx::{Connection, PgConnection};
use tracing::{debug, info};

use crate::error::EngineError;

use super::layout::FeatureLayout;
use super::query::{TileParams, TileQuery};
use super::{ConnectionManager, SpatialConnection};

/// Functions the tile query depends on.
pub const REQUIRED_FUNCTIONS: &[&str] = &[
    "st_tileenvelope",
    "st_intersects",
    "st_simplify",
    "st_asmvtgeom",
    "st_asmvt",
];

// =============================================================================
// Connection
// =============================================================================

/// A single PostGIS connection.
pub struct PostgisConnection {
    conn: PgConnection,
}

#[async_trait]
impl SpatialConnection for PostgisConnection {
    async fn fetch_tile(
        &mut self,
        query: &TileQuery,
        params: &TileParams,
    ) -> Result<Option<Vec<u8>>, EngineError> {
        let payload: Option<Vec<u8>> = sqlx::query_scalar(query.sql())
            .bind(params.z)
            .bind(params.x)
            .bind(params.y)
            .bind(params.tolerance)
            .fetch_one(&mut self.conn)
            .await?;
        Ok(payload)
    }

    async fn ping(&mut self) -> Result<(), EngineError> {
        sqlx::query("SELECT 1").execute(&mut self.conn).await?;
        Ok(())
    }

    async fn close(self) -> Result<(), EngineError> {
        self.conn.close().await?;
        Ok(())
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Opens PostGIS connections and runs the startup capability check.
#[derive(Clone)]
pub struct PostgisManager {
    database_url: String,
    layout: FeatureLayout,
}

impl PostgisManager {
    /// Create a manager for the given database and feature table.
    pub fn new(database_url: impl Into<String>, layout: FeatureLayout) -> Self {
        Self {
            database_url: database_url.into(),
            layout,
        }
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }
}

impl std::fmt::Debug for PostgisManager {
    // The URL may carry credentials
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgisManager")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ConnectionManager for PostgisManager {
    type Connection = PostgisConnection;

    async fn connect(&self) -> Result<Self::Connection, EngineError> {
        let conn = PgConnection::connect(&self.database_url)
            .await
            .map_err(|e| EngineError::Connection(e.to_string()))?;
        Ok(PostgisConnection { conn })
    }

    async fn check(&self, conn: &mut Self::Connection) -> Result<(), EngineError> {
        let pg = &mut conn.conn;

        // Liveness
        let answer: i32 = sqlx::query_scalar("SELECT 42")
            .fetch_one(&mut *pg)
            .await
            .map_err(|e| EngineError::Capability(format!("liveness query failed: {}", e)))?;
        if answer != 42 {
            return Err(EngineError::Capability(format!(
                "liveness query returned {}",
                answer
            )));
        }
        debug!("Liveness check passed");

        // Spatial extension loaded
        sqlx::query("SELECT ST_AsText(ST_Point(1, 2))")
            .execute(&mut *pg)
            .await
            .map_err(|e| {
                EngineError::Capability(format!("spatial extension is not available: {}", e))
            })?;
        debug!("Spatial extension check passed");

        // Tiling and encoding functions
        let wanted: Vec<String> = REQUIRED_FUNCTIONS.iter().map(|s| s.to_string()).collect();
        let found: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT lower(proname)::text FROM pg_proc WHERE lower(proname) = ANY($1)",
        )
        .bind(wanted)
        .fetch_all(&mut *pg)
        .await
        .map_err(|e| EngineError::Capability(format!("function lookup failed: {}", e)))?;

        let missing = missing_functions(&found);
        if !missing.is_empty() {
            return Err(EngineError::Capability(format!(
                "missing spatial functions: {}",
                missing.join(", ")
            )));
        }
        debug!("Tile function check passed");

        // Feature table loaded and non-empty
        let has_rows: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS (SELECT 1 FROM {} LIMIT 1)",
            self.layout.quoted_table()
        ))
        .fetch_one(&mut *pg)
        .await
        .map_err(|e| {
            EngineError::Capability(format!(
                "feature table {} is not readable: {}",
                self.layout.table(),
                e
            ))
        })?;
        if !has_rows {
            return Err(EngineError::Capability(format!(
                "feature table {} is empty",
                self.layout.table()
            )));
        }

        info!(table = self.layout.table(), "Engine capability check passed");
        Ok(())
    }
}

/// Required functions absent from `found` (lower-case `pg_proc` names).
fn missing_functions(found: &[String]) -> Vec<&'static str> {
    REQUIRED_FUNCTIONS
        .iter()
        .copied()
        .filter(|f| !found.iter().any(|name| name.as_str() == *f))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
