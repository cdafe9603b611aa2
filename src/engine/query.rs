//! Tile query construction and execution.
//!
//! One SQL statement renders one tile:
//!
//! 1. `ST_TileEnvelope(z, x, y)` gives the tile bounds in Web Mercator
//! 2. Features intersecting the bounds are selected (the bounds are moved into
//!    the storage SRID so the geometry index can be used)
//! 3. Each geometry is simplified with the zoom tolerance
//! 4. `ST_AsMVTGeom` clips to the tile at extent 4096 / buffer 256, returning
//!    NULL for geometries that vanish
//! 5. `ST_AsMVT` aggregates the surviving rows into one layer
//!
//! Table, column and layer names come from a validated [`FeatureLayout`]. The
//! tile coordinate and the tolerance are always bound as `$1..$4`.

use bytes::Bytes;
use tracing::debug;

use crate::error::EngineError;
use crate::tile::TileCoordinate;

use super::layout::{quote_ident, FeatureLayout, WEB_MERCATOR_SRID};
use super::SpatialConnection;

/// Tile-local coordinate extent passed to `ST_AsMVTGeom` / `ST_AsMVT`.
pub const MVT_EXTENT: u32 = 4096;

/// Clip buffer around the tile, in tile-local units.
pub const MVT_BUFFER: u32 = 256;

// =============================================================================
// Query
// =============================================================================

/// Bound parameters for a tile query, in placeholder order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileParams {
    /// `$1`
    pub z: i32,
    /// `$2`
    pub x: i32,
    /// `$3`
    pub y: i32,
    /// `$4`, simplification tolerance in meters
    pub tolerance: f64,
}

impl TileParams {
    pub fn new(coord: &TileCoordinate, tolerance: f64) -> Self {
        // Validated coordinates have z <= 30, so x and y fit in i32
        Self {
            z: i32::from(coord.z()),
            x: coord.x() as i32,
            y: coord.y() as i32,
            tolerance,
        }
    }
}

/// A prepared tile query for one feature layout.
///
/// The SQL text is built once; only [`TileParams`] change per request.
#[derive(Debug, Clone)]
pub struct TileQuery {
    sql: String,
    layer: String,
}

impl TileQuery {
    /// Build the query for a layout.
    pub fn new(layout: &FeatureLayout) -> Self {
        Self {
            sql: build_sql(layout),
            layer: layout.layer().to_string(),
        }
    }

    /// The SQL text with `$1..$4` placeholders.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Name of the MVT layer the query emits.
    pub fn layer(&self) -> &str {
        &self.layer
    }
}

fn build_sql(layout: &FeatureLayout) -> String {
    let geom = format!("t.{}", quote_ident(layout.geometry_column()));

    // Simplify in meters, so reproject first when storage is not Web Mercator
    let projected = if layout.needs_transform() {
        format!("ST_Transform({}, {})", geom, WEB_MERCATOR_SRID)
    } else {
        geom.clone()
    };
    let envelope = if layout.needs_transform() {
        format!("ST_Transform(bounds.geom, {})", layout.source_srid())
    } else {
        "bounds.geom".to_string()
    };

    let mut columns = vec![format!("t.{}", quote_ident(layout.id_column()))];
    columns.extend(
        layout
            .attributes()
            .iter()
            .map(|a| format!("t.{}", quote_ident(a))),
    );

    format!(
        "WITH bounds AS ( \
             SELECT ST_TileEnvelope($1, $2, $3) AS geom \
         ), \
         features AS ( \
             SELECT {columns}, \
                 ST_AsMVTGeom( \
                     ST_Simplify({projected}, $4), \
                     bounds.geom::box2d, \
                     {extent}, {buffer}, true \
                 ) AS mvt_geom \
             FROM {table} t, bounds \
             WHERE ST_Intersects({geom}, {envelope}) \
         ) \
         SELECT ST_AsMVT(features.*, '{layer}', {extent}, 'mvt_geom') \
         FROM features \
         WHERE features.mvt_geom IS NOT NULL",
        columns = columns.join(", "),
        projected = projected,
        extent = MVT_EXTENT,
        buffer = MVT_BUFFER,
        table = layout.quoted_table(),
        geom = geom,
        envelope = envelope,
        // Validated as a plain identifier, so it cannot contain a quote
        layer = layout.layer(),
    )
}

// =============================================================================
// Outcome
// =============================================================================

/// Result of rendering a tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileOutcome {
    /// Encoded MVT payload
    Tile(Bytes),

    /// No features survived clipping
    Empty,
}

impl TileOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, TileOutcome::Empty)
    }

    /// Payload size in bytes (0 for empty tiles).
    pub fn len(&self) -> usize {
        match self {
            TileOutcome::Tile(data) => data.len(),
            TileOutcome::Empty => 0,
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Runs tile queries on borrowed connections.
///
/// The orchestrator never retries; a failed query is reported as-is.
#[derive(Debug, Clone)]
pub struct QueryOrchestrator {
    query: TileQuery,
}

impl QueryOrchestrator {
    pub fn new(layout: &FeatureLayout) -> Self {
        Self {
            query: TileQuery::new(layout),
        }
    }

    pub fn query(&self) -> &TileQuery {
        &self.query
    }

    /// Render one tile on the given connection.
    ///
    /// A NULL or zero-length result is [`TileOutcome::Empty`], not an error.
    pub async fn run<C: SpatialConnection>(
        &self,
        coord: &TileCoordinate,
        tolerance: f64,
        conn: &mut C,
    ) -> Result<TileOutcome, EngineError> {
        let params = TileParams::new(coord, tolerance);
        let payload = conn.fetch_tile(&self.query, &params).await?;

        let outcome = match payload {
            Some(data) if !data.is_empty() => TileOutcome::Tile(Bytes::from(data)),
            _ => TileOutcome::Empty,
        };

        debug!(
            tile = %coord,
            tolerance,
            bytes = outcome.len(),
            "Rendered tile"
        );

        Ok(outcome)
    }
}

// =============================================================================
// Tests
// =============================================================================
