//! Tile coordinate validation.
//!
//! Coordinates follow the standard XYZ quad-tree scheme: at zoom `z` the
//! world is split into a `2^z × 2^z` grid, with `(0, 0)` at the top-left.
//! A [`TileCoordinate`] can only be obtained through [`TileCoordinate::validate`],
//! so holding one means the zoom is within the service's [`ZoomRange`] and the
//! column/row fall inside the grid.

use std::fmt;

use crate::error::{ConfigError, TileError};

/// Highest zoom level that can be represented (`2^30` fits in `u32`).
pub const MAX_SUPPORTED_ZOOM: u8 = 30;

/// Default lowest zoom served.
pub const DEFAULT_MIN_ZOOM: u8 = 8;

/// Default highest zoom served.
pub const DEFAULT_MAX_ZOOM: u8 = 22;

// =============================================================================
// Zoom Range
// =============================================================================

/// Inclusive range of zoom levels the service renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomRange {
    min: u8,
    max: u8,
}

impl ZoomRange {
    /// Create a zoom range, rejecting `min > max` and zooms above
    /// [`MAX_SUPPORTED_ZOOM`].
    pub fn new(min: u8, max: u8) -> Result<Self, ConfigError> {
        if min > max || max > MAX_SUPPORTED_ZOOM {
            return Err(ConfigError::InvalidZoomRange {
                min,
                max,
                limit: MAX_SUPPORTED_ZOOM,
            });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u8 {
        self.min
    }

    pub fn max(&self) -> u8 {
        self.max
    }

    /// Check whether a zoom level lies within the range.
    pub fn contains(&self, z: i64) -> bool {
        z >= i64::from(self.min) && z <= i64::from(self.max)
    }
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_ZOOM,
            max: DEFAULT_MAX_ZOOM,
        }
    }
}

// =============================================================================
// Tile Coordinate
// =============================================================================

/// A validated tile coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoordinate {
    z: u8,
    x: u32,
    y: u32,
}

impl TileCoordinate {
    /// Validate a raw `(z, x, y)` triple against a zoom range.
    ///
    /// Inputs are taken as `i64` so that negative or oversized values coming
    /// off the wire are rejected here rather than by an unrelated parse error.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::OutOfRange`] if `z` is outside `range`, or if `x`
    /// or `y` fall outside `[0, 2^z)`.
    pub fn validate(z: i64, x: i64, y: i64, range: ZoomRange) -> Result<Self, TileError> {
        let out_of_range = || TileError::OutOfRange {
            z,
            x,
            y,
            min_zoom: range.min(),
            max_zoom: range.max(),
        };

        if !range.contains(z) {
            return Err(out_of_range());
        }

        // z <= MAX_SUPPORTED_ZOOM here, so the shift cannot overflow.
        let limit = 1i64 << z;
        if !(0..limit).contains(&x) || !(0..limit).contains(&y) {
            return Err(out_of_range());
        }

        Ok(Self {
            z: z as u8,
            x: x as u32,
            y: y as u32,
        })
    }

    pub fn z(&self) -> u8 {
        self.z
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    /// Number of tiles along one edge of the grid at this zoom.
    pub fn grid_size(&self) -> u64 {
        1u64 << self.z
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

// =============================================================================
// Tests
// =============================================================================
