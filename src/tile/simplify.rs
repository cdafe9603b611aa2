//! Zoom-dependent simplification tolerance.
//!
//! The tolerance handed to the engine is half the ground size of one pixel at
//! the requested zoom, in Web Mercator meters. Simplifying within half a pixel
//! is visually lossless at that zoom while removing most vertices at low zooms.
//! The formula is fixed: changing it changes rendered output.

/// Web Mercator projected circumference of the Earth, in meters.
pub const EARTH_CIRCUMFERENCE_METERS: f64 = 40_075_016.68;

/// Edge length of a rendered tile, in pixels.
pub const TILE_SIZE_PIXELS: f64 = 256.0;

/// Ground resolution in meters per pixel at zoom `z`.
pub fn ground_resolution(z: u8) -> f64 {
    EARTH_CIRCUMFERENCE_METERS / (TILE_SIZE_PIXELS * 2f64.powi(i32::from(z)))
}

/// Simplification tolerance in meters for zoom `z` (half a pixel).
pub fn tolerance(z: u8) -> f64 {
    ground_resolution(z) * 0.5
}
