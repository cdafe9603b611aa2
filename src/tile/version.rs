//! Cache versions.
//!
//! A cache version is an opaque token mixed into every cache key. Requests
//! may override it with `?v=`, so it is also echoed back in response headers
//! and must stay a short, header-safe string.

use sha2::{Digest, Sha256};

use crate::engine::{FeatureLayout, MVT_BUFFER, MVT_EXTENT};

use super::coord::ZoomRange;
use super::simplify::TILE_SIZE_PIXELS;

/// Longest accepted cache version.
pub const MAX_VERSION_LEN: usize = 64;

/// Length of a derived version, in hex characters.
const DERIVED_VERSION_LEN: usize = 12;

/// Check that a version is 1-64 characters of `[A-Za-z0-9._-]`.
pub fn is_valid_cache_version(version: &str) -> bool {
    !version.is_empty()
        && version.len() <= MAX_VERSION_LEN
        && version
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

/// Derive a default version from everything that shapes a rendered tile.
///
/// Restarting with the same layout and zoom range yields the same version;
/// changing the table, columns, layer or encoding constants yields a new one,
/// which orphans every entry rendered under the old settings.
pub fn derive_cache_version(layout: &FeatureLayout, zoom_range: ZoomRange) -> String {
    let mut hasher = Sha256::new();
    hasher.update(crate::VERSION.as_bytes());
    hasher.update(b"\n");
    hasher.update(layout.table().as_bytes());
    hasher.update(b"\n");
    hasher.update(layout.id_column().as_bytes());
    hasher.update(b"\n");
    for attribute in layout.attributes() {
        hasher.update(attribute.as_bytes());
        hasher.update(b",");
    }
    hasher.update(b"\n");
    hasher.update(layout.geometry_column().as_bytes());
    hasher.update(b"\n");
    hasher.update(layout.layer().as_bytes());
    hasher.update(b"\n");
    hasher.update(layout.source_srid().to_be_bytes());
    hasher.update(MVT_EXTENT.to_be_bytes());
    hasher.update(MVT_BUFFER.to_be_bytes());
    hasher.update(TILE_SIZE_PIXELS.to_be_bytes());
    hasher.update([zoom_range.min(), zoom_range.max()]);

    let mut version = hex::encode(hasher.finalize());
    version.truncate(DERIVED_VERSION_LEN);
    version
}
