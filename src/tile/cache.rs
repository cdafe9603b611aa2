//! Versioned LRU cache for rendered vector tiles.
//!
//! # Cache Key
//!
//! Tiles are cached by a composite key including:
//! - Zoom level
//! - Tile X coordinate
//! - Tile Y coordinate
//! - Cache version
//!
//! # Invalidation
//!
//! There is no per-key delete. Changing the version component makes every
//! entry written under the previous version unreachable; those entries age
//! out through normal LRU eviction.
//!
//! # Empty Tiles
//!
//! A tile with no features is cached as [`TileOutcome::Empty`], so repeated
//! requests over empty areas never reach the engine twice.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::RwLock;

use crate::engine::TileOutcome;

use super::coord::TileCoordinate;

/// Default cache capacity in entries.
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 2048;

// =============================================================================
// Cache Key
// =============================================================================

/// Cache key for rendered tiles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    /// Zoom level
    pub z: u8,

    /// Tile X coordinate (0-indexed from left)
    pub x: u32,

    /// Tile Y coordinate (0-indexed from top)
    pub y: u32,

    /// Cache version the tile was rendered under
    pub version: Arc<str>,
}

impl TileCacheKey {
    /// Create a new cache key.
    pub fn new(z: u8, x: u32, y: u32, version: impl Into<Arc<str>>) -> Self {
        Self {
            z,
            x,
            y,
            version: version.into(),
        }
    }

    /// Create a key for a validated coordinate.
    pub fn for_coord(coord: &TileCoordinate, version: impl Into<Arc<str>>) -> Self {
        Self::new(coord.z(), coord.x(), coord.y(), version)
    }
}

impl fmt::Display for TileCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.version, self.z, self.x, self.y)
    }
}

// =============================================================================
// Tile Cache
// =============================================================================

/// LRU cache for rendered tiles with an entry-count capacity.
///
/// # Thread Safety
///
/// The cache is safe to share across tasks. The lock only protects the LRU
/// structure; two tasks missing on the same key may both render and both
/// `put`, and the later write simply replaces an identical entry.
///
/// # Example
///
/// ```
/// use mvt_streamer::engine::TileOutcome;
/// use mvt_streamer::tile::{TileCache, TileCacheKey};
/// use bytes::Bytes;
///
/// #[tokio::main]
/// async fn main() {
///     let cache = TileCache::new();
///
///     let key = TileCacheKey::new(14, 3680, 7300, "v1");
///     let tile = TileOutcome::Tile(Bytes::from_static(b"\x1a\x02"));
///
///     cache.put(key.clone(), tile.clone()).await;
///     assert_eq!(cache.get(&key).await, Some(tile));
///
///     // A different version never sees the old entry
///     let bumped = TileCacheKey::new(14, 3680, 7300, "v2");
///     assert_eq!(cache.get(&bumped).await, None);
/// }
/// ```
pub struct TileCache {
    cache: RwLock<LruCache<TileCacheKey, TileOutcome>>,
    capacity: NonZeroUsize,
}

impl TileCache {
    /// Create a new tile cache with default capacity (2048 entries).
    pub fn new() -> Self {
        Self::with_capacity(NonZeroUsize::new(DEFAULT_TILE_CACHE_CAPACITY).unwrap())
    }

    /// Create a new tile cache holding at most `capacity` entries.
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            cache: RwLock::new(LruCache::new(capacity)),
            capacity,
        }
    }

    /// Get a tile from the cache.
    ///
    /// Returns `None` on a miss. A hit marks the entry as recently used.
    pub async fn get(&self, key: &TileCacheKey) -> Option<TileOutcome> {
        let mut cache = self.cache.write().await;
        cache.get(key).cloned()
    }

    /// Check if a key is cached without updating LRU order.
    pub async fn contains(&self, key: &TileCacheKey) -> bool {
        let cache = self.cache.read().await;
        cache.contains(key)
    }

    /// Store a tile in the cache.
    ///
    /// Overwrites an existing entry for the same key. When the cache is full,
    /// the least-recently-used entry is evicted first.
    pub async fn put(&self, key: TileCacheKey, entry: TileOutcome) {
        let mut cache = self.cache.write().await;
        if let Some((evicted, _)) = cache.push(key, entry) {
            // push() hands back the old value on overwrite, which is not an eviction
            if !cache.contains(&evicted) {
                tracing::trace!(key = %evicted, "Evicted tile from cache");
            }
        }
    }

    /// Drop every entry.
    ///
    /// Operational escape hatch only; routine invalidation goes through the
    /// version component of the key.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
    }

    /// Get the current number of cached entries.
    pub async fn len(&self) -> usize {
        let cache = self.cache.read().await;
        cache.len()
    }

    /// Check if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        let cache = self.cache.read().await;
        cache.is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
