//! Decoded tile cache.
//!
//! Neighbouring candidates overlap the same slide tiles, so decoded tiles
//! are kept in an LRU keyed by level and tile index.

use std::num::NonZeroUsize;
use std::sync::Arc;

use image::RgbaImage;
use lru::LruCache;
use tokio::sync::RwLock;

/// Default number of decoded tiles kept per slide (~64 MiB of 256x256 tiles).
pub const DEFAULT_TILE_CACHE_ENTRIES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub level: usize,
    pub index: usize,
}

/// LRU of decoded tiles shared by concurrent region reads.
pub struct TileCache {
    tiles: RwLock<LruCache<TileKey, Arc<RgbaImage>>>,
}

impl TileCache {
    /// A cache holding at most `capacity` tiles (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            tiles: RwLock::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Look up a tile, marking it as recently used.
    pub async fn get(&self, key: &TileKey) -> Option<Arc<RgbaImage>> {
        self.tiles.write().await.get(key).cloned()
    }

    pub async fn put(&self, key: TileKey, tile: Arc<RgbaImage>) {
        self.tiles.write().await.put(key, tile);
    }

    pub async fn len(&self) -> usize {
        self.tiles.read().await.len()
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new(DEFAULT_TILE_CACHE_ENTRIES)
    }
}
