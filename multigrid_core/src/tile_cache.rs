//! Memoized tile rendering.
//!
//! Tiles are pure functions of the occupant's encoding, the highlight flag
//! and the tile geometry, so they are rendered once per key and shared for
//! the rest of the process. Entries are never evicted.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, OnceLock, PoisonError},
};

use tracing::debug;

use crate::{
    error::{Error, Result},
    grid::Entity,
    rendering::{Image, downsample, fill_coords, highlight_img, point_in_rect},
    world_object::OBJ_DIM,
};

/// Supersampling factor used by [`render_tile`].
pub const SUBDIVISIONS: usize = 3;

const GRID_LINE: [u8; 3] = [100, 100, 100];

/// Everything a rendered tile depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub object: Option<[i32; OBJ_DIM]>,
    pub highlight: bool,
    pub tile_size: usize,
    pub subdivisions: usize,
}

/// Thread-safe store of rendered tiles.
///
/// Tiles are handed out as `Arc<Image>`; they are immutable once cached.
#[derive(Debug, Default)]
pub struct TileCache {
    tiles: Mutex<HashMap<TileKey, Arc<Image>>>,
}

impl TileCache {
    /// An empty cache, independent of [`TileCache::global`].
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache.
    pub fn global() -> &'static TileCache {
        static CACHE: OnceLock<TileCache> = OnceLock::new();
        CACHE.get_or_init(TileCache::new)
    }

    /// Returns the tile for `entity`, rendering and caching it on a miss.
    ///
    /// `tile_size` and `subdivisions` must both be positive.
    pub fn render_tile(
        &self,
        entity: Option<&Entity>,
        highlight: bool,
        tile_size: usize,
        subdivisions: usize,
    ) -> Result<Arc<Image>> {
        if tile_size == 0 {
            return Err(Error::invalid("tile_size", tile_size));
        }
        if subdivisions == 0 {
            return Err(Error::invalid("subdivisions", subdivisions));
        }
        let key = TileKey {
            object: entity.map(Entity::encode),
            highlight,
            tile_size,
            subdivisions,
        };
        if let Some(tile) = self.lock().get(&key) {
            return Ok(Arc::clone(tile));
        }

        debug!(?key, "tile cache miss");
        // Rendered outside the lock; only complete tiles are ever inserted.
        let tile = Arc::new(draw_tile(entity, highlight, tile_size, subdivisions)?);
        let mut tiles = self.lock();
        Ok(Arc::clone(tiles.entry(key).or_insert(tile)))
    }

    /// Number of distinct tiles stored.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TileKey, Arc<Image>>> {
        // Entries are inserted whole, so a poisoned map is still consistent.
        self.tiles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Renders a tile through the process-wide cache.
pub fn render_tile(entity: Option<&Entity>, highlight: bool, tile_size: usize) -> Result<Arc<Image>> {
    TileCache::global().render_tile(entity, highlight, tile_size, SUBDIVISIONS)
}

fn draw_tile(
    entity: Option<&Entity>,
    highlight: bool,
    tile_size: usize,
    subdivisions: usize,
) -> Result<Image> {
    let side = tile_size * subdivisions;
    let mut img = Image::new(side, side);

    // grid lines along the top and left edges
    fill_coords(&mut img, point_in_rect(0.0, 0.031, 0.0, 1.0), GRID_LINE);
    fill_coords(&mut img, point_in_rect(0.0, 1.0, 0.0, 0.031), GRID_LINE);

    if let Some(entity) = entity {
        entity.render(&mut img)?;
    }
    if highlight {
        highlight_img(&mut img);
    }
    downsample(&img, subdivisions)
}
