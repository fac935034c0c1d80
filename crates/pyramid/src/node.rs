//! Tiled image nodes.
//!
//! [`TiledImage`] is the tile-source contract every pyramid level fulfils.
//! [`OpImage`] implements it on top of a [`TileOp`] that computes single
//! tiles, adding optional cache memoization under `"{id}/{x}/{y}"`.
//! [`DecoratorImage`] is an `OpImage` whose op fetches the matching tile
//! of a source image and applies a pure [`TileTransform`] to it.

use crate::{PyramidError, Result, Tile};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use storage::Cache;
use tile_common::{PixelRect, Size2D};
use tracing::debug;

/// Shared handle to a tile cache.
pub type TileCache = Arc<Cache<Tile>>;

/// Shared handle to a tiled image node.
pub type ImageRef = Arc<dyn TiledImage>;

/// A lazily tiled image.
pub trait TiledImage: Send + Sync {
    /// Unique node id, used to build cache keys.
    fn id(&self) -> &str;

    /// Image size in pixels.
    fn size(&self) -> Size2D;

    fn tile_size(&self) -> Size2D;

    fn num_tiles(&self) -> Size2D;

    /// Get (computing if needed) tile `(tile_x, tile_y)`.
    fn get_tile(&self, tile_x: usize, tile_y: usize) -> Result<Tile>;

    /// Release cached tiles held for this node.
    fn dispose(&self);
}

/// Image geometry shared by all nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLayout {
    pub size: Size2D,
    pub tile_size: Size2D,
    pub num_tiles: Size2D,
}

impl ImageLayout {
    /// Layout covering `size` with as many `tile_size` tiles as needed.
    pub fn covering(size: Size2D, tile_size: Size2D) -> Self {
        Self {
            size,
            tile_size,
            num_tiles: size.tiles_for(tile_size),
        }
    }

    pub fn of(image: &dyn TiledImage) -> Self {
        Self {
            size: image.size(),
            tile_size: image.tile_size(),
            num_tiles: image.num_tiles(),
        }
    }
}

/// Computes single tiles for an [`OpImage`].
pub trait TileOp: Send + Sync {
    /// Compute tile `(tile_x, tile_y)` covering `rect` in image pixels.
    fn compute_tile(&self, tile_x: usize, tile_y: usize, rect: PixelRect) -> Result<Tile>;

    /// Dispose the images this op reads from, if it owns them.
    fn dispose_sources(&self) {}
}

/// Tile key of tile `(tile_x, tile_y)` in image `id`.
pub fn tile_key(id: &str, tile_x: usize, tile_y: usize) -> String {
    format!("{}/{}/{}", id, tile_x, tile_y)
}

/// Per-key locks so that concurrent misses compute a tile once.
#[derive(Default)]
struct SingleFlight {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SingleFlight {
    fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release(&self, key: &str, slot: &Arc<Mutex<()>>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(key);
        }
    }
}

/// An image computing its tiles through a [`TileOp`].
pub struct OpImage<O> {
    id: String,
    layout: ImageLayout,
    op: O,
    cache: Option<TileCache>,
    log_perf: bool,
    in_flight: SingleFlight,
}

impl<O: TileOp> OpImage<O> {
    pub fn new(id: impl Into<String>, layout: ImageLayout, op: O) -> Self {
        Self {
            id: id.into(),
            layout,
            op,
            cache: None,
            log_perf: false,
            in_flight: SingleFlight::default(),
        }
    }

    /// Memoize computed tiles in `cache`.
    pub fn with_cache(mut self, cache: Option<TileCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Emit per-step timings at debug level.
    pub fn with_log_perf(mut self, log_perf: bool) -> Self {
        self.log_perf = log_perf;
        self
    }

    pub fn op(&self) -> &O {
        &self.op
    }

    pub fn cache(&self) -> Option<&TileCache> {
        self.cache.as_ref()
    }

    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    fn timed<T>(&self, key: &str, step: &'static str, f: impl FnOnce() -> T) -> T {
        if !self.log_perf {
            return f();
        }
        let start = Instant::now();
        let result = f();
        debug!(
            tile = key,
            step = step,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Tile step"
        );
        result
    }

    fn compute(&self, key: &str, tile_x: usize, tile_y: usize) -> Result<Tile> {
        let rect = PixelRect::for_tile(tile_x, tile_y, self.layout.tile_size);
        self.timed(key, "compute tile", || {
            self.op.compute_tile(tile_x, tile_y, rect)
        })
    }

    fn check_range(&self, tile_x: usize, tile_y: usize) -> Result<()> {
        let num_tiles = self.layout.num_tiles;
        if tile_x >= num_tiles.width || tile_y >= num_tiles.height {
            return Err(PyramidError::TileOutOfRange {
                image_id: self.id.clone(),
                tile_x,
                tile_y,
                num_tiles_x: num_tiles.width,
                num_tiles_y: num_tiles.height,
            });
        }
        Ok(())
    }
}

impl<O: TileOp> TiledImage for OpImage<O> {
    fn id(&self) -> &str {
        &self.id
    }

    fn size(&self) -> Size2D {
        self.layout.size
    }

    fn tile_size(&self) -> Size2D {
        self.layout.tile_size
    }

    fn num_tiles(&self) -> Size2D {
        self.layout.num_tiles
    }

    fn get_tile(&self, tile_x: usize, tile_y: usize) -> Result<Tile> {
        self.check_range(tile_x, tile_y)?;
        let key = tile_key(&self.id, tile_x, tile_y);

        let Some(cache) = &self.cache else {
            return self.compute(&key, tile_x, tile_y);
        };

        if let Some(tile) = self.timed(&key, "queried cache", || cache.get(&key)) {
            return Ok(tile);
        }

        let slot = self.in_flight.slot(&key);
        let result = {
            let _turn = slot.lock().unwrap_or_else(PoisonError::into_inner);
            // Another thread may have stored the tile while we waited.
            match cache.contains(&key).then(|| cache.get(&key)).flatten() {
                Some(tile) => Ok(tile),
                None => self.compute(&key, tile_x, tile_y).map(|tile| {
                    self.timed(&key, "stored in cache", || cache.put(&key, tile.clone()));
                    tile
                }),
            }
        };
        self.in_flight.release(&key, &slot);
        result
    }

    fn dispose(&self) {
        if let Some(cache) = &self.cache {
            let num_tiles = self.layout.num_tiles;
            for tile_y in 0..num_tiles.height {
                for tile_x in 0..num_tiles.width {
                    cache.remove(&tile_key(&self.id, tile_x, tile_y));
                }
            }
        }
        self.op.dispose_sources();
    }
}

/// A pure per-tile transform applied by a [`DecoratorImage`].
pub trait TileTransform: Send + Sync {
    /// Source tile to fetch for target tile `(tile_x, tile_y)`.
    fn source_tile(&self, tile_x: usize, tile_y: usize, _num_tiles: Size2D) -> (usize, usize) {
        (tile_x, tile_y)
    }

    /// Derive the target tile from `source`.
    fn transform_tile(
        &self,
        tile_x: usize,
        tile_y: usize,
        rect: PixelRect,
        source: Tile,
    ) -> Result<Tile>;
}

/// Op fetching one source tile and transforming it.
pub struct DecoratorOp<T> {
    source: ImageRef,
    transform: T,
}

impl<T> DecoratorOp<T> {
    pub fn source(&self) -> &ImageRef {
        &self.source
    }

    pub fn transform(&self) -> &T {
        &self.transform
    }
}

impl<T: TileTransform> TileOp for DecoratorOp<T> {
    fn compute_tile(&self, tile_x: usize, tile_y: usize, rect: PixelRect) -> Result<Tile> {
        let (source_x, source_y) = self
            .transform
            .source_tile(tile_x, tile_y, self.source.num_tiles());
        let source = self.source.get_tile(source_x, source_y)?;
        self.transform.transform_tile(tile_x, tile_y, rect, source)
    }

    fn dispose_sources(&self) {
        self.source.dispose();
    }
}

/// An image with the layout of its source whose tiles are transformed
/// source tiles.
pub type DecoratorImage<T> = OpImage<DecoratorOp<T>>;

impl<T: TileTransform> OpImage<DecoratorOp<T>> {
    pub fn decorate(id: impl Into<String>, source: ImageRef, transform: T) -> Self {
        let layout = ImageLayout::of(source.as_ref());
        OpImage::new(id, layout, DecoratorOp { source, transform })
    }
}
