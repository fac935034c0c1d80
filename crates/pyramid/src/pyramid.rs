//! Quad-tree image pyramids.
//!
//! Level 0 is the lowest resolution; each following level doubles the
//! resolution. All levels share the tile size of the pyramid's [`TileGrid`].

use crate::downsample::{BlockAggregator, QuadAggregate, QuadResize, StridedRead};
use crate::node::{ImageRef, TileCache};
use crate::{ArrayRef, PyramidError, Result, Tile};
use image::imageops::FilterType;
use rayon::prelude::*;
use std::sync::Arc;
use tile_common::{GeoExtent, Size2D, TileGrid};
use tracing::debug;

/// One tiled image per level of a tile grid.
#[derive(Clone)]
pub struct ImagePyramid {
    tile_grid: TileGrid,
    levels: Vec<ImageRef>,
}

impl std::fmt::Debug for ImagePyramid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePyramid")
            .field("tile_grid", &self.tile_grid)
            .field("levels", &self.levels.iter().map(|l| l.id()).collect::<Vec<_>>())
            .finish()
    }
}

impl ImagePyramid {
    /// Assemble a pyramid from `levels`, lowest resolution first.
    pub fn new(tile_grid: TileGrid, levels: Vec<ImageRef>) -> Result<Self> {
        if levels.len() != tile_grid.num_levels {
            return Err(PyramidError::shape(format!(
                "{} level images for a grid with {} levels",
                levels.len(),
                tile_grid.num_levels
            )));
        }
        if let Some(level) = levels.iter().find(|l| l.tile_size() != tile_grid.tile_size()) {
            return Err(PyramidError::shape(format!(
                "level '{}' has tile size {}, grid has {}",
                level.id(),
                level.tile_size(),
                tile_grid.tile_size()
            )));
        }
        Ok(Self { tile_grid, levels })
    }

    /// Build coarser levels from a full-resolution `source` image.
    ///
    /// `level_transformer(source, finer_level, step, id)` creates the level
    /// one step coarser than `finer_level`; `step` counts from 1 at the level
    /// just below full resolution. Level ids are `"{source_id}/{z}"`.
    pub fn from_image<F>(source: ImageRef, geo_extent: GeoExtent, mut level_transformer: F) -> Result<Self>
    where
        F: FnMut(&ImageRef, &ImageRef, usize, String) -> ImageRef,
    {
        let size = source.size();
        let tile_grid = TileGrid::with_tile_size(size.width, size.height, source.tile_size(), geo_extent)?;

        let num_levels = tile_grid.num_levels;
        let mut levels = Vec::with_capacity(num_levels);
        levels.push(source.clone());
        for step in 1..num_levels {
            let z = num_levels - 1 - step;
            let id = format!("{}/{}", source.id(), z);
            let finer = levels[step - 1].clone();
            levels.push(level_transformer(&source, &finer, step, id));
        }
        levels.reverse();

        debug!(
            source = source.id(),
            num_levels = num_levels,
            "Created pyramid from image"
        );
        Self::new(tile_grid, levels)
    }

    /// Read every level straight from `array` at the level's stride.
    ///
    /// Levels are independent of each other. Tiles are cached under
    /// `level_id(z)` when `cache` is given.
    pub fn from_array(
        array: ArrayRef,
        tile_grid: TileGrid,
        level_id: impl Fn(usize) -> String,
        cache: Option<TileCache>,
    ) -> Result<Self> {
        if array.shape().len() < 2 {
            return Err(PyramidError::InvalidDimensions {
                shape: array.shape().to_vec(),
            });
        }
        let levels = (0..tile_grid.num_levels)
            .map(|z| {
                let image = StridedRead::level_image(level_id(z), array.clone(), &tile_grid, z)
                    .with_cache(cache.clone());
                Arc::new(image) as ImageRef
            })
            .collect();
        Self::new(tile_grid, levels)
    }

    /// A new pyramid whose level `z` is `level_mapper(level_z, z)`.
    pub fn apply<F>(&self, mut level_mapper: F) -> Result<Self>
    where
        F: FnMut(&ImageRef, usize) -> ImageRef,
    {
        let levels = self
            .levels
            .iter()
            .enumerate()
            .map(|(z, level)| level_mapper(level, z))
            .collect();
        Self::new(self.tile_grid, levels)
    }

    pub fn tile_grid(&self) -> &TileGrid {
        &self.tile_grid
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn tile_size(&self) -> Size2D {
        self.tile_grid.tile_size()
    }

    pub fn num_level_zero_tiles(&self) -> Size2D {
        self.tile_grid.num_tiles(0)
    }

    pub fn level_image(&self, z: usize) -> Result<&ImageRef> {
        self.levels.get(z).ok_or(PyramidError::LevelOutOfRange {
            level: z,
            num_levels: self.levels.len(),
        })
    }

    /// Tile `(tile_x, tile_y)` of level `z`.
    pub fn get_tile(&self, tile_x: usize, tile_y: usize, z: usize) -> Result<Tile> {
        self.level_image(z)?.get_tile(tile_x, tile_y)
    }

    /// Compute every tile of level `z` in parallel; returns the tile count.
    pub fn prefetch_level(&self, z: usize) -> Result<usize> {
        let level = self.level_image(z)?;
        let num_tiles = level.num_tiles();
        (0..num_tiles.area()).into_par_iter().try_for_each(|i| {
            level
                .get_tile(i % num_tiles.width, i / num_tiles.width)
                .map(|_| ())
        })?;
        Ok(num_tiles.area())
    }

    /// Dispose every level, purging their cached tiles.
    pub fn dispose(&self) {
        for level in &self.levels {
            level.dispose();
        }
        debug!(num_levels = self.levels.len(), "Disposed pyramid");
    }
}

/// Level transformer resizing RGBA child tiles with `filter`.
pub fn resize_levels(
    filter: FilterType,
    cache: Option<TileCache>,
) -> impl FnMut(&ImageRef, &ImageRef, usize, String) -> ImageRef {
    move |_source, finer, _step, id| {
        Arc::new(QuadResize::image(id, finer.clone(), filter).with_cache(cache.clone())) as ImageRef
    }
}

/// Level transformer aggregating numeric child tiles with `aggregator`.
pub fn aggregate_levels<A>(
    aggregator: A,
    cache: Option<TileCache>,
) -> impl FnMut(&ImageRef, &ImageRef, usize, String) -> ImageRef
where
    A: BlockAggregator + Clone + 'static,
{
    move |_source, finer, _step, id| {
        Arc::new(QuadAggregate::image(id, finer.clone(), aggregator.clone()).with_cache(cache.clone()))
            as ImageRef
    }
}
