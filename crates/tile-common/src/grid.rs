//! Quad-tree tiling scheme derived from raster dimensions.

use crate::{GeoExtent, Size2D, TileError, TileResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Upper bound on pyramid depth; deeper grids fall back to a single level.
pub const MAX_NUM_LEVELS: usize = 24;

/// Smallest tile edge tried when searching for an exact decomposition.
pub const MIN_TILE_SIZE: usize = 64;

/// A quad-tree tiling scheme for one raster shape.
///
/// Level 0 is the lowest resolution. At level `L` the (padded) raster
/// measures `tile_size * num_level_zero_tiles * 2^L` pixels per axis.
/// `raster_width`/`raster_height` keep the unpadded native size so padded
/// edge pixels can be georeferenced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileGrid {
    pub num_levels: usize,
    pub num_level_zero_tiles_x: usize,
    pub num_level_zero_tiles_y: usize,
    pub tile_width: usize,
    pub tile_height: usize,
    pub raster_width: usize,
    pub raster_height: usize,
    pub geo_extent: GeoExtent,
    pub inv_y: bool,
}

impl TileGrid {
    /// Derive a tile grid for a `width` x `height` raster.
    ///
    /// Never fails: when no consistent decomposition exists the result is a
    /// single-level grid whose one tile covers the whole raster.
    pub fn create(
        width: usize,
        height: usize,
        preferred_tile_size: Option<usize>,
        max_tile_size: usize,
        geo_extent: GeoExtent,
    ) -> Self {
        match Self::try_create(width, height, preferred_tile_size, max_tile_size, geo_extent) {
            Ok(grid) => grid,
            Err(e) => {
                warn!(
                    width = width,
                    height = height,
                    preferred_tile_size = ?preferred_tile_size,
                    max_tile_size = max_tile_size,
                    error = %e,
                    "Falling back to single-level tile grid"
                );
                Self::single_level(width, height, geo_extent)
            }
        }
    }

    /// Like [`TileGrid::create`] but reports why no grid could be derived.
    ///
    /// With a preferred tile size (usually the storage chunk size) edge
    /// tiles may be padded. Without one, the largest tile size in
    /// `[MIN_TILE_SIZE, max_tile_size]` that divides the raster exactly and
    /// leaves the fewest level-zero tiles wins; padding is the last resort.
    pub fn try_create(
        width: usize,
        height: usize,
        preferred_tile_size: Option<usize>,
        max_tile_size: usize,
        geo_extent: GeoExtent,
    ) -> TileResult<Self> {
        if width == 0 || height == 0 {
            return Err(TileError::InvalidTileGrid(format!(
                "raster size {}x{} is empty",
                width, height
            )));
        }
        if max_tile_size == 0 {
            return Err(TileError::InvalidTileGrid(
                "maximum tile size is zero".to_string(),
            ));
        }

        if let Some(preferred) = preferred_tile_size {
            let tile_size = preferred.min(max_tile_size);
            return Self::with_tile_size(width, height, Size2D::new(tile_size, tile_size), geo_extent);
        }

        if let Some((tile_size, num_levels)) = exact_decomposition(width, height, max_tile_size) {
            let step = 1 << (num_levels - 1);
            return Ok(Self {
                num_levels,
                num_level_zero_tiles_x: width / tile_size / step,
                num_level_zero_tiles_y: height / tile_size / step,
                tile_width: tile_size,
                tile_height: tile_size,
                raster_width: width,
                raster_height: height,
                geo_extent,
                inv_y: geo_extent.inv_y,
            });
        }

        // One padded square root tile, halved until it fits.
        let max_size = width.max(height);
        let mut num_levels = 1;
        while max_size.div_ceil(1 << (num_levels - 1)) > max_tile_size {
            num_levels += 1;
            if num_levels > MAX_NUM_LEVELS {
                return Err(TileError::InvalidTileGrid(format!(
                    "{} levels exceed the maximum of {}",
                    num_levels, MAX_NUM_LEVELS
                )));
            }
        }
        let tile_size = max_size.div_ceil(1 << (num_levels - 1));

        Ok(Self {
            num_levels,
            num_level_zero_tiles_x: 1,
            num_level_zero_tiles_y: 1,
            tile_width: tile_size,
            tile_height: tile_size,
            raster_width: width,
            raster_height: height,
            geo_extent,
            inv_y: geo_extent.inv_y,
        })
    }

    /// Grid with a fixed (possibly non-square) tile size.
    ///
    /// Tile counts are halved (rounding up) until one axis has a single
    /// tile; each halving adds a level.
    pub fn with_tile_size(
        width: usize,
        height: usize,
        tile_size: Size2D,
        geo_extent: GeoExtent,
    ) -> TileResult<Self> {
        if width == 0 || height == 0 || tile_size.is_empty() {
            return Err(TileError::InvalidTileGrid(format!(
                "cannot tile {}x{} raster with {} tiles",
                width, height, tile_size
            )));
        }
        let mut nx = width.div_ceil(tile_size.width);
        let mut ny = height.div_ceil(tile_size.height);
        let mut num_levels = 1;
        while nx > 1 && ny > 1 {
            nx = nx.div_ceil(2);
            ny = ny.div_ceil(2);
            num_levels += 1;
        }
        if num_levels > MAX_NUM_LEVELS {
            return Err(TileError::InvalidTileGrid(format!(
                "{} levels exceed the maximum of {}",
                num_levels, MAX_NUM_LEVELS
            )));
        }

        Ok(Self {
            num_levels,
            num_level_zero_tiles_x: nx,
            num_level_zero_tiles_y: ny,
            tile_width: tile_size.width,
            tile_height: tile_size.height,
            raster_width: width,
            raster_height: height,
            geo_extent,
            inv_y: geo_extent.inv_y,
        })
    }

    /// Single-level grid with one tile covering the whole raster.
    pub fn single_level(width: usize, height: usize, geo_extent: GeoExtent) -> Self {
        Self {
            num_levels: 1,
            num_level_zero_tiles_x: 1,
            num_level_zero_tiles_y: 1,
            tile_width: width.max(1),
            tile_height: height.max(1),
            raster_width: width.max(1),
            raster_height: height.max(1),
            geo_extent,
            inv_y: geo_extent.inv_y,
        }
    }

    pub fn tile_size(&self) -> Size2D {
        Size2D::new(self.tile_width, self.tile_height)
    }

    /// Padded raster width in pixels at `level`.
    pub fn width(&self, level: usize) -> usize {
        self.tile_width * self.num_tiles_x(level)
    }

    /// Padded raster height in pixels at `level`.
    pub fn height(&self, level: usize) -> usize {
        self.tile_height * self.num_tiles_y(level)
    }

    pub fn size(&self, level: usize) -> Size2D {
        Size2D::new(self.width(level), self.height(level))
    }

    pub fn num_tiles_x(&self, level: usize) -> usize {
        self.num_level_zero_tiles_x << level
    }

    pub fn num_tiles_y(&self, level: usize) -> usize {
        self.num_level_zero_tiles_y << level
    }

    /// Number of tiles along each axis at `level`.
    pub fn num_tiles(&self, level: usize) -> Size2D {
        Size2D::new(self.num_tiles_x(level), self.num_tiles_y(level))
    }

    /// Pixel stride relative to full resolution at `level`.
    pub fn level_step(&self, level: usize) -> usize {
        1 << (self.num_levels - 1).saturating_sub(level)
    }

    /// True when the top level is larger than the raster.
    pub fn is_padded(&self) -> bool {
        let top = self.num_levels - 1;
        self.width(top) != self.raster_width || self.height(top) != self.raster_height
    }

    /// Degrees per pixel at `level`, based on the latitudinal span of the
    /// unpadded raster.
    pub fn resolution(&self, level: usize) -> f64 {
        self.geo_extent.height() / self.raster_height as f64 * self.level_step(level) as f64
    }

    /// Extent covered by the tiles, including padded edge pixels.
    ///
    /// Tiles are served north-up, so padding lies east of the raster and
    /// south of it, or north of it when the source rows run south to north.
    pub fn tiled_extent(&self) -> GeoExtent {
        if !self.is_padded() {
            return self.geo_extent;
        }
        let top = self.num_levels - 1;
        let extent = self.geo_extent;
        let res_x = extent.width() / self.raster_width as f64;
        let res_y = extent.height() / self.raster_height as f64;
        let pad_x = self.width(top).saturating_sub(self.raster_width) as f64 * res_x;
        let pad_y = self.height(top).saturating_sub(self.raster_height) as f64 * res_y;

        let mut east = extent.east + pad_x;
        if east > 180.0 {
            east -= 360.0;
        }
        let (south, north) = if self.inv_y {
            (extent.south, extent.north + pad_y)
        } else {
            (extent.south - pad_y, extent.north)
        };
        GeoExtent {
            west: extent.west,
            south,
            east,
            north,
            inv_y: extent.inv_y,
            crosses_antimeridian: extent.west > east,
        }
    }
}

/// Largest tile size and its level count that tile `width` x `height`
/// without padding, preferring the fewest level-zero tiles.
fn exact_decomposition(width: usize, height: usize, max_tile_size: usize) -> Option<(usize, usize)> {
    let min_tile_size = MIN_TILE_SIZE.min(width).min(height);
    let max_tile_size = max_tile_size.min(width).min(height);

    let mut best: Option<(usize, usize, usize)> = None;
    for tile_size in min_tile_size..=max_tile_size {
        if width % tile_size != 0 || height % tile_size != 0 {
            continue;
        }
        let (mut nx, mut ny) = (width / tile_size, height / tile_size);
        let mut num_levels = 1;
        while nx % 2 == 0 && ny % 2 == 0 && num_levels < MAX_NUM_LEVELS {
            nx /= 2;
            ny /= 2;
            num_levels += 1;
        }
        let num_level_zero_tiles = nx * ny;
        // Later (larger) sizes win ties.
        if best.map_or(true, |(n, _, _)| num_level_zero_tiles <= n) {
            best = Some((num_level_zero_tiles, tile_size, num_levels));
        }
    }
    best.map(|(_, tile_size, num_levels)| (tile_size, num_levels))
}

/// Derive the tile grid for a variable of `shape` (spatial dimensions last).
///
/// Returns `None` for arrays with fewer than two dimensions. A GeoExtent
/// that cannot be derived from the coordinates is replaced by the global
/// default so tile serving can proceed.
pub fn tile_grid_for_variable(
    shape: &[usize],
    lon: &[f64],
    lat: &[f64],
    bounds: Option<(&[[f64; 2]], &[[f64; 2]])>,
    preferred_tile_size: Option<usize>,
    max_tile_size: usize,
) -> Option<TileGrid> {
    if shape.len() < 2 {
        return None;
    }
    let height = shape[shape.len() - 2];
    let width = shape[shape.len() - 1];

    let (lon_bounds, lat_bounds) = match bounds {
        Some((lon_bounds, lat_bounds)) => (Some(lon_bounds), Some(lat_bounds)),
        None => (None, None),
    };
    let geo_extent = GeoExtent::from_coord_and_bounds_arrays(lon, lat, lon_bounds, lat_bounds)
        .unwrap_or_else(|e| {
            warn!(error = %e, "Cannot derive geographic extent, using global default");
            GeoExtent::default()
        });

    Some(TileGrid::create(
        width,
        height,
        preferred_tile_size,
        max_tile_size,
        geo_extent,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferred_tile_size() {
        let grid = TileGrid::create(2000, 1000, Some(250), 512, GeoExtent::default());
        assert_eq!(grid.num_levels, 3);
        assert_eq!(grid.num_level_zero_tiles_x, 2);
        assert_eq!(grid.num_level_zero_tiles_y, 1);
        assert_eq!(grid.tile_size(), Size2D::new(250, 250));
        assert_eq!(grid.width(2), 2000);
        assert_eq!(grid.height(2), 1000);
        assert_eq!(grid.num_tiles(0), Size2D::new(2, 1));
        assert_eq!(grid.level_step(0), 4);
        assert_eq!(grid.level_step(2), 1);
    }

    #[test]
    fn test_padded_edges() {
        let grid = TileGrid::create(1000, 700, Some(256), 512, GeoExtent::default());
        // 4x3 tiles -> 2x2 -> 1x1
        assert_eq!(grid.num_levels, 3);
        assert_eq!(grid.num_tiles(0), Size2D::new(1, 1));
        assert!(grid.width(2) >= 1000);
        assert!(grid.height(2) >= 700);
    }

    #[test]
    fn test_preferred_clamped_to_max() {
        let grid = TileGrid::create(4096, 4096, Some(2048), 512, GeoExtent::default());
        assert_eq!(grid.tile_width, 512);
        assert_eq!(grid.num_levels, 4);
    }

    #[test]
    fn test_without_preferred_finds_exact_tiling() {
        let grid = TileGrid::create(2000, 1000, None, 360, GeoExtent::default());
        assert_eq!(grid.tile_size(), Size2D::new(250, 250));
        assert_eq!(grid.num_level_zero_tiles_x, 2);
        assert_eq!(grid.num_level_zero_tiles_y, 1);
        assert_eq!(grid.num_levels, 3);
        assert_eq!(grid.size(2), Size2D::new(2000, 1000));
        assert!(!grid.is_padded());

        let grid = TileGrid::create(2000, 1000, None, 512, GeoExtent::default());
        assert_eq!(grid.tile_width, 500);
        assert_eq!(grid.num_tiles(0), Size2D::new(2, 1));
        assert_eq!(grid.num_levels, 2);
    }

    #[test]
    fn test_global_grid_native_resolution() {
        let grid = TileGrid::create(1440, 720, None, 512, GeoExtent::default());
        assert_eq!(grid.tile_size(), Size2D::new(360, 360));
        assert_eq!(grid.num_tiles(0), Size2D::new(2, 1));
        assert_eq!(grid.num_levels, 2);
        assert!((grid.resolution(1) - 0.25).abs() < 1e-9);
        assert!((grid.resolution(0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_no_exact_tiling_pads_one_root_tile() {
        // 997 is prime
        let grid = TileGrid::create(1000, 997, None, 512, GeoExtent::default());
        assert_eq!(grid.num_tiles(0), Size2D::new(1, 1));
        assert_eq!(grid.num_levels, 2);
        assert_eq!(grid.tile_width, 500);
        assert!(grid.is_padded());
        // resolution follows the real rows, not the padded ones
        assert!((grid.resolution(1) - 180.0 / 997.0).abs() < 1e-12);
    }

    #[test]
    fn test_small_raster_single_level() {
        let grid = TileGrid::create(100, 50, None, 512, GeoExtent::default());
        assert_eq!(grid.num_levels, 1);
        assert_eq!(grid.tile_size(), Size2D::new(50, 50));
        assert_eq!(grid.num_tiles(0), Size2D::new(2, 1));
        assert!(!grid.is_padded());
    }

    #[test]
    fn test_tiled_extent_covers_padding() {
        let extent = GeoExtent::new(0.0, 0.0, 10.0, 7.0, false).unwrap();
        let grid = TileGrid::create(1000, 700, Some(256), 512, extent);
        // 1024x1024 padded raster at 0.01 degrees per pixel
        let tiled = grid.tiled_extent();
        assert!((tiled.east - 10.24).abs() < 1e-9);
        assert!((tiled.south - (7.0 - 10.24)).abs() < 1e-9);
        assert_eq!(tiled.north, 7.0);
        assert!((grid.resolution(2) - 0.01).abs() < 1e-12);

        let flipped = GeoExtent::new(0.0, 0.0, 10.0, 7.0, true).unwrap();
        let tiled = TileGrid::create(1000, 700, Some(256), 512, flipped).tiled_extent();
        assert_eq!(tiled.south, 0.0);
        assert!((tiled.north - 10.24).abs() < 1e-9);
    }

    #[test]
    fn test_tiled_extent_wraps_past_antimeridian() {
        let extent = GeoExtent::new(175.0, 0.0, 179.0, 4.0, false).unwrap();
        let grid = TileGrid::create(400, 300, Some(256), 512, extent);
        let tiled = grid.tiled_extent();
        assert!(tiled.crosses_antimeridian);
        assert!((tiled.east - (175.0 + 5.12 - 360.0)).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_fallback() {
        let grid = TileGrid::create(0, 10, Some(256), 512, GeoExtent::default());
        assert_eq!(grid.num_levels, 1);
        assert_eq!(grid.num_level_zero_tiles_x, 1);
        assert_eq!(grid.num_level_zero_tiles_y, 1);

        let grid = TileGrid::create(300, 200, Some(0), 512, GeoExtent::default());
        assert_eq!(grid.num_levels, 1);
        assert_eq!(grid.tile_size(), Size2D::new(300, 200));

        assert!(TileGrid::try_create(300, 200, None, 0, GeoExtent::default()).is_err());
    }

    #[test]
    fn test_resolution() {
        let grid = TileGrid::create(360, 180, Some(90), 512, GeoExtent::default());
        assert_eq!(grid.num_levels, 2);
        assert!((grid.resolution(1) - 1.0).abs() < 1e-12);
        assert!((grid.resolution(0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_variable_needs_two_dims() {
        assert!(tile_grid_for_variable(&[10], &[0.0, 1.0], &[0.0, 1.0], None, None, 512).is_none());
    }

    #[test]
    fn test_variable_extent_fallback() {
        let grid = tile_grid_for_variable(&[4, 4], &[0.0], &[0.0], None, None, 512)
            .expect("grid for 2-D shape");
        assert_eq!(grid.geo_extent, GeoExtent::default());
    }

    #[test]
    fn test_with_non_square_tiles() {
        let grid =
            TileGrid::with_tile_size(1024, 300, Size2D::new(256, 100), GeoExtent::default())
                .unwrap();
        // 4x3 tiles -> 2x2 -> 1x1
        assert_eq!(grid.num_levels, 3);
        assert_eq!(grid.tile_size(), Size2D::new(256, 100));
        assert_eq!(grid.num_tiles(2), Size2D::new(4, 4));
        assert!(TileGrid::with_tile_size(10, 10, Size2D::new(0, 4), GeoExtent::default()).is_err());
    }
}
