//! Common types shared by the tile pyramid crates.
//!
//! - [`GeoExtent`]: geographic bounds of a raster plus row orientation and
//!   antimeridian metadata, derived from 1-D coordinate arrays.
//! - [`TileGrid`]: the quad-tree tiling scheme (tile size, level count,
//!   level-zero tile counts) for a raster.
//! - [`scheme`]: map-client source descriptors built from a tile grid.

pub mod bbox;
pub mod error;
pub mod extent;
pub mod grid;
pub mod scheme;
pub mod tile;

pub use bbox::BoundingBox;
pub use error::{TileError, TileResult};
pub use extent::GeoExtent;
pub use grid::{tile_grid_for_variable, TileGrid};
pub use scheme::{tiling_scheme_options, tiling_scheme_options_for, TilingSchemeFormat};
pub use tile::{PixelRect, Size2D, TileCoord};
