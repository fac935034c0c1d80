//! Lazily computed, cache-memoized tile pyramids over raster arrays.
//!
//! A pyramid is a stack of [`TiledImage`] levels sharing one
//! [`tile_common::TileGrid`]. Tiles are computed on demand and optionally
//! memoized in a [`storage::Cache`]:
//!
//! - [`array`]: the raster-array contract and in-memory implementations
//! - [`tile`]: numeric, RGBA and encoded tile payloads
//! - [`node`]: `OpImage` / `DecoratorImage` nodes with per-key single-flight
//! - [`transform`]: orientation/masking and color-mapping transforms
//! - [`downsample`]: strided reads and child-tile resize/aggregate nodes
//! - [`pyramid`]: `ImagePyramid` construction from images or arrays
//! - [`context`]: caller-owned registry of caches, tile grids and pyramids
//!
//! # Example
//!
//! ```ignore
//! use pyramid::{RenderConfig, RenderContext, RenderParams, Variable};
//!
//! let context = RenderContext::new(RenderConfig::from_env())?;
//! let var = Variable::new("era5", "t2m", array, lon, lat);
//! let png = context.get_tile(&var, &RenderParams::default(), 0, 0, 0)?;
//! ```

pub mod array;
pub mod config;
pub mod context;
pub mod downsample;
pub mod error;
pub mod node;
pub mod pyramid;
pub mod tile;
pub mod transform;

pub use array::{plane_index, ArrayRef, InMemoryArray, RasterArray, SlicedArray};
pub use config::RenderConfig;
pub use context::{ContextStats, PyramidKey, RenderContext, RenderParams, Variable};
pub use downsample::{
    downsample_2x, AggregatedImage, BlockAggregator, DownsampleMethod, QuadAggregate, QuadResize,
    ResizedImage, StridedImage, StridedRead,
};
pub use error::{PyramidError, Result};
pub use node::{
    tile_key, DecoratorImage, DecoratorOp, ImageLayout, ImageRef, OpImage, TileCache, TileOp,
    TileTransform, TiledImage,
};
pub use pyramid::{aggregate_levels, resize_levels, ImagePyramid};
pub use tile::{trim_tile, ArrayTile, EncodedTile, RgbaTile, Tile};
pub use transform::{ArrayTransform, ColorMapping, ValidRange};
