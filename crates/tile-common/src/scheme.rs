//! Map-client tiling-scheme descriptors built from a [`TileGrid`].

use crate::{GeoExtent, TileError, TileGrid, TileResult};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// Supported client descriptor formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TilingSchemeFormat {
    /// OpenLayers XYZ source options (`ol4.json`).
    OpenLayers,
    /// Cesium UrlTemplateImageryProvider options (`cesium.json`).
    Cesium,
}

impl TilingSchemeFormat {
    pub fn file_name(&self) -> &'static str {
        match self {
            TilingSchemeFormat::OpenLayers => "ol4.json",
            TilingSchemeFormat::Cesium => "cesium.json",
        }
    }
}

impl FromStr for TilingSchemeFormat {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ol4.json" | "ol4" => Ok(TilingSchemeFormat::OpenLayers),
            "cesium.json" | "cesium" => Ok(TilingSchemeFormat::Cesium),
            _ => Err(TileError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for TilingSchemeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Build the client options document for `grid` in the given format.
///
/// `url` is the tile URL template, e.g. `.../tiles/{z}/{x}/{y}.png`.
pub fn tiling_scheme_options(format: TilingSchemeFormat, url: &str, grid: &TileGrid) -> Value {
    match format {
        TilingSchemeFormat::OpenLayers => ol4_options(url, grid),
        TilingSchemeFormat::Cesium => cesium_options(url, grid),
    }
}

/// Parse `format` and build its options document.
pub fn tiling_scheme_options_for(format: &str, url: &str, grid: &TileGrid) -> TileResult<Value> {
    let format: TilingSchemeFormat = format.parse()?;
    Ok(tiling_scheme_options(format, url, grid))
}

fn ol4_options(url: &str, grid: &TileGrid) -> Value {
    // Tiles are served north-up whatever the source row order.
    let extent = grid.tiled_extent();
    let resolutions: Vec<f64> = (0..grid.num_levels).map(|level| grid.resolution(level)).collect();

    json!({
        "url": url,
        "projection": "EPSG:4326",
        "minZoom": 0,
        "maxZoom": grid.num_levels - 1,
        "tileGrid": {
            "extent": [extent.west, extent.south, extent.east, extent.north],
            "origin": [extent.west, extent.north],
            "tileSize": [grid.tile_width, grid.tile_height],
            "resolutions": resolutions,
        }
    })
}

fn rectangle(extent: &GeoExtent) -> Value {
    json!({
        "west": extent.west,
        "south": extent.south,
        "east": extent.east,
        "north": extent.north,
    })
}

fn cesium_options(url: &str, grid: &TileGrid) -> Value {
    json!({
        "url": url,
        "rectangle": rectangle(&grid.geo_extent),
        "minimumLevel": 0,
        "maximumLevel": grid.num_levels - 1,
        "tileWidth": grid.tile_width,
        "tileHeight": grid.tile_height,
        "tilingScheme": {
            "rectangle": rectangle(&grid.tiled_extent()),
            "numberOfLevelZeroTilesX": grid.num_level_zero_tiles_x,
            "numberOfLevelZeroTilesY": grid.num_level_zero_tiles_y,
        }
    })
}
