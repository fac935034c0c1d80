//! Caller-owned registry of caches, tile grids and pyramids.
//!
//! A [`RenderContext`] renders encoded tiles of a variable through three
//! pyramid stages that share one tile grid:
//!
//! 1. `arr-{array_id}/{z}`: strided reads of the 2-D slice (not cached)
//! 2. `tra-{array_id}/{z}`: orientation and masking (memory cache)
//! 3. `rgb-{image_id}/{z}`: color mapping and encoding (file cache, if enabled)

use crate::array::{ArrayRef, SlicedArray};
use crate::config::RenderConfig;
use crate::node::{DecoratorImage, ImageRef, TileCache};
use crate::pyramid::ImagePyramid;
use crate::transform::{ArrayTransform, ColorMapping, ValidRange};
use crate::{PyramidError, Result};
use bytes::Bytes;
use renderer::{ColorRampRegistry, ImageFormat, ValueRange};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use storage::{Cache, CacheStats};
use tile_common::{tile_grid_for_variable, tiling_scheme_options_for, PixelRect, TileGrid};
use tracing::{debug, info};

/// A renderable variable of a dataset.
#[derive(Clone)]
pub struct Variable {
    pub dataset_id: String,
    pub name: String,
    pub array: ArrayRef,
    /// Longitude cell centers, one per column.
    pub lon: Vec<f64>,
    /// Latitude cell centers, one per row.
    pub lat: Vec<f64>,
    /// Optional per-cell `(lon, lat)` bounds.
    pub bounds: Option<(Vec<[f64; 2]>, Vec<[f64; 2]>)>,
    pub no_data: Option<f64>,
    pub valid_range: Option<ValidRange>,
}

impl Variable {
    pub fn new(
        dataset_id: impl Into<String>,
        name: impl Into<String>,
        array: ArrayRef,
        lon: Vec<f64>,
        lat: Vec<f64>,
    ) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            name: name.into(),
            array,
            lon,
            lat,
            bounds: None,
            no_data: None,
            valid_range: None,
        }
    }

    pub fn with_bounds(mut self, lon_bounds: Vec<[f64; 2]>, lat_bounds: Vec<[f64; 2]>) -> Self {
        self.bounds = Some((lon_bounds, lat_bounds));
        self
    }

    pub fn with_no_data(mut self, no_data: Option<f64>) -> Self {
        self.no_data = no_data;
        self
    }

    pub fn with_valid_range(mut self, valid_range: Option<ValidRange>) -> Self {
        self.valid_range = valid_range;
        self
    }

    fn shape(&self) -> &[usize] {
        self.array.shape()
    }
}

impl std::fmt::Debug for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variable")
            .field("dataset_id", &self.dataset_id)
            .field("name", &self.name)
            .field("shape", &self.shape())
            .finish()
    }
}

/// Per-request rendering parameters.
///
/// Unset values fall back to the context defaults; a NaN bound is replaced
/// by the NaN-ignoring minimum or maximum of the 2-D slice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderParams {
    /// One index per leading (non-spatial) dimension.
    #[serde(default)]
    pub leading_indices: Vec<usize>,
    pub color_ramp: Option<String>,
    pub value_min: Option<f64>,
    pub value_max: Option<f64>,
}

/// Snapshot of context state.
#[derive(Debug, Clone, Serialize)]
pub struct ContextStats {
    pub mem_cache: CacheStats,
    pub file_cache: Option<CacheStats>,
    pub num_pyramids: usize,
    pub num_tile_grids: usize,
}

type GridKey = (String, String, Vec<usize>);

/// Identity of a color-mapped pyramid, with request defaults filled in.
///
/// Value bounds are kept as bit patterns so NaN ("use the data range")
/// compares equal to itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PyramidKey {
    pub dataset_id: String,
    pub var_name: String,
    pub leading_indices: Vec<usize>,
    pub color_ramp: String,
    value_min: u64,
    value_max: u64,
}

impl PyramidKey {
    pub fn value_min(&self) -> f64 {
        f64::from_bits(self.value_min)
    }

    pub fn value_max(&self) -> f64 {
        f64::from_bits(self.value_max)
    }

    /// Id shared by the array-level pyramids, e.g. `era5-t2m-0,3`.
    pub fn array_id(&self) -> String {
        let indexers: Vec<String> = self.leading_indices.iter().map(|i| i.to_string()).collect();
        format!(
            "{}-{}-{}",
            escape_id_part(&self.dataset_id),
            escape_id_part(&self.var_name),
            indexers.join(",")
        )
    }

    /// Id of the color-mapped pyramid, e.g. `era5-t2m-0,3-jet-250-310`.
    pub fn image_id(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.array_id(),
            escape_id_part(&self.color_ramp),
            self.value_min(),
            self.value_max()
        )
    }
}

/// Percent-escape the id separators so distinct parts never join to the same id.
fn escape_id_part(part: &str) -> String {
    let mut escaped = String::with_capacity(part.len());
    for c in part.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '-' => escaped.push_str("%2D"),
            '/' => escaped.push_str("%2F"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn canonical_bits(value: f64) -> u64 {
    if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        // -0.0 and 0.0 select the same pyramid
        (value + 0.0).to_bits()
    }
}

/// Owns the tile caches and the pyramids built over them.
pub struct RenderContext {
    config: RenderConfig,
    ramps: ColorRampRegistry,
    image_format: ImageFormat,
    mem_cache: TileCache,
    file_cache: Option<TileCache>,
    tile_grids: Mutex<HashMap<GridKey, TileGrid>>,
    pyramids: Mutex<HashMap<PyramidKey, Arc<ImagePyramid>>>,
}

impl RenderContext {
    /// Create the caches described by `config` and load its color ramps.
    pub fn new(config: RenderConfig) -> Result<Self> {
        config.check()?;
        let image_format = config.image_format()?;

        let mut ramps = ColorRampRegistry::default();
        if let Some(path) = &config.color_ramp_file {
            ramps.load_json_file(path)?;
        }

        let mem_cache = Cache::memory(config.mem_tile_cache_capacity_bytes(), config.cache_threshold)?
            .with_name("mem-tiles");
        let file_cache = if config.file_tile_cache_enabled {
            let dir = config.file_tile_cache_path.join("tiles");
            let ext = format!(".{}", image_format.extension());
            let cache = Cache::file(
                dir,
                &ext,
                config.file_tile_cache_capacity_bytes(),
                config.cache_threshold,
            )?
            .with_name("file-tiles");
            Some(Arc::new(cache))
        } else {
            None
        };

        info!(
            mem_capacity_mb = config.mem_tile_cache_capacity_mb,
            file_cache = config.file_tile_cache_enabled,
            image_format = %image_format,
            "Created render context"
        );

        Ok(Self {
            config,
            ramps,
            image_format,
            mem_cache: Arc::new(mem_cache),
            file_cache,
            tile_grids: Mutex::new(HashMap::new()),
            pyramids: Mutex::new(HashMap::new()),
        })
    }

    /// Replace the color ramp registry.
    pub fn with_color_ramps(mut self, ramps: ColorRampRegistry) -> Self {
        self.ramps = ramps;
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn color_ramps(&self) -> &ColorRampRegistry {
        &self.ramps
    }

    pub fn image_format(&self) -> ImageFormat {
        self.image_format
    }

    pub fn mem_cache(&self) -> &TileCache {
        &self.mem_cache
    }

    pub fn file_cache(&self) -> Option<&TileCache> {
        self.file_cache.as_ref()
    }

    /// Tile grid of `var`, derived once per dataset, variable and shape.
    pub fn tile_grid(&self, var: &Variable) -> Result<TileGrid> {
        let key = (var.dataset_id.clone(), var.name.clone(), var.shape().to_vec());
        if let Some(grid) = self.lock_grids().get(&key) {
            return Ok(*grid);
        }

        let bounds = var
            .bounds
            .as_ref()
            .map(|(lon, lat)| (lon.as_slice(), lat.as_slice()));
        let grid = tile_grid_for_variable(
            var.shape(),
            &var.lon,
            &var.lat,
            bounds,
            self.config.preferred_tile_size,
            self.config.max_tile_size,
        )
        .ok_or_else(|| PyramidError::InvalidDimensions {
            shape: var.shape().to_vec(),
        })?;

        self.lock_grids().insert(key, grid);
        Ok(grid)
    }

    /// Client tiling-scheme document (`ol4.json`, `cesium.json`) for `var`.
    pub fn tiling_scheme(&self, var: &Variable, format: &str, url: &str) -> Result<serde_json::Value> {
        let grid = self.tile_grid(var)?;
        Ok(tiling_scheme_options_for(format, url, &grid)?)
    }

    /// Key of the color-mapped pyramid for `var` and `params`.
    pub fn pyramid_key(&self, var: &Variable, params: &RenderParams) -> PyramidKey {
        PyramidKey {
            dataset_id: var.dataset_id.clone(),
            var_name: var.name.clone(),
            leading_indices: params.leading_indices.clone(),
            color_ramp: self.ramp_name(params).to_string(),
            value_min: canonical_bits(params.value_min.unwrap_or(self.config.default_value_min)),
            value_max: canonical_bits(params.value_max.unwrap_or(self.config.default_value_max)),
        }
    }

    /// Id of the array-level pyramids of `var` at `params.leading_indices`.
    pub fn array_id(&self, var: &Variable, params: &RenderParams) -> String {
        self.pyramid_key(var, params).array_id()
    }

    /// Id of the color-mapped pyramid for `var` and `params`.
    pub fn image_id(&self, var: &Variable, params: &RenderParams) -> String {
        self.pyramid_key(var, params).image_id()
    }

    /// Encoded tile `(tile_x, tile_y)` of level `z`.
    pub fn get_tile(
        &self,
        var: &Variable,
        params: &RenderParams,
        tile_x: usize,
        tile_y: usize,
        z: usize,
    ) -> Result<Bytes> {
        let pyramid = self.get_or_create_pyramid(var, params)?;
        pyramid.get_tile(tile_x, tile_y, z)?.into_bytes()
    }

    /// The color-mapped pyramid for `var` and `params`, built on first use.
    pub fn get_or_create_pyramid(
        &self,
        var: &Variable,
        params: &RenderParams,
    ) -> Result<Arc<ImagePyramid>> {
        let key = self.pyramid_key(var, params);
        if let Some(pyramid) = self.lock_pyramids().get(&key) {
            return Ok(pyramid.clone());
        }

        let pyramid = Arc::new(self.create_pyramid(var, params, &key)?);
        // A concurrent request may have built the same pyramid; keep the first.
        let pyramid = self
            .lock_pyramids()
            .entry(key)
            .or_insert(pyramid)
            .clone();
        Ok(pyramid)
    }

    fn create_pyramid(
        &self,
        var: &Variable,
        params: &RenderParams,
        key: &PyramidKey,
    ) -> Result<ImagePyramid> {
        if var.shape().len() < 2 {
            return Err(PyramidError::InvalidDimensions {
                shape: var.shape().to_vec(),
            });
        }
        let ramp = self.ramps.get(&key.color_ramp)?;
        let grid = self.tile_grid(var)?;

        let array: ArrayRef = if var.shape().len() == 2 && params.leading_indices.is_empty() {
            var.array.clone()
        } else {
            Arc::new(SlicedArray::new(var.array.clone(), &params.leading_indices)?)
        };
        let range = self.resolve_range(&array, params)?;

        let array_id = key.array_id();
        let image_id = key.image_id();
        let arrays = ImagePyramid::from_array(
            array,
            grid,
            |z| format!("arr-{}/{}", array_id, z),
            None,
        )?;

        let transform = ArrayTransform::new()
            .with_flip_y(grid.inv_y)
            .with_no_data(var.no_data)
            .with_valid_range(var.valid_range);
        let transformed = arrays.apply(|level, z| {
            let image = DecoratorImage::decorate(
                format!("tra-{}/{}", array_id, z),
                level.clone(),
                transform.clone(),
            )
            .with_cache(Some(self.mem_cache.clone()))
            .with_log_perf(self.config.trace_perf);
            Arc::new(image) as ImageRef
        })?;

        let mapping = ColorMapping::new(range, ramp).with_format(Some(self.image_format));
        let pyramid = transformed.apply(|level, z| {
            let image = DecoratorImage::decorate(
                format!("rgb-{}/{}", image_id, z),
                level.clone(),
                mapping.clone(),
            )
            .with_cache(self.file_cache.clone())
            .with_log_perf(self.config.trace_perf);
            Arc::new(image) as ImageRef
        })?;

        let level_zero = pyramid.num_level_zero_tiles();
        info!(
            image_id = %image_id,
            num_levels = pyramid.num_levels(),
            tile_size = %pyramid.tile_size(),
            level_zero_tiles_x = level_zero.width,
            level_zero_tiles_y = level_zero.height,
            value_min = range.min,
            value_max = range.max,
            "Created image pyramid"
        );
        Ok(pyramid)
    }

    fn ramp_name<'a>(&'a self, params: &'a RenderParams) -> &'a str {
        params
            .color_ramp
            .as_deref()
            .unwrap_or(&self.config.default_color_ramp)
    }

    /// Fill in defaults and replace NaN bounds by the slice's data range.
    fn resolve_range(&self, array: &ArrayRef, params: &RenderParams) -> Result<ValueRange> {
        let min = params.value_min.unwrap_or(self.config.default_value_min);
        let max = params.value_max.unwrap_or(self.config.default_value_max);
        if !min.is_nan() && !max.is_nan() {
            return Ok(ValueRange::new(min, max));
        }

        let size = array.size();
        let slice = array.read_window(PixelRect::new(0, 0, size.width, size.height))?;
        let (data_min, data_max) = match slice.nan_min_max() {
            Some((lo, hi)) => (lo as f64, hi as f64),
            None => (f64::NAN, f64::NAN),
        };
        let range = ValueRange::new(
            if min.is_nan() { data_min } else { min },
            if max.is_nan() { data_max } else { max },
        );
        debug!(value_min = range.min, value_max = range.max, "Resolved value range from data");
        Ok(range)
    }

    /// Dispose and forget the pyramid with `image_id`.
    pub fn evict_pyramid(&self, image_id: &str) -> bool {
        let removed = {
            let mut pyramids = self.lock_pyramids();
            let key = pyramids.keys().find(|key| key.image_id() == image_id).cloned();
            key.and_then(|key| pyramids.remove(&key))
        };
        match removed {
            Some(pyramid) => {
                pyramid.dispose();
                true
            }
            None => false,
        }
    }

    /// Dispose every pyramid of `dataset_id`; returns how many were evicted.
    pub fn evict_dataset(&self, dataset_id: &str) -> usize {
        let removed: Vec<Arc<ImagePyramid>> = {
            let mut pyramids = self.lock_pyramids();
            let keys: Vec<PyramidKey> = pyramids
                .keys()
                .filter(|key| key.dataset_id == dataset_id)
                .cloned()
                .collect();
            keys.iter().filter_map(|key| pyramids.remove(key)).collect()
        };
        for pyramid in &removed {
            pyramid.dispose();
        }
        self.lock_grids().retain(|(dataset, _, _), _| dataset != dataset_id);
        removed.len()
    }

    /// Dispose all pyramids and empty every cache.
    pub fn clear(&self) {
        let pyramids: Vec<Arc<ImagePyramid>> =
            self.lock_pyramids().drain().map(|(_, p)| p).collect();
        for pyramid in &pyramids {
            pyramid.dispose();
        }
        self.lock_grids().clear();
        self.mem_cache.clear();
        if let Some(cache) = &self.file_cache {
            cache.clear();
        }
        info!(pyramids = pyramids.len(), "Cleared render context");
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            mem_cache: self.mem_cache.stats(),
            file_cache: self.file_cache.as_ref().map(|c| c.stats()),
            num_pyramids: self.lock_pyramids().len(),
            num_tile_grids: self.lock_grids().len(),
        }
    }

    fn lock_grids(&self) -> std::sync::MutexGuard<'_, HashMap<GridKey, TileGrid>> {
        self.tile_grids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pyramids(&self) -> std::sync::MutexGuard<'_, HashMap<PyramidKey, Arc<ImagePyramid>>> {
        self.pyramids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
