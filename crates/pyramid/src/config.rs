//! Configuration for tile rendering and caching.

use crate::{PyramidError, Result};
use renderer::ImageFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a [`crate::RenderContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Memory budget for numeric tiles in megabytes.
    pub mem_tile_cache_capacity_mb: u64,

    /// Whether encoded tiles are also kept on disk.
    pub file_tile_cache_enabled: bool,

    /// Root directory of the file tile cache.
    pub file_tile_cache_path: PathBuf,

    /// Disk budget for encoded tiles in megabytes.
    pub file_tile_cache_capacity_mb: u64,

    /// Fraction of capacity that eviction shrinks a cache to.
    pub cache_threshold: f64,

    /// Preferred tile edge length; derived from the raster when unset.
    pub preferred_tile_size: Option<usize>,

    pub max_tile_size: usize,

    pub default_color_ramp: String,

    pub default_value_min: f64,

    pub default_value_max: f64,

    /// Output format name (`PNG`, `JPEG`, or a MIME type).
    pub image_format: String,

    /// Log per-tile step timings.
    pub trace_perf: bool,

    /// JSON file with additional color ramps.
    pub color_ramp_file: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            mem_tile_cache_capacity_mb: 256,
            file_tile_cache_enabled: false,
            file_tile_cache_path: PathBuf::from("./image-cache"),
            file_tile_cache_capacity_mb: 1024,
            cache_threshold: 0.75,
            preferred_tile_size: None,
            max_tile_size: 512,
            default_color_ramp: "jet".to_string(),
            default_value_min: 0.0,
            default_value_max: 1.0,
            image_format: "PNG".to_string(),
            trace_perf: false,
            color_ramp_file: None,
        }
    }
}

fn parse_bool(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

impl RenderConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("MEM_TILE_CACHE_CAPACITY_MB") {
            if let Ok(size) = val.parse() {
                config.mem_tile_cache_capacity_mb = size;
            }
        }

        if let Ok(val) = std::env::var("FILE_TILE_CACHE_ENABLED") {
            config.file_tile_cache_enabled = parse_bool(&val);
        }

        if let Ok(val) = std::env::var("FILE_TILE_CACHE_PATH") {
            config.file_tile_cache_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("FILE_TILE_CACHE_CAPACITY_MB") {
            if let Ok(size) = val.parse() {
                config.file_tile_cache_capacity_mb = size;
            }
        }

        if let Ok(val) = std::env::var("TILE_CACHE_THRESHOLD") {
            if let Ok(threshold) = val.parse() {
                config.cache_threshold = threshold;
            }
        }

        if let Ok(val) = std::env::var("PREFERRED_TILE_SIZE") {
            if let Ok(size) = val.parse() {
                config.preferred_tile_size = Some(size);
            }
        }

        if let Ok(val) = std::env::var("MAX_TILE_SIZE") {
            if let Ok(size) = val.parse() {
                config.max_tile_size = size;
            }
        }

        if let Ok(val) = std::env::var("DEFAULT_COLOR_RAMP") {
            config.default_color_ramp = val;
        }

        if let Ok(val) = std::env::var("DEFAULT_VALUE_MIN") {
            if let Ok(v) = val.parse() {
                config.default_value_min = v;
            }
        }

        if let Ok(val) = std::env::var("DEFAULT_VALUE_MAX") {
            if let Ok(v) = val.parse() {
                config.default_value_max = v;
            }
        }

        if let Ok(val) = std::env::var("TILE_IMAGE_FORMAT") {
            config.image_format = val;
        }

        if let Ok(val) = std::env::var("TRACE_PERF") {
            config.trace_perf = parse_bool(&val);
        }

        if let Ok(val) = std::env::var("COLOR_RAMP_FILE") {
            config.color_ramp_file = Some(PathBuf::from(val));
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.mem_tile_cache_capacity_mb == 0 {
            return Err("mem_tile_cache_capacity_mb must be > 0".to_string());
        }

        if self.file_tile_cache_enabled && self.file_tile_cache_capacity_mb == 0 {
            return Err("file_tile_cache_capacity_mb must be > 0".to_string());
        }

        if !(self.cache_threshold > 0.0 && self.cache_threshold <= 1.0) {
            return Err("cache_threshold must be in (0, 1]".to_string());
        }

        if self.max_tile_size == 0 || self.preferred_tile_size == Some(0) {
            return Err("tile sizes must be > 0".to_string());
        }

        if self.image_format.parse::<ImageFormat>().is_err() {
            return Err(format!("unknown image format '{}'", self.image_format));
        }

        Ok(())
    }

    /// Parsed output image format.
    pub fn image_format(&self) -> Result<ImageFormat> {
        Ok(self.image_format.parse()?)
    }

    /// Get the memory cache capacity in bytes.
    pub fn mem_tile_cache_capacity_bytes(&self) -> u64 {
        self.mem_tile_cache_capacity_mb * 1024 * 1024
    }

    /// Get the file cache capacity in bytes.
    pub fn file_tile_cache_capacity_bytes(&self) -> u64 {
        self.file_tile_cache_capacity_mb * 1024 * 1024
    }

    /// Validate, mapping failures to a configuration error.
    pub fn check(&self) -> Result<()> {
        self.validate().map_err(PyramidError::Config)
    }
}
