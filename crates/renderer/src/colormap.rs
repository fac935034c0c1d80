//! Named color ramps quantized to lookup tables.

use crate::{RenderError, RenderResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Default number of LUT entries per ramp.
pub const DEFAULT_NUM_COLORS: usize = 256;

/// Suffix selecting the reversed variant of a ramp.
pub const REVERSED_SUFFIX: &str = "_r";

/// Parse hex color string (`#rrggbb` or `rrggbb`) to RGB.
pub fn hex_to_rgb(hex: &str) -> Option<[u8; 3]> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }

    let r = u8::from_str_radix(&digits[0..2], 16).ok()?;
    let g = u8::from_str_radix(&digits[2..4], 16).ok()?;
    let b = u8::from_str_radix(&digits[4..6], 16).ok()?;

    Some([r, g, b])
}

/// A color ramp sampled into `num_colors` opaque RGBA entries.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorRamp {
    name: String,
    lut: Vec<[u8; 4]>,
}

impl ColorRamp {
    /// Build a ramp by linear interpolation between evenly spaced stops.
    pub fn from_stops(name: &str, stops: &[[u8; 3]], num_colors: usize) -> RenderResult<Self> {
        if stops.is_empty() {
            return Err(RenderError::EmptyColorRamp(name.to_string()));
        }
        let num_colors = num_colors.max(1);
        let segments = (stops.len() - 1) as f64;

        let lut = (0..num_colors)
            .map(|i| {
                if stops.len() == 1 {
                    let [r, g, b] = stops[0];
                    return [r, g, b, 255];
                }
                let t = if num_colors == 1 {
                    0.0
                } else {
                    i as f64 / (num_colors - 1) as f64
                };
                let pos = t * segments;
                let lower = (pos.floor() as usize).min(stops.len() - 2);
                let frac = pos - lower as f64;
                let (a, b) = (stops[lower], stops[lower + 1]);
                let mix = |c0: u8, c1: u8| (c0 as f64 + (c1 as f64 - c0 as f64) * frac).round() as u8;
                [mix(a[0], b[0]), mix(a[1], b[1]), mix(a[2], b[2]), 255]
            })
            .collect();

        Ok(Self {
            name: name.to_string(),
            lut,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_colors(&self) -> usize {
        self.lut.len()
    }

    pub fn colors(&self) -> &[[u8; 4]] {
        &self.lut
    }

    /// Color for a normalized value in [0, 1]; values outside are clamped.
    #[inline]
    pub fn color_at(&self, normalized: f64) -> [u8; 4] {
        let n = self.lut.len();
        let index = if normalized.is_nan() || normalized <= 0.0 {
            0
        } else {
            ((normalized * n as f64) as usize).min(n - 1)
        };
        self.lut[index]
    }

    /// The same ramp running from the last color to the first.
    pub fn reversed(&self) -> Self {
        let name = match self.name.strip_suffix(REVERSED_SUFFIX) {
            Some(base) => base.to_string(),
            None => format!("{}{}", self.name, REVERSED_SUFFIX),
        };
        let mut lut = self.lut.clone();
        lut.reverse();
        Self { name, lut }
    }
}

/// JSON layout for custom ramps: `{"ramps": {"name": ["#rrggbb", ...]}}`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ColorRampFile {
    pub ramps: HashMap<String, Vec<String>>,
}

const JET: &[[u8; 3]] = &[
    [0, 0, 128],
    [0, 0, 255],
    [0, 128, 255],
    [0, 255, 255],
    [128, 255, 128],
    [255, 255, 0],
    [255, 128, 0],
    [255, 0, 0],
    [128, 0, 0],
];

const VIRIDIS: &[[u8; 3]] = &[
    [68, 1, 84],
    [72, 40, 120],
    [62, 73, 137],
    [49, 104, 142],
    [38, 130, 142],
    [31, 158, 137],
    [53, 183, 121],
    [110, 206, 88],
    [181, 222, 43],
    [253, 231, 37],
];

const GREYS: &[[u8; 3]] = &[[255, 255, 255], [0, 0, 0]];

const GRAY: &[[u8; 3]] = &[[0, 0, 0], [255, 255, 255]];

const HOT: &[[u8; 3]] = &[[10, 0, 0], [255, 0, 0], [255, 255, 0], [255, 255, 255]];

const COOLWARM: &[[u8; 3]] = &[
    [59, 76, 192],
    [141, 176, 254],
    [221, 221, 221],
    [244, 154, 123],
    [180, 4, 38],
];

const RAINBOW: &[[u8; 3]] = &[
    [128, 0, 255],
    [0, 180, 235],
    [128, 255, 180],
    [255, 180, 100],
    [255, 0, 0],
];

const TEMPERATURE: &[[u8; 3]] = &[
    [102, 0, 214],
    [0, 51, 255],
    [0, 191, 255],
    [0, 255, 128],
    [255, 255, 0],
    [255, 128, 0],
    [255, 0, 0],
    [139, 0, 0],
];

const BUILTIN_RAMPS: &[(&str, &[[u8; 3]])] = &[
    ("jet", JET),
    ("viridis", VIRIDIS),
    ("greys", GREYS),
    ("gray", GRAY),
    ("hot", HOT),
    ("coolwarm", COOLWARM),
    ("rainbow", RAINBOW),
    ("temperature", TEMPERATURE),
];

/// Registry of named ramps; every ramp is also reachable reversed via `_r`.
#[derive(Debug, Clone)]
pub struct ColorRampRegistry {
    num_colors: usize,
    ramps: HashMap<String, Arc<ColorRamp>>,
}

impl Default for ColorRampRegistry {
    fn default() -> Self {
        Self::with_builtins(DEFAULT_NUM_COLORS)
    }
}

impl ColorRampRegistry {
    /// Empty registry producing ramps with `num_colors` LUT entries.
    pub fn new(num_colors: usize) -> Self {
        Self {
            num_colors: num_colors.clamp(1, 256),
            ramps: HashMap::new(),
        }
    }

    /// Registry holding the built-in ramps.
    pub fn with_builtins(num_colors: usize) -> Self {
        let mut registry = Self::new(num_colors);
        for (name, stops) in BUILTIN_RAMPS {
            // Built-in stop tables are never empty.
            if let Ok(ramp) = ColorRamp::from_stops(name, stops, registry.num_colors) {
                registry.insert(ramp);
            }
        }
        registry
    }

    /// Register a ramp (and its reversed variant) from RGB stops.
    pub fn register(&mut self, name: &str, stops: &[[u8; 3]]) -> RenderResult<()> {
        let ramp = ColorRamp::from_stops(name, stops, self.num_colors)?;
        self.insert(ramp);
        Ok(())
    }

    /// Register ramps from a JSON document of `#rrggbb` stops.
    ///
    /// Returns the number of ramps registered.
    pub fn load_json_str(&mut self, json: &str) -> RenderResult<usize> {
        let file: ColorRampFile = serde_json::from_str(json)?;
        let mut count = 0;
        for (name, colors) in &file.ramps {
            let stops = colors
                .iter()
                .map(|c| hex_to_rgb(c).ok_or_else(|| RenderError::InvalidColor(c.clone())))
                .collect::<RenderResult<Vec<_>>>()?;
            self.register(name, &stops)?;
            count += 1;
        }
        Ok(count)
    }

    /// Register ramps from a JSON file.
    pub fn load_json_file(&mut self, path: impl AsRef<Path>) -> RenderResult<usize> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| RenderError::RampFile {
            path: path.to_path_buf(),
            source,
        })?;
        let count = self.load_json_str(&content)?;
        info!(path = %path.display(), count = count, "Loaded custom color ramps");
        Ok(count)
    }

    /// Look up a ramp by name.
    pub fn get(&self, name: &str) -> RenderResult<Arc<ColorRamp>> {
        self.ramps
            .get(name)
            .cloned()
            .ok_or_else(|| RenderError::UnknownColorRamp(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ramps.contains_key(name)
    }

    /// All registered names (including reversed variants), sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ramps.keys().cloned().collect();
        names.sort();
        names
    }

    fn insert(&mut self, ramp: ColorRamp) {
        let reversed = ramp.reversed();
        self.ramps
            .insert(reversed.name().to_string(), Arc::new(reversed));
        self.ramps.insert(ramp.name().to_string(), Arc::new(ramp));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_to_rgb() {
        assert_eq!(hex_to_rgb("#FF0000"), Some([255, 0, 0]));
        assert_eq!(hex_to_rgb("#00ff00"), Some([0, 255, 0]));
        assert_eq!(hex_to_rgb("0000FF"), Some([0, 0, 255]));
        assert_eq!(hex_to_rgb("#GGGGGG"), None);
        assert_eq!(hex_to_rgb("#FFF"), None);
    }

    #[test]
    fn test_two_stop_ramp() {
        let ramp = ColorRamp::from_stops("bw", &[[0, 0, 0], [255, 255, 255]], 256).unwrap();
        assert_eq!(ramp.num_colors(), 256);
        assert_eq!(ramp.colors()[0], [0, 0, 0, 255]);
        assert_eq!(ramp.colors()[255], [255, 255, 255, 255]);
        assert_eq!(ramp.colors()[128], [128, 128, 128, 255]);
    }

    #[test]
    fn test_color_at_quantization() {
        let ramp = ColorRamp::from_stops("bw", &[[0, 0, 0], [255, 255, 255]], 4).unwrap();
        assert_eq!(ramp.color_at(0.0), ramp.colors()[0]);
        assert_eq!(ramp.color_at(0.24), ramp.colors()[0]);
        assert_eq!(ramp.color_at(0.25), ramp.colors()[1]);
        assert_eq!(ramp.color_at(1.0), ramp.colors()[3]);
        assert_eq!(ramp.color_at(7.0), ramp.colors()[3]);
        assert_eq!(ramp.color_at(-1.0), ramp.colors()[0]);
    }

    #[test]
    fn test_reversed() {
        let registry = ColorRampRegistry::default();
        let jet = registry.get("jet").unwrap();
        let jet_r = registry.get("jet_r").unwrap();
        assert_eq!(jet_r.name(), "jet_r");
        assert_eq!(jet.color_at(0.0), jet_r.color_at(1.0));
        assert_eq!(jet_r.reversed().name(), "jet");
    }

    #[test]
    fn test_builtins_present() {
        let registry = ColorRampRegistry::default();
        for name in ["jet", "viridis", "greys", "gray", "hot", "coolwarm", "rainbow", "temperature"] {
            assert!(registry.contains(name), "{}", name);
            assert!(registry.contains(&format!("{}_r", name)), "{}_r", name);
        }
        assert_eq!(registry.names().len(), 16);
    }

    #[test]
    fn test_unknown_ramp() {
        let registry = ColorRampRegistry::default();
        let err = registry.get("nope").unwrap_err();
        assert!(matches!(err, RenderError::UnknownColorRamp(_)));
        assert_eq!(err.http_status_code(), 400);
    }

    #[test]
    fn test_load_json() {
        let mut registry = ColorRampRegistry::new(16);
        let count = registry
            .load_json_str(r##"{"ramps": {"sea": ["#000080", "#00ffff"]}}"##)
            .unwrap();
        assert_eq!(count, 1);
        let sea = registry.get("sea").unwrap();
        assert_eq!(sea.num_colors(), 16);
        assert_eq!(sea.color_at(0.0), [0, 0, 128, 255]);
        assert_eq!(sea.color_at(1.0), [0, 255, 255, 255]);
        assert!(registry.contains("sea_r"));

        let err = registry
            .load_json_str(r##"{"ramps": {"bad": ["#zzzzzz"]}}"##)
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidColor(_)));
    }
}
