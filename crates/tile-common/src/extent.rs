//! Geographic extent of a raster derived from its coordinate arrays.

use crate::{BoundingBox, TileError, TileResult};
use serde::{Deserialize, Serialize};

/// Tolerance used when comparing longitudes and latitudes against the globe limits.
const EPS: f64 = 1e-9;

/// Rectangular geographic extent of a raster, in degrees.
///
/// When `crosses_antimeridian` is set the extent wraps through ±180° and
/// `west > east` numerically. `inv_y` is set when the source rows run
/// south to north, so a north-up tile needs a vertical flip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoExtent {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    pub inv_y: bool,
    pub crosses_antimeridian: bool,
}

impl Default for GeoExtent {
    /// The whole globe, north-up, not wrapping.
    fn default() -> Self {
        Self {
            west: -180.0,
            south: -90.0,
            east: 180.0,
            north: 90.0,
            inv_y: false,
            crosses_antimeridian: false,
        }
    }
}

impl GeoExtent {
    /// Create a validated extent.
    ///
    /// Longitudes must lie in [-180, 180], latitudes in [-90, 90] with
    /// `south < north`. Antimeridian crossing is inferred from `west > east`.
    pub fn new(west: f64, south: f64, east: f64, north: f64, inv_y: bool) -> TileResult<Self> {
        for (name, value) in [("west", west), ("south", south), ("east", east), ("north", north)] {
            if !value.is_finite() {
                return Err(TileError::InvalidExtent(format!("{} is not finite: {}", name, value)));
            }
        }
        if !(-180.0..=180.0).contains(&west) || !(-180.0..=180.0).contains(&east) {
            return Err(TileError::InvalidExtent(format!(
                "longitudes out of range: west={}, east={}",
                west, east
            )));
        }
        if !(-90.0..=90.0).contains(&south) || !(-90.0..=90.0).contains(&north) || south >= north {
            return Err(TileError::InvalidExtent(format!(
                "latitudes out of range: south={}, north={}",
                south, north
            )));
        }
        Ok(Self {
            west,
            south,
            east,
            north,
            inv_y,
            crosses_antimeridian: west > east,
        })
    }

    /// Derive an extent from 1-D cell-center coordinate arrays.
    ///
    /// Cell edges are inferred by padding the outermost centers with half the
    /// minimum adjacent spacing.
    pub fn from_coord_arrays(lon: &[f64], lat: &[f64]) -> TileResult<Self> {
        Self::from_coord_and_bounds_arrays(lon, lat, None, None)
    }

    /// Derive an extent from cell-center coordinates and optional per-cell
    /// bound pairs.
    ///
    /// When bounds are given, the first and last bound pair of each axis
    /// define the outer edges; otherwise edges are padded by half a cell.
    pub fn from_coord_and_bounds_arrays(
        lon: &[f64],
        lat: &[f64],
        lon_bounds: Option<&[[f64; 2]]>,
        lat_bounds: Option<&[[f64; 2]]>,
    ) -> TileResult<Self> {
        let (raw_west, raw_east) = axis_edges("lon", lon, lon_bounds)?;
        let (lat_first, lat_last) = axis_edges("lat", lat, lat_bounds)?;

        let (west, east) = if (raw_east - raw_west).abs() >= 360.0 - EPS {
            // Whole-globe coverage, reported without wraparound.
            (-180.0, 180.0)
        } else {
            (normalize_lon(raw_west), normalize_lon(raw_east))
        };

        let south = lat_first.min(lat_last).max(-90.0);
        let north = lat_first.max(lat_last).min(90.0);
        let inv_y = lat[lat.len() - 1] > lat[0];

        Self::new(west, south, east, north, inv_y)
    }

    /// Longitudinal span in degrees, accounting for antimeridian wraparound.
    pub fn width(&self) -> f64 {
        if self.crosses_antimeridian {
            self.east - self.west + 360.0
        } else {
            self.east - self.west
        }
    }

    /// Latitudinal span in degrees.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Split this extent into non-wrapping boxes.
    ///
    /// Returns one box, or two (west part up to 180°, east part from -180°)
    /// when the extent crosses the antimeridian.
    pub fn split_at_antimeridian(&self) -> Vec<BoundingBox> {
        if self.crosses_antimeridian {
            vec![
                BoundingBox::new(self.west, self.south, 180.0, self.north),
                BoundingBox::new(-180.0, self.south, self.east, self.north),
            ]
        } else {
            vec![BoundingBox::new(self.west, self.south, self.east, self.north)]
        }
    }
}

/// Outer edges (first, last) along one axis, in array order.
fn axis_edges(
    axis: &'static str,
    centers: &[f64],
    bounds: Option<&[[f64; 2]]>,
) -> TileResult<(f64, f64)> {
    if centers.len() < 2 {
        return Err(TileError::TooFewCoordinates {
            axis,
            count: centers.len(),
        });
    }

    if let Some(bounds) = bounds {
        if let (Some(first), Some(last)) = (bounds.first(), bounds.last()) {
            if first[0].is_finite() && last[1].is_finite() {
                return Ok((first[0], last[1]));
            }
            return Err(TileError::DegenerateSpacing {
                axis,
                message: "bounds are not finite".to_string(),
            });
        }
    }

    let delta = min_spacing(axis, centers)?;
    let first = centers[0];
    let last = centers[centers.len() - 1];
    if last >= first || axis == "lon" {
        // Longitudes always run eastward; a decreasing last center means wraparound.
        Ok((first - 0.5 * delta, last + 0.5 * delta))
    } else {
        Ok((first + 0.5 * delta, last - 0.5 * delta))
    }
}

/// Minimum absolute spacing between adjacent centers.
fn min_spacing(axis: &'static str, centers: &[f64]) -> TileResult<f64> {
    let mut delta = f64::INFINITY;
    for pair in centers.windows(2) {
        let d = (pair[1] - pair[0]).abs();
        if !d.is_finite() {
            return Err(TileError::DegenerateSpacing {
                axis,
                message: format!("non-finite coordinate near {} / {}", pair[0], pair[1]),
            });
        }
        delta = delta.min(d);
    }
    if delta <= 0.0 || !delta.is_finite() {
        return Err(TileError::DegenerateSpacing {
            axis,
            message: format!("minimum spacing is {}", delta),
        });
    }
    Ok(delta)
}

/// Wrap a longitude into [-180, 180].
fn normalize_lon(lon: f64) -> f64 {
    let lon = if lon > 180.0 + EPS {
        lon - 360.0
    } else if lon < -180.0 - EPS {
        lon + 360.0
    } else {
        lon
    };
    lon.clamp(-180.0, 180.0)
}
