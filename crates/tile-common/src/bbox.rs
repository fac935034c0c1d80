//! Non-wrapping lon/lat boxes.

use serde::{Deserialize, Serialize};

/// A geographic box in degrees with `min_x <= max_x`.
///
/// Produced by [`GeoExtent::split_at_antimeridian`](crate::GeoExtent::split_at_antimeridian);
/// a wrapping extent becomes two of these.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// True when `(lon, lat)` lies inside or on the edge.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        (self.min_x..=self.max_x).contains(&lon) && (self.min_y..=self.max_y).contains(&lat)
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }
}
