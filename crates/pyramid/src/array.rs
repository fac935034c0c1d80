//! Raster arrays that pyramids read tiles from.
//!
//! Spatial dimensions are always the last two (`[..., height, width]`).
//! Windows are read unstrided; callers subsample in memory.

use crate::{ArrayTile, PyramidError, Result};
use std::sync::Arc;
use tile_common::{PixelRect, Size2D};

/// A random-access N-D raster, `N >= 2`.
pub trait RasterArray: Send + Sync {
    /// Full shape, spatial dimensions last.
    fn shape(&self) -> &[usize];

    /// Read `rect` of every plane.
    ///
    /// The rectangle is clipped to the array; the returned tile may be
    /// smaller than requested (or empty) at the right and bottom edges.
    fn read_window(&self, rect: PixelRect) -> Result<ArrayTile>;

    /// Read `rect` of the single plane with flat index `plane`.
    ///
    /// The default reads every plane and keeps one; arrays that can address
    /// a plane directly should override it.
    fn read_plane_window(&self, plane: usize, rect: PixelRect) -> Result<ArrayTile> {
        self.read_window(rect)?.plane(plane)
    }

    fn width(&self) -> usize {
        let shape = self.shape();
        shape[shape.len() - 1]
    }

    fn height(&self) -> usize {
        let shape = self.shape();
        shape[shape.len() - 2]
    }

    fn size(&self) -> Size2D {
        Size2D::new(self.width(), self.height())
    }

    /// Sizes of the non-spatial dimensions.
    fn leading_shape(&self) -> &[usize] {
        let shape = self.shape();
        &shape[..shape.len() - 2]
    }
}

/// Shared handle to a raster array.
pub type ArrayRef = Arc<dyn RasterArray>;

fn check_shape(shape: &[usize]) -> Result<()> {
    if shape.len() < 2 {
        return Err(PyramidError::InvalidDimensions {
            shape: shape.to_vec(),
        });
    }
    Ok(())
}

/// Row-major `f32` array held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryArray {
    shape: Vec<usize>,
    data: Arc<Vec<f32>>,
}

impl InMemoryArray {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        check_shape(&shape)?;
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(PyramidError::shape(format!(
                "{} samples for shape {:?}, expected {}",
                data.len(),
                shape,
                expected
            )));
        }
        Ok(Self {
            shape,
            data: Arc::new(data),
        })
    }

    pub fn from_2d(width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        Self::new(vec![height, width], data)
    }

    /// Convert samples of any numeric type that widens losslessly to `f64`.
    pub fn from_values<T: Copy + Into<f64>>(shape: Vec<usize>, values: &[T]) -> Result<Self> {
        let data = values.iter().map(|&v| Into::<f64>::into(v) as f32).collect();
        Self::new(shape, data)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

impl RasterArray for InMemoryArray {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn read_window(&self, rect: PixelRect) -> Result<ArrayTile> {
        let size = self.size();
        let rect = rect.clip_to(size);
        let leading = self.leading_shape().to_vec();
        let planes: usize = leading.iter().product();
        let plane_len = size.area();
        if rect.is_empty() {
            return Ok(ArrayTile::filled(leading, 0, 0, f32::NAN));
        }

        let mut data = Vec::with_capacity(planes * rect.width * rect.height);
        for plane in 0..planes {
            let offset = plane * plane_len;
            for row in rect.y..rect.y + rect.height {
                let start = offset + row * size.width + rect.x;
                data.extend_from_slice(&self.data[start..start + rect.width]);
            }
        }
        ArrayTile::new(leading, rect.width, rect.height, data)
    }

    fn read_plane_window(&self, plane: usize, rect: PixelRect) -> Result<ArrayTile> {
        let planes: usize = self.leading_shape().iter().product();
        if plane >= planes {
            return Err(PyramidError::shape(format!(
                "plane {} of {} requested",
                plane, planes
            )));
        }
        let size = self.size();
        let rect = rect.clip_to(size);
        if rect.is_empty() {
            return Ok(ArrayTile::filled(Vec::new(), 0, 0, f32::NAN));
        }

        let offset = plane * size.area();
        let mut data = Vec::with_capacity(rect.width * rect.height);
        for row in rect.y..rect.y + rect.height {
            let start = offset + row * size.width + rect.x;
            data.extend_from_slice(&self.data[start..start + rect.width]);
        }
        ArrayTile::new(Vec::new(), rect.width, rect.height, data)
    }
}

/// 2-D view of an N-D array at fixed leading indices.
pub struct SlicedArray {
    source: ArrayRef,
    plane: usize,
    shape: Vec<usize>,
}

impl SlicedArray {
    /// Fix every leading dimension of `source` to the given index.
    pub fn new(source: ArrayRef, leading_indices: &[usize]) -> Result<Self> {
        check_shape(source.shape())?;
        let plane = plane_index(source.leading_shape(), leading_indices)?;
        let shape = vec![source.height(), source.width()];
        Ok(Self {
            source,
            plane,
            shape,
        })
    }
}

impl RasterArray for SlicedArray {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn read_window(&self, rect: PixelRect) -> Result<ArrayTile> {
        self.source.read_plane_window(self.plane, rect)
    }

    fn read_plane_window(&self, plane: usize, rect: PixelRect) -> Result<ArrayTile> {
        if plane != 0 {
            return Err(PyramidError::shape(format!("plane {} of 1 requested", plane)));
        }
        self.read_window(rect)
    }
}

/// Flatten `indices` over `leading_shape` into a plane number.
pub fn plane_index(leading_shape: &[usize], indices: &[usize]) -> Result<usize> {
    if indices.len() != leading_shape.len() {
        return Err(PyramidError::LeadingIndices {
            expected: leading_shape.len(),
            actual: indices.len(),
        });
    }
    let mut plane = 0;
    for (dim, (&index, &size)) in indices.iter().zip(leading_shape).enumerate() {
        if index >= size {
            return Err(PyramidError::LeadingIndexOutOfRange { dim, index, size });
        }
        plane = plane * size + index;
    }
    Ok(plane)
}
