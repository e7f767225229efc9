use ndarray::Array3;

use crate::error::{FusionError, Result};
use crate::grid::Grid;

/// A dense 3D sample buffer sharing `grid`'s extents (spec §3, `Image3D`).
///
/// Internally stored z-slowest, y-next, x-fastest (`Array3` dim
/// `(nz, ny, nx)`), which is also the order `Grid::strides` assumes — the
/// underlying buffer is always contiguous in standard layout, so
/// [`Image3D::as_flat_slice`] and [`Image3D::linear_index`] agree.
#[derive(Clone, Debug)]
pub struct Image3D<T> {
    pub grid: Grid,
    data: Array3<T>,
}

impl<T> Image3D<T> {
    pub fn from_array(grid: Grid, data: Array3<T>) -> Result<Self> {
        let (nx, ny, nz) = grid.extents;
        if data.dim() != (nz, ny, nx) {
            return Err(FusionError::MismatchedGrid {
                what: "extents",
                a: format!("{:?}", grid.extents),
                b: format!("{:?}", data.dim()),
            });
        }
        Ok(Self { grid, data })
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        self.grid.extents
    }

    pub fn as_flat_slice(&self) -> &[T] {
        self.data
            .as_slice()
            .expect("Image3D buffer is always standard-layout contiguous")
    }

    pub fn as_flat_slice_mut(&mut self) -> &mut [T] {
        self.data
            .as_slice_mut()
            .expect("Image3D buffer is always standard-layout contiguous")
    }

    pub fn linear_index(&self, x: usize, y: usize, z: usize) -> usize {
        let (sx, sy, sz) = self.grid.strides();
        (x as isize * sx + y as isize * sy + z as isize * sz) as usize
    }

    pub fn array(&self) -> &Array3<T> {
        &self.data
    }
}

impl<T: Copy> Image3D<T> {
    pub fn get(&self, x: usize, y: usize, z: usize) -> T {
        self.data[[z, y, x]]
    }

    pub fn set(&mut self, x: usize, y: usize, z: usize, value: T) {
        self.data[[z, y, x]] = value;
    }
}

impl<T: Default + Clone> Image3D<T> {
    pub fn zeros(grid: Grid) -> Self {
        let (nx, ny, nz) = grid.extents;
        let data = Array3::from_elem((nz, ny, nx), T::default());
        Self { grid, data }
    }
}

impl<T: Clone> Image3D<T> {
    pub fn filled(grid: Grid, value: T) -> Self {
        let (nx, ny, nz) = grid.extents;
        let data = Array3::from_elem((nz, ny, nx), value);
        Self { grid, data }
    }
}
