use crate::consts::DEFAULT_SPACING_TOLERANCE;

/// Grid geometry shared by every image participating in a fusion run
/// (spec §3, `Image3D`: extents, strides, origin, spacing, orientation).
///
/// `extents` is `(X, Y, Z)`; the underlying buffers are stored X-fastest,
/// Y-next, Z-slowest (see [`crate::image3d::Image3D::linear_index`]).
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    pub extents: (usize, usize, usize),
    pub spacing: (f64, f64, f64),
    pub origin: (f64, f64, f64),
    /// Row-major 3x3 direction cosine matrix.
    pub orientation: [[f64; 3]; 3],
}

impl Grid {
    pub fn identity(extents: (usize, usize, usize)) -> Self {
        Self {
            extents,
            spacing: (1.0, 1.0, 1.0),
            origin: (0.0, 0.0, 0.0),
            orientation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    pub fn voxel_count(&self) -> usize {
        self.extents.0 * self.extents.1 * self.extents.2
    }

    /// Linear strides in voxel units, X-fastest.
    pub fn strides(&self) -> (isize, isize, isize) {
        let (nx, ny, _nz) = self.extents;
        (1, nx as isize, (nx * ny) as isize)
    }

    pub fn contains(&self, x: usize, y: usize, z: usize) -> bool {
        x < self.extents.0 && y < self.extents.1 && z < self.extents.2
    }

    /// Checks the three grid invariants spec §6 requires at entry: identical
    /// extents, identical spacing within `tolerance`, identical orientation.
    pub fn compatible_with(&self, other: &Grid, tolerance: f64) -> bool {
        if self.extents != other.extents {
            return false;
        }
        let spacing_close = (self.spacing.0 - other.spacing.0).abs() <= tolerance
            && (self.spacing.1 - other.spacing.1).abs() <= tolerance
            && (self.spacing.2 - other.spacing.2).abs() <= tolerance;
        if !spacing_close {
            return false;
        }
        for r in 0..3 {
            for c in 0..3 {
                if (self.orientation[r][c] - other.orientation[r][c]).abs() > tolerance {
                    return false;
                }
            }
        }
        true
    }
}

impl Default for Grid {
    fn default() -> Self {
        Grid::identity((0, 0, 0))
    }
}

pub fn default_tolerance() -> f64 {
    DEFAULT_SPACING_TOLERANCE
}
