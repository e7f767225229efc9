//! ExclusionMap (spec §3, §4.7): optional per-label veto masks, nonzero
//! meaning "this label is forbidden at this voxel".

use std::collections::HashMap;

use crate::error::{FusionError, Result};
use crate::grid::Grid;
use crate::image3d::Image3D;

#[derive(Default)]
pub struct ExclusionMap {
    masks: HashMap<i32, Image3D<u8>>,
}

impl ExclusionMap {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validates that every mask shares `grid`'s extents and inserts it.
    pub fn insert(&mut self, label: i32, mask: Image3D<u8>, grid: &Grid) -> Result<()> {
        if mask.grid.extents != grid.extents {
            return Err(FusionError::InvalidExclusionMap { label: label as i64 });
        }
        self.masks.insert(label, mask);
        Ok(())
    }

    pub fn is_excluded(&self, label: i32, x: usize, y: usize, z: usize) -> bool {
        self.masks
            .get(&label)
            .map(|mask| mask.get(x, y, z) != 0)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_label_is_never_excluded() {
        let exclusion = ExclusionMap::empty();
        assert!(!exclusion.is_excluded(3, 0, 0, 0));
    }

    #[test]
    fn nonzero_mask_excludes() {
        let grid = Grid::identity((2, 2, 2));
        let mut mask = Image3D::<u8>::zeros(grid.clone());
        mask.set(1, 1, 1, 1);
        let mut exclusion = ExclusionMap::empty();
        exclusion.insert(2, mask, &grid).unwrap();
        assert!(exclusion.is_excluded(2, 1, 1, 1));
        assert!(!exclusion.is_excluded(2, 0, 0, 0));
    }

    #[test]
    fn mismatched_grid_rejected() {
        let grid = Grid::identity((2, 2, 2));
        let wrong = Image3D::<u8>::zeros(Grid::identity((3, 3, 3)));
        let mut exclusion = ExclusionMap::empty();
        assert!(exclusion.insert(1, wrong, &grid).is_err());
    }
}
