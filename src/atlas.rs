//! AtlasPair (spec §3): an intensity image paired with a label image on
//! the same grid.

use std::collections::BTreeSet;

use crate::image3d::Image3D;

pub struct AtlasPair {
    pub intensity: Image3D<f32>,
    pub labels: Image3D<i32>,
}

impl AtlasPair {
    pub fn new(intensity: Image3D<f32>, labels: Image3D<i32>) -> Self {
        debug_assert_eq!(intensity.grid.extents, labels.grid.extents);
        Self { intensity, labels }
    }
}

/// Discovers the label set as the union of distinct values across every
/// atlas label image (spec §4.9 Driver duty), sorted so the resulting
/// tie-break order in [`crate::posterior::PosteriorMap::argmax`] is
/// deterministic and independent of atlas ordering.
pub fn discover_labels(atlases: &[AtlasPair]) -> Vec<i32> {
    let mut set = BTreeSet::new();
    for atlas in atlases {
        for &label in atlas.labels.as_flat_slice() {
            set.insert(label);
        }
    }
    set.into_iter().collect()
}
