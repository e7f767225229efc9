//! WeightMapSink (spec §4.8): optional per-atlas spatial weight maps,
//! purely diagnostic — never read back by the engine.

use crate::grid::Grid;
use crate::image3d::Image3D;

pub struct WeightMapSink {
    maps: Vec<Image3D<f32>>,
}

impl WeightMapSink {
    pub fn new(grid: Grid, n_atlases: usize) -> Self {
        Self {
            maps: (0..n_atlases).map(|_| Image3D::<f32>::zeros(grid.clone())).collect(),
        }
    }

    pub fn record(&mut self, x: usize, y: usize, z: usize, weights: &[f64]) {
        debug_assert_eq!(weights.len(), self.maps.len());
        for (atlas, &w) in weights.iter().enumerate() {
            self.maps[atlas].set(x, y, z, w as f32);
        }
    }

    pub fn into_maps(self) -> Vec<Image3D<f32>> {
        self.maps
    }

    /// Merges a thread-private tile sink into `self`. Each target voxel is
    /// processed by exactly one tile, so every other tile's sink is zero
    /// there — elementwise addition is exact, not an approximation.
    pub fn merge_from(&mut self, other: &WeightMapSink) {
        for (dst, src) in self.maps.iter_mut().zip(&other.maps) {
            for (d, s) in dst.as_flat_slice_mut().iter_mut().zip(src.as_flat_slice()) {
                *d += s;
            }
        }
    }
}
