//! PosteriorAccumulator and PosteriorMap (spec §3, §4.6): per-label
//! volumetric weight accumulators, indexed by a dense compact id rather
//! than the sparse label value itself (spec §9, "Map from label to
//! accumulator").

use std::collections::HashMap;

use crate::geometry::OffsetTable;
use crate::grid::Grid;
use crate::image3d::Image3D;

/// Lazily discovered (at engine start) fixed set of labels observed
/// anywhere in any atlas label image, plus one accumulator per label.
pub struct PosteriorMap {
    label_to_id: HashMap<i32, usize>,
    ids_to_label: Vec<i32>,
    accumulators: Vec<Image3D<f32>>,
}

impl PosteriorMap {
    /// Builds an empty accumulator set for exactly the labels in `labels`
    /// (order is preserved, becoming the tie-break order for argmax).
    pub fn new(grid: Grid, labels: &[i32]) -> Self {
        let mut label_to_id = HashMap::with_capacity(labels.len());
        let mut ids_to_label = Vec::with_capacity(labels.len());
        let mut accumulators = Vec::with_capacity(labels.len());
        for &label in labels {
            label_to_id.insert(label, ids_to_label.len());
            ids_to_label.push(label);
            accumulators.push(Image3D::<f32>::zeros(grid.clone()));
        }
        Self {
            label_to_id,
            ids_to_label,
            accumulators,
        }
    }

    pub fn labels(&self) -> &[i32] {
        &self.ids_to_label
    }

    pub fn accumulator(&self, label: i32) -> Option<&Image3D<f32>> {
        self.label_to_id.get(&label).map(|&id| &self.accumulators[id])
    }

    fn id_of(&self, label: i32) -> usize {
        self.label_to_id[&label]
    }

    /// Adds `weight` to `accumulators[label](x, y, z)`.
    pub fn add(&mut self, label: i32, x: usize, y: usize, z: usize, weight: f32) {
        let id = self.id_of(label);
        let current = self.accumulators[id].get(x, y, z);
        self.accumulators[id].set(x, y, z, current + weight);
    }

    /// Merges `other`'s accumulators (assumed over the same label set and
    /// grid) into `self` by elementwise addition. Used to fold a
    /// thread-private tile accumulator back into the global one.
    pub fn merge_from(&mut self, other: &PosteriorMap) {
        for (id, label) in other.ids_to_label.iter().enumerate() {
            let self_id = self.id_of(*label);
            let dst = self.accumulators[self_id].as_flat_slice_mut();
            let src = other.accumulators[id].as_flat_slice();
            for (d, s) in dst.iter_mut().zip(src) {
                *d += s;
            }
        }
    }

    /// argmax over labels at `(x, y, z)`, skipping any label excluded at
    /// that voxel (spec §4.7). Ties break on first label in `labels()`
    /// order. Returns `0` if every label is excluded.
    pub fn argmax(
        &self,
        x: usize,
        y: usize,
        z: usize,
        is_excluded: impl Fn(i32) -> bool,
    ) -> i32 {
        let mut best_label = 0i32;
        let mut best_value = f32::NEG_INFINITY;
        for (id, &label) in self.ids_to_label.iter().enumerate() {
            if is_excluded(label) {
                continue;
            }
            let value = self.accumulators[id].get(x, y, z);
            if value > best_value {
                best_value = value;
                best_label = label;
            }
        }
        best_label
    }
}

/// For every patch offset `delta` around target voxel `(x, y, z)`, adds
/// `weights[i]` into `posterior[atlas_labels[i](best_center[i] + delta)]`
/// at the shifted target voxel — Wang's neighborhood voting (spec §4.6).
/// Neighbor voxels falling outside the grid are skipped.
#[allow(clippy::too_many_arguments)]
pub fn accumulate_votes(
    posterior: &mut PosteriorMap,
    grid: &Grid,
    x: usize,
    y: usize,
    z: usize,
    best_centers: &[usize],
    atlas_label_slices: &[&[i32]],
    weights: &[f64],
    patch_offsets: &OffsetTable,
) {
    let (nx, ny, nz) = grid.extents;

    for (k, &patch_off) in patch_offsets.offsets.iter().enumerate() {
        let (dx, dy, dz) = patch_offsets.deltas[k];
        let (tx, ty, tz) = match (
            checked_add(x, dx as isize, nx),
            checked_add(y, dy as isize, ny),
            checked_add(z, dz as isize, nz),
        ) {
            (Some(tx), Some(ty), Some(tz)) => (tx, ty, tz),
            _ => continue,
        };

        for (i, &weight) in weights.iter().enumerate() {
            let neighbor_idx = (best_centers[i] as isize + patch_off) as usize;
            let label = atlas_label_slices[i][neighbor_idx];
            posterior.add(label, tx, ty, tz, weight as f32);
        }
    }
}

fn checked_add(base: usize, delta: isize, extent: usize) -> Option<usize> {
    let v = base as isize + delta;
    if v >= 0 && (v as usize) < extent {
        Some(v as usize)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::build_offset_table;

    #[test]
    fn votes_spread_over_patch_neighborhood() {
        let grid = Grid::identity((5, 5, 5));
        let mut posterior = PosteriorMap::new(grid.clone(), &[1, 2]);
        let strides = grid.strides();
        let patch_offsets = build_offset_table((1, 0, 0), strides, false);

        let labels = vec![1i32; grid.voxel_count()];
        let label_slices: Vec<&[i32]> = vec![&labels];
        let center = grid.strides().0 as usize * 2
            + grid.strides().1 as usize * 2
            + grid.strides().2 as usize * 2;

        accumulate_votes(
            &mut posterior,
            &grid,
            2,
            2,
            2,
            &[center],
            &label_slices,
            &[1.0],
            &patch_offsets,
        );

        assert_eq!(posterior.accumulator(1).unwrap().get(1, 2, 2), 1.0);
        assert_eq!(posterior.accumulator(1).unwrap().get(2, 2, 2), 1.0);
        assert_eq!(posterior.accumulator(1).unwrap().get(3, 2, 2), 1.0);
    }

    #[test]
    fn argmax_respects_exclusion() {
        let grid = Grid::identity((2, 2, 2));
        let mut posterior = PosteriorMap::new(grid.clone(), &[1, 2]);
        posterior.add(1, 0, 0, 0, 5.0);
        posterior.add(2, 0, 0, 0, 1.0);
        assert_eq!(posterior.argmax(0, 0, 0, |_| false), 1);
        assert_eq!(posterior.argmax(0, 0, 0, |label| label == 1), 2);
    }

    #[test]
    fn merge_adds_elementwise() {
        let grid = Grid::identity((2, 2, 2));
        let mut a = PosteriorMap::new(grid.clone(), &[1]);
        let mut b = PosteriorMap::new(grid.clone(), &[1]);
        a.add(1, 0, 0, 0, 2.0);
        b.add(1, 0, 0, 0, 3.0);
        a.merge_from(&b);
        assert_eq!(a.accumulator(1).unwrap().get(0, 0, 0), 5.0);
    }
}
