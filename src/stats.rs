//! PatchStats (spec §4.2): running mean/standard deviation of a patch
//! sampled through an [`OffsetTable`].

use crate::consts::MIN_PATCH_STD;
use crate::geometry::OffsetTable;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatchStats {
    pub mean: f64,
    pub std: f64,
}

/// Computes `mean = sum(p) / n` and `std = sqrt((sum(p^2) - n*mean^2) / (n-1))`
/// over the `n = offsets.len()` samples at `base + offsets[k]` in `data`.
///
/// `std` is clamped to [`MIN_PATCH_STD`] whenever it would otherwise be
/// smaller (or NaN), preventing division by zero in low-contrast regions.
pub fn compute_patch_stats(data: &[f32], base: usize, offsets: &OffsetTable) -> PatchStats {
    let n = offsets.len();
    debug_assert!(n > 1, "patch statistics require at least 2 samples");

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for &off in &offsets.offsets {
        let v = data[(base as isize + off) as usize] as f64;
        sum += v;
        sum_sq += v * v;
    }

    let mean = sum / n as f64;
    let variance = (sum_sq - n as f64 * mean * mean) / (n as f64 - 1.0);
    let std = variance.sqrt();

    let std = if std.is_nan() || std < MIN_PATCH_STD {
        MIN_PATCH_STD
    } else {
        std
    };

    PatchStats { mean, std }
}

/// Fills `out` with the z-normalized samples `(p_i - mean) / std` for the
/// patch at `base`. `out.len()` must equal `offsets.len()`.
pub fn normalize_patch(data: &[f32], base: usize, offsets: &OffsetTable, out: &mut [f32]) {
    let stats = compute_patch_stats(data, base, offsets);
    for (slot, &off) in out.iter_mut().zip(&offsets.offsets) {
        let v = data[(base as isize + off) as usize] as f64;
        *slot = ((v - stats.mean) / stats.std) as f32;
    }
}
