//! FusionParams: the engine's tunables (spec §6), shaped as a
//! serde-derived struct with a hand-written `Default`, the same way
//! `MultiPointConfig`/`PipelineConfig` are built.

use serde::{Deserialize, Serialize};

use crate::matching::SimilarityMode;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FusionParams {
    /// `(rx, ry, rz)`. Signed so out-of-range config (e.g. from a
    /// deserialized file) can be rejected as `InvalidInput` rather than
    /// silently wrapping.
    pub patch_radius: (i64, i64, i64),
    pub search_radius: (i64, i64, i64),
    /// Ridge added to `Mx`'s diagonal (spec §4.5). Must be `>= 0`.
    pub alpha: f64,
    /// Exponent applied to `Mx` (spec §4.5). `beta == 2.0` takes the
    /// multiplication fast path instead of `powf`.
    pub beta: f64,
    pub generate_weight_maps: bool,
    pub retain_posteriors: bool,
    /// Whether to run the [`crate::mask`] unique-label pre-pass at all.
    pub mask_mode: bool,
    #[serde(default)]
    pub similarity_mode: SimilarityMode,
    /// Upper bound on bytes the driver may allocate for weight maps and
    /// posterior accumulators before refusing to start (spec §5).
    #[serde(default)]
    pub memory_budget_bytes: Option<u64>,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            patch_radius: (1, 1, 1),
            search_radius: (2, 2, 2),
            alpha: 0.1,
            beta: 2.0,
            generate_weight_maps: false,
            retain_posteriors: false,
            mask_mode: true,
            similarity_mode: SimilarityMode::default(),
            memory_budget_bytes: None,
        }
    }
}

impl FusionParams {
    pub fn patch_radius_usize(&self) -> Option<(usize, usize, usize)> {
        to_usize_radius(self.patch_radius)
    }

    pub fn search_radius_usize(&self) -> Option<(usize, usize, usize)> {
        to_usize_radius(self.search_radius)
    }
}

fn to_usize_radius(r: (i64, i64, i64)) -> Option<(usize, usize, usize)> {
    if r.0 < 0 || r.1 < 0 || r.2 < 0 {
        None
    } else {
        Some((r.0 as usize, r.1 as usize, r.2 as usize))
    }
}
