/// Lower clamp for a patch's intensity standard deviation (spec §4.2).
pub const MIN_PATCH_STD: f64 = 1e-6;

/// Lower clamp for an unnormalized candidate variance in the similarity score (spec §4.3).
pub const MIN_CANDIDATE_VARIANCE: f64 = 1e-6;

/// Lower clamp for a matched patch's variance when building apd vectors (spec §4.5).
pub const MIN_MATCH_VARIANCE: f64 = 1e-12;

/// Minimum tile depth (in target-grid voxels along the slowest axis) to justify
/// handing a slab to its own rayon task rather than folding it into a neighbor.
pub const MIN_TILE_DEPTH: usize = 4;

/// Default grid-spacing comparison tolerance (spec §6, "within tolerance").
pub const DEFAULT_SPACING_TOLERANCE: f64 = 1e-3;
