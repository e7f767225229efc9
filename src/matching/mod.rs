//! PatchMatcher (spec §4.3): finds, within one atlas's search neighborhood,
//! the candidate center whose patch best matches an already z-normalized
//! target patch.

mod ncc;

pub use ncc::SimilarityMode;
use ncc::{score_candidate, CandidateStats};

use crate::geometry::OffsetTable;

/// The winning candidate, plus the sufficient statistics
/// ([`crate::weights`] needs `sum_v`/`sum_v2` to build apd residuals, and
/// the caller needs the winning search offset's Manhattan distance for
/// the diagnostic histogram).
#[derive(Clone, Copy, Debug)]
pub struct MatchResult {
    pub best_center: usize,
    pub best_search_index: usize,
    pub sum_v: f64,
    pub sum_v2: f64,
}

/// Searches every offset in `search_offsets` around `center` in
/// `atlas_data`, scoring each candidate's patch (addressed via
/// `patch_offsets`) against the pre-normalized target patch `u`.
///
/// Ties are broken by first-encountered, which is stable given
/// `search_offsets`' deterministic iteration order.
pub fn find_best_match(
    u: &[f32],
    atlas_data: &[f32],
    center: usize,
    patch_offsets: &OffsetTable,
    search_offsets: &OffsetTable,
    mode: SimilarityMode,
) -> MatchResult {
    let mut best_index = 0;
    let mut best: Option<CandidateStats> = None;

    for (k, &search_off) in search_offsets.offsets.iter().enumerate() {
        let candidate_center = (center as isize + search_off) as usize;
        let stats = score_candidate(u, atlas_data, candidate_center, patch_offsets, mode);

        let better = match best {
            None => true,
            Some(current) => stats.score < current.score,
        };
        if better {
            best = Some(stats);
            best_index = k;
        }
    }

    let best = best.expect("search_offsets must contain at least one candidate");
    let best_search_off = search_offsets.offsets[best_index];
    MatchResult {
        best_center: (center as isize + best_search_off) as usize,
        best_search_index: best_index,
        sum_v: best.sum_v,
        sum_v2: best.sum_v2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::build_offset_table;

    #[test]
    fn finds_exact_translation() {
        // 1D atlas with a distinctive bump; target patch is the atlas patch
        // centered 2 voxels to the right of the search center.
        let atlas: Vec<f32> = vec![0.0, 0.0, 5.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let patch_offsets = build_offset_table((1, 0, 0), (1, 1, 1), false);
        let search_offsets = build_offset_table((3, 0, 0), (1, 1, 1), true);

        let target_center = 2usize;
        let mean: f64 = patch_offsets
            .offsets
            .iter()
            .map(|&o| atlas[(target_center as isize + o) as usize] as f64)
            .sum::<f64>()
            / patch_offsets.len() as f64;
        let u: Vec<f32> = patch_offsets
            .offsets
            .iter()
            .map(|&o| (atlas[(target_center as isize + o) as usize] as f64 - mean) as f32)
            .collect();

        let result = find_best_match(
            &u,
            &atlas,
            5, // search centered away from the true match
            &patch_offsets,
            &search_offsets,
            SimilarityMode::PenalizeAnticorrelation,
        );
        assert_eq!(result.best_center, target_center);
    }
}
