//! Normalized-cross-correlation surrogate used to score a single search
//! candidate (spec §4.3).

use crate::consts::MIN_CANDIDATE_VARIANCE;
use crate::geometry::OffsetTable;

/// How to score a candidate whose raw cross-correlation `S` is negative
/// (spec §9, "Sign handling in PatchSimilarity" open question). The
/// source's behavior — penalize anticorrelated candidates so they are
/// never selected over a positively-correlated one — is preserved as the
/// default; `Symmetric` exposes the alternative unconditional
/// `-(S^2)/var` the source's own comment suggests was intended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SimilarityMode {
    PenalizeAnticorrelation,
    Symmetric,
}

impl Default for SimilarityMode {
    fn default() -> Self {
        SimilarityMode::PenalizeAnticorrelation
    }
}

/// Candidate statistics sufficient to both score it and later build the
/// apd residual vector for [`crate::weights`] — no need to revisit the
/// atlas buffer once a candidate is scored.
#[derive(Clone, Copy, Debug)]
pub struct CandidateStats {
    pub score: f64,
    pub sum_v: f64,
    pub sum_v2: f64,
}

/// Scores one candidate center against the pre-normalized target patch
/// `u` (mean 0, std 1, `u.len() == patch_offsets.len()`).
pub fn score_candidate(
    u: &[f32],
    atlas_data: &[f32],
    candidate_center: usize,
    patch_offsets: &OffsetTable,
    mode: SimilarityMode,
) -> CandidateStats {
    let n = patch_offsets.len() as f64;

    let mut s = 0.0f64;
    let mut sum_v = 0.0f64;
    let mut sum_v2 = 0.0f64;
    for (&u_i, &off) in u.iter().zip(&patch_offsets.offsets) {
        let v = atlas_data[(candidate_center as isize + off) as usize] as f64;
        s += u_i as f64 * v;
        sum_v += v;
        sum_v2 += v * v;
    }

    let var_unnorm = (sum_v2 - sum_v * sum_v / n).max(MIN_CANDIDATE_VARIANCE);

    let score = if s > 0.0 {
        -(s * s) / var_unnorm
    } else {
        match mode {
            SimilarityMode::PenalizeAnticorrelation => (s * s) / var_unnorm,
            SimilarityMode::Symmetric => -(s * s) / var_unnorm,
        }
    };

    CandidateStats {
        score,
        sum_v,
        sum_v2,
    }
}
