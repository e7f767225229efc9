//! WeightSolver (spec §4.5): builds the inter-atlas error covariance
//! matrix `Mx` from per-atlas patch residuals and solves
//! `(Mx + alpha*I) w = 1`, Cholesky first with an SVD fallback when `Mx`
//! is ill-conditioned.

use nalgebra::{linalg::Cholesky, linalg::SymmetricEigen, DMatrix, DVector, Dyn};

use crate::consts::MIN_MATCH_VARIANCE;
use crate::error::{FusionError, Result};

/// Reciprocal-condition threshold below which Cholesky is abandoned in
/// favor of the SVD fallback (spec §4.5: "reciprocal condition > sqrt(eps)").
fn rcond_threshold() -> f64 {
    f64::EPSILON.sqrt()
}

/// Builds one atlas' apd (absolute patch difference) vector from its
/// best-matched patch's raw samples `v` and the pre-normalized target
/// patch `u` (spec §4.5).
pub fn compute_apd(u: &[f32], v: &[f64], sum_v: f64, sum_v2: f64) -> Vec<f64> {
    let n = v.len() as f64;
    let mean_v = sum_v / n;
    let variance_v = ((sum_v2 - n * mean_v * mean_v) / (n - 1.0)).max(MIN_MATCH_VARIANCE);
    let std_v = variance_v.sqrt();

    u.iter()
        .zip(v)
        .map(|(&u_m, &v_m)| (u_m as f64 - (v_m - mean_v) / std_v).abs())
        .collect()
}

/// Forms `Mx(i,j) = (sum_m apd_i[m] * apd_j[m]) / (N-1)`, raised
/// elementwise to the `beta` power (multiplication instead of `powf`
/// when `beta == 2.0`, spec §3's stated fast path).
fn build_mx(apd: &[Vec<f64>], beta: f64) -> DMatrix<f64> {
    let n_atlas = apd.len();
    let n_samples = apd[0].len() as f64;

    DMatrix::from_fn(n_atlas, n_atlas, |i, j| {
        let dot: f64 = apd[i].iter().zip(&apd[j]).map(|(a, b)| a * b).sum();
        let raw = dot / (n_samples - 1.0);
        if beta == 2.0 {
            raw * raw
        } else {
            raw.powf(beta)
        }
    })
}

/// Solves for atlas weights given each atlas' apd vector, the ridge
/// `alpha`, and the exponent `beta`. `voxel` is only used to annotate a
/// [`FusionError::NumericFailure`] should both solve paths fail.
pub fn solve_weights(
    apd: &[Vec<f64>],
    alpha: f64,
    beta: f64,
    voxel: (usize, usize, usize),
) -> Result<Vec<f64>> {
    let n = apd.len();
    let mx = build_mx(apd, beta);
    let ridged = &mx + DMatrix::identity(n, n) * alpha;
    // Numerically symmetrize: Mx is symmetric by construction, but the
    // elementwise beta power and floating-point summation order can leave
    // tiny asymmetries that would otherwise confuse SymmetricEigen/Cholesky.
    let symmetric = (&ridged + ridged.transpose()) * 0.5;

    let ones = DVector::from_element(n, 1.0);

    let eigen = SymmetricEigen::new(symmetric.clone());
    let max_eig = eigen.eigenvalues.iter().cloned().fold(f64::MIN, f64::max);
    let min_eig = eigen.eigenvalues.iter().cloned().fold(f64::MAX, f64::min);
    let rcond = if max_eig.abs() > 0.0 {
        min_eig.abs() / max_eig.abs()
    } else {
        0.0
    };

    let w = if rcond > rcond_threshold() {
        match Cholesky::<f64, Dyn>::new(symmetric.clone()) {
            Some(chol) => chol.solve(&ones),
            None => svd_solve(&symmetric, &ones, voxel)?,
        }
    } else {
        svd_solve(&symmetric, &ones, voxel)?
    };

    let sum: f64 = w.iter().sum();
    if sum.abs() < f64::EPSILON || !sum.is_finite() {
        return Err(FusionError::NumericFailure { voxel });
    }
    Ok(w.iter().map(|&wi| wi / sum).collect())
}

fn svd_solve(m: &DMatrix<f64>, b: &DVector<f64>, voxel: (usize, usize, usize)) -> Result<DVector<f64>> {
    let svd = m.clone().svd(true, true);
    svd.solve(b, rcond_threshold())
        .map_err(|_| FusionError::NumericFailure { voxel })
}
