use thiserror::Error;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("mismatched grid: {what} differs between {a} and {b}")]
    MismatchedGrid {
        what: &'static str,
        a: String,
        b: String,
    },

    #[error("empty atlas list")]
    EmptyAtlasList,

    #[error("negative radius component in {which}: {radius:?}")]
    NegativeRadius {
        which: &'static str,
        radius: (i64, i64, i64),
    },

    #[error("ridge alpha must be >= 0, got {0}")]
    InvalidAlpha(f64),

    #[error("label {label} has no exclusion-map voxel matching the target grid")]
    InvalidExclusionMap { label: i64 },

    #[error("numeric solve failed at voxel {voxel:?}: both Cholesky and SVD paths failed")]
    NumericFailure { voxel: (usize, usize, usize) },

    #[error("resource budget exceeded: requested {requested} bytes, budget {budget} bytes")]
    ResourceExhaustion { requested: u64, budget: u64 },

    #[error("fusion cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, FusionError>;
