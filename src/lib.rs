//! Multi-atlas weighted-voting label fusion for 3D volumetric images.
//!
//! [`driver::fuse_labels`] is the entry point: given a target intensity
//! image and a set of co-registered atlas pairs, it produces a label
//! image by patch-based matching, per-atlas weight estimation, and
//! neighborhood-weighted voting. See `SPEC_FULL.md` for the full design.

pub mod atlas;
pub mod cancel;
pub mod consts;
pub mod driver;
pub mod engine;
pub mod error;
pub mod exclusion;
pub mod geometry;
pub mod grid;
pub mod image3d;
pub mod mask;
pub mod matching;
pub mod posterior;
pub mod stats;
pub mod weightmap;
pub mod weights;

pub use atlas::AtlasPair;
pub use cancel::CancellationToken;
pub use driver::{fuse_labels, FusionOutputs};
pub use engine::config::FusionParams;
pub use error::{FusionError, Result};
pub use exclusion::ExclusionMap;
pub use grid::Grid;
pub use image3d::Image3D;
pub use matching::SimilarityMode;
