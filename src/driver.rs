//! Driver (spec §4.9): validates inputs, discovers the label set, checks
//! the resource budget, runs the unique-mask pre-pass and the
//! boundary-voxel fallback, then dispatches to [`FusionEngine`].

use std::collections::HashMap;

use tracing::{info, instrument};

use crate::atlas::{discover_labels, AtlasPair};
use crate::cancel::CancellationToken;
use crate::engine::config::FusionParams;
use crate::engine::FusionEngine;
use crate::error::{FusionError, Result};
use crate::exclusion::ExclusionMap;
use crate::grid::{default_tolerance, Grid};
use crate::image3d::Image3D;
use crate::mask::compute_unique_mask;

pub struct FusionOutputs {
    pub labels: Image3D<i32>,
    pub posteriors: Option<HashMap<i32, Image3D<f32>>>,
    pub weight_maps: Option<Vec<Image3D<f32>>>,
    pub histogram: Vec<u64>,
}

/// Runs one complete fusion: validates every input against `target`'s
/// grid (spec §6), discovers the label set, applies the unique-mask
/// pre-pass and boundary fallback, then hands the remaining voxels to
/// [`FusionEngine`].
#[instrument(skip_all, fields(atlases = atlases.len()))]
pub fn fuse_labels(
    target: &Image3D<f32>,
    atlases: &[AtlasPair],
    exclusion: &ExclusionMap,
    params: &FusionParams,
    cancel: &CancellationToken,
) -> Result<FusionOutputs> {
    validate_inputs(target, atlases, params)?;

    let labels = discover_labels(atlases);
    info!(n_labels = labels.len(), "label set discovered");

    let engine = FusionEngine::new(target.grid.clone(), target, atlases, exclusion, params)?;
    check_resource_budget(&engine.grid, labels.len(), atlases.len(), params)?;

    let (nx, ny, nz) = engine.grid.extents;
    let (mx, my, mz) = engine.safe_margin();
    let safe_region = |x: usize, y: usize, z: usize| {
        x >= mx && x + mx < nx && y >= my && y + my < ny && z >= mz && z + mz < nz
    };

    let (mut output, mut mask) = if params.mask_mode {
        let atlas_label_images: Vec<Image3D<i32>> =
            atlases.iter().map(|a| a.labels.clone()).collect();
        let (output, mask) = compute_unique_mask(&atlas_label_images, &engine.search_offsets, safe_region);
        info!("unique-mask pre-pass complete");
        (output, mask)
    } else {
        (
            Image3D::<i32>::zeros(engine.grid.clone()),
            Image3D::<u8>::filled(engine.grid.clone(), 1u8),
        )
    };

    apply_boundary_fallback(atlases, &mut output, &mut mask, safe_region);

    let outputs = engine.run(&mask, &mut output, &labels, cancel)?;
    info!("main fusion loop complete");

    Ok(FusionOutputs {
        labels: output,
        posteriors: params.retain_posteriors.then(|| {
            outputs
                .posterior
                .labels()
                .iter()
                .map(|&label| (label, outputs.posterior.accumulator(label).unwrap().clone()))
                .collect()
        }),
        weight_maps: outputs.weight_maps,
        histogram: outputs.histogram,
    })
}

fn validate_inputs(target: &Image3D<f32>, atlases: &[AtlasPair], params: &FusionParams) -> Result<()> {
    if atlases.is_empty() {
        return Err(FusionError::EmptyAtlasList);
    }
    if params.alpha < 0.0 {
        return Err(FusionError::InvalidAlpha(params.alpha));
    }

    let tolerance = default_tolerance();
    for (i, atlas) in atlases.iter().enumerate() {
        if !target.grid.compatible_with(&atlas.intensity.grid, tolerance) {
            return Err(mismatched(&target.grid, &atlas.intensity.grid, i, "intensity"));
        }
        if !target.grid.compatible_with(&atlas.labels.grid, tolerance) {
            return Err(mismatched(&target.grid, &atlas.labels.grid, i, "labels"));
        }
    }
    Ok(())
}

fn mismatched(target: &Grid, other: &Grid, atlas_index: usize, which: &'static str) -> FusionError {
    FusionError::MismatchedGrid {
        what: which,
        a: format!("target: {:?}", target.extents),
        b: format!("atlas[{atlas_index}].{which}: {:?}", other.extents),
    }
}

/// Approximates the bytes the engine will hold live at once: one global
/// posterior accumulator plus, if enabled, one global weight-map set.
/// Deliberately conservative rather than tracking every per-tile copy —
/// good enough to catch a budget that's wildly too small (spec §5).
fn check_resource_budget(grid: &Grid, n_labels: usize, n_atlases: usize, params: &FusionParams) -> Result<()> {
    let Some(budget) = params.memory_budget_bytes else {
        return Ok(());
    };
    let voxels = grid.voxel_count() as u64;
    let posterior_bytes = voxels * n_labels as u64 * std::mem::size_of::<f32>() as u64;
    let weight_map_bytes = if params.generate_weight_maps {
        voxels * n_atlases as u64 * std::mem::size_of::<f32>() as u64
    } else {
        0
    };
    let requested = posterior_bytes + weight_map_bytes;
    if requested > budget {
        return Err(FusionError::ResourceExhaustion { requested, budget });
    }
    Ok(())
}

/// Voxels whose patch+search neighborhood doesn't fully fit the grid
/// never enter the costly main loop (spec §11.4 of `SPEC_FULL.md`):
/// assign them by plain plurality vote of the raw atlas labels at that
/// single voxel, tie-broken by first atlas index.
fn apply_boundary_fallback(
    atlases: &[AtlasPair],
    output: &mut Image3D<i32>,
    mask: &mut Image3D<u8>,
    safe_region: impl Fn(usize, usize, usize) -> bool,
) {
    let (nx, ny, nz) = output.dim();
    let atlas_labels: Vec<&[i32]> = atlases.iter().map(|a| a.labels.as_flat_slice()).collect();

    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                if safe_region(x, y, z) {
                    continue;
                }
                let idx = atlases[0].labels.linear_index(x, y, z);
                output.set(x, y, z, plurality_label(&atlas_labels, idx));
                mask.set(x, y, z, 0);
            }
        }
    }
}

fn plurality_label(atlas_labels: &[&[i32]], idx: usize) -> i32 {
    let mut counts: Vec<(i32, u32)> = Vec::with_capacity(atlas_labels.len());
    for &slice in atlas_labels {
        let label = slice[idx];
        match counts.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 += 1,
            None => counts.push((label, 1)),
        }
    }

    let mut best_label = 0i32;
    let mut best_count = 0u32;
    for (label, count) in counts {
        if count > best_count {
            best_count = count;
            best_label = label;
        }
    }
    best_label
}
