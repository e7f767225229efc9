//! Integration tests for the six literal scenarios and the quantified
//! invariants of `SPEC_FULL.md` §1–9 (unchanged from `spec.md` §8).

use approx::assert_relative_eq;
use label_fusion::cancel::CancellationToken;
use label_fusion::driver::fuse_labels;
use label_fusion::exclusion::ExclusionMap;
use label_fusion::geometry::build_offset_table;
use label_fusion::grid::Grid;
use label_fusion::image3d::Image3D;
use label_fusion::mask::compute_unique_mask;
use label_fusion::{AtlasPair, FusionParams};

/// A smoothly varying, non-periodic intensity field so patch matching has
/// a unique best candidate almost everywhere — avoids accidental ties
/// that would make test expectations depend on offset-table iteration
/// order.
fn ramp_intensity(grid: &Grid) -> Image3D<f32> {
    let (nx, ny, nz) = grid.extents;
    let mut image = Image3D::<f32>::zeros(grid.clone());
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let v = x as f32 + 2.0 * y as f32 + 3.0 * z as f32;
                image.set(x, y, z, v * 0.37 + (x as f32 * y as f32 * 0.01).sin());
            }
        }
    }
    image
}

/// A second, differently-shaped intensity field — used where a test needs
/// an atlas that does *not* trivially identity-match the target.
fn ramp_intensity_variant(grid: &Grid) -> Image3D<f32> {
    let (nx, ny, nz) = grid.extents;
    let mut image = Image3D::<f32>::zeros(grid.clone());
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let v = x as f32 * 1.1 + y as f32 * 2.3 + z as f32 * 2.9;
                image.set(x, y, z, v * 0.29 + (x as f32 + y as f32 * 0.5).cos());
            }
        }
    }
    image
}

fn scaled(image: &Image3D<f32>, lambda: f32) -> Image3D<f32> {
    let mut out = image.clone();
    for v in out.as_flat_slice_mut() {
        *v *= lambda;
    }
    out
}

#[test]
fn scenario1_single_atlas_exact_match() {
    let grid = Grid::identity((10, 10, 10));
    let intensity = ramp_intensity(&grid);

    let mut labels = Image3D::<i32>::zeros(grid.clone());
    for z in 3..7 {
        for y in 3..7 {
            for x in 3..7 {
                labels.set(x, y, z, 7);
            }
        }
    }
    let atlas = AtlasPair::new(intensity.clone(), labels.clone());

    let mut params = FusionParams::default();
    params.patch_radius = (1, 1, 0);
    params.search_radius = (1, 1, 0);
    params.alpha = 0.1;
    params.beta = 2.0;

    let exclusion = ExclusionMap::empty();
    let cancel = CancellationToken::new();
    let outputs = fuse_labels(&intensity, &[atlas], &exclusion, &params, &cancel).unwrap();

    // Safe interior: margin = patchRadius + searchRadius = (2, 2, 0).
    for z in 0..10 {
        for y in 2..8 {
            for x in 2..8 {
                assert_eq!(
                    outputs.labels.get(x, y, z),
                    labels.get(x, y, z),
                    "identity-atlas property violated at ({x},{y},{z})"
                );
            }
        }
    }
}

#[test]
fn scenario2_two_atlases_contradiction_at_boundary() {
    let grid = Grid::identity((10, 10, 10));
    let intensity = ramp_intensity(&grid);

    // x < 5 labeled 1 (atlas1) / 2 (atlas2); x >= 5 labeled 3 (atlas1) / 4
    // (atlas2) — kept distinct from {1, 2} so the boundary tie under test
    // isn't diluted by the far side's votes.
    let mut labels1 = Image3D::<i32>::zeros(grid.clone());
    let mut labels2 = Image3D::<i32>::zeros(grid.clone());
    for z in 0..10 {
        for y in 0..10 {
            for x in 0..10 {
                if x < 5 {
                    labels1.set(x, y, z, 1);
                    labels2.set(x, y, z, 2);
                } else {
                    labels1.set(x, y, z, 3);
                    labels2.set(x, y, z, 4);
                }
            }
        }
    }

    let atlas1 = AtlasPair::new(intensity.clone(), labels1);
    let atlas2 = AtlasPair::new(intensity.clone(), labels2);

    let mut params = FusionParams::default();
    params.patch_radius = (1, 0, 0);
    params.search_radius = (1, 0, 0);
    params.generate_weight_maps = true;

    let exclusion = ExclusionMap::empty();
    let cancel = CancellationToken::new();
    let outputs = fuse_labels(&intensity, &[atlas1, atlas2], &exclusion, &params, &cancel).unwrap();

    assert_eq!(outputs.labels.get(4, 5, 5), 1, "tie-break must pick the lower label value");

    let maps = outputs.weight_maps.unwrap();
    let sum = maps[0].get(4, 5, 5) + maps[1].get(4, 5, 5);
    assert_relative_eq!(sum, 1.0, epsilon = 1e-6);
}

#[test]
fn scenario3_unique_mask_shortcut() {
    let grid = Grid::identity((6, 6, 6));
    let labels = Image3D::<i32>::filled(grid.clone(), 5);
    let intensity = ramp_intensity(&grid);
    let atlases: Vec<AtlasPair> = (0..3)
        .map(|_| AtlasPair::new(intensity.clone(), labels.clone()))
        .collect();

    let mut params = FusionParams::default();
    params.patch_radius = (1, 1, 1);
    params.search_radius = (1, 1, 1);

    let exclusion = ExclusionMap::empty();
    let cancel = CancellationToken::new();
    let outputs = fuse_labels(&intensity, &atlases, &exclusion, &params, &cancel).unwrap();

    for z in 0..6 {
        for y in 0..6 {
            for x in 0..6 {
                assert_eq!(outputs.labels.get(x, y, z), 5);
            }
        }
    }

    // Every atlas agrees everywhere, so the pre-pass alone resolves the
    // whole interior without a single solve.
    let strides = grid.strides();
    let search = build_offset_table((1, 1, 1), strides, true);
    let safe = |x: usize, y: usize, z: usize| x >= 2 && x < 4 && y >= 2 && y < 4 && z >= 2 && z < 4;
    let (_out, mask) = compute_unique_mask(&[labels.clone(), labels.clone(), labels.clone()], &search, safe);
    for z in 2..4 {
        for y in 2..4 {
            for x in 2..4 {
                assert_eq!(mask.get(x, y, z), 0);
            }
        }
    }
}

#[test]
fn scenario4_exclusion_overrides_argmax() {
    let grid = Grid::identity((9, 9, 9));
    let intensity = ramp_intensity(&grid);

    // Three atlases agree everywhere except at the voxel under test,
    // where the third disagrees — so label 2 gets roughly twice the
    // weight of label 3 there.
    let labels_agree = Image3D::<i32>::filled(grid.clone(), 2);
    let mut labels_dissent = Image3D::<i32>::filled(grid.clone(), 2);
    labels_dissent.set(4, 4, 4, 3);

    let atlas1 = AtlasPair::new(intensity.clone(), labels_agree.clone());
    let atlas2 = AtlasPair::new(intensity.clone(), labels_agree);
    let atlas3 = AtlasPair::new(intensity.clone(), labels_dissent);

    let mut params = FusionParams::default();
    params.patch_radius = (1, 1, 1);
    params.search_radius = (1, 1, 1);
    params.mask_mode = false;

    let mut exclusion_mask = Image3D::<u8>::zeros(grid.clone());
    exclusion_mask.set(4, 4, 4, 1);
    let mut exclusion = ExclusionMap::empty();
    exclusion.insert(2, exclusion_mask, &grid).unwrap();

    let cancel = CancellationToken::new();
    let outputs = fuse_labels(&intensity, &[atlas1, atlas2, atlas3], &exclusion, &params, &cancel).unwrap();

    assert_ne!(outputs.labels.get(4, 4, 4), 2);
    assert_eq!(outputs.labels.get(4, 4, 4), 3);
}

#[test]
fn scenario5_conditioning_fallback_produces_finite_weights() {
    let grid = Grid::identity((8, 8, 8));
    let intensity = ramp_intensity(&grid);
    // atlas1 does not match the target exactly, so its patch residual is
    // generically nonzero; atlas2's intensity is a tiny positive scaling
    // of atlas1's, and patch z-normalization cancels that scale factor
    // exactly (candidate scores are scale-invariant for a positive
    // factor, so both atlases pick the same best center), so their apd
    // vectors end up identical and Mx is exactly rank-1 before the ridge.
    let atlas1_intensity = ramp_intensity_variant(&grid);
    let atlas2_intensity = scaled(&atlas1_intensity, 1e-6);

    let labels = Image3D::<i32>::filled(grid.clone(), 1);
    let atlas1 = AtlasPair::new(atlas1_intensity, labels.clone());
    let atlas2 = AtlasPair::new(atlas2_intensity, labels);

    let mut params = FusionParams::default();
    params.patch_radius = (1, 1, 1);
    params.search_radius = (1, 1, 1);
    params.alpha = 1e-6;
    params.mask_mode = false;
    params.generate_weight_maps = true;

    let exclusion = ExclusionMap::empty();
    let cancel = CancellationToken::new();
    let outputs = fuse_labels(&intensity, &[atlas1, atlas2], &exclusion, &params, &cancel).unwrap();

    let maps = outputs.weight_maps.unwrap();
    for z in 2..6 {
        for y in 2..6 {
            for x in 2..6 {
                let w0 = maps[0].get(x, y, z);
                let w1 = maps[1].get(x, y, z);
                assert!(w0.is_finite() && w1.is_finite(), "weights must stay finite under SVD fallback");
                assert_relative_eq!(w0 + w1, 1.0, epsilon = 1e-6);
            }
        }
    }
}

#[test]
fn scenario6_low_contrast_patch_has_defined_output() {
    let grid = Grid::identity((6, 6, 6));
    let intensity = Image3D::<f32>::filled(grid.clone(), 5.0f32);
    let labels = Image3D::<i32>::filled(grid.clone(), 7);
    let atlas = AtlasPair::new(intensity.clone(), labels);

    let mut params = FusionParams::default();
    params.patch_radius = (1, 1, 1);
    params.search_radius = (1, 1, 1);
    params.mask_mode = false;
    params.generate_weight_maps = true;

    let exclusion = ExclusionMap::empty();
    let cancel = CancellationToken::new();
    let outputs = fuse_labels(&intensity, &[atlas], &exclusion, &params, &cancel).unwrap();

    for z in 2..4 {
        for y in 2..4 {
            for x in 2..4 {
                assert_eq!(outputs.labels.get(x, y, z), 7);
            }
        }
    }
    let maps = outputs.weight_maps.unwrap();
    assert_relative_eq!(maps[0].get(3, 3, 3), 1.0, epsilon = 1e-6);
}
