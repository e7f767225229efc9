//! UniqueLabelMask (spec §4.4): a pre-pass that assigns voxels directly
//! when every atlas agrees on every label sample in the search
//! neighborhood, sparing them the costly main loop.

use crate::geometry::OffsetTable;
use crate::image3d::Image3D;

/// Result of the unique-mask pre-pass: `output` holds the unanimous label
/// wherever `mask == 0`; wherever `mask == 1` the voxel still needs the
/// main fusion loop. `safe_region` is the caller-provided predicate for
/// "the whole search neighborhood fits in the shared grid" — voxels
/// outside it are always marked non-unique (spec §4.4 edge policy).
pub fn compute_unique_mask(
    atlas_labels: &[Image3D<i32>],
    search_offsets: &OffsetTable,
    safe_region: impl Fn(usize, usize, usize) -> bool,
) -> (Image3D<i32>, Image3D<u8>) {
    let grid = atlas_labels[0].grid.clone();
    let (nx, ny, nz) = grid.extents;
    let mut output = Image3D::<i32>::zeros(grid.clone());
    let mut mask = Image3D::<u8>::zeros(grid);

    let label_slices: Vec<&[i32]> = atlas_labels.iter().map(|im| im.as_flat_slice()).collect();

    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                if !safe_region(x, y, z) {
                    mask.set(x, y, z, 1);
                    continue;
                }

                let base = atlas_labels[0].linear_index(x, y, z);
                let mut unanimous: Option<i32> = None;
                let mut all_agree = true;

                'search: for &off in &search_offsets.offsets {
                    let idx = (base as isize + off) as usize;
                    for &slice in &label_slices {
                        let label = slice[idx];
                        match unanimous {
                            None => unanimous = Some(label),
                            Some(l) if l == label => {}
                            Some(_) => {
                                all_agree = false;
                                break 'search;
                            }
                        }
                    }
                }

                if all_agree {
                    output.set(x, y, z, unanimous.expect("search neighborhood is non-empty"));
                    mask.set(x, y, z, 0);
                } else {
                    mask.set(x, y, z, 1);
                }
            }
        }
    }

    (output, mask)
}
