//! FusionEngine (spec §4.7): the per-voxel main loop. Owns nothing
//! long-lived itself — it borrows the buffers [`crate::driver`] allocated
//! and returns freshly built accumulators, the same division of labor
//! `jupiter-core`'s `pipeline` module keeps between orchestration and
//! per-stage computation.

pub mod config;
pub mod histogram;

use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::atlas::AtlasPair;
use crate::cancel::CancellationToken;
use crate::error::{FusionError, Result};
use crate::exclusion::ExclusionMap;
use crate::geometry::{build_offset_table, OffsetTable};
use crate::grid::Grid;
use crate::image3d::Image3D;
use crate::matching::find_best_match;
use crate::posterior::{accumulate_votes, PosteriorMap};
use crate::stats::normalize_patch;
use crate::weightmap::WeightMapSink;
use crate::weights::{compute_apd, solve_weights};

use self::config::FusionParams;
use self::histogram::DistanceHistogram;

pub struct FusionEngine<'a> {
    pub grid: Grid,
    pub target: &'a Image3D<f32>,
    pub atlases: &'a [AtlasPair],
    pub exclusion: &'a ExclusionMap,
    pub params: &'a FusionParams,
    pub patch_offsets: OffsetTable,
    pub search_offsets: OffsetTable,
}

pub struct EngineOutputs {
    pub posterior: PosteriorMap,
    pub weight_maps: Option<Vec<Image3D<f32>>>,
    pub histogram: Vec<u64>,
}

struct TileResult {
    posterior: PosteriorMap,
    weight_maps: Option<WeightMapSink>,
    histogram: DistanceHistogram,
}

impl<'a> FusionEngine<'a> {
    pub fn new(
        grid: Grid,
        target: &'a Image3D<f32>,
        atlases: &'a [AtlasPair],
        exclusion: &'a ExclusionMap,
        params: &'a FusionParams,
    ) -> Result<Self> {
        let patch_radius = params.patch_radius_usize().ok_or(FusionError::NegativeRadius {
            which: "patchRadius",
            radius: params.patch_radius,
        })?;
        let search_radius = params
            .search_radius_usize()
            .ok_or(FusionError::NegativeRadius {
                which: "searchRadius",
                radius: params.search_radius,
            })?;

        let strides = grid.strides();
        let patch_offsets = build_offset_table(patch_radius, strides, false);
        let search_offsets = build_offset_table(search_radius, strides, true);

        Ok(Self {
            grid,
            target,
            atlases,
            exclusion,
            params,
            patch_offsets,
            search_offsets,
        })
    }

    /// Halo a caller must keep between a voxel and the grid boundary for
    /// every search candidate's patch to stay in bounds: `patchRadius +
    /// searchRadius` along each axis (spec §4.4 edge policy).
    pub fn safe_margin(&self) -> (usize, usize, usize) {
        let (prx, pry, prz) = self
            .params
            .patch_radius_usize()
            .expect("validated in FusionEngine::new");
        let (srx, sry, srz) = self
            .params
            .search_radius_usize()
            .expect("validated in FusionEngine::new");
        (prx + srx, pry + sry, prz + srz)
    }

    pub fn max_manhattan(&self) -> u32 {
        self.search_offsets
            .manhattan
            .as_ref()
            .and_then(|m| m.iter().copied().max())
            .unwrap_or(0)
    }

    /// Runs the main loop over every voxel with `mask(x,y,z) != 0`, then
    /// the final per-voxel argmax (spec §4.7). `output` must already hold
    /// the unique-mask / boundary-fallback labels for every voxel whose
    /// mask is `0` (this pass only ever writes where `mask != 0`).
    #[instrument(skip_all, fields(atlases = self.atlases.len()))]
    pub fn run(
        &self,
        mask: &Image3D<u8>,
        output: &mut Image3D<i32>,
        labels: &[i32],
        cancel: &CancellationToken,
    ) -> Result<EngineOutputs> {
        let (nx, ny, nz) = self.grid.extents;
        let n_tiles = rayon::current_num_threads().max(1).min(nz.max(1));
        let tile_depth = nz.div_ceil(n_tiles.max(1)).max(1);
        let tile_ranges: Vec<(usize, usize)> = (0..nz)
            .step_by(tile_depth)
            .map(|z0| (z0, (z0 + tile_depth).min(nz)))
            .collect();

        info!(tiles = tile_ranges.len(), tile_depth, "starting main fusion loop");

        // Cancellation is polled once per tile at dispatch, never inside a
        // tile's per-voxel math (spec §5).
        let tile_results: Vec<TileResult> = tile_ranges
            .par_iter()
            .map(|&(z0, z1)| {
                if cancel.is_cancelled() {
                    return Err(FusionError::Cancelled);
                }
                self.run_tile(z0, z1, mask, labels)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut posterior = PosteriorMap::new(self.grid.clone(), labels);
        let mut weight_maps = self
            .params
            .generate_weight_maps
            .then(|| WeightMapSink::new(self.grid.clone(), self.atlases.len()));
        let mut histogram = DistanceHistogram::new(self.max_manhattan());

        for tile in &tile_results {
            posterior.merge_from(&tile.posterior);
            if let (Some(global), Some(local)) = (weight_maps.as_mut(), tile.weight_maps.as_ref()) {
                global.merge_from(local);
            }
            histogram.merge_from(&tile.histogram);
        }

        debug!("tile contributions merged, running final argmax");

        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    if mask.get(x, y, z) == 0 {
                        continue;
                    }
                    let label = posterior.argmax(x, y, z, |l| self.exclusion.is_excluded(l, x, y, z));
                    output.set(x, y, z, label);
                }
            }
        }

        Ok(EngineOutputs {
            posterior,
            weight_maps: weight_maps.map(WeightMapSink::into_maps),
            histogram: histogram.into_counts(),
        })
    }

    fn run_tile(&self, z0: usize, z1: usize, mask: &Image3D<u8>, labels: &[i32]) -> Result<TileResult> {
        let (nx, ny, _nz) = self.grid.extents;
        let mut posterior = PosteriorMap::new(self.grid.clone(), labels);
        let mut weight_maps = self
            .params
            .generate_weight_maps
            .then(|| WeightMapSink::new(self.grid.clone(), self.atlases.len()));
        let mut histogram = DistanceHistogram::new(self.max_manhattan());

        let target_data = self.target.as_flat_slice();
        let n_atlas = self.atlases.len();
        let atlas_intensity: Vec<&[f32]> =
            self.atlases.iter().map(|a| a.intensity.as_flat_slice()).collect();
        let atlas_labels: Vec<&[i32]> = self.atlases.iter().map(|a| a.labels.as_flat_slice()).collect();

        let patch_n = self.patch_offsets.len();
        let mut u = vec![0f32; patch_n];
        let mut best_centers = Vec::with_capacity(n_atlas);
        let mut apd = Vec::with_capacity(n_atlas);
        let manhattan = self
            .search_offsets
            .manhattan
            .as_ref()
            .expect("search_offsets is always built with manhattan distances");

        for z in z0..z1 {
            for y in 0..ny {
                for x in 0..nx {
                    if mask.get(x, y, z) == 0 {
                        continue;
                    }

                    let base = self.target.linear_index(x, y, z);
                    normalize_patch(target_data, base, &self.patch_offsets, &mut u);

                    best_centers.clear();
                    apd.clear();

                    for i in 0..n_atlas {
                        let result = find_best_match(
                            &u,
                            atlas_intensity[i],
                            base,
                            &self.patch_offsets,
                            &self.search_offsets,
                            self.params.similarity_mode,
                        );
                        histogram.record(manhattan[result.best_search_index]);

                        let v: Vec<f64> = self
                            .patch_offsets
                            .offsets
                            .iter()
                            .map(|&off| {
                                atlas_intensity[i][(result.best_center as isize + off) as usize] as f64
                            })
                            .collect();
                        apd.push(compute_apd(&u, &v, result.sum_v, result.sum_v2));
                        best_centers.push(result.best_center);
                    }

                    let weights = solve_weights(&apd, self.params.alpha, self.params.beta, (x, y, z))?;

                    if let Some(sink) = weight_maps.as_mut() {
                        sink.record(x, y, z, &weights);
                    }

                    accumulate_votes(
                        &mut posterior,
                        &self.grid,
                        x,
                        y,
                        z,
                        &best_centers,
                        &atlas_labels,
                        &weights,
                        &self.patch_offsets,
                    );
                }
            }
        }

        Ok(TileResult {
            posterior,
            weight_maps,
            histogram,
        })
    }
}
