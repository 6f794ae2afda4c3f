// src/voxel.rs
//
// Preparation of voxelized count data for the PCA kernel and mapping of the
// resulting scores back onto individual ion positions.

use log::{debug, info};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis, ShapeBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::PcaError;
use crate::matrix_view::DataMatrixView;

/// Non-empty voxels of a grid, ready for `NoiseWeightedPca`.
#[derive(Debug, Clone)]
pub struct CompactedVoxels {
    /// Column-major `(n_nonempty_voxels, n_features)` count matrix.
    pub data: Array2<f32>,
    /// Full-grid index of each row of `data`, ascending.
    pub voxel_indices: Vec<usize>,
}

impl CompactedVoxels {
    pub fn n_voxels(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.data.ncols()
    }

    pub fn view(&self) -> DataMatrixView<'_> {
        DataMatrixView::from(&self.data)
    }
}

/// Drops voxels whose counts are zero in every feature.
///
/// `grid` has one row per voxel of the full grid and one column per feature (ion type).
pub fn compact_voxel_grid(grid: ArrayView2<'_, f32>) -> Result<CompactedVoxels, PcaError> {
    let (n_all_voxels, n_features) = grid.dim();
    let voxel_indices: Vec<usize> = grid
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(_, counts)| counts.iter().any(|&c| c != 0.0))
        .map(|(voxel, _)| voxel)
        .collect();
    if voxel_indices.is_empty() {
        return Err(PcaError::invalid(format!(
            "all {} voxels of the grid are empty",
            n_all_voxels
        )));
    }

    let mut data = Array2::<f32>::zeros((voxel_indices.len(), n_features).f());
    data.assign(&grid.select(Axis(0), &voxel_indices));
    info!(
        "Kept {} of {} voxels with non-zero counts.",
        voxel_indices.len(),
        n_all_voxels
    );
    Ok(CompactedVoxels { data, voxel_indices })
}

/// Maps 3-D positions onto linear voxel indices `x + y * nx + z * nx * ny`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoxelBinner {
    min_edge: [f32; 3],
    voxel_size: [f32; 3],
    num_bins: [usize; 3],
}

impl VoxelBinner {
    /// `min_edge` is the lower corner of the grid, `voxel_size` the edge lengths of one
    /// voxel and `num_bins` the voxel counts along x, y and z.
    pub fn new(min_edge: [f32; 3], voxel_size: [f32; 3], num_bins: [usize; 3]) -> Result<Self, PcaError> {
        if voxel_size.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(PcaError::invalid(format!(
                "voxel sizes must be finite and positive, got {:?}",
                voxel_size
            )));
        }
        if min_edge.iter().any(|m| !m.is_finite()) {
            return Err(PcaError::invalid(format!("grid origin must be finite, got {:?}", min_edge)));
        }
        Ok(Self { min_edge, voxel_size, num_bins })
    }

    pub fn num_voxels(&self) -> usize {
        self.num_bins.iter().product()
    }

    /// Linear voxel index of `position`, or `None` when it falls outside the grid.
    pub fn to_bin(&self, position: [f32; 3]) -> Option<usize> {
        let mut cell = [0usize; 3];
        for axis in 0..3 {
            let normalized = (position[axis] - self.min_edge[axis]) / self.voxel_size[axis];
            if !(normalized >= 0.0) {
                return None;
            }
            let floor = normalized.floor() as usize;
            if floor >= self.num_bins[axis] {
                return None;
            }
            cell[axis] = floor;
        }
        let [nx, ny, _] = self.num_bins;
        Some(cell[0] + cell[1] * nx + cell[2] * nx * ny)
    }
}

/// How component scores are turned into an ion selection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectionOptions {
    /// Component whose scores drive the selection.
    pub component_index: usize,
    /// Minimum scaled score for a voxel to be selected.
    pub isovalue: f32,
    /// Factor applied to raw scores before comparing against `isovalue`.
    pub score_scale: f32,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        SelectionOptions {
            component_index: 0,
            isovalue: 1.0,
            score_scale: 1000.0,
        }
    }
}

/// Selects ions that sit in voxels whose scaled component score reaches the isovalue.
#[derive(Debug, Clone)]
pub struct ScoreSelector {
    binner: VoxelBinner,
    scored_voxels: HashMap<usize, f32>,
    isovalue: f32,
}

impl ScoreSelector {
    /// `voxel_indices` are the grid indices of the rows of `scores`
    /// (as produced by `compact_voxel_grid`).
    pub fn new(
        binner: VoxelBinner,
        voxel_indices: &[usize],
        scores: ArrayView2<'_, f32>,
        options: &SelectionOptions,
    ) -> Result<Self, PcaError> {
        if scores.nrows() != voxel_indices.len() {
            return Err(PcaError::invalid(format!(
                "{} voxel indices for {} score rows",
                voxel_indices.len(),
                scores.nrows()
            )));
        }
        if options.component_index >= scores.ncols() {
            return Err(PcaError::invalid(format!(
                "component index {} out of range for {} components",
                options.component_index,
                scores.ncols()
            )));
        }
        let scored_voxels = voxel_indices
            .iter()
            .copied()
            .zip(scores.column(options.component_index).iter().map(|s| s * options.score_scale))
            .collect();
        Ok(Self { binner, scored_voxels, isovalue: options.isovalue })
    }

    /// Scaled score of a grid voxel, if it was part of the analysis.
    pub fn scaled_score(&self, voxel: usize) -> Option<f32> {
        self.scored_voxels.get(&voxel).copied()
    }

    pub fn is_selected(&self, position: [f32; 3]) -> bool {
        self.binner
            .to_bin(position)
            .and_then(|bin| self.scaled_score(bin))
            .is_some_and(|score| score >= self.isovalue)
    }

    /// Indices (in iteration order) of the positions that are selected.
    pub fn selected_ions<I>(&self, positions: I) -> Vec<usize>
    where
        I: IntoIterator<Item = [f32; 3]>,
    {
        let mut total = 0usize;
        let selected: Vec<usize> = positions
            .into_iter()
            .enumerate()
            .inspect(|_| total += 1)
            .filter(|(_, position)| self.is_selected(*position))
            .map(|(index, _)| index)
            .collect();
        debug!("Selected {} of {} ions at isovalue {}.", selected.len(), total, self.isovalue);
        selected
    }
}

/// Bin width used for score histograms of a selected component.
pub const DEFAULT_SCORE_BIN_SIZE: f32 = 0.01;

/// Fixed-width histogram of component scores, starting at the smallest score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreHistogram {
    /// Lower edge of the first bin.
    pub min: f32,
    pub bin_size: f32,
    /// Voxel count per bin.
    pub counts: Vec<usize>,
}

impl ScoreHistogram {
    /// Lower edge of every bin, paired with its count.
    pub fn bins(&self) -> impl Iterator<Item = (f32, usize)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .map(move |(i, &count)| (self.min + i as f32 * self.bin_size, count))
    }
}

/// Bins `scores` into `ceil((max - min) / bin_size)` bins of width `bin_size`.
///
/// The maximum score lands in the last bin; a constant score vector yields a single bin.
pub fn score_histogram(scores: ArrayView1<'_, f32>, bin_size: f32) -> Result<ScoreHistogram, PcaError> {
    if !(bin_size.is_finite() && bin_size > 0.0) {
        return Err(PcaError::invalid(format!("histogram bin size must be positive, got {}", bin_size)));
    }
    if scores.is_empty() {
        return Err(PcaError::invalid("cannot build a histogram of zero scores"));
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(PcaError::invalid("scores contain NaN or infinite values"));
    }
    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    let n_bins = (((max - min) / bin_size).ceil() as usize).max(1);
    let mut counts = vec![0usize; n_bins];
    for &score in scores.iter() {
        let bin = (((score - min) / bin_size) as usize).min(n_bins - 1);
        counts[bin] += 1;
    }
    Ok(ScoreHistogram { min, bin_size, counts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn compaction_drops_empty_voxels_and_keeps_order() {
        let grid = array![[0.0f32, 0.0], [1.0, 0.0], [0.0, 0.0], [0.0, 2.0], [3.0, 4.0]];
        let compacted = compact_voxel_grid(grid.view()).unwrap();
        assert_eq!(compacted.voxel_indices, vec![1, 3, 4]);
        assert_eq!(compacted.data, array![[1.0f32, 0.0], [0.0, 2.0], [3.0, 4.0]]);
        assert!(compacted.data.t().is_standard_layout());
        assert_eq!(compacted.view().n_rows(), 3);
    }

    #[test]
    fn all_empty_grid_is_rejected() {
        let grid = Array2::<f32>::zeros((4, 3));
        assert!(compact_voxel_grid(grid.view()).unwrap_err().is_invalid_input());
    }

    #[test]
    fn binning_follows_x_fastest_layout() {
        let binner = VoxelBinner::new([0.0, 0.0, 0.0], [1.0, 2.0, 0.5], [4, 3, 5]).unwrap();
        assert_eq!(binner.num_voxels(), 60);
        assert_eq!(binner.to_bin([0.5, 0.5, 0.1]), Some(0));
        assert_eq!(binner.to_bin([3.9, 0.0, 0.0]), Some(3));
        assert_eq!(binner.to_bin([1.0, 2.5, 0.0]), Some(1 + 4));
        assert_eq!(binner.to_bin([2.0, 4.1, 1.2]), Some(2 + 2 * 4 + 2 * 12));
    }

    #[test]
    fn positions_outside_grid_have_no_bin() {
        let binner = VoxelBinner::new([-1.0, -1.0, -1.0], [1.0, 1.0, 1.0], [2, 2, 2]).unwrap();
        assert_eq!(binner.to_bin([-1.5, 0.0, 0.0]), None);
        assert_eq!(binner.to_bin([1.0, 0.0, 0.0]), None);
        assert_eq!(binner.to_bin([0.0, f32::NAN, 0.0]), None);
        assert_eq!(binner.to_bin([0.5, 0.5, 0.5]), Some(7));
    }

    #[test]
    fn invalid_voxel_size_is_rejected() {
        assert!(VoxelBinner::new([0.0; 3], [1.0, 0.0, 1.0], [1, 1, 1]).is_err());
        assert!(VoxelBinner::new([0.0; 3], [1.0, -1.0, 1.0], [1, 1, 1]).is_err());
    }

    #[test]
    fn selection_uses_scaled_scores_and_isovalue() {
        let binner = VoxelBinner::new([0.0; 3], [1.0; 3], [2, 1, 1]).unwrap();
        // voxel 0 scales to 0.48828125, voxel 1 to 1.953125
        let scores = array![[0.00048828125f32, 1.0], [0.001953125, -1.0]];
        let selector = ScoreSelector::new(binner, &[0, 1], scores.view(), &SelectionOptions::default()).unwrap();
        assert_eq!(selector.scaled_score(1), Some(1.953125));
        assert_eq!(selector.scaled_score(7), None);
        let positions = vec![[0.2, 0.2, 0.2], [1.5, 0.5, 0.5], [5.0, 0.0, 0.0], [1.1, 0.9, 0.1]];
        assert_eq!(selector.selected_ions(positions), vec![1, 3]);
    }

    #[test]
    fn histogram_clamps_maximum_into_last_bin() {
        let scores = array![0.0f32, 0.25, 0.5, 0.75, 1.0];
        let histogram = score_histogram(scores.view(), 0.25).unwrap();
        assert_eq!(histogram.counts, vec![1, 1, 1, 2]);
        assert_eq!(histogram.counts.iter().sum::<usize>(), scores.len());
        let edges: Vec<f32> = histogram.bins().map(|(edge, _)| edge).collect();
        assert_eq!(edges, vec![0.0, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn histogram_of_constant_scores_has_one_bin() {
        let scores = array![-0.5f32, -0.5, -0.5];
        let histogram = score_histogram(scores.view(), DEFAULT_SCORE_BIN_SIZE).unwrap();
        assert_eq!(histogram.min, -0.5);
        assert_eq!(histogram.counts, vec![3]);
    }

    #[test]
    fn histogram_rejects_bad_input() {
        let scores = array![0.0f32, 1.0];
        assert!(score_histogram(scores.view(), 0.0).unwrap_err().is_invalid_input());
        assert!(score_histogram(ndarray::Array1::<f32>::zeros(0).view(), 0.01).unwrap_err().is_invalid_input());
        assert!(score_histogram(array![0.0f32, f32::NAN].view(), 0.01).is_err());
    }

    #[test]
    fn selection_rejects_bad_component_index() {
        let binner = VoxelBinner::new([0.0; 3], [1.0; 3], [2, 1, 1]).unwrap();
        let scores = array![[1.0f32], [2.0]];
        let options = SelectionOptions { component_index: 1, ..Default::default() };
        assert!(ScoreSelector::new(binner, &[0, 1], scores.view(), &options).is_err());
    }
}
