// src/covariance.rs

use log::trace;
use ndarray::linalg::general_mat_mul;
use ndarray::{Array1, Array2, Axis, ShapeBuilder};

use crate::error::PcaError;
use crate::matrix_view::DataMatrixView;

/// Mean spectrum and second-moment matrix of a voxel x feature data matrix.
#[derive(Debug, Clone)]
pub struct CovarianceEstimate {
    /// Column means, shape `(n_features)`.
    pub mean: Array1<f32>,
    /// `X^T X / n_voxels`, shape `(n_features, n_features)`, exactly symmetric, column-major.
    /// Kept unmodified; solvers receive copies.
    pub covariance: Array2<f32>,
}

/// Computes the mean spectrum and the uncentered covariance `X^T X / n_voxels`.
///
/// The product goes through a single BLAS `gemm` on the transposed view; the lower
/// triangle is then mirrored from the upper one so downstream `UPLO::Upper` consumers
/// see an exactly symmetric matrix. `ndarray` exposes no `syrk`, so this costs a full
/// `n_features^2 * n_voxels` product instead of the half a symmetric rank-k update needs.
pub fn estimate_covariance(data: &DataMatrixView<'_>) -> Result<CovarianceEstimate, PcaError> {
    let x = data.as_view();
    let (n_voxels, n_features) = x.dim();
    if n_voxels == 0 {
        return Err(PcaError::invalid("data matrix has no voxels"));
    }
    if n_features == 0 {
        return Err(PcaError::invalid("data matrix has no features"));
    }

    let mean = x
        .mean_axis(Axis(0))
        .ok_or_else(|| PcaError::invalid("failed to compute mean spectrum"))?;

    let mut covariance = Array2::<f32>::zeros((n_features, n_features).f());
    general_mat_mul(1.0 / n_voxels as f32, &x.t(), &x, 0.0, &mut covariance);
    for j in 0..n_features {
        for i in (j + 1)..n_features {
            covariance[[i, j]] = covariance[[j, i]];
        }
    }
    trace!("Covariance estimated for {} voxels x {} features.", n_voxels, n_features);

    Ok(CovarianceEstimate { mean, covariance })
}
