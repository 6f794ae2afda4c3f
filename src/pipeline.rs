// src/pipeline.rs

use log::{debug, info, log_enabled, Level};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::covariance::{estimate_covariance, CovarianceEstimate};
use crate::diagnostics::{compute_orthogonality_error_f32, relative_max_difference, PipelineDiagnostics};
use crate::error::PcaError;
use crate::factor_model::{orthogonalize_factor_model, FactorModel};
use crate::generalized_eigen::GeneralizedEigenSolver;
use crate::matrix_view::{check_output_len, write_column_major, DataMatrixView};
use crate::noise_model::build_noise_matrix;
use crate::sign::normalize_signs;
use crate::varimax::{varimax_rotate, VarimaxConfig};

/// Configuration for the noise-weighted PCA runner.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NoiseWeightedPcaConfig {
    pub varimax: VarimaxConfig,
}

/// Final results of a full noise-weighted PCA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcaOutput {
    /// Rotated, sign-normalized scores. Columns are orthonormal.
    /// Shape: `(n_voxels, n_components)`
    pub scores: Array2<f32>,
    /// Rotated, sign-normalized loadings, predominantly positive per column.
    /// Shape: `(n_features, n_components)`
    pub loadings: Array2<f32>,
    /// Full generalized eigenvalue spectrum, non-increasing.
    /// Shape: `(n_features)`
    pub eigenvalues: Array1<f32>,
    /// Varimax rotation applied after orthogonalization (before sign normalization).
    /// Shape: `(n_components, n_components)`
    pub rotation: Array2<f32>,
    /// False when varimax stopped at its iteration cap.
    pub rotation_converged: bool,
    pub rotation_iterations: usize,
    /// Present only when debug logging was enabled during the run.
    pub diagnostics: Option<PipelineDiagnostics>,
}

/// Orchestrates noise-weighted PCA of a voxel x feature count matrix.
///
/// The runner holds configuration only; every call allocates its own working matrices,
/// so one instance can be shared across threads.
///
/// ## Numerical Precision
/// All matrix work is single precision (`f32`), including the LAPACK calls
/// (`ssygv`, `sgeqrf`/`sorgqr`, `sgesdd`). Diagnostics are accumulated in `f64`.
#[derive(Debug, Clone, Default)]
pub struct NoiseWeightedPca {
    config: NoiseWeightedPcaConfig,
    solver: GeneralizedEigenSolver,
}

impl NoiseWeightedPca {
    pub fn new(config: NoiseWeightedPcaConfig) -> Self {
        Self { config, solver: GeneralizedEigenSolver::new() }
    }

    pub fn config(&self) -> &NoiseWeightedPcaConfig {
        &self.config
    }

    /// Full generalized eigenvalue spectrum of the covariance against the Poisson noise model,
    /// in descending order.
    pub fn spectrum(&self, data: DataMatrixView<'_>) -> Result<Array1<f32>, PcaError> {
        let start_time = Instant::now();
        info!(
            "Starting noise-weighted spectrum. Voxels={}, Features={}",
            data.n_rows(),
            data.n_cols()
        );
        validate_data(&data)?;
        let (estimate, noise) = self.noise_weighted_moments(&data)?;
        let eigenvalues = self.solver.full_spectrum(estimate.covariance, noise)?;
        info!("Computed noise-weighted spectrum in {:?}", start_time.elapsed());
        Ok(eigenvalues)
    }

    /// Noise-weighted PCA with varimax rotation and sign normalization.
    pub fn compute(&self, data: DataMatrixView<'_>, n_components: usize) -> Result<PcaOutput, PcaError> {
        let overall_start_time = Instant::now();
        let x = data.as_view();
        let (n_voxels, n_features) = x.dim();
        info!(
            "Starting noise-weighted PCA. Voxels={}, Features={}, Components={}",
            n_voxels, n_features, n_components
        );
        validate_data(&data)?;
        validate_components(n_components, n_features)?;

        let stage_start_time = Instant::now();
        let (estimate, noise) = self.noise_weighted_moments(&data)?;
        debug!("Estimated covariance and noise model in {:?}", stage_start_time.elapsed());

        let stage_start_time = Instant::now();
        let eigenvalues = self
            .solver
            .full_spectrum(estimate.covariance.clone(), noise.clone())?;
        let truncated = self
            .solver
            .truncated(estimate.covariance.clone(), noise, n_components)?;
        debug!("Solved generalized eigenproblems in {:?}", stage_start_time.elapsed());

        // T = X V, P = diag(mean) V
        let initial_scores = x.dot(&truncated.eigenvectors);
        let mean_column = estimate.mean.view().insert_axis(Axis(1));
        let initial_loadings = &truncated.eigenvectors * &mean_column;
        let initial = FactorModel::new(initial_scores, initial_loadings)?;

        let collect_diagnostics = log_enabled!(Level::Debug);
        let initial_reconstruction = collect_diagnostics.then(|| initial.reconstruct());

        // Loadings take the QR role so the scores come out orthonormal for varimax.
        let stage_start_time = Instant::now();
        let orthogonal = orthogonalize_factor_model(initial.transposed())?.transposed();
        debug!("Orthogonalized factor model in {:?}", stage_start_time.elapsed());

        let mut diagnostics = initial_reconstruction.map(|before| {
            let after = orthogonal.reconstruct();
            PipelineDiagnostics {
                scores_orthogonality_error: compute_orthogonality_error_f32(&orthogonal.scores.view()),
                orthogonalization_drift: Some(relative_max_difference(&before.view(), &after.view())),
                ..Default::default()
            }
        });
        let orthogonal_reconstruction = collect_diagnostics.then(|| orthogonal.reconstruct());

        let stage_start_time = Instant::now();
        let outcome = varimax_rotate(orthogonal, &self.config.varimax)?;
        debug!(
            "Varimax rotation finished after {} iterations (converged: {}) in {:?}",
            outcome.iterations,
            outcome.converged,
            stage_start_time.elapsed()
        );

        let mut model = outcome.model;
        let signs = normalize_signs(&mut model);
        debug!("Component signs: {:?}", signs.to_vec());

        if let (Some(diag), Some(before)) = (diagnostics.as_mut(), orthogonal_reconstruction) {
            diag.rotation_orthogonality_error = compute_orthogonality_error_f32(&outcome.rotation.view());
            diag.rotation_drift = Some(relative_max_difference(&before.view(), &model.reconstruct().view()));
            debug!("Pipeline diagnostics: {:?}", diag);
        }

        info!(
            "Noise-weighted PCA finished in {:?}. Leading eigenvalues: {:?}",
            overall_start_time.elapsed(),
            eigenvalues.iter().take(n_components.min(5)).collect::<Vec<_>>()
        );

        Ok(PcaOutput {
            scores: model.scores,
            loadings: model.loadings,
            eigenvalues,
            rotation: outcome.rotation,
            rotation_converged: outcome.converged,
            rotation_iterations: outcome.iterations,
            diagnostics,
        })
    }

    fn noise_weighted_moments(&self, data: &DataMatrixView<'_>) -> Result<(CovarianceEstimate, Array2<f32>), PcaError> {
        let estimate = estimate_covariance(data)?;
        let noise = build_noise_matrix(&estimate.mean)?;
        Ok((estimate, noise))
    }
}

fn validate_data(data: &DataMatrixView<'_>) -> Result<(), PcaError> {
    let (n_voxels, n_features) = (data.n_rows(), data.n_cols());
    if n_features == 0 {
        return Err(PcaError::invalid("data matrix has no features"));
    }
    if n_voxels <= n_features {
        return Err(PcaError::invalid(format!(
            "need more voxels than features, got {} voxels for {} features",
            n_voxels, n_features
        )));
    }
    if data.as_view().iter().any(|v| !v.is_finite()) {
        return Err(PcaError::invalid("data matrix contains NaN or infinite values"));
    }
    Ok(())
}

fn validate_components(n_components: usize, n_features: usize) -> Result<(), PcaError> {
    if n_components == 0 || n_components > n_features {
        return Err(PcaError::invalid(format!(
            "n_components ({}) must lie in [1, {}]",
            n_components, n_features
        )));
    }
    Ok(())
}

/// Fills `evals` with the full descending noise-weighted eigenvalue spectrum.
///
/// `data` is a column-major `n_voxels x n_features` buffer. `n_evals` is accepted for
/// caller compatibility only; the whole spectrum is always computed and `evals` must
/// hold exactly `n_features` values. On error `evals` is left untouched.
pub fn spectrum_only(
    n_voxels: usize,
    n_features: usize,
    data: &[f32],
    n_evals: usize,
    evals: &mut [f32],
) -> Result<(), PcaError> {
    if n_evals != n_features {
        debug!(
            "Requested eigenvalue count {} ignored; returning all {} eigenvalues.",
            n_evals, n_features
        );
    }
    let view = DataMatrixView::from_column_major(data, n_voxels, n_features)?;
    check_output_len("evals", evals, n_features, 1)?;
    let eigenvalues = NoiseWeightedPca::default().spectrum(view)?;
    evals.copy_from_slice(&eigenvalues.to_vec());
    Ok(())
}

/// Full noise-weighted PCA into caller buffers (all column-major, single precision).
///
/// * `scores` – `n_voxels x n_components`
/// * `loads` – `n_features x n_components`
/// * `evals` – `n_features`, full descending spectrum
///
/// `n_ions` is caller bookkeeping and does not influence the result. Either every
/// output is written or, on error, none is.
#[allow(clippy::too_many_arguments)]
pub fn full_pca(
    n_voxels: usize,
    n_features: usize,
    data: &[f32],
    n_ions: usize,
    n_components: usize,
    scores: &mut [f32],
    loads: &mut [f32],
    evals: &mut [f32],
) -> Result<(), PcaError> {
    debug!("full_pca called for {} ranged ions.", n_ions);
    let view = DataMatrixView::from_column_major(data, n_voxels, n_features)?;
    validate_components(n_components, n_features)?;
    check_output_len("scores", scores, n_voxels, n_components)?;
    check_output_len("loads", loads, n_features, n_components)?;
    check_output_len("evals", evals, n_features, 1)?;

    let output = NoiseWeightedPca::default().compute(view, n_components)?;

    write_column_major(scores, &output.scores.view())?;
    write_column_major(loads, &output.loadings.view())?;
    evals.copy_from_slice(&output.eigenvalues.to_vec());
    Ok(())
}
