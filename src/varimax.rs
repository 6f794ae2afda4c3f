// src/varimax.rs

use log::{debug, trace, warn};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::PcaError;
use crate::factor_model::{singular_triplets, FactorModel};
use crate::linalg_backends::{BackendSVD, LinAlgBackendProvider};

/// Iteration controls for the varimax rotation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VarimaxConfig {
    /// Hard cap on SVD iterations.
    pub max_iterations: usize,
    /// Stop once the relative objective gain `(cost - previous) / cost` falls below this.
    pub tolerance: f32,
}

impl Default for VarimaxConfig {
    fn default() -> Self {
        VarimaxConfig {
            max_iterations: 500,
            tolerance: 1.0e-8,
        }
    }
}

/// Result of a varimax rotation.
#[derive(Debug, Clone)]
pub struct VarimaxOutcome {
    /// `(T0 R, P R)`.
    pub model: FactorModel,
    /// Orthogonal `k x k` rotation that was applied to both factors.
    pub rotation: Array2<f32>,
    /// Number of SVD iterations performed.
    pub iterations: usize,
    /// False when the iteration cap was reached first. The last rotation is still applied.
    pub converged: bool,
    /// Sum of singular values after every iteration.
    pub objective_history: Vec<f32>,
}

/// Varimax rotation of the scores (Lawley & Maxwell, iterative SVD form).
///
/// The scores must have orthonormal columns. Each iteration forms the gradient
/// `C = T.^3 - T diag(mean(T.^2))`, takes the SVD `T0^T C = U S V^T` and sets
/// `R = U V^T`, `T = T0 R`. The loadings receive the same final `R`, so
/// `T P^T` is unchanged.
///
/// Hitting `max_iterations` is not an error: the rotation from the last iteration is
/// returned with `converged == false` and a warning is logged.
pub fn varimax_rotate(model: FactorModel, config: &VarimaxConfig) -> Result<VarimaxOutcome, PcaError> {
    let backend = LinAlgBackendProvider::<f32>::new();
    let FactorModel { scores: reference, loadings } = model;
    let k = reference.ncols();
    if loadings.ncols() != k {
        return Err(PcaError::invalid("scores and loadings disagree on the number of components"));
    }

    let mut rotation = Array2::<f32>::eye(k);
    let mut rotated = reference.clone();
    let mut objective_history = Vec::new();
    let mut previous_cost = 0.0f32;
    let mut converged = false;
    let mut iterations = 0;

    while iterations < config.max_iterations {
        iterations += 1;

        let mean_square = rotated
            .mapv(|x| x * x)
            .mean_axis(Axis(0))
            .ok_or_else(|| PcaError::invalid("cannot rotate a factor model without voxels"))?;
        let gradient = rotated.mapv(|x| x * x * x) - &(&rotated * &mean_square);
        let cross = reference.t().dot(&gradient);

        let svd = backend
            .svd_into(cross, true, true)
            .map_err(PcaError::numerical("varimax SVD"))?;
        let (u, singular_values, vt) = singular_triplets(svd, "varimax SVD")?;
        rotation = u.dot(&vt);
        rotated = reference.dot(&rotation);

        let cost = singular_values.sum();
        if !cost.is_finite() {
            return Err(PcaError::NumericalFailure {
                stage: "varimax objective",
                source: format!("objective became {} at iteration {}", cost, iterations).into(),
            });
        }
        objective_history.push(cost);
        trace!("Varimax iteration {}: objective {}", iterations, cost);

        if cost <= 0.0 || (cost - previous_cost) / cost < config.tolerance {
            converged = true;
            break;
        }
        previous_cost = cost;
    }

    if converged {
        debug!("Varimax converged after {} iterations.", iterations);
    } else {
        warn!(
            "Varimax did not converge within {} iterations; keeping the last rotation.",
            config.max_iterations
        );
    }

    let loadings = loadings.dot(&rotation);
    Ok(VarimaxOutcome {
        model: FactorModel { scores: rotated, loadings },
        rotation,
        iterations,
        converged,
        objective_history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{compute_orthogonality_error_f32, relative_max_difference};
    use crate::factor_model::orthogonalize_factor_model;
    use approx::assert_abs_diff_eq;

    /// Two overlapping blocks of voxels, mixed by a 30 degree rotation.
    fn mixed_orthonormal_model() -> FactorModel {
        let n = 60;
        let mut simple = Array2::<f32>::zeros((n, 2));
        for i in 0..n {
            if i < 30 {
                simple[[i, 0]] = 1.0 + (i % 3) as f32 * 0.1;
            } else {
                simple[[i, 1]] = 1.0 + (i % 4) as f32 * 0.1;
            }
        }
        let (c, s) = (30f32.to_radians().cos(), 30f32.to_radians().sin());
        let mix = ndarray::array![[c, -s], [s, c]];
        let scores = simple.dot(&mix);
        let loadings = ndarray::array![[1.0f32, 0.2], [0.5, 1.0], [0.3, 0.3], [0.8, 0.1]];
        let model = FactorModel::new(scores, loadings).unwrap();
        orthogonalize_factor_model(model.transposed()).unwrap().transposed()
    }

    #[test]
    fn rotation_is_orthogonal_and_reconstruction_preserved() {
        let model = mixed_orthonormal_model();
        let before = model.reconstruct();
        let out = varimax_rotate(model, &VarimaxConfig::default()).unwrap();
        let err = compute_orthogonality_error_f32(&out.rotation.view()).unwrap();
        assert!(err < 1e-4, "rotation orthogonality error {err}");
        let drift = relative_max_difference(&before.view(), &out.model.reconstruct().view());
        assert!(drift < 1e-4, "reconstruction drift {drift}");
        assert!(out.converged);
    }

    #[test]
    fn objective_increases_until_stop() {
        let out = varimax_rotate(mixed_orthonormal_model(), &VarimaxConfig::default()).unwrap();
        let history = &out.objective_history;
        assert_eq!(history.len(), out.iterations);
        let accepted = &history[..history.len() - 1];
        for w in accepted.windows(2) {
            assert!(w[1] >= w[0], "objective decreased: {history:?}");
        }
    }

    #[test]
    fn rotation_recovers_block_structure() {
        let out = varimax_rotate(mixed_orthonormal_model(), &VarimaxConfig::default()).unwrap();
        let scores = &out.model.scores;
        // after rotation each voxel block should load on one component only
        for col in 0..2 {
            let first: f32 = scores.column(col).iter().take(30).map(|x| x * x).sum();
            let second: f32 = scores.column(col).iter().skip(30).map(|x| x * x).sum();
            let ratio = first.min(second) / first.max(second);
            assert!(ratio < 1e-3, "component {col} still mixes blocks: {first} vs {second}");
        }
    }

    #[test]
    fn iteration_cap_is_soft() {
        let config = VarimaxConfig { max_iterations: 1, tolerance: 0.0 };
        let model = mixed_orthonormal_model();
        let out = varimax_rotate(model, &config).unwrap();
        assert_eq!(out.iterations, 1);
        assert!(!out.converged);
        let err = compute_orthogonality_error_f32(&out.rotation.view()).unwrap();
        assert!(err < 1e-4);
    }

    #[test]
    fn single_component_rotation_is_plus_or_minus_one() {
        let scores = Array2::from_shape_fn((10, 1), |(i, _)| (i as f32 + 1.0) / 19.621416);
        let loadings = Array2::from_elem((3, 1), 2.0f32);
        let out = varimax_rotate(FactorModel::new(scores, loadings).unwrap(), &VarimaxConfig::default()).unwrap();
        assert_abs_diff_eq!(out.rotation[[0, 0]].abs(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn zero_iterations_leave_model_untouched() {
        let config = VarimaxConfig { max_iterations: 0, tolerance: 1e-8 };
        let model = mixed_orthonormal_model();
        let out = varimax_rotate(model.clone(), &config).unwrap();
        assert_eq!(out.model, model);
        assert!(!out.converged);
    }
}
