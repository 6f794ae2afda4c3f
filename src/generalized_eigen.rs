// src/generalized_eigen.rs

use log::debug;
use ndarray::{s, Array1, Array2};

use crate::error::PcaError;
use crate::linalg_backends::{BackendGeneralizedEigh, LinAlgBackendProvider};

/// Top of the generalized spectrum: eigenvalues descending, eigenvectors in matching column order.
#[derive(Debug, Clone)]
pub struct TruncatedEigenpairs {
    /// Shape `(n_components)`, non-increasing.
    pub eigenvalues: Array1<f32>,
    /// Shape `(n_features, n_components)`, `B`-orthonormal columns.
    pub eigenvectors: Array2<f32>,
}

/// Solves `C x = lambda N x` for the covariance `C` and noise matrix `N`.
///
/// Both modes consume their matrices; callers that need the full spectrum and the
/// truncated eigenvectors hand each call its own copies.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeneralizedEigenSolver {
    backend: LinAlgBackendProvider<f32>,
}

impl GeneralizedEigenSolver {
    pub fn new() -> Self {
        Self { backend: LinAlgBackendProvider::new() }
    }

    /// Every eigenvalue, descending. No eigenvectors are returned.
    pub fn full_spectrum(&self, covariance: Array2<f32>, noise: Array2<f32>) -> Result<Array1<f32>, PcaError> {
        let n_features = covariance.nrows();
        let decomposition = self
            .backend
            .eigh_generalized_upper_into(covariance, noise)
            .map_err(PcaError::numerical("full-spectrum generalized eigensolve"))?;
        // LAPACK order is ascending
        let eigenvalues = decomposition.eigenvalues.slice(s![..;-1]).to_owned();
        debug!(
            "Full generalized spectrum ({} values), leading: {:?}",
            n_features,
            eigenvalues.iter().take(3).collect::<Vec<_>>()
        );
        Ok(eigenvalues)
    }

    /// The `n_components` largest eigenpairs, descending.
    ///
    /// These are the top tail `[n - n_components, n)` of LAPACK's ascending ordering,
    /// reversed so that column 0 pairs with the largest eigenvalue. `ndarray-linalg` wraps
    /// `?sygv` but not the index-range `?sygvx`, so the full eigenvector set is computed
    /// (`O(n_features^3)`) and all but the top `n_components` columns are discarded.
    pub fn truncated(
        &self,
        covariance: Array2<f32>,
        noise: Array2<f32>,
        n_components: usize,
    ) -> Result<TruncatedEigenpairs, PcaError> {
        let n_features = covariance.nrows();
        if n_components == 0 || n_components > n_features {
            return Err(PcaError::invalid(format!(
                "n_components ({}) must lie in [1, {}]",
                n_components, n_features
            )));
        }
        let decomposition = self
            .backend
            .eigh_generalized_upper_into(covariance, noise)
            .map_err(PcaError::numerical("truncated generalized eigensolve"))?;

        let lower = n_features - n_components;
        let eigenvalues = decomposition.eigenvalues.slice(s![lower..;-1]).to_owned();
        let eigenvectors = decomposition.eigenvectors.slice(s![.., lower..;-1]).to_owned();
        debug!(
            "Truncated generalized spectrum: {} of {} eigenpairs kept.",
            n_components, n_features
        );
        Ok(TruncatedEigenpairs { eigenvalues, eigenvectors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn problem() -> (Array2<f32>, Array2<f32>) {
        let c = array![[4.0f32, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]];
        let n = Array2::from_diag(&array![1.0f32, 2.0, 0.5]);
        (c, n)
    }

    #[test]
    fn full_spectrum_is_descending() {
        let (c, n) = problem();
        let evals = GeneralizedEigenSolver::new().full_spectrum(c, n).unwrap();
        assert_eq!(evals.len(), 3);
        for w in evals.windows(2) {
            assert!(w[0] >= w[1], "{:?}", evals);
        }
    }

    #[test]
    fn truncated_matches_leading_full_values() {
        let (c, n) = problem();
        let solver = GeneralizedEigenSolver::new();
        let full = solver.full_spectrum(c.clone(), n.clone()).unwrap();
        let top = solver.truncated(c.clone(), n.clone(), 2).unwrap();
        assert_eq!(top.eigenvectors.dim(), (3, 2));
        for k in 0..2 {
            assert_abs_diff_eq!(top.eigenvalues[k], full[k], epsilon = 1e-4 * full[0].abs());
            // C v = lambda N v
            let v = top.eigenvectors.column(k);
            let lhs = c.dot(&v);
            let rhs = n.dot(&v) * top.eigenvalues[k];
            for (a, b) in lhs.iter().zip(rhs.iter()) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn truncated_vectors_are_noise_orthonormal() {
        let (c, n) = problem();
        let top = GeneralizedEigenSolver::new().truncated(c, n.clone(), 3).unwrap();
        let gram = top.eigenvectors.t().dot(&n).dot(&top.eigenvectors);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(gram[[i, j]], expected, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn truncated_rejects_out_of_range_components() {
        let (c, n) = problem();
        let solver = GeneralizedEigenSolver::new();
        assert!(solver.truncated(c.clone(), n.clone(), 0).unwrap_err().is_invalid_input());
        assert!(solver.truncated(c, n, 4).unwrap_err().is_invalid_input());
    }

    #[test]
    fn non_positive_definite_noise_is_numerical_failure() {
        let c = Array2::<f32>::eye(2);
        let n = Array2::from_diag(&array![1.0f32, 0.0]);
        let err = GeneralizedEigenSolver::new().full_spectrum(c, n).unwrap_err();
        assert!(err.is_numerical_failure(), "{err}");
    }
}
