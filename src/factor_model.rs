// src/factor_model.rs

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::PcaError;
use crate::linalg_backends::{BackendQR, BackendSVD, LinAlgBackendProvider, SVDOutput};

/// Rank-k factor model `scores * loadings^T`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorModel {
    /// Shape `(n_voxels, n_components)`.
    pub scores: Array2<f32>,
    /// Shape `(n_features, n_components)`.
    pub loadings: Array2<f32>,
}

impl FactorModel {
    pub fn new(scores: Array2<f32>, loadings: Array2<f32>) -> Result<Self, PcaError> {
        if scores.ncols() != loadings.ncols() {
            return Err(PcaError::invalid(format!(
                "scores have {} components but loadings have {}",
                scores.ncols(),
                loadings.ncols()
            )));
        }
        Ok(Self { scores, loadings })
    }

    pub fn n_components(&self) -> usize {
        self.scores.ncols()
    }

    /// `scores * loadings^T`, shape `(n_voxels, n_features)`.
    pub fn reconstruct(&self) -> Array2<f32> {
        self.scores.dot(&self.loadings.t())
    }

    /// Same model with the two factors' roles exchanged.
    pub fn transposed(self) -> Self {
        Self { scores: self.loadings, loadings: self.scores }
    }
}

/// Re-expresses `T P^T` with orthogonal scores and orthonormal loadings.
///
/// Thin QR plus a small SVD (Halko, Martinsson & Tropp, SIAM Review 53(2), sec. 3.3.3):
/// `T = Q R`, `P R^T = U S V^T`, then `P' = U` and `T' = Q V S`, so that
/// `T' P'^T = Q V S U^T = Q (P R^T)^T = T P^T`.
pub fn orthogonalize_factor_model(model: FactorModel) -> Result<FactorModel, PcaError> {
    let backend = LinAlgBackendProvider::<f32>::new();
    let k = model.n_components();
    let FactorModel { scores, loadings } = model;
    if loadings.ncols() != k {
        return Err(PcaError::invalid("scores and loadings disagree on the number of components"));
    }
    if scores.nrows() < k || loadings.nrows() < k {
        return Err(PcaError::invalid(format!(
            "factor model with {} components needs at least {} rows in both factors, got {} and {}",
            k,
            k,
            scores.nrows(),
            loadings.nrows()
        )));
    }

    let (q, r) = backend
        .qr_thin(&scores)
        .map_err(PcaError::numerical("thin QR of factor scores"))?;

    // Economy SVD: U stays (rows x k) even when the loadings are the tall factor.
    let projected = loadings.dot(&r.t());
    let svd = backend
        .svd_thin(projected)
        .map_err(PcaError::numerical("SVD of projected loadings"))?;
    let (u, s, vt) = singular_triplets(svd, "SVD of projected loadings")?;

    // LAPACK hands back V^T
    let v = vt.t();
    let new_scores = q.dot(&v) * &s;
    let new_loadings = u;

    Ok(FactorModel { scores: new_scores, loadings: new_loadings })
}

/// Unpacks `(U, S, V^T)`; a backend that omits either factor is a numerical failure of `stage`.
pub(crate) fn singular_triplets(
    svd: SVDOutput<f32>,
    stage: &'static str,
) -> Result<(Array2<f32>, Array1<f32>, Array2<f32>), PcaError> {
    match svd {
        SVDOutput { u: Some(u), s, vt: Some(vt) } => Ok((u, s, vt)),
        _ => Err(PcaError::NumericalFailure {
            stage,
            source: "singular vectors were not returned".into(),
        }),
    }
}
