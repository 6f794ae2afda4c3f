// src/linalg_backends.rs

use ndarray::{s, Array1, Array2};
use ndarray_linalg::{
    EighInto as NdLinalgEighInto, JobSvd, SVDDCInto as NdLinalgSVDDCInto, QR as NdLinalgQR,
    SVDInto as NdLinalgSVDInto, UPLO,
};
use std::error::Error;
use std::marker::PhantomData;

use crate::error::ThreadSafeStdError;

#[derive(Debug, Default, Copy, Clone)]
pub struct LinAlgBackendProvider<F: 'static + Copy + Send + Sync> {
    _phantom: PhantomData<F>,
}

impl<F: 'static + Copy + Send + Sync> LinAlgBackendProvider<F> {
    pub fn new() -> Self {
        Self { _phantom: PhantomData }
    }
}

// --- Trait Definitions ---

/// Output of a symmetric (generalized) eigendecomposition.
#[derive(Debug)]
pub struct EighOutput<F: 'static> {
    /// Eigenvalues in ascending order, the native LAPACK convention.
    pub eigenvalues: Array1<F>,
    /// Eigenvectors as columns of the matrix.
    /// eigenvectors.column(i) corresponds to eigenvalues[i].
    pub eigenvectors: Array2<F>,
}

/// Symmetric-definite generalized eigenproblem `A x = lambda B x` (LAPACK `?sygv`, itype 1).
///
/// Only the upper triangles of `a` and `b` are referenced. Both matrices are consumed:
/// LAPACK overwrites `a` with the eigenvectors and `b` with its Cholesky factor, so a caller
/// that needs the inputs again must pass copies.
/// The returned eigenvectors are `B`-orthonormal (`X^T B X = I`).
pub trait BackendGeneralizedEigh<F: 'static + Copy + Send + Sync> {
    fn eigh_generalized_upper_into(
        &self,
        a: Array2<F>,
        b: Array2<F>,
    ) -> Result<EighOutput<F>, ThreadSafeStdError>;
}

/// Thin QR decomposition `A = Q R` of an `m x n` matrix with `m >= n`.
pub trait BackendQR<F: 'static + Copy + Send + Sync> {
    /// Returns `(Q, R)` with `Q` of shape `(m, n)` and upper-triangular `R` of shape `(n, n)`.
    fn qr_thin(&self, matrix: &Array2<F>) -> Result<(Array2<F>, Array2<F>), ThreadSafeStdError>;
}

/// Output of a Singular Value Decomposition.
#[derive(Debug)]
pub struct SVDOutput<F: 'static> {
    pub u: Option<Array2<F>>,
    pub s: Array1<F>,
    /// Right singular vectors as rows, i.e. the transpose of the conventional `V`.
    pub vt: Option<Array2<F>>,
}

/// Trait for Singular Value Decomposition.
pub trait BackendSVD<F: 'static + Copy + Send + Sync> {
    /// Full-size factors: `U` is `m x m`, `V^T` is `n x n`.
    fn svd_into(&self, matrix: Array2<F>, compute_u: bool, compute_v: bool) -> Result<SVDOutput<F>, ThreadSafeStdError>;

    /// Economy SVD (LAPACK `?gesdd`, `jobz = 'S'`): with `k = min(m, n)`, `U` is `m x k`
    /// and `V^T` is `k x n`. Both factors are always returned.
    fn svd_thin(&self, matrix: Array2<F>) -> Result<SVDOutput<F>, ThreadSafeStdError>;
}

// --- NdarrayLinAlgBackend Implementation ---

/// LAPACK through `ndarray-linalg`; the provider is picked by the `backend_*` Cargo features.
#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

// Helper to convert ndarray-linalg's error to Box<dyn Error + Send + Sync>
fn to_dyn_error<E: Error + Send + Sync + 'static>(e: E) -> ThreadSafeStdError {
    Box::new(e)
}

impl BackendGeneralizedEigh<f32> for NdarrayLinAlgBackend {
    fn eigh_generalized_upper_into(
        &self,
        a: Array2<f32>,
        b: Array2<f32>,
    ) -> Result<EighOutput<f32>, ThreadSafeStdError> {
        if a.nrows() != a.ncols() || b.nrows() != b.ncols() || a.nrows() != b.nrows() {
            return Err(format!(
                "Generalized eigenproblem needs two square matrices of equal order, got {:?} and {:?}.",
                a.dim(),
                b.dim()
            )
            .into());
        }
        if a.is_empty() {
            return Ok(EighOutput { eigenvalues: Array1::zeros(0), eigenvectors: Array2::zeros((0, 0)) });
        }
        let (eigenvalues, (eigenvectors, _cholesky_factor)) =
            (a, b).eigh_into(UPLO::Upper).map_err(to_dyn_error)?;
        if eigenvalues.iter().any(|v| !v.is_finite()) {
            return Err("Generalized eigensolver returned non-finite eigenvalues.".into());
        }
        Ok(EighOutput { eigenvalues, eigenvectors })
    }
}

impl BackendQR<f32> for NdarrayLinAlgBackend {
    fn qr_thin(&self, matrix: &Array2<f32>) -> Result<(Array2<f32>, Array2<f32>), ThreadSafeStdError> {
        let (nrows, ncols) = matrix.dim();
        if nrows < ncols {
            return Err(format!("Thin QR needs a tall matrix, got {}x{}.", nrows, ncols).into());
        }
        let (q_factor, r_factor) = matrix.qr().map_err(to_dyn_error)?;
        // Guard against a full-size Q from the LAPACK wrapper.
        let q_thin = q_factor.slice(s![.., ..ncols]).to_owned();
        let r_square = r_factor.slice(s![..ncols, ..ncols]).to_owned();
        Ok((q_thin, r_square))
    }
}

impl BackendSVD<f32> for NdarrayLinAlgBackend {
    fn svd_into(&self, matrix: Array2<f32>, compute_u: bool, compute_v: bool) -> Result<SVDOutput<f32>, ThreadSafeStdError> {
        let (u, s, vt) = matrix.svd_into(compute_u, compute_v).map_err(to_dyn_error)?;
        Ok(SVDOutput { u, s, vt })
    }

    fn svd_thin(&self, matrix: Array2<f32>) -> Result<SVDOutput<f32>, ThreadSafeStdError> {
        if matrix.is_empty() {
            return Err(format!("Thin SVD of an empty {}x{} matrix.", matrix.nrows(), matrix.ncols()).into());
        }
        let (u, s, vt) = matrix.svddc_into(JobSvd::Some).map_err(to_dyn_error)?;
        Ok(SVDOutput { u, s, vt })
    }
}

// --- LinAlgBackendProvider Dispatch ---

impl<F> BackendGeneralizedEigh<F> for LinAlgBackendProvider<F>
where
    F: 'static + Copy + Send + Sync,
    NdarrayLinAlgBackend: BackendGeneralizedEigh<F>,
{
    fn eigh_generalized_upper_into(
        &self,
        a: Array2<F>,
        b: Array2<F>,
    ) -> Result<EighOutput<F>, ThreadSafeStdError> {
        NdarrayLinAlgBackend.eigh_generalized_upper_into(a, b)
    }
}

impl<F> BackendQR<F> for LinAlgBackendProvider<F>
where
    F: 'static + Copy + Send + Sync,
    NdarrayLinAlgBackend: BackendQR<F>,
{
    fn qr_thin(&self, matrix: &Array2<F>) -> Result<(Array2<F>, Array2<F>), ThreadSafeStdError> {
        NdarrayLinAlgBackend.qr_thin(matrix)
    }
}

impl<F> BackendSVD<F> for LinAlgBackendProvider<F>
where
    F: 'static + Copy + Send + Sync,
    NdarrayLinAlgBackend: BackendSVD<F>,
{
    fn svd_into(&self, matrix: Array2<F>, compute_u: bool, compute_v: bool) -> Result<SVDOutput<F>, ThreadSafeStdError> {
        NdarrayLinAlgBackend.svd_into(matrix, compute_u, compute_v)
    }

    fn svd_thin(&self, matrix: Array2<F>) -> Result<SVDOutput<F>, ThreadSafeStdError> {
        NdarrayLinAlgBackend.svd_thin(matrix)
    }
}
