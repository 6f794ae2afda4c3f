// src/diagnostics.rs

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Numerical health of one `full_pca` run. Filled only when debug logging is enabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// ||I - T^T T||_F of the orthonormal scores fed to varimax.
    pub scores_orthogonality_error: Option<f64>,
    /// max |T P^T - T' P'^T| across orthogonalization, relative to max |T P^T|.
    pub orthogonalization_drift: Option<f64>,
    /// ||I - R^T R||_F of the varimax rotation.
    pub rotation_orthogonality_error: Option<f64>,
    /// max |T P^T| change across rotation and sign normalization, relative.
    pub rotation_drift: Option<f64>,
}

/// Computes orthogonality error ||I - Q^T Q||_F for an f32 matrix.
pub fn compute_orthogonality_error_f32(q_matrix: &ArrayView2<f32>) -> Option<f64> {
    if q_matrix.nrows() == 0 || q_matrix.ncols() == 0 {
        return None;
    }
    let q_f64 = q_matrix.mapv(|x| x as f64);
    let qtq = q_f64.t().dot(&q_f64);
    let diff = Array2::<f64>::eye(qtq.nrows()) - qtq;
    Some(diff.iter().map(|x| x * x).sum::<f64>().sqrt())
}

/// Largest elementwise absolute difference of two equally shaped matrices.
/// Returns `f32::INFINITY` on a shape mismatch.
pub fn max_abs_difference(a: &ArrayView2<f32>, b: &ArrayView2<f32>) -> f32 {
    if a.dim() != b.dim() {
        return f32::INFINITY;
    }
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).fold(0.0, f32::max)
}

/// `max_abs_difference(a, b) / max |a|`, or the absolute difference when `a` is ~0.
pub fn relative_max_difference(a: &ArrayView2<f32>, b: &ArrayView2<f32>) -> f64 {
    let diff = max_abs_difference(a, b) as f64;
    let scale = a.iter().fold(0.0f32, |m, x| m.max(x.abs())) as f64;
    if scale < 1e-12 {
        diff
    } else {
        diff / scale
    }
}

/// Pearson correlation of two f32 vectors, computed in f64.
pub fn pearson_correlation_f32(vec_a: &ArrayView1<f32>, vec_b: &ArrayView1<f32>) -> Option<f64> {
    let n = vec_a.len();
    if n != vec_b.len() || n < 2 {
        return None;
    }
    let mean_a = vec_a.iter().map(|&x| x as f64).sum::<f64>() / n as f64;
    let mean_b = vec_b.iter().map(|&x| x as f64).sum::<f64>() / n as f64;

    let mut cov_ab = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&a, &b) in vec_a.iter().zip(vec_b.iter()) {
        let diff_a = a as f64 - mean_a;
        let diff_b = b as f64 - mean_b;
        cov_ab += diff_a * diff_b;
        var_a += diff_a * diff_a;
        var_b += diff_b * diff_b;
    }
    if var_a < 1e-24 || var_b < 1e-24 {
        return None;
    }
    Some((cov_ab / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0))
}

/// Cosine of the angle between two f32 vectors, computed in f64. `None` if either is zero.
pub fn cosine_similarity_f32(vec_a: &ArrayView1<f32>, vec_b: &ArrayView1<f32>) -> Option<f64> {
    if vec_a.len() != vec_b.len() {
        return None;
    }
    let dot: f64 = vec_a.iter().zip(vec_b.iter()).map(|(&a, &b)| a as f64 * b as f64).sum();
    let na = vec_a.iter().map(|&a| (a as f64).powi(2)).sum::<f64>().sqrt();
    let nb = vec_b.iter().map(|&b| (b as f64).powi(2)).sum::<f64>().sqrt();
    if na < 1e-30 || nb < 1e-30 {
        return None;
    }
    Some(dot / (na * nb))
}
