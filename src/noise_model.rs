// src/noise_model.rs

use ndarray::{Array1, Array2, ShapeBuilder};

use crate::error::PcaError;

/// Diagonal Poisson noise covariance: variance of each channel equals its mean count.
///
/// Every entry of `mean` must be finite and strictly positive, otherwise the
/// generalized eigenproblem has no positive-definite right-hand side.
pub fn build_noise_matrix(mean: &Array1<f32>) -> Result<Array2<f32>, PcaError> {
    if let Some((channel, value)) = mean
        .iter()
        .enumerate()
        .find(|(_, v)| !(v.is_finite() && **v > 0.0))
    {
        return Err(PcaError::invalid(format!(
            "mean spectrum must be strictly positive for the Poisson noise model; channel {} has mean {}",
            channel, value
        )));
    }
    let n = mean.len();
    let mut noise = Array2::<f32>::zeros((n, n).f());
    noise.diag_mut().assign(mean);
    Ok(noise)
}
