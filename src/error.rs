// src/error.rs

use std::error::Error;
use thiserror::Error;

/// A thread-safe wrapper for standard dynamic errors,
/// so they implement `Send` and `Sync`.
pub type ThreadSafeStdError = Box<dyn Error + Send + Sync + 'static>;

/// Failures surfaced by the noise-weighted PCA pipeline.
///
/// Any failure aborts the whole call; caller buffers are left untouched.
#[derive(Debug, Error)]
pub enum PcaError {
    /// Shapes, buffer lengths or data values that make the problem ill-posed.
    /// Detected before any solver runs.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A LAPACK-backed stage reported a non-zero status (non-convergence,
    /// a noise matrix that is not positive-definite, ...).
    #[error("numerical failure during {stage}: {source}")]
    NumericalFailure {
        stage: &'static str,
        #[source]
        source: ThreadSafeStdError,
    },
}

impl PcaError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        PcaError::InvalidInput(msg.into())
    }

    pub(crate) fn numerical(stage: &'static str) -> impl FnOnce(ThreadSafeStdError) -> Self {
        move |source| PcaError::NumericalFailure { stage, source }
    }

    /// True for `InvalidInput`.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, PcaError::InvalidInput(_))
    }

    /// True for `NumericalFailure`.
    pub fn is_numerical_failure(&self) -> bool {
        matches!(self, PcaError::NumericalFailure { .. })
    }
}
