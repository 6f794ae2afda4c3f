// Noise-weighted principal component analysis (PCA)

#![doc = include_str!("../README.md")]

pub mod covariance;
pub mod diagnostics;
pub mod error;
pub mod factor_model;
pub mod generalized_eigen;
pub mod linalg_backends;
pub mod matrix_view;
pub mod noise_model;
pub mod pipeline;
pub mod sign;
pub mod varimax;
pub mod voxel;

pub use error::{PcaError, ThreadSafeStdError};
pub use factor_model::FactorModel;
pub use matrix_view::DataMatrixView;
pub use pipeline::{full_pca, spectrum_only, NoiseWeightedPca, NoiseWeightedPcaConfig, PcaOutput};
pub use varimax::VarimaxConfig;
