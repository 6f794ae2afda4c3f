// src/sign.rs

use ndarray::{Array1, Axis};

use crate::factor_model::FactorModel;

/// Flips components so that each loading column is predominantly positive.
///
/// For column `j`, `ratio = sum(max(p, 0)^2) / sum(p^2)`. Columns with `ratio < 0.5`
/// are negated in both factors, leaving `T P^T` unchanged. A balanced column
/// (`ratio == 0.5`) or an all-zero column keeps its sign.
///
/// Returns the applied signs (`+1.0` or `-1.0` per component).
pub fn normalize_signs(model: &mut FactorModel) -> Array1<f32> {
    let signs = model.loadings.map_axis(Axis(0), |column| {
        let positive: f32 = column.iter().map(|&x| x.max(0.0)).map(|x| x * x).sum();
        let negative: f32 = column.iter().map(|&x| x.min(0.0)).map(|x| x * x).sum();
        if positive >= negative {
            1.0
        } else {
            -1.0
        }
    });
    model.scores *= &signs;
    model.loadings *= &signs;
    signs
}
