// src/matrix_view.rs

use ndarray::{Array2, ArrayView2, ArrayViewMut2, ShapeBuilder};

use crate::error::PcaError;

/// Non-owning, read-only view of a caller's column-major `n_rows x n_cols` `f32` buffer.
///
/// The shape is checked against the slice length when the view is built, so every
/// later access is in bounds. No data is copied.
#[derive(Debug, Clone, Copy)]
pub struct DataMatrixView<'a> {
    view: ArrayView2<'a, f32>,
}

impl<'a> DataMatrixView<'a> {
    /// Wraps `data` as a column-major (Fortran order) matrix.
    pub fn from_column_major(data: &'a [f32], n_rows: usize, n_cols: usize) -> Result<Self, PcaError> {
        let expected = checked_len(n_rows, n_cols)?;
        if data.len() != expected {
            return Err(PcaError::invalid(format!(
                "data buffer holds {} values, expected {} ({} x {})",
                data.len(),
                expected,
                n_rows,
                n_cols
            )));
        }
        let view = ArrayView2::from_shape((n_rows, n_cols).f(), data)
            .map_err(|e| PcaError::invalid(format!("cannot view data as {} x {}: {}", n_rows, n_cols, e)))?;
        Ok(Self { view })
    }

    pub fn n_rows(&self) -> usize {
        self.view.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.view.ncols()
    }

    pub fn as_view(&self) -> ArrayView2<'a, f32> {
        self.view
    }
}

impl<'a> From<&'a Array2<f32>> for DataMatrixView<'a> {
    fn from(matrix: &'a Array2<f32>) -> Self {
        Self { view: matrix.view() }
    }
}

/// Copies `src` into the caller's column-major buffer `dst`.
///
/// `dst` must hold exactly `src.nrows() * src.ncols()` values.
pub fn write_column_major(dst: &mut [f32], src: &ArrayView2<f32>) -> Result<(), PcaError> {
    let (n_rows, n_cols) = src.dim();
    let mut out = column_major_view_mut(dst, n_rows, n_cols)?;
    out.assign(src);
    Ok(())
}

/// Checks that `dst` can receive a column-major `n_rows x n_cols` matrix, without writing.
pub fn check_output_len(name: &str, dst: &[f32], n_rows: usize, n_cols: usize) -> Result<(), PcaError> {
    let expected = checked_len(n_rows, n_cols)?;
    if dst.len() != expected {
        return Err(PcaError::invalid(format!(
            "{} buffer holds {} values, expected {} ({} x {})",
            name,
            dst.len(),
            expected,
            n_rows,
            n_cols
        )));
    }
    Ok(())
}

fn column_major_view_mut(dst: &mut [f32], n_rows: usize, n_cols: usize) -> Result<ArrayViewMut2<'_, f32>, PcaError> {
    check_output_len("output", dst, n_rows, n_cols)?;
    ArrayViewMut2::from_shape((n_rows, n_cols).f(), dst)
        .map_err(|e| PcaError::invalid(format!("cannot view output as {} x {}: {}", n_rows, n_cols, e)))
}

fn checked_len(n_rows: usize, n_cols: usize) -> Result<usize, PcaError> {
    n_rows
        .checked_mul(n_cols)
        .ok_or_else(|| PcaError::invalid(format!("matrix shape {} x {} overflows usize", n_rows, n_cols)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn column_major_indexing() {
        // columns [1,2,3] and [4,5,6]
        let buf = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let view = DataMatrixView::from_column_major(&buf, 3, 2).unwrap();
        let v = view.as_view();
        assert_eq!(v[[0, 1]], 4.0);
        assert_eq!(v[[2, 0]], 3.0);
        assert_eq!(view.n_rows(), 3);
        assert_eq!(view.n_cols(), 2);
    }

    #[test]
    fn length_mismatch_is_invalid_input() {
        let buf = [0.0f32; 5];
        let err = DataMatrixView::from_column_major(&buf, 3, 2).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn write_back_is_column_major() {
        let m = array![[1.0f32, 4.0], [2.0, 5.0], [3.0, 6.0]];
        let mut out = vec![0.0f32; 6];
        write_column_major(&mut out, &m.view()).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn write_back_rejects_short_buffer() {
        let m = Array2::<f32>::zeros((2, 2));
        let mut out = vec![7.0f32; 3];
        assert!(write_column_major(&mut out, &m.view()).is_err());
        assert_eq!(out, vec![7.0; 3]);
    }
}
