use ndarray::{Array2, ArrayView2, Axis};

use crate::sparse::{SparseMatrix, SparseVector};
use crate::utils::FloatOps;

impl<T: FloatOps> SparseMatrix<T> {
    /// Dense copy of the matrix; absent rows become rows of zeros.
    pub fn to_dense(&self) -> Array2<T> {
        let mut dense = Array2::zeros((self.nrows(), self.ncols()));
        for (i, row) in self.rows().iter().enumerate() {
            if let Some(row) = row {
                for (j, value) in row.iter() {
                    dense[[i, j]] = value;
                }
            }
        }
        dense
    }

    /// Sparse copy of a dense array. Rows that are entirely zero become absent.
    pub fn from_dense(dense: ArrayView2<T>) -> Self {
        let ncols = dense.ncols();
        let rows = dense
            .axis_iter(Axis(0))
            .map(|row| {
                let values: Vec<T> = row.iter().copied().collect();
                let sparse = SparseVector::from_dense(&values);
                (!sparse.is_empty()).then_some(sparse)
            })
            .collect();
        SparseMatrix::from_parts(rows, ncols)
    }
}
