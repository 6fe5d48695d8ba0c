use anyhow::anyhow;
use nalgebra_sparse::CsrMatrix;

use crate::utils::FloatOps;

use super::{SparseMatrix, SparseVector};

impl<T: FloatOps> TryFrom<&CsrMatrix<T>> for SparseMatrix<T> {
    type Error = anyhow::Error;

    /// Rows without stored entries become absent rows.
    fn try_from(csr: &CsrMatrix<T>) -> anyhow::Result<Self> {
        let ncols = csr.ncols();
        let rows = csr
            .row_iter()
            .enumerate()
            .map(|(i, row)| {
                if row.nnz() == 0 {
                    return Ok(None);
                }
                SparseVector::new(row.col_indices().to_vec(), row.values().to_vec(), ncols)
                    .map(Some)
                    .map_err(|e| anyhow!("CSR row {} is not a valid sparse row: {}", i, e))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(SparseMatrix::from_parts(rows, ncols))
    }
}

impl<T: FloatOps> SparseMatrix<T> {
    pub fn to_csr(&self) -> anyhow::Result<CsrMatrix<T>> {
        let mut row_offsets = Vec::with_capacity(self.nrows() + 1);
        let mut col_indices = Vec::with_capacity(self.nnz());
        let mut values = Vec::with_capacity(self.nnz());

        row_offsets.push(0);
        for row in self.rows() {
            if let Some(row) = row {
                col_indices.extend_from_slice(row.indices());
                values.extend_from_slice(row.values());
            }
            row_offsets.push(col_indices.len());
        }

        CsrMatrix::try_from_csr_data(self.nrows(), self.ncols(), row_offsets, col_indices, values)
            .map_err(|e| anyhow!("Failed to build CSR matrix: {}", e))
    }
}
