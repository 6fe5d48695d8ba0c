use log::trace;
use serde::{Deserialize, Serialize};

use crate::sparse::{MatrixNorm, SparseMatrix, SparseVector};
use crate::transform::FeatureTransform;
use crate::utils::{Direction, FloatOps};

const NAME: &str = "RowNormTransform";

/// Divides every row by its own L_p norm. Rows are independent of each other,
/// so fitting learns nothing and behaves exactly like inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowNormTransform {
    norm_degree: u32,
}

impl RowNormTransform {
    pub fn new(norm_degree: u32) -> Self {
        RowNormTransform { norm_degree }
    }

    pub fn norm_degree(&self) -> u32 {
        self.norm_degree
    }
}

impl<T: FloatOps> FeatureTransform<T> for RowNormTransform {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_fitted(&self) -> bool {
        true
    }

    fn fit_transform(&mut self, matrix: &mut SparseMatrix<T>) -> anyhow::Result<()> {
        self.transform(matrix)
    }

    fn transform(&self, matrix: &mut SparseMatrix<T>) -> anyhow::Result<()> {
        trace!("{}: transforming {}x{} matrix", NAME, matrix.nrows(), matrix.ncols());
        let norms = matrix.norm(self.norm_degree, &Direction::ROW)?;
        matrix.apply_row_norm(&norms)
    }

    fn transform_vector(&self, vector: &mut SparseVector<T>) -> anyhow::Result<()> {
        if vector.is_empty() {
            return Ok(());
        }
        vector.apply_norm(self.norm_degree)
    }
}
