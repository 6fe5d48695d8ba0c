use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::sparse::{MatrixNorm, SparseMatrix, SparseVector};
use crate::transform::{check_columns, not_fitted, FeatureTransform};
use crate::utils::{Direction, FloatOps};

const NAME: &str = "ColumnNormTransform";

/// Divides every column by its L_p norm over the training matrix.
/// Columns with a zero norm pass through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnNormTransform<T> {
    norm_degree: u32,
    col_norm: Option<Vec<T>>,
}

impl<T: FloatOps> ColumnNormTransform<T> {
    pub fn new(norm_degree: u32) -> Self {
        ColumnNormTransform {
            norm_degree,
            col_norm: None,
        }
    }

    pub fn norm_degree(&self) -> u32 {
        self.norm_degree
    }

    pub fn col_norm(&self) -> Option<&[T]> {
        self.col_norm.as_deref()
    }

    fn fitted(&self) -> anyhow::Result<&[T]> {
        self.col_norm().ok_or_else(|| not_fitted(NAME))
    }
}

impl<T: FloatOps> FeatureTransform<T> for ColumnNormTransform<T> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_fitted(&self) -> bool {
        self.col_norm.is_some()
    }

    fn fit_transform(&mut self, matrix: &mut SparseMatrix<T>) -> anyhow::Result<()> {
        let norms = matrix.norm(self.norm_degree, &Direction::COLUMN)?;
        debug!(
            "{}: fitted L{} norms for {} columns ({} with zero norm)",
            NAME,
            self.norm_degree,
            norms.len(),
            norms.iter().filter(|n| n.is_zero()).count()
        );
        self.col_norm = Some(norms);
        self.transform(matrix)
    }

    fn transform(&self, matrix: &mut SparseMatrix<T>) -> anyhow::Result<()> {
        let norms = self.fitted()?;
        check_columns(NAME, matrix, norms.len())?;
        trace!("{}: transforming {}x{} matrix", NAME, matrix.nrows(), matrix.ncols());
        matrix.apply_col_norm(norms)
    }

    fn transform_vector(&self, vector: &mut SparseVector<T>) -> anyhow::Result<()> {
        if vector.is_empty() {
            return Ok(());
        }
        vector.divide_by(self.fitted()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_gives_unit_column_norms() {
        init_logger();
        let mut matrix = training_matrix();
        let mut transform = ColumnNormTransform::new(2);
        transform.fit_transform(&mut matrix).unwrap();

        let norms = matrix.norm(2, &Direction::COLUMN).unwrap();
        assert_relative_eq!(norms[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(norms[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(norms[2], 1.0, epsilon = 1e-12);
        // all-zero column
        assert_eq!(norms[3], 0.0);

        assert_relative_eq!(transform.col_norm().unwrap()[1], 41.0f64.sqrt());
    }

    #[test]
    fn test_vector_path_matches_matrix_path() {
        let mut train = training_matrix();
        let mut transform = ColumnNormTransform::new(1);
        transform.fit_transform(&mut train).unwrap();

        assert_vector_path_matches(
            &training_matrix(),
            |m| transform.transform(m).unwrap(),
            |v| transform.transform_vector(v).unwrap(),
        );
    }

    #[test]
    fn test_inference_uses_fitted_norms() {
        let mut train = training_matrix();
        let mut transform = ColumnNormTransform::new(1);
        transform.fit_transform(&mut train).unwrap();

        // L1 norms of the training columns are [6, 9, 16, 0]
        let mut v = SparseVector::new(vec![0, 2, 3], vec![3.0, 4.0, 5.0], 4).unwrap();
        transform.transform_vector(&mut v).unwrap();
        assert_relative_eq!(v.values()[0], 0.5);
        assert_relative_eq!(v.values()[1], 0.25);
        assert_relative_eq!(v.values()[2], 5.0);
    }

    #[test]
    fn test_not_fitted() {
        let transform = ColumnNormTransform::<f64>::new(2);
        let mut matrix = training_matrix();
        let err = transform.transform(&mut matrix).unwrap_err();
        assert!(err.to_string().contains("has not been fitted"));

        let mut v = SparseVector::new(vec![0], vec![1.0], 4).unwrap();
        assert!(transform.transform_vector(&mut v).is_err());

        let mut empty = SparseVector::<f64>::empty(4);
        assert!(transform.transform_vector(&mut empty).is_ok());
    }

    #[test]
    fn test_column_count_mismatch() {
        let mut train = training_matrix();
        let mut transform = ColumnNormTransform::new(2);
        transform.fit_transform(&mut train).unwrap();

        let mut other = SparseMatrix::<f64>::new(2, 3);
        assert!(transform.transform(&mut other).is_err());
    }

    #[test]
    fn test_zero_degree_rejected() {
        let mut matrix = training_matrix();
        assert!(ColumnNormTransform::new(0).fit_transform(&mut matrix).is_err());
    }
}
