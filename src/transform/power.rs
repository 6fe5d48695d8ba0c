use log::trace;
use serde::{Deserialize, Serialize};

use crate::sparse::{SparseMatrix, SparseVector};
use crate::transform::FeatureTransform;
use crate::utils::FloatOps;

const NAME: &str = "PowerTransform";

/// Elementwise `x^power` on stored entries. Nothing is learned from the data,
/// so fitting and inference behave the same.
///
/// Follows `Float::powf`: a negative base with a fractional power gives NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerTransform<T> {
    power: T,
}

impl<T: FloatOps> PowerTransform<T> {
    pub fn new(power: T) -> Self {
        PowerTransform { power }
    }

    pub fn power(&self) -> T {
        self.power
    }
}

impl<T: FloatOps> FeatureTransform<T> for PowerTransform<T> {
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
        trace!("{}: raising {} entries to {:?}", NAME, matrix.nnz(), self.power);
        matrix.try_par_for_each_row(|row| self.transform_vector(row))
    }

    fn transform_vector(&self, vector: &mut SparseVector<T>) -> anyhow::Result<()> {
        for value in vector.values_mut() {
            *value = value.powf(self.power);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_square() {
        let mut matrix = training_matrix();
        let mut transform = PowerTransform::new(2.0);
        transform.fit_transform(&mut matrix).unwrap();
        assert_eq!(matrix.row(3).unwrap().values(), &[25.0, 36.0]);
        assert_eq!(matrix.nnz(), training_matrix().nnz());
    }

    #[test]
    fn test_fractional_and_negative_powers() {
        let mut v = SparseVector::new(vec![0, 1, 2], vec![4.0f64, -4.0, 0.5], 3).unwrap();
        PowerTransform::new(0.5).transform_vector(&mut v).unwrap();
        assert_relative_eq!(v.values()[0], 2.0);
        assert!(v.values()[1].is_nan());
        assert_relative_eq!(v.values()[2], 0.5f64.sqrt());

        let mut v = SparseVector::new(vec![0], vec![4.0f32], 1).unwrap();
        PowerTransform::new(-1.0).transform_vector(&mut v).unwrap();
        assert_relative_eq!(v.values()[0], 0.25);
    }

    #[test]
    fn test_vector_path_matches_matrix_path() {
        let transform = PowerTransform::new(1.5);
        assert_vector_path_matches(
            &training_matrix(),
            |m| transform.transform(m).unwrap(),
            |v| transform.transform_vector(v).unwrap(),
        );
    }

    #[test]
    fn test_empty_vector_untouched() {
        let mut v = SparseVector::<f64>::empty(3);
        PowerTransform::new(3.0).transform_vector(&mut v).unwrap();
        assert!(v.is_empty());
    }
}
