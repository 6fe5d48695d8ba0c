use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::reduce::reduce_columns;
use crate::sparse::{SparseMatrix, SparseVector};
use crate::transform::{check_columns, check_fitted_pair, not_fitted, FeatureTransform};
use crate::utils::FloatOps;

const NAME: &str = "MinMaxTransform";

/// Scales every column into `[0, 1]` using the column range seen at fit time.
/// Constant columns map to exactly 1.
///
/// The running bounds are seeded from the dense expansion of the first present
/// row, so a column that is empty in that row starts from zero: its fitted
/// range always includes zero even when every stored entry is positive (or
/// every stored entry negative).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(
    try_from = "MinMaxParts<T>",
    bound(deserialize = "T: FloatOps + Deserialize<'de>")
)]
pub struct MinMaxTransform<T> {
    min: Option<Vec<T>>,
    max: Option<Vec<T>>,
}

#[derive(Deserialize)]
struct MinMaxParts<T> {
    min: Option<Vec<T>>,
    max: Option<Vec<T>>,
}

impl<T: FloatOps> TryFrom<MinMaxParts<T>> for MinMaxTransform<T> {
    type Error = anyhow::Error;

    fn try_from(parts: MinMaxParts<T>) -> anyhow::Result<Self> {
        check_fitted_pair(NAME, &parts.min, &parts.max)?;
        Ok(MinMaxTransform {
            min: parts.min,
            max: parts.max,
        })
    }
}

impl<T: FloatOps> MinMaxTransform<T> {
    pub fn new() -> Self {
        MinMaxTransform {
            min: None,
            max: None,
        }
    }

    pub fn min(&self) -> Option<&[T]> {
        self.min.as_deref()
    }

    pub fn max(&self) -> Option<&[T]> {
        self.max.as_deref()
    }

    fn fitted(&self) -> anyhow::Result<(&[T], &[T])> {
        match (self.min(), self.max()) {
            (Some(min), Some(max)) => Ok((min, max)),
            _ => Err(not_fitted(NAME)),
        }
    }
}

impl<T: FloatOps> FeatureTransform<T> for MinMaxTransform<T> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_fitted(&self) -> bool {
        self.min.is_some() && self.max.is_some()
    }

    fn fit_transform(&mut self, matrix: &mut SparseMatrix<T>) -> anyhow::Result<()> {
        let mut seed = vec![(T::zero(), T::zero()); matrix.ncols()];
        if let Some(first) = matrix.rows().iter().flatten().next() {
            for (col, value) in first.iter() {
                if let Some(cell) = seed.get_mut(col) {
                    *cell = (value, value);
                }
            }
        }

        let (min, max): (Vec<T>, Vec<T>) = reduce_columns(
            matrix,
            &seed,
            |(lo, hi), _, value| {
                if value < *lo {
                    *lo = value;
                }
                if value > *hi {
                    *hi = value;
                }
            },
            |(lo, hi), &(other_lo, other_hi)| {
                if other_lo < *lo {
                    *lo = other_lo;
                }
                if other_hi > *hi {
                    *hi = other_hi;
                }
            },
        )
        .into_iter()
        .unzip();

        debug!(
            "{}: fitted ranges for {} columns ({} constant)",
            NAME,
            min.len(),
            min.iter().zip(max.iter()).filter(|(lo, hi)| lo == hi).count()
        );
        self.min = Some(min);
        self.max = Some(max);
        self.transform(matrix)
    }

    fn transform(&self, matrix: &mut SparseMatrix<T>) -> anyhow::Result<()> {
        let (min, _) = self.fitted()?;
        check_columns(NAME, matrix, min.len())?;
        trace!("{}: transforming {}x{} matrix", NAME, matrix.nrows(), matrix.ncols());
        matrix.try_par_for_each_row(|row| self.transform_vector(row))
    }

    fn transform_vector(&self, vector: &mut SparseVector<T>) -> anyhow::Result<()> {
        if vector.is_empty() {
            return Ok(());
        }
        let (min, max) = self.fitted()?;
        vector.check_bounds(min.len())?;
        for (index, value) in vector.iter_mut() {
            let range = max[index] - min[index];
            *value = if range.is_zero() {
                T::one()
            } else {
                (*value - min[index]) / range
            };
        }
        Ok(())
    }
}
