use anyhow::bail;
use log::{debug, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::reduce::ColumnHeaps;
use crate::sparse::{MatrixNonZero, SparseMatrix, SparseVector};
use crate::transform::{check_columns, check_fitted_pair, not_fitted, FeatureTransform};
use crate::utils::FloatOps;

const NAME: &str = "OutlierClipTransform";

/// Clips every column to approximate percentiles of its stored entries.
///
/// With `cutoff_fraction = p`, values below the p-quantile are raised to it
/// and values above the (1-p)-quantile are lowered to it. For `p = 0.05` this
/// removes everything outside the 5th..95th percentile band. Quantiles are
/// taken from the `ceil(nnz * p) + 1` smallest and largest entries of each
/// column, so no column is ever fully sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "OutlierClipParts<T>",
    bound(deserialize = "T: FloatOps + Deserialize<'de>")
)]
pub struct OutlierClipTransform<T> {
    cutoff_fraction: f64,
    min_cutoffs: Option<Vec<T>>,
    max_cutoffs: Option<Vec<T>>,
}

#[derive(Deserialize)]
struct OutlierClipParts<T> {
    cutoff_fraction: f64,
    min_cutoffs: Option<Vec<T>>,
    max_cutoffs: Option<Vec<T>>,
}

impl<T: FloatOps> TryFrom<OutlierClipParts<T>> for OutlierClipTransform<T> {
    type Error = anyhow::Error;

    fn try_from(parts: OutlierClipParts<T>) -> anyhow::Result<Self> {
        check_cutoff_fraction(parts.cutoff_fraction)?;
        check_fitted_pair(NAME, &parts.min_cutoffs, &parts.max_cutoffs)?;
        Ok(OutlierClipTransform {
            cutoff_fraction: parts.cutoff_fraction,
            min_cutoffs: parts.min_cutoffs,
            max_cutoffs: parts.max_cutoffs,
        })
    }
}

fn check_cutoff_fraction(cutoff_fraction: f64) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&cutoff_fraction) {
        bail!(
            "{}: cutoff fraction must lie in [0, 1], got {}",
            NAME,
            cutoff_fraction
        );
    }
    Ok(())
}

impl<T: FloatOps> OutlierClipTransform<T> {
    pub fn new(cutoff_fraction: f64) -> Self {
        OutlierClipTransform {
            cutoff_fraction,
            min_cutoffs: None,
            max_cutoffs: None,
        }
    }

    pub fn cutoff_fraction(&self) -> f64 {
        self.cutoff_fraction
    }

    pub fn min_cutoffs(&self) -> Option<&[T]> {
        self.min_cutoffs.as_deref()
    }

    pub fn max_cutoffs(&self) -> Option<&[T]> {
        self.max_cutoffs.as_deref()
    }

    fn fitted(&self) -> anyhow::Result<(&[T], &[T])> {
        match (self.min_cutoffs(), self.max_cutoffs()) {
            (Some(lower), Some(upper)) => Ok((lower, upper)),
            _ => Err(not_fitted(NAME)),
        }
    }

    fn cutoff_rank(&self, nnz: usize) -> usize {
        (nnz as f64 * self.cutoff_fraction).ceil() as usize + 1
    }
}

impl<T: FloatOps> FeatureTransform<T> for OutlierClipTransform<T> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_fitted(&self) -> bool {
        self.min_cutoffs.is_some() && self.max_cutoffs.is_some()
    }

    fn fit_transform(&mut self, matrix: &mut SparseMatrix<T>) -> anyhow::Result<()> {
        check_cutoff_fraction(self.cutoff_fraction)?;

        let counts: Vec<usize> = matrix.nonzero_col()?;
        let ranks: Vec<usize> = counts.iter().map(|&nnz| self.cutoff_rank(nnz)).collect();
        let heaps = ColumnHeaps::new(&ranks);

        matrix
            .rows()
            .par_iter()
            .filter_map(Option::as_ref)
            .for_each(|row| {
                for (col, value) in row.iter() {
                    heaps.offer(col, value);
                }
            });

        let (lower, upper) = heaps.into_cutoffs();
        debug!(
            "{}: fitted {} column cutoffs at fraction {}",
            NAME,
            lower.len(),
            self.cutoff_fraction
        );
        self.min_cutoffs = Some(lower);
        self.max_cutoffs = Some(upper);
        self.transform(matrix)
    }

    fn transform(&self, matrix: &mut SparseMatrix<T>) -> anyhow::Result<()> {
        let (lower, _) = self.fitted()?;
        check_columns(NAME, matrix, lower.len())?;
        trace!("{}: transforming {}x{} matrix", NAME, matrix.nrows(), matrix.ncols());
        matrix.try_par_for_each_row(|row| self.transform_vector(row))
    }

    fn transform_vector(&self, vector: &mut SparseVector<T>) -> anyhow::Result<()> {
        if vector.is_empty() {
            return Ok(());
        }
        let (lower, upper) = self.fitted()?;
        vector.check_bounds(lower.len())?;
        for (index, value) in vector.iter_mut() {
            if *value > upper[index] {
                *value = upper[index];
            } else if *value < lower[index] {
                *value = lower[index];
            }
        }
        Ok(())
    }
}
