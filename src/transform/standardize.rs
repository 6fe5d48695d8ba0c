use anyhow::{anyhow, bail};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::reduce::reduce_columns;
use crate::sparse::{MatrixNonZero, MatrixSum, SparseMatrix, SparseVector};
use crate::transform::{check_columns, check_fitted_pair, not_fitted, FeatureTransform};
use crate::utils::FloatOps;

const NAME: &str = "StandardizeTransform";

/// Entries this close to their column mean are dropped instead of being
/// stored as (near) zero.
const MEAN_TOLERANCE: f64 = 1e-5;

/// Z-scores every column over its stored entries, clips the scores to
/// `[-clip_cutoff, clip_cutoff]` and prunes entries that sit on the mean.
///
/// Means and deviations are taken over stored entries only; implicit zeros do
/// not count. A column with a single stored entry keeps that entry as its
/// mean (the sum is only divided by the count when the count exceeds one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "StandardizeParts<T>",
    bound(deserialize = "T: FloatOps + Deserialize<'de>")
)]
pub struct StandardizeTransform<T> {
    clip_cutoff: T,
    mean: Option<Vec<T>>,
    std: Option<Vec<T>>,
}

#[derive(Deserialize)]
struct StandardizeParts<T> {
    clip_cutoff: T,
    mean: Option<Vec<T>>,
    std: Option<Vec<T>>,
}

impl<T: FloatOps> TryFrom<StandardizeParts<T>> for StandardizeTransform<T> {
    type Error = anyhow::Error;

    fn try_from(parts: StandardizeParts<T>) -> anyhow::Result<Self> {
        check_clip_cutoff(parts.clip_cutoff)?;
        check_fitted_pair(NAME, &parts.mean, &parts.std)?;
        Ok(StandardizeTransform {
            clip_cutoff: parts.clip_cutoff,
            mean: parts.mean,
            std: parts.std,
        })
    }
}

fn check_clip_cutoff<T: FloatOps>(clip_cutoff: T) -> anyhow::Result<()> {
    if clip_cutoff.is_nan() || clip_cutoff < T::zero() {
        bail!("{}: clip cutoff must be non-negative, got {:?}", NAME, clip_cutoff);
    }
    Ok(())
}

impl<T: FloatOps> StandardizeTransform<T> {
    pub fn new(clip_cutoff: T) -> Self {
        StandardizeTransform {
            clip_cutoff,
            mean: None,
            std: None,
        }
    }

    pub fn clip_cutoff(&self) -> T {
        self.clip_cutoff
    }

    pub fn mean(&self) -> Option<&[T]> {
        self.mean.as_deref()
    }

    pub fn std(&self) -> Option<&[T]> {
        self.std.as_deref()
    }

    fn fitted(&self) -> anyhow::Result<(&[T], &[T])> {
        match (self.mean(), self.std()) {
            (Some(mean), Some(std)) => Ok((mean, std)),
            _ => Err(not_fitted(NAME)),
        }
    }
}

impl<T: FloatOps> FeatureTransform<T> for StandardizeTransform<T> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_fitted(&self) -> bool {
        self.mean.is_some() && self.std.is_some()
    }

    fn fit_transform(&mut self, matrix: &mut SparseMatrix<T>) -> anyhow::Result<()> {
        check_clip_cutoff(self.clip_cutoff)?;

        let counts: Vec<usize> = matrix.nonzero_col()?;
        let counts_as_t = counts
            .iter()
            .map(|&c| T::from(c).ok_or_else(|| anyhow!("Failed to convert count {} to float", c)))
            .collect::<anyhow::Result<Vec<T>>>()?;

        let mut mean: Vec<T> = matrix.sum_col()?;
        for ((m, &count), &count_t) in mean.iter_mut().zip(counts.iter()).zip(counts_as_t.iter()) {
            if count > 1 {
                *m = *m / count_t;
            }
        }

        let squared_deviations = reduce_columns(
            matrix,
            &vec![T::zero(); matrix.ncols()],
            |acc, col, value| {
                let diff = value - mean[col];
                *acc += diff * diff;
            },
            |acc, other| *acc += *other,
        );
        let std: Vec<T> = squared_deviations
            .into_iter()
            .zip(counts.iter().zip(counts_as_t.iter()))
            .map(|(sq, (&count, &count_t))| {
                if count > 0 {
                    (sq / count_t).sqrt()
                } else {
                    T::zero()
                }
            })
            .collect();

        debug!(
            "{}: fitted {} columns ({} with zero deviation)",
            NAME,
            std.len(),
            std.iter().filter(|s| s.is_zero()).count()
        );
        self.mean = Some(mean);
        self.std = Some(std);
        self.transform(matrix)
    }

    fn transform(&self, matrix: &mut SparseMatrix<T>) -> anyhow::Result<()> {
        let (mean, _) = self.fitted()?;
        check_columns(NAME, matrix, mean.len())?;
        trace!("{}: transforming {}x{} matrix", NAME, matrix.nrows(), matrix.ncols());
        matrix.try_par_for_each_row(|row| self.transform_vector(row))
    }

    fn transform_vector(&self, vector: &mut SparseVector<T>) -> anyhow::Result<()> {
        if vector.is_empty() {
            return Ok(());
        }
        let (mean, std) = self.fitted()?;
        vector.check_bounds(mean.len())?;

        let tolerance = T::from(MEAN_TOLERANCE).unwrap_or_else(T::epsilon);
        vector.retain(|index, value| (value - mean[index]).abs() >= tolerance);

        let cutoff = self.clip_cutoff;
        for (index, value) in vector.iter_mut() {
            let score = (*value - mean[index]) / std[index];
            *value = if score > cutoff {
                cutoff
            } else if score < -cutoff {
                -cutoff
            } else {
                score
            };
        }
        Ok(())
    }
}
