use std::collections::BTreeMap;
use std::ops::AddAssign;

use anyhow::{anyhow, bail};
use num_traits::{PrimInt, Unsigned, Zero};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::reduce::reduce_columns;
use crate::utils::{check_norm_degree, finish_norm, norm_term, Direction, FloatOps, Normalize};

use super::{MatrixNonZero, MatrixNorm, MatrixSum, SparseVector};

/// Row-oriented sparse matrix. Each row is either absent or a
/// [`SparseVector`] whose dimension equals the matrix column count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "SparseMatrixParts<T>",
    bound(deserialize = "T: FloatOps + Deserialize<'de>")
)]
pub struct SparseMatrix<T> {
    rows: Vec<Option<SparseVector<T>>>,
    ncols: usize,
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: FloatOps + Deserialize<'de>"))]
struct SparseMatrixParts<T> {
    rows: Vec<Option<SparseVector<T>>>,
    ncols: usize,
}

impl<T: FloatOps> TryFrom<SparseMatrixParts<T>> for SparseMatrix<T> {
    type Error = anyhow::Error;

    fn try_from(parts: SparseMatrixParts<T>) -> anyhow::Result<Self> {
        SparseMatrix::from_rows(parts.ncols, parts.rows)
    }
}

impl<T: FloatOps> SparseMatrix<T> {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        SparseMatrix {
            rows: vec![None; nrows],
            ncols,
        }
    }

    pub fn from_rows(ncols: usize, rows: Vec<Option<SparseVector<T>>>) -> anyhow::Result<Self> {
        for (i, row) in rows.iter().enumerate() {
            if let Some(row) = row {
                if row.dim() != ncols {
                    bail!(
                        "Row {} has dimension {} but the matrix has {} columns",
                        i,
                        row.dim(),
                        ncols
                    );
                }
            }
        }
        Ok(SparseMatrix { rows, ncols })
    }

    pub(crate) fn from_parts(rows: Vec<Option<SparseVector<T>>>, ncols: usize) -> Self {
        SparseMatrix { rows, ncols }
    }

    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Total number of stored entries.
    pub fn nnz(&self) -> usize {
        self.rows.iter().flatten().map(SparseVector::nnz).sum()
    }

    /// Returns `None` for absent rows and for indices past the last row.
    pub fn row(&self, index: usize) -> Option<&SparseVector<T>> {
        self.rows.get(index).and_then(Option::as_ref)
    }

    pub fn rows(&self) -> &[Option<SparseVector<T>>] {
        &self.rows
    }

    pub fn set_row(&mut self, index: usize, row: Option<SparseVector<T>>) -> anyhow::Result<()> {
        let nrows = self.rows.len();
        if let Some(row) = &row {
            if row.dim() != self.ncols {
                bail!(
                    "Row has dimension {} but the matrix has {} columns",
                    row.dim(),
                    self.ncols
                );
            }
        }
        let slot = self
            .rows
            .get_mut(index)
            .ok_or_else(|| anyhow!("Row index {} is out of bounds for {} rows", index, nrows))?;
        *slot = row;
        Ok(())
    }

    /// Runs `op` on every present row in parallel, stopping at the first error.
    ///
    /// `op` must not change a row's dimension; the column selector is the only
    /// caller allowed to, and it resets `ncols` afterwards.
    pub(crate) fn try_par_for_each_row<F>(&mut self, op: F) -> anyhow::Result<()>
    where
        F: Fn(&mut SparseVector<T>) -> anyhow::Result<()> + Sync + Send,
    {
        self.rows
            .par_iter_mut()
            .filter_map(Option::as_mut)
            .try_for_each(op)
    }

    /// Columns with at least one and at least `min_nonzero` stored entries,
    /// mapped to dense target indices in ascending source order.
    pub fn select_cols(&self, min_nonzero: usize) -> anyhow::Result<BTreeMap<usize, usize>> {
        let counts: Vec<usize> = self.nonzero_col()?;
        Ok(counts
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0 && count >= min_nonzero)
            .enumerate()
            .map(|(target, (source, _))| (source, target))
            .collect())
    }

    /// Drops unselected columns from every row and renumbers the rest.
    pub fn apply_col_selector(
        &mut self,
        selected: &BTreeMap<usize, usize>,
        new_ncols: usize,
    ) -> anyhow::Result<()> {
        if let Some((source, target)) = selected.iter().find(|(_, &target)| target >= new_ncols) {
            bail!(
                "Column {} is mapped to {} which exceeds the new column count {}",
                source,
                target,
                new_ncols
            );
        }
        self.try_par_for_each_row(|row| row.apply_index_selector(selected, new_ncols))?;
        self.ncols = new_ncols;
        Ok(())
    }

    pub fn apply_col_norm(&mut self, norms: &[T]) -> anyhow::Result<()> {
        self.normalize(norms, &Direction::COLUMN)
    }

    pub fn apply_row_norm(&mut self, norms: &[T]) -> anyhow::Result<()> {
        self.normalize(norms, &Direction::ROW)
    }
}

impl<T: FloatOps> MatrixNonZero for SparseMatrix<T> {
    fn nonzero_col<I>(&self) -> anyhow::Result<Vec<I>>
    where
        I: PrimInt + Unsigned + Zero + AddAssign + Send + Sync,
    {
        Ok(reduce_columns(
            self,
            &vec![I::zero(); self.ncols],
            |count, _, _| *count += I::one(),
            |count, other| *count += *other,
        ))
    }

    fn nonzero_row<I>(&self) -> anyhow::Result<Vec<I>>
    where
        I: PrimInt + Unsigned + Zero + AddAssign + Send + Sync,
    {
        self.rows
            .iter()
            .map(|row| {
                let count = row.as_ref().map_or(0, SparseVector::nnz);
                I::from(count).ok_or_else(|| anyhow!("Failed to convert to target type"))
            })
            .collect()
    }
}

impl<T: FloatOps> MatrixSum for SparseMatrix<T> {
    type Item = T;

    fn sum_col<U>(&self) -> anyhow::Result<Vec<U>>
    where
        U: FloatOps,
    {
        reduce_columns(
            self,
            &vec![T::zero(); self.ncols],
            |sum, _, value| *sum += value,
            |sum, other| *sum += *other,
        )
        .into_iter()
        .map(|sum| U::from(sum).ok_or_else(|| anyhow!("Failed to convert to target type")))
        .collect()
    }

    fn sum_row<U>(&self) -> anyhow::Result<Vec<U>>
    where
        U: FloatOps,
    {
        self.rows
            .par_iter()
            .map(|row| {
                let sum: T = row.as_ref().map_or_else(T::zero, |r| r.values().iter().copied().sum());
                U::from(sum).ok_or_else(|| anyhow!("Failed to convert to target type"))
            })
            .collect()
    }
}

impl<T: FloatOps> MatrixNorm for SparseMatrix<T> {
    type Item = T;

    fn norm(&self, degree: u32, direction: &Direction) -> anyhow::Result<Vec<T>> {
        check_norm_degree(degree)?;
        match direction {
            Direction::COLUMN => Ok(reduce_columns(
                self,
                &vec![T::zero(); self.ncols],
                |acc, _, value| *acc += norm_term(value, degree),
                |acc, other| *acc += *other,
            )
            .into_iter()
            .map(|acc| finish_norm(acc, degree))
            .collect()),
            Direction::ROW => self
                .rows
                .par_iter()
                .map(|row| row.as_ref().map_or_else(|| Ok(T::zero()), |r| r.norm(degree)))
                .collect(),
        }
    }
}

impl<T: FloatOps> Normalize<T> for SparseMatrix<T> {
    fn normalize(&mut self, norms: &[T], direction: &Direction) -> anyhow::Result<()> {
        match direction {
            Direction::COLUMN => {
                if norms.len() != self.ncols {
                    bail!(
                        "Length of norms ({}) does not match number of columns ({})",
                        norms.len(),
                        self.ncols
                    );
                }
                self.try_par_for_each_row(|row| row.divide_by(norms))
            }
            Direction::ROW => {
                if norms.len() != self.rows.len() {
                    bail!(
                        "Length of norms ({}) does not match number of rows ({})",
                        norms.len(),
                        self.rows.len()
                    );
                }
                self.rows
                    .par_iter_mut()
                    .zip(norms.par_iter())
                    .for_each(|(row, &norm)| {
                        if let Some(row) = row {
                            row.scale_by_norm(norm);
                        }
                    });
                Ok(())
            }
        }
    }
}
