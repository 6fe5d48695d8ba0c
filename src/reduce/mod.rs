//! # Concurrent reductions over sparse rows
//!
//! Column statistics are gathered by folding rows into thread-local partial
//! aggregates and merging those partials once every row has been visited.
//! No accumulator is shared between threads while rows are being folded, so
//! results only depend on the merge operation, never on row scheduling.
//!
//! Percentile cutoffs need retained values rather than a mergeable summary,
//! so they go through [`ColumnHeaps`], which locks per column.

use rayon::prelude::*;

use crate::sparse::{SparseMatrix, SparseVector};
use crate::utils::FloatOps;

pub mod heap;

pub use heap::{BoundedHeap, ColumnHeaps, Retain};

/// Folds every present row of `matrix` in parallel.
///
/// `init` creates a fresh partial aggregate per rayon job, `fold` folds a row
/// into it and `merge` combines two partials. `merge` must be associative and
/// `init()` must be neutral under it.
pub fn fold_rows<T, A, I, F, M>(matrix: &SparseMatrix<T>, init: I, fold: F, merge: M) -> A
where
    T: FloatOps,
    A: Send,
    I: Fn() -> A + Sync + Send,
    F: Fn(A, &SparseVector<T>) -> A + Sync + Send,
    M: Fn(A, A) -> A + Sync + Send,
{
    matrix
        .rows()
        .par_iter()
        .filter_map(|row| row.as_ref())
        .fold(&init, |acc, row| fold(acc, row))
        .reduce(&init, merge)
}

/// Per-column reduction of every stored entry.
///
/// Each job starts from a copy of `seed`; `update` folds a value into its
/// column's cell (it also receives the column index) and `merge` folds one
/// job's cell into another's.
pub fn reduce_columns<T, A, F, M>(matrix: &SparseMatrix<T>, seed: &[A], update: F, merge: M) -> Vec<A>
where
    T: FloatOps,
    A: Clone + Send + Sync,
    F: Fn(&mut A, usize, T) + Sync + Send,
    M: Fn(&mut A, &A) + Sync + Send,
{
    fold_rows(
        matrix,
        || seed.to_vec(),
        |mut acc, row| {
            for (col, value) in row.iter() {
                update(&mut acc[col], col, value);
            }
            acc
        },
        |mut left, right| {
            for (cell, other) in left.iter_mut().zip(right.iter()) {
                merge(cell, other);
            }
            left
        },
    )
}
