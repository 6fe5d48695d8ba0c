use std::ops::AddAssign;

use num_traits::{PrimInt, Unsigned, Zero};

use crate::utils::{Direction, FloatOps};

pub mod csr;
pub mod matrix;
pub mod vector;

pub use matrix::SparseMatrix;
pub use vector::SparseVector;

pub trait MatrixNonZero {
    fn nonzero_col<I>(&self) -> anyhow::Result<Vec<I>>
    where
        I: PrimInt + Unsigned + Zero + AddAssign + Send + Sync;

    fn nonzero_row<I>(&self) -> anyhow::Result<Vec<I>>
    where
        I: PrimInt + Unsigned + Zero + AddAssign + Send + Sync;
}

pub trait MatrixSum {
    type Item: FloatOps;

    fn sum_col<U>(&self) -> anyhow::Result<Vec<U>>
    where
        U: FloatOps;

    fn sum_row<U>(&self) -> anyhow::Result<Vec<U>>
    where
        U: FloatOps;
}

pub trait MatrixNorm {
    type Item: FloatOps;

    /// L_p norm of every row or every column, depending on `direction`.
    fn norm(&self, degree: u32, direction: &Direction) -> anyhow::Result<Vec<Self::Item>>;
}
