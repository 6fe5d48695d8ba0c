use std::fmt::Debug;
use std::iter::Sum;
use std::ops::AddAssign;

use anyhow::bail;
use num_traits::{Float, NumCast};

/// Numeric bound for the values stored in sparse rows and fitted parameters.
pub trait FloatOps:
    Float + NumCast + AddAssign + Sum + Send + Sync + Debug + Default + 'static
{
}

impl FloatOps for f32 {}
impl FloatOps for f64 {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ROW,
    COLUMN,
}

/// Divide every stored entry by the norm of its row or column.
///
/// Entries whose norm is zero are left untouched.
pub trait Normalize<T: FloatOps> {
    fn normalize(&mut self, norms: &[T], direction: &Direction) -> anyhow::Result<()>;
}

pub(crate) fn check_norm_degree(degree: u32) -> anyhow::Result<()> {
    if degree == 0 {
        bail!("Norm degree must be at least 1, got 0");
    }
    Ok(())
}

/// L_p norm of a slice of values, `(sum |v|^p)^(1/p)`.
pub fn lp_norm<T: FloatOps>(values: &[T], degree: u32) -> anyhow::Result<T> {
    check_norm_degree(degree)?;
    Ok(finish_norm(
        values.iter().map(|&v| norm_term(v, degree)).sum(),
        degree,
    ))
}

/// Contribution of a single value to an L_p norm before the final root.
#[inline]
pub(crate) fn norm_term<T: FloatOps>(value: T, degree: u32) -> T {
    match degree {
        1 => value.abs(),
        2 => value * value,
        p => value.abs().powi(p as i32),
    }
}

#[inline]
pub(crate) fn finish_norm<T: FloatOps>(accumulated: T, degree: u32) -> T {
    match degree {
        1 => accumulated,
        2 => accumulated.sqrt(),
        p => accumulated.powf(T::one() / T::from(p).unwrap_or_else(T::one)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_lp_norm() {
        let values = [3.0f64, -4.0];
        assert_relative_eq!(lp_norm(&values, 1).unwrap(), 7.0);
        assert_relative_eq!(lp_norm(&values, 2).unwrap(), 5.0);
        assert_relative_eq!(
            lp_norm(&values, 3).unwrap(),
            (27.0f64 + 64.0).powf(1.0 / 3.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_lp_norm_empty_is_zero() {
        let values: [f32; 0] = [];
        assert_eq!(lp_norm(&values, 2).unwrap(), 0.0);
    }

    #[test]
    fn test_zero_degree_rejected() {
        assert!(lp_norm(&[1.0f64], 0).is_err());
    }
}
