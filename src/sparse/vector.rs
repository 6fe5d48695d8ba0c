use std::collections::BTreeMap;

use anyhow::{anyhow, bail};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::utils::{check_norm_degree, finish_norm, norm_term, FloatOps};

/// A sparse row: strictly increasing `indices` with their `values`, inside a
/// space of `dim` columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "SparseVectorParts<T>",
    bound(deserialize = "T: FloatOps + Deserialize<'de>")
)]
pub struct SparseVector<T> {
    indices: Vec<usize>,
    values: Vec<T>,
    dim: usize,
}

/// Unchecked wire form; loading goes through [`SparseVector::new`].
#[derive(Deserialize)]
struct SparseVectorParts<T> {
    indices: Vec<usize>,
    values: Vec<T>,
    dim: usize,
}

impl<T: FloatOps> TryFrom<SparseVectorParts<T>> for SparseVector<T> {
    type Error = anyhow::Error;

    fn try_from(parts: SparseVectorParts<T>) -> anyhow::Result<Self> {
        SparseVector::new(parts.indices, parts.values, parts.dim)
    }
}

fn validate<T>(indices: &[usize], values: &[T], dim: usize) -> anyhow::Result<()> {
    if indices.len() != values.len() {
        bail!(
            "Index array length {} does not match value array length {}",
            indices.len(),
            values.len()
        );
    }
    if let Some(window) = indices.windows(2).find(|w| w[0] >= w[1]) {
        bail!(
            "Sparse indices must be strictly increasing, found {} followed by {}",
            window[0],
            window[1]
        );
    }
    if let Some(&last) = indices.last() {
        if last >= dim {
            bail!("Index {} is out of bounds for dimension {}", last, dim);
        }
    }
    Ok(())
}

impl<T: FloatOps> SparseVector<T> {
    pub fn new(indices: Vec<usize>, values: Vec<T>, dim: usize) -> anyhow::Result<Self> {
        validate(&indices, &values, dim)?;
        Ok(SparseVector {
            indices,
            values,
            dim,
        })
    }

    pub fn empty(dim: usize) -> Self {
        SparseVector {
            indices: Vec::new(),
            values: Vec::new(),
            dim,
        }
    }

    /// Builds a sparse vector from a dense slice, keeping only non-zero entries.
    pub fn from_dense(dense: &[T]) -> Self {
        let (indices, values) = dense
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_zero())
            .map(|(i, &v)| (i, v))
            .unzip();
        SparseVector {
            indices,
            values,
            dim: dense.len(),
        }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, T)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> + '_ {
        self.indices.iter().copied().zip(self.values.iter_mut())
    }

    /// Replaces both arrays at once.
    pub fn set_parts(&mut self, indices: Vec<usize>, values: Vec<T>) -> anyhow::Result<()> {
        validate(&indices, &values, self.dim)?;
        self.indices = indices;
        self.values = values;
        Ok(())
    }

    /// Keeps only the entries for which `keep` returns true, preserving order.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(usize, T) -> bool,
    {
        let mut write = 0;
        for read in 0..self.indices.len() {
            let (index, value) = (self.indices[read], self.values[read]);
            if keep(index, value) {
                self.indices[write] = index;
                self.values[write] = value;
                write += 1;
            }
        }
        self.indices.truncate(write);
        self.values.truncate(write);
    }

    pub fn to_dense(&self) -> Array1<T> {
        let mut dense = Array1::zeros(self.dim);
        for (index, value) in self.iter() {
            dense[index] = value;
        }
        dense
    }

    pub fn norm(&self, degree: u32) -> anyhow::Result<T> {
        check_norm_degree(degree)?;
        let accumulated = self.values.iter().map(|&v| norm_term(v, degree)).sum();
        Ok(finish_norm(accumulated, degree))
    }

    /// Divides the vector by its own L_p norm; a zero norm leaves it unchanged.
    pub fn apply_norm(&mut self, degree: u32) -> anyhow::Result<()> {
        let norm = self.norm(degree)?;
        self.scale_by_norm(norm);
        Ok(())
    }

    pub(crate) fn scale_by_norm(&mut self, norm: T) {
        if norm.is_zero() {
            return;
        }
        for value in self.values.iter_mut() {
            *value = *value / norm;
        }
    }

    /// Divides each entry by the divisor at its index. Zero divisors are skipped.
    pub fn divide_by(&mut self, divisors: &[T]) -> anyhow::Result<()> {
        self.check_bounds(divisors.len())?;
        for (index, value) in self.indices.iter().zip(self.values.iter_mut()) {
            let divisor = divisors[*index];
            if !divisor.is_zero() {
                *value = *value / divisor;
            }
        }
        Ok(())
    }

    /// Drops indices absent from `selected`, renumbers the rest and moves the
    /// vector into a space of `new_dim` columns.
    pub(crate) fn apply_index_selector(
        &mut self,
        selected: &BTreeMap<usize, usize>,
        new_dim: usize,
    ) -> anyhow::Result<()> {
        let mut pairs: Vec<(usize, T)> = self
            .iter()
            .filter_map(|(index, value)| selected.get(&index).map(|&target| (target, value)))
            .collect();
        if let Some(&(target, _)) = pairs.iter().find(|(target, _)| *target >= new_dim) {
            return Err(anyhow!(
                "Selector maps to index {} outside of the new dimension {}",
                target,
                new_dim
            ));
        }
        // Column maps are injective but not required to be monotone.
        pairs.sort_unstable_by_key(|&(target, _)| target);
        let (indices, values) = pairs.into_iter().unzip();
        self.indices = indices;
        self.values = values;
        self.dim = new_dim;
        Ok(())
    }

    /// Fails when an index lies outside a parameter array of length `len`.
    pub(crate) fn check_bounds(&self, len: usize) -> anyhow::Result<()> {
        match self.indices.last() {
            Some(&last) if last >= len => bail!(
                "Vector index {} is out of bounds for {} fitted columns",
                last,
                len
            ),
            _ => Ok(()),
        }
    }
}
