use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use parking_lot::Mutex;

use crate::utils::FloatOps;

/// Float wrapper with a total order for use inside `BinaryHeap`.
/// Incomparable values (NaN) compare as equal.
#[derive(Debug, Clone, Copy)]
struct OrdValue<T>(T);

impl<T: FloatOps> PartialEq for OrdValue<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T: FloatOps> Eq for OrdValue<T> {}

impl<T: FloatOps> PartialOrd for OrdValue<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: FloatOps> Ord for OrdValue<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retain {
    /// Keep the `capacity` smallest values; the top is the largest of them.
    Smallest,
    /// Keep the `capacity` largest values; the top is the smallest of them.
    Largest,
}

#[derive(Debug, Clone)]
enum Slots<T> {
    Smallest(BinaryHeap<OrdValue<T>>),
    Largest(BinaryHeap<Reverse<OrdValue<T>>>),
}

/// Fixed-capacity top-k heap.
#[derive(Debug, Clone)]
pub struct BoundedHeap<T> {
    capacity: usize,
    slots: Slots<T>,
}

impl<T: FloatOps> BoundedHeap<T> {
    pub fn new(capacity: usize, retain: Retain) -> Self {
        let slots = match retain {
            Retain::Smallest => Slots::Smallest(BinaryHeap::with_capacity(capacity)),
            Retain::Largest => Slots::Largest(BinaryHeap::with_capacity(capacity)),
        };
        BoundedHeap { capacity, slots }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        match &self.slots {
            Slots::Smallest(heap) => heap.len(),
            Slots::Largest(heap) => heap.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pushes while below capacity; once full, replaces the top only when
    /// `value` is a tighter bound than it.
    pub fn offer(&mut self, value: T) {
        let full = self.len() >= self.capacity;
        match &mut self.slots {
            Slots::Smallest(heap) => {
                if !full {
                    heap.push(OrdValue(value));
                } else if let Some(mut top) = heap.peek_mut() {
                    if top.0 > value {
                        *top = OrdValue(value);
                    }
                }
            }
            Slots::Largest(heap) => {
                if !full {
                    heap.push(Reverse(OrdValue(value)));
                } else if let Some(mut top) = heap.peek_mut() {
                    if (top.0).0 < value {
                        *top = Reverse(OrdValue(value));
                    }
                }
            }
        }
    }

    /// The worst retained extreme: the k-th smallest (or k-th largest) value seen.
    pub fn peek(&self) -> Option<T> {
        match &self.slots {
            Slots::Smallest(heap) => heap.peek().map(|v| v.0),
            Slots::Largest(heap) => heap.peek().map(|v| (v.0).0),
        }
    }
}

/// Per-column pair of bounded heaps, each pair behind its own lock so
/// writers to different columns never contend.
pub struct ColumnHeaps<T> {
    columns: Vec<Mutex<(BoundedHeap<T>, BoundedHeap<T>)>>,
}

impl<T: FloatOps> ColumnHeaps<T> {
    pub fn new(capacities: &[usize]) -> Self {
        let columns = capacities
            .iter()
            .map(|&k| {
                Mutex::new((
                    BoundedHeap::new(k, Retain::Smallest),
                    BoundedHeap::new(k, Retain::Largest),
                ))
            })
            .collect();
        ColumnHeaps { columns }
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn offer(&self, col: usize, value: T) {
        let mut pair = self.columns[col].lock();
        pair.0.offer(value);
        pair.1.offer(value);
    }

    /// Consumes the heaps into `(lower, upper)` cutoffs per column.
    /// Columns that saw no values get zero for both.
    pub fn into_cutoffs(self) -> (Vec<T>, Vec<T>) {
        self.columns
            .into_iter()
            .map(|pair| {
                let (smallest, largest) = pair.into_inner();
                (
                    smallest.peek().unwrap_or_else(T::zero),
                    largest.peek().unwrap_or_else(T::zero),
                )
            })
            .unzip()
    }
}
