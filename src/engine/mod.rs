//! Vector engine seams and concrete engine implementations.
//!
//! Handles treat the similarity-search implementation as an external
//! collaborator behind two traits:
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │           VectorEngine              │  build / add / search /
//! └──────────┬──────────────┬───────────┘  serialize / load
//!            │              │
//!     ┌──────┴─────┐  ┌─────┴──────┐
//!     │ FlatEngine │  │ IvfEngine  │── TrainableEngine (two-phase)
//!     └────────────┘  └────────────┘
//! ```
//!
//! Engines are passive data structures: they hold no locks and assume the
//! handle layer has already validated argument shapes (dimension
//! divisibility, id counts). Distance is squared L2 throughout; the metric
//! itself is not part of this layer's contract.

mod flat;
mod ivf;
mod kmeans;

pub use flat::FlatEngine;
pub use ivf::{IvfEngine, Quantizer};

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::config::Config;
use crate::error::Result;
use crate::types::{BinarySet, IndexType, SearchHits};

/// Contract every engine implements.
///
/// `build` is single-shot from the caller's viewpoint; engines with an
/// internal training phase run it on the full vector set. `load` is an
/// associated constructor so a failed decode can never leave an engine
/// half-replaced.
pub trait VectorEngine: Send + Sync {
    /// The variant tag embedded in this engine's serialized form.
    fn engine_type(&self) -> IndexType;

    /// Vector dimension, 0 while unbuilt.
    fn dimension(&self) -> usize;

    /// Number of indexed vectors.
    fn count(&self) -> usize;

    /// Builds the engine from scratch, replacing any prior state.
    fn build(&mut self, dim: usize, vectors: &[f32], ids: &[i64], config: &Config) -> Result<()>;

    /// Appends vectors to a built engine.
    fn add(&mut self, vectors: &[f32], ids: &[i64]) -> Result<()>;

    /// k-nearest-neighbor scan over `queries` (row-major, `dimension()` wide).
    fn search(&self, queries: &[f32], k: usize, config: &Config) -> Result<SearchHits>;

    /// Persists full engine state as a named-blob set.
    fn serialize(&self) -> Result<BinarySet>;

    /// Reconstructs an engine from a serialized set.
    fn load(set: &BinarySet) -> Result<Self>
    where
        Self: Sized;
}

/// Capability of engines whose build is two-phase: fit partition
/// structures on a training subset, then bulk-add.
pub trait TrainableEngine: VectorEngine {
    /// Fits partition structures (the coarse quantizer) on `vectors`.
    fn train(&mut self, dim: usize, vectors: &[f32], config: &Config) -> Result<()>;

    /// Returns true once partition structures are fitted.
    fn is_trained(&self) -> bool;

    /// Number of partitions, 0 while untrained.
    fn partition_count(&self) -> usize;
}

/// Squared L2 distance between two equal-length slices.
#[inline]
pub(crate) fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// A candidate neighbor during top-k selection.
#[derive(Clone, Copy)]
pub(crate) struct Candidate {
    pub id: i64,
    pub distance: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        // Max-heap ordering: peek() is the current worst of the k best,
        // so new candidates only displace it when strictly closer.
        self.distance.partial_cmp(&other.distance)
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap_or(Ordering::Equal)
    }
}

/// Bounded top-k selector over scored candidates.
pub(crate) struct TopK {
    heap: BinaryHeap<Candidate>,
    k: usize,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(k),
            k,
        }
    }

    pub fn push(&mut self, id: i64, distance: f32) {
        if self.heap.len() < self.k {
            self.heap.push(Candidate { id, distance });
        } else if let Some(worst) = self.heap.peek() {
            if distance < worst.distance {
                self.heap.pop();
                self.heap.push(Candidate { id, distance });
            }
        }
    }

    /// Drains into a row sorted by distance ascending.
    pub fn into_sorted_row(self) -> Vec<(i64, f32)> {
        let mut row: Vec<(i64, f32)> = self
            .heap
            .into_iter()
            .map(|c| (c.id, c.distance))
            .collect();
        row.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_squared() {
        assert_eq!(l2_squared(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(l2_squared(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_top_k_keeps_smallest() {
        let mut top = TopK::new(3);
        for (id, d) in [(1, 5.0), (2, 1.0), (3, 4.0), (4, 0.5), (5, 9.0)] {
            top.push(id, d);
        }
        let row = top.into_sorted_row();
        assert_eq!(row.len(), 3);
        assert_eq!(row[0], (4, 0.5));
        assert_eq!(row[1], (2, 1.0));
        assert_eq!(row[2], (3, 4.0));
    }

    #[test]
    fn test_top_k_underfull() {
        let mut top = TopK::new(10);
        top.push(1, 2.0);
        top.push(2, 1.0);
        let row = top.into_sorted_row();
        assert_eq!(row, vec![(2, 1.0), (1, 2.0)]);
    }
}
