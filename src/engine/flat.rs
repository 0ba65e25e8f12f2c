//! Exhaustive-scan engine.
//!
//! The ground-truth baseline: stores raw vectors and ids in flat arrays
//! and computes distances to every stored vector per query. Batch queries
//! scan in parallel via rayon.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::types::{BinarySet, IndexType, SearchHits};

use super::{l2_squared, TopK, VectorEngine};

const META_TAG: &str = "flat_meta";
const VECTORS_TAG: &str = "flat_vectors";
const IDS_TAG: &str = "flat_ids";

#[derive(Debug, Serialize, Deserialize)]
struct FlatMeta {
    dim: usize,
    count: usize,
}

/// Exhaustive-scan engine over flat backing arrays.
///
/// The backing arrays are exposed as non-owning views through the
/// brute-force handle for inspection and debugging.
#[derive(Clone, Debug, Default)]
pub struct FlatEngine {
    dim: usize,
    ids: Vec<i64>,
    vectors: Vec<f32>,
}

impl FlatEngine {
    /// Creates an empty, unbuilt engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty engine with a fixed dimension, ready for `add`.
    pub fn with_dimension(dim: usize) -> Self {
        Self {
            dim,
            ids: Vec::new(),
            vectors: Vec::new(),
        }
    }

    /// Non-owning view into the raw vector backing array (row-major).
    pub fn raw_vectors(&self) -> &[f32] {
        &self.vectors
    }

    /// Non-owning view into the raw id backing array.
    pub fn raw_ids(&self) -> &[i64] {
        &self.ids
    }

    /// Exact top-k scan for a single query.
    fn scan(&self, query: &[f32], k: usize) -> Vec<(i64, f32)> {
        let mut top = TopK::new(k);
        for (row, &id) in self.vectors.chunks_exact(self.dim).zip(self.ids.iter()) {
            top.push(id, l2_squared(query, row));
        }
        top.into_sorted_row()
    }
}

impl VectorEngine for FlatEngine {
    fn engine_type(&self) -> IndexType {
        IndexType::BruteForce
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn count(&self) -> usize {
        self.ids.len()
    }

    fn build(&mut self, dim: usize, vectors: &[f32], ids: &[i64], _config: &Config) -> Result<()> {
        *self = Self {
            dim,
            ids: ids.to_vec(),
            vectors: vectors.to_vec(),
        };
        Ok(())
    }

    fn add(&mut self, vectors: &[f32], ids: &[i64]) -> Result<()> {
        self.vectors.extend_from_slice(vectors);
        self.ids.extend_from_slice(ids);
        Ok(())
    }

    fn search(&self, queries: &[f32], k: usize, _config: &Config) -> Result<SearchHits> {
        let rows: Vec<Vec<(i64, f32)>> = queries
            .par_chunks(self.dim)
            .map(|query| self.scan(query, k))
            .collect();

        let mut hits = SearchHits::new(k);
        for row in rows {
            hits.push_row(row);
        }
        Ok(hits)
    }

    fn serialize(&self) -> Result<BinarySet> {
        let meta = FlatMeta {
            dim: self.dim,
            count: self.ids.len(),
        };

        let mut set = BinarySet::new();
        set.set_index_type(self.engine_type());
        set.append(META_TAG, bincode::serialize(&meta)?);
        set.append(VECTORS_TAG, bincode::serialize(&self.vectors)?);
        set.append(IDS_TAG, bincode::serialize(&self.ids)?);
        Ok(set)
    }

    fn load(set: &BinarySet) -> Result<Self> {
        if set.index_type()? != IndexType::BruteForce {
            return Err(IndexError::corrupt(format!(
                "expected a brute_force payload, found '{}'",
                set.index_type()?
            )));
        }

        let meta: FlatMeta = bincode::deserialize(set.require(META_TAG)?)
            .map_err(|e| IndexError::corrupt(format!("malformed '{}': {}", META_TAG, e)))?;
        let vectors: Vec<f32> = bincode::deserialize(set.require(VECTORS_TAG)?)
            .map_err(|e| IndexError::corrupt(format!("malformed '{}': {}", VECTORS_TAG, e)))?;
        let ids: Vec<i64> = bincode::deserialize(set.require(IDS_TAG)?)
            .map_err(|e| IndexError::corrupt(format!("malformed '{}': {}", IDS_TAG, e)))?;

        if ids.len() != meta.count || vectors.len() != meta.count * meta.dim {
            return Err(IndexError::corrupt(
                "flat blob lengths disagree with metadata",
            ));
        }

        Ok(Self {
            dim: meta.dim,
            ids,
            vectors,
        })
    }
}
