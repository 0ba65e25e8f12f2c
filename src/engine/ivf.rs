//! Inverted-file engine with a detachable coarse quantizer.
//!
//! The engine state decomposes into two sub-resources:
//!
//! - [`Quantizer`]: the k-means centroid table. Immutable once fitted and
//!   shared by reference (`Arc`), so one quantizer can serve many engine
//!   instances simultaneously.
//! - Posting lists: per-partition id and vector arrays (the residual
//!   data), always owned by exactly one engine.
//!
//! Detaching the quantizer leaves the posting lists intact but makes
//! search, add, and serialize fail with not-ready until a compatible
//! quantizer is re-attached. This is the memory-parking pattern used by
//! the hybrid handle.

use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{keys, Config};
use crate::error::{IndexError, Result};
use crate::types::{BinarySet, IndexType, SearchHits};

use super::{kmeans, l2_squared, TopK, TrainableEngine, VectorEngine};

const META_TAG: &str = "ivf_meta";
const QUANTIZER_TAG: &str = "ivf_quantizer";
const POSTINGS_TAG: &str = "ivf_postings";

const KMEANS_MAX_ITERS: usize = 25;

#[derive(Debug, Serialize, Deserialize)]
struct IvfMeta {
    dim: usize,
    nlist: usize,
    count: usize,
}

/// Coarse partitioning structure: a flat `nlist * dim` centroid table.
///
/// Immutable once constructed; concurrent reads from any number of
/// attached engines are safe.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Quantizer {
    dim: usize,
    nlist: usize,
    centroids: Vec<f32>,
}

impl Quantizer {
    /// Fits a quantizer on `vectors` (row-major, `dim` wide).
    pub(crate) fn fit(vectors: &[f32], dim: usize, nlist: usize) -> Self {
        let centroids = kmeans::fit_centroids(vectors, dim, nlist, KMEANS_MAX_ITERS);
        Self {
            dim,
            nlist,
            centroids,
        }
    }

    /// Partition dimension.
    pub fn dimension(&self) -> usize {
        self.dim
    }

    /// Partition count.
    pub fn nlist(&self) -> usize {
        self.nlist
    }

    /// Partition index of the centroid nearest to `vector`.
    pub fn assign(&self, vector: &[f32]) -> usize {
        kmeans::nearest_centroid(vector, &self.centroids, self.dim).0
    }

    /// The `nprobe` partition indices nearest to `query`, closest first.
    fn probe(&self, query: &[f32], nprobe: usize) -> Vec<usize> {
        let mut ranked: Vec<(usize, f32)> = self
            .centroids
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(idx, c)| (idx, l2_squared(query, c)))
            .collect();
        ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.into_iter().take(nprobe).map(|(idx, _)| idx).collect()
    }

    fn validate(&self) -> Result<()> {
        if self.dim == 0
            || self.nlist == 0
            || self.centroids.len() != self.nlist * self.dim
        {
            return Err(IndexError::corrupt(
                "quantizer centroid table disagrees with its metadata",
            ));
        }
        Ok(())
    }
}

/// One partition's residual data.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct PostingList {
    ids: Vec<i64>,
    vectors: Vec<f32>,
}

/// Inverted-file engine.
///
/// Two-phase build: `train` fits the quantizer, `add` routes vectors into
/// posting lists by nearest centroid. Search scans the `nprobe` nearest
/// partitions per query.
#[derive(Clone, Debug)]
pub struct IvfEngine {
    kind: IndexType,
    dim: usize,
    count: usize,
    quantizer: Option<Arc<Quantizer>>,
    postings: Vec<PostingList>,
}

impl IvfEngine {
    /// Creates an unbuilt engine declaring itself as `kind`
    /// (plain inverted-file or hybrid).
    pub fn new(kind: IndexType) -> Self {
        debug_assert!(kind.is_inverted_file());
        Self {
            kind,
            dim: 0,
            count: 0,
            quantizer: None,
            postings: Vec::new(),
        }
    }

    /// The currently attached quantizer, if any.
    pub fn quantizer(&self) -> Option<&Arc<Quantizer>> {
        self.quantizer.as_ref()
    }

    /// Attaches an externally supplied quantizer.
    ///
    /// Fails with dimension-mismatch when the quantizer disagrees with
    /// the engine's residual data in dimension or partition count.
    pub fn set_quantizer(&mut self, quantizer: Arc<Quantizer>) -> Result<()> {
        if quantizer.dim != self.dim {
            return Err(IndexError::dimension_mismatch(self.dim, quantizer.dim));
        }
        if quantizer.nlist != self.postings.len() {
            return Err(IndexError::dimension_mismatch(
                self.postings.len(),
                quantizer.nlist,
            ));
        }
        self.quantizer = Some(quantizer);
        Ok(())
    }

    /// Detaches the quantizer, keeping residual data.
    pub fn unset_quantizer(&mut self) {
        self.quantizer = None;
    }

    /// Decodes only the quantizer half of a serialized set.
    pub fn decode_quantizer(set: &BinarySet) -> Result<Quantizer> {
        if !set.index_type()?.is_inverted_file() {
            return Err(IndexError::corrupt(format!(
                "expected an inverted-file payload, found '{}'",
                set.index_type()?
            )));
        }
        let quantizer: Quantizer = bincode::deserialize(set.require(QUANTIZER_TAG)?)
            .map_err(|e| IndexError::corrupt(format!("malformed '{}': {}", QUANTIZER_TAG, e)))?;
        quantizer.validate()?;
        Ok(quantizer)
    }

    /// Loads only the residual/postings half of a serialized set,
    /// validating partition assignment against `reference`.
    ///
    /// The engine's quantizer attachment is left untouched, so an
    /// attached quantizer must also agree with the incoming postings in
    /// dimension and partition count.
    pub fn load_postings(&mut self, reference: &Quantizer, set: &BinarySet) -> Result<()> {
        let (meta, postings) = Self::decode_postings(set)?;
        if meta.dim != reference.dim {
            return Err(IndexError::dimension_mismatch(reference.dim, meta.dim));
        }
        if meta.nlist != reference.nlist {
            return Err(IndexError::dimension_mismatch(reference.nlist, meta.nlist));
        }
        if let Some(attached) = &self.quantizer {
            if attached.dim != meta.dim {
                return Err(IndexError::dimension_mismatch(attached.dim, meta.dim));
            }
            if attached.nlist != meta.nlist {
                return Err(IndexError::dimension_mismatch(attached.nlist, meta.nlist));
            }
        }

        self.dim = meta.dim;
        self.count = meta.count;
        self.postings = postings;
        Ok(())
    }

    fn decode_postings(set: &BinarySet) -> Result<(IvfMeta, Vec<PostingList>)> {
        if !set.index_type()?.is_inverted_file() {
            return Err(IndexError::corrupt(format!(
                "expected an inverted-file payload, found '{}'",
                set.index_type()?
            )));
        }

        let meta: IvfMeta = bincode::deserialize(set.require(META_TAG)?)
            .map_err(|e| IndexError::corrupt(format!("malformed '{}': {}", META_TAG, e)))?;
        let postings: Vec<PostingList> = bincode::deserialize(set.require(POSTINGS_TAG)?)
            .map_err(|e| IndexError::corrupt(format!("malformed '{}': {}", POSTINGS_TAG, e)))?;

        if meta.dim == 0 || meta.nlist == 0 || postings.len() != meta.nlist {
            return Err(IndexError::corrupt(
                "posting lists disagree with partition metadata",
            ));
        }
        let total: usize = postings.iter().map(|p| p.ids.len()).sum();
        if total != meta.count
            || postings
                .iter()
                .any(|p| p.vectors.len() != p.ids.len() * meta.dim)
        {
            return Err(IndexError::corrupt(
                "posting list lengths disagree with metadata",
            ));
        }

        Ok((meta, postings))
    }

    fn attached(&self) -> Result<&Arc<Quantizer>> {
        self.quantizer
            .as_ref()
            .ok_or_else(|| IndexError::not_ready("quantizer is detached"))
    }

    /// Top-k scan over the `nprobe` partitions nearest to `query`.
    fn scan(&self, quantizer: &Quantizer, query: &[f32], k: usize, nprobe: usize) -> Vec<(i64, f32)> {
        let mut top = TopK::new(k);
        for partition in quantizer.probe(query, nprobe) {
            let posting = &self.postings[partition];
            for (row, &id) in posting.vectors.chunks_exact(self.dim).zip(posting.ids.iter()) {
                top.push(id, l2_squared(query, row));
            }
        }
        top.into_sorted_row()
    }
}

impl VectorEngine for IvfEngine {
    fn engine_type(&self) -> IndexType {
        self.kind
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn count(&self) -> usize {
        self.count
    }

    fn build(&mut self, dim: usize, vectors: &[f32], ids: &[i64], config: &Config) -> Result<()> {
        // Single-shot entry: train on the full set, then add it.
        let mut staged = Self::new(self.kind);
        staged.train(dim, vectors, config)?;
        staged.add(vectors, ids)?;
        *self = staged;
        Ok(())
    }

    fn add(&mut self, vectors: &[f32], ids: &[i64]) -> Result<()> {
        let quantizer = Arc::clone(self.attached()?);
        for (row, &id) in vectors.chunks_exact(self.dim).zip(ids.iter()) {
            let partition = quantizer.assign(row);
            let posting = &mut self.postings[partition];
            posting.ids.push(id);
            posting.vectors.extend_from_slice(row);
        }
        self.count += ids.len();
        Ok(())
    }

    fn search(&self, queries: &[f32], k: usize, config: &Config) -> Result<SearchHits> {
        let quantizer = self.attached()?;
        let nprobe = config
            .positive_or(keys::NPROBE, 1)?
            .min(quantizer.nlist);

        let rows: Vec<Vec<(i64, f32)>> = queries
            .par_chunks(self.dim)
            .map(|query| self.scan(quantizer, query, k, nprobe))
            .collect();

        let mut hits = SearchHits::new(k);
        for row in rows {
            hits.push_row(row);
        }
        Ok(hits)
    }

    fn serialize(&self) -> Result<BinarySet> {
        let quantizer = self.attached()?;
        let meta = IvfMeta {
            dim: self.dim,
            nlist: quantizer.nlist,
            count: self.count,
        };

        let mut set = BinarySet::new();
        set.set_index_type(self.kind);
        set.append(META_TAG, bincode::serialize(&meta)?);
        set.append(QUANTIZER_TAG, bincode::serialize(quantizer.as_ref())?);
        set.append(POSTINGS_TAG, bincode::serialize(&self.postings)?);
        Ok(set)
    }

    fn load(set: &BinarySet) -> Result<Self> {
        let kind = set.index_type()?;
        let quantizer = Self::decode_quantizer(set)?;
        let (meta, postings) = Self::decode_postings(set)?;

        if quantizer.dim != meta.dim || quantizer.nlist != meta.nlist {
            return Err(IndexError::corrupt(
                "quantizer disagrees with partition metadata",
            ));
        }

        Ok(Self {
            kind,
            dim: meta.dim,
            count: meta.count,
            quantizer: Some(Arc::new(quantizer)),
            postings,
        })
    }
}

impl TrainableEngine for IvfEngine {
    fn train(&mut self, dim: usize, vectors: &[f32], config: &Config) -> Result<()> {
        let nlist = config.require_positive(keys::NLIST)?;
        let train_count = vectors.len() / dim;
        if nlist > train_count {
            return Err(IndexError::invalid_argument(format!(
                "nlist {} exceeds training count {}",
                nlist, train_count
            )));
        }

        let quantizer = Quantizer::fit(vectors, dim, nlist);
        self.dim = dim;
        self.count = 0;
        self.quantizer = Some(Arc::new(quantizer));
        self.postings = vec![PostingList::default(); nlist];
        Ok(())
    }

    fn is_trained(&self) -> bool {
        self.quantizer.is_some() && !self.postings.is_empty()
    }

    fn partition_count(&self) -> usize {
        self.postings.len()
    }
}
