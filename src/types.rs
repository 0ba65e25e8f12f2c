//! Core types shared across the handle and engine layers.
//!
//! - [`IndexType`]: enumerated variant tag embedded in serialized forms
//! - [`DeviceId`]: compute residency of an engine instance
//! - [`BinarySet`]: persisted named-blob representation of engine state
//! - [`SearchHits`]: row-major `nq x k` search result block

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// Sentinel id for padded result slots when a query matched fewer than
/// `k` vectors.
pub const INVALID_ID: i64 = -1;

/// Reserved BinarySet tag identifying the engine variant.
pub const INDEX_TYPE_TAG: &str = "index_type";

/// Enumerated index variant tag.
///
/// Returned by introspection and embedded in every serialized form so
/// `load` can validate compatibility before reconstruction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    /// No variant; the sentinel default.
    #[default]
    Invalid,
    /// Exhaustive-scan index.
    BruteForce,
    /// Inverted-file index with an embedded coarse quantizer.
    InvertedFile,
    /// Inverted-file index whose quantizer is detachable and shareable.
    InvertedFileHybrid,
}

impl IndexType {
    /// Stable string tag used in serialized forms.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::BruteForce => "brute_force",
            Self::InvertedFile => "inverted_file",
            Self::InvertedFileHybrid => "inverted_file_hybrid",
        }
    }

    /// Parses a serialized string tag back into a variant.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "invalid" => Some(Self::Invalid),
            "brute_force" => Some(Self::BruteForce),
            "inverted_file" => Some(Self::InvertedFile),
            "inverted_file_hybrid" => Some(Self::InvertedFileHybrid),
            _ => None,
        }
    }

    /// Returns true if this is an inverted-file variant (plain or hybrid).
    pub fn is_inverted_file(&self) -> bool {
        matches!(self, Self::InvertedFile | Self::InvertedFileHybrid)
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute residency of an engine instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceId {
    /// Host memory.
    #[default]
    Cpu,
    /// Accelerator memory, by device ordinal.
    Gpu(u32),
}

impl DeviceId {
    /// Returns true for accelerator residency.
    pub fn is_gpu(&self) -> bool {
        matches!(self, Self::Gpu(_))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Gpu(ordinal) => write!(f, "gpu:{}", ordinal),
        }
    }
}

/// Persisted named-blob representation of one engine's full state.
///
/// A mapping from string tag to opaque byte blob; insertion order is
/// irrelevant. Every set produced by `serialize` carries the reserved
/// [`INDEX_TYPE_TAG`] entry.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BinarySet {
    blobs: BTreeMap<String, Vec<u8>>,
}

impl BinarySet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a blob under `tag`, replacing any previous entry.
    pub fn append(&mut self, tag: impl Into<String>, blob: Vec<u8>) {
        self.blobs.insert(tag.into(), blob);
    }

    /// Returns the blob stored under `tag`, if present.
    pub fn get(&self, tag: &str) -> Option<&[u8]> {
        self.blobs.get(tag).map(Vec::as_slice)
    }

    /// Returns the blob stored under `tag`, failing with corrupt-data
    /// when the tag is missing.
    pub fn require(&self, tag: &str) -> Result<&[u8]> {
        self.get(tag)
            .ok_or_else(|| IndexError::corrupt(format!("missing tag '{}'", tag)))
    }

    /// Iterates over the stored tags.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.blobs.keys().map(String::as_str)
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Returns true if the set holds no blobs.
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Records the engine variant under the reserved type tag.
    pub fn set_index_type(&mut self, index_type: IndexType) {
        self.append(INDEX_TYPE_TAG, index_type.as_str().as_bytes().to_vec());
    }

    /// Reads and validates the reserved type tag.
    pub fn index_type(&self) -> Result<IndexType> {
        let blob = self.require(INDEX_TYPE_TAG)?;
        let tag = std::str::from_utf8(blob)
            .map_err(|_| IndexError::corrupt("type tag is not valid UTF-8"))?;
        IndexType::from_tag(tag)
            .ok_or_else(|| IndexError::corrupt(format!("unknown index type tag '{}'", tag)))
    }
}

/// Row-major `nq x k` nearest-neighbor result block.
///
/// Each query contributes one row of `k` ids and `k` distances, sorted
/// by distance ascending. Rows with fewer than `k` matches are padded
/// with [`INVALID_ID`] and `+inf`.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchHits {
    k: usize,
    ids: Vec<i64>,
    distances: Vec<f32>,
}

impl SearchHits {
    /// Creates an empty result block for rows of width `k`.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ids: Vec::new(),
            distances: Vec::new(),
        }
    }

    /// Appends one query's row, padding it out to `k` slots.
    pub fn push_row(&mut self, row: Vec<(i64, f32)>) {
        debug_assert!(row.len() <= self.k);
        let pad = self.k - row.len().min(self.k);
        for (id, distance) in row.into_iter().take(self.k) {
            self.ids.push(id);
            self.distances.push(distance);
        }
        for _ in 0..pad {
            self.ids.push(INVALID_ID);
            self.distances.push(f32::INFINITY);
        }
    }

    /// Row width (neighbors requested per query).
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of query rows stored.
    pub fn num_queries(&self) -> usize {
        if self.k == 0 {
            0
        } else {
            self.ids.len() / self.k
        }
    }

    /// All ids, row-major.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    /// All distances, row-major.
    pub fn distances(&self) -> &[f32] {
        &self.distances
    }

    /// The ids and distances of query row `q`.
    ///
    /// # Panics
    /// Panics if `q` is out of range.
    pub fn row(&self, q: usize) -> (&[i64], &[f32]) {
        let start = q * self.k;
        let end = start + self.k;
        (&self.ids[start..end], &self.distances[start..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_type_tags_roundtrip() {
        for t in [
            IndexType::Invalid,
            IndexType::BruteForce,
            IndexType::InvertedFile,
            IndexType::InvertedFileHybrid,
        ] {
            assert_eq!(IndexType::from_tag(t.as_str()), Some(t));
        }
        assert_eq!(IndexType::from_tag("hnsw"), None);
    }

    #[test]
    fn test_index_type_display() {
        assert_eq!(IndexType::InvertedFileHybrid.to_string(), "inverted_file_hybrid");
        assert_eq!(IndexType::default(), IndexType::Invalid);
    }

    #[test]
    fn test_device_id() {
        assert!(!DeviceId::Cpu.is_gpu());
        assert!(DeviceId::Gpu(0).is_gpu());
        assert_eq!(DeviceId::Gpu(2).to_string(), "gpu:2");
        assert_eq!(DeviceId::Cpu.to_string(), "cpu");
    }

    #[test]
    fn test_binary_set_basic() {
        let mut set = BinarySet::new();
        assert!(set.is_empty());

        set.append("blob_a", vec![1, 2, 3]);
        set.set_index_type(IndexType::BruteForce);

        assert_eq!(set.len(), 2);
        assert_eq!(set.get("blob_a"), Some(&[1u8, 2, 3][..]));
        assert_eq!(set.index_type().unwrap(), IndexType::BruteForce);
    }

    #[test]
    fn test_binary_set_missing_tag() {
        let set = BinarySet::new();
        let err = set.require("nope").unwrap_err();
        assert!(err.is_corrupt());
        assert!(set.index_type().unwrap_err().is_corrupt());
    }

    #[test]
    fn test_binary_set_bad_type_tag() {
        let mut set = BinarySet::new();
        set.append(INDEX_TYPE_TAG, b"hnsw".to_vec());
        assert!(set.index_type().unwrap_err().is_corrupt());
    }

    #[test]
    fn test_search_hits_padding() {
        let mut hits = SearchHits::new(3);
        hits.push_row(vec![(7, 0.1), (4, 0.2)]);
        hits.push_row(vec![]);

        assert_eq!(hits.num_queries(), 2);
        let (ids, distances) = hits.row(0);
        assert_eq!(ids, &[7, 4, INVALID_ID]);
        assert_eq!(distances[0], 0.1);
        assert!(distances[2].is_infinite());

        let (ids, _) = hits.row(1);
        assert_eq!(ids, &[INVALID_ID; 3]);
    }
}
