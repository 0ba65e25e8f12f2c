//! Exhaustive-scan handle.

use tracing::{debug, info};

use crate::config::{keys, Config};
use crate::engine::{FlatEngine, VectorEngine};
use crate::error::{IndexError, Result};
use crate::types::{BinarySet, DeviceId, IndexType, SearchHits};

use super::{check_rebuild_dim, checked_count, checked_queries, IndexHandle};

/// Ground-truth handle over the exhaustive-scan engine.
///
/// Beyond the uniform contract it offers [`build`](Self::build), which
/// prepares an empty index of a fixed dimension so vectors can arrive
/// purely through `add`, and read-only views into the backing arrays.
/// Host-only: `copy_to_gpu` is unsupported.
#[derive(Default)]
pub struct BruteForceHandle {
    engine: FlatEngine,
}

impl BruteForceHandle {
    /// Creates an unbuilt handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Initializes an empty index with the dimension from config.
    ///
    /// The handle counts as built afterwards (zero vectors), so `add`
    /// is immediately valid. Fails with dimension-mismatch when a
    /// different dimension was already established.
    pub fn build(&mut self, config: &Config) -> Result<()> {
        let dim = config.require_positive(keys::DIM)?;
        check_rebuild_dim(self.engine.dimension(), dim)?;
        self.engine = FlatEngine::with_dimension(dim);
        info!(dim, "initialized brute-force index");
        Ok(())
    }

    /// Non-owning view into the raw vector backing array (row-major).
    pub fn raw_vectors(&self) -> &[f32] {
        self.engine.raw_vectors()
    }

    /// Non-owning view into the raw id backing array.
    pub fn raw_ids(&self) -> &[i64] {
        self.engine.raw_ids()
    }

    fn require_built(&self) -> Result<()> {
        if self.engine.dimension() == 0 {
            return Err(IndexError::NotBuilt);
        }
        Ok(())
    }
}

impl IndexHandle for BruteForceHandle {
    fn build_all(
        &mut self,
        vectors: &[f32],
        ids: &[i64],
        _train: Option<&[f32]>,
        config: &Config,
    ) -> Result<()> {
        let dim = config.require_positive(keys::DIM)?;
        check_rebuild_dim(self.engine.dimension(), dim)?;
        let count = checked_count(dim, vectors, ids)?;

        let mut staged = FlatEngine::new();
        staged.build(dim, vectors, ids, config)?;
        self.engine = staged;

        info!(dim, count, "built brute-force index");
        Ok(())
    }

    fn add(&mut self, vectors: &[f32], ids: &[i64], _config: &Config) -> Result<()> {
        self.require_built()?;
        checked_count(self.engine.dimension(), vectors, ids)?;
        self.engine.add(vectors, ids)
    }

    fn search(&self, queries: &[f32], config: &Config) -> Result<SearchHits> {
        self.require_built()?;
        let k = config.require_positive(keys::K)?;
        checked_queries(self.engine.dimension(), queries)?;
        self.engine.search(queries, k, config)
    }

    fn serialize(&self) -> Result<BinarySet> {
        self.require_built()?;
        self.engine.serialize()
    }

    fn load(&mut self, set: &BinarySet) -> Result<()> {
        let loaded = FlatEngine::load(set)?;
        check_rebuild_dim(self.engine.dimension(), loaded.dimension())?;
        debug!(count = loaded.count(), "loaded brute-force index");
        self.engine = loaded;
        Ok(())
    }

    fn clone_handle(&self) -> Box<dyn IndexHandle> {
        Box::new(Self {
            engine: self.engine.clone(),
        })
    }

    fn copy_to_gpu(&self, _device: u32, _config: &Config) -> Result<Box<dyn IndexHandle>> {
        Err(IndexError::unsupported(
            "brute-force index is host-only and cannot migrate to an accelerator",
        ))
    }

    fn copy_to_cpu(&self, _config: &Config) -> Result<Box<dyn IndexHandle>> {
        Ok(self.clone_handle())
    }

    fn index_type(&self) -> IndexType {
        IndexType::BruteForce
    }

    fn dimension(&self) -> usize {
        self.engine.dimension()
    }

    fn count(&self) -> usize {
        self.engine.count()
    }

    fn device(&self) -> DeviceId {
        DeviceId::Cpu
    }
}
