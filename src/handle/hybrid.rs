//! Hybrid inverted-file handle with a detachable, shareable quantizer.
//!
//! The engine state splits into a quantizer sub-resource and a
//! residual/postings sub-resource that load, attach, and release
//! independently. The intended fleet pattern: park many handles in the
//! residual-only state, share one quantizer behind an `Arc`, and attach
//! it to whichever handle is about to serve a search.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{keys, Config};
use crate::engine::{IvfEngine, Quantizer, TrainableEngine, VectorEngine};
use crate::error::{IndexError, Result};
use crate::types::{BinarySet, DeviceId, IndexType, SearchHits};

use super::{
    check_device, check_rebuild_dim, checked_count, checked_queries, checked_train,
    DetachableQuantizer, IndexHandle, PartitionedHandle, TwoPhaseBuild,
};

/// Two-phase inverted-file handle whose quantizer is detachable.
///
/// State machine:
///
/// ```text
/// Unbuilt ──build_all/load──► Built(Attached) ◄──set_quantizer──┐
///                                  │                            │
///                                  └──unset_quantizer──► Built(Detached)
/// ```
///
/// `search` is valid only in `Built(Attached)`; in the detached state it
/// fails with not-ready. Post-build `add` is unsupported on this variant
/// (residual storage is quantizer-dependent and frozen after build).
pub struct HybridHandle {
    engine: IvfEngine,
    device: DeviceId,
}

impl Default for HybridHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl HybridHandle {
    /// Creates an unbuilt, host-resident handle.
    pub fn new() -> Self {
        Self {
            engine: IvfEngine::new(IndexType::InvertedFileHybrid),
            device: DeviceId::Cpu,
        }
    }

    fn at_device(engine: IvfEngine, device: DeviceId) -> Self {
        Self { engine, device }
    }

    fn require_built(&self) -> Result<()> {
        if self.engine.dimension() == 0 {
            return Err(IndexError::NotBuilt);
        }
        Ok(())
    }

    /// Returns true while a quantizer is attached.
    pub fn quantizer_attached(&self) -> bool {
        self.engine.quantizer().is_some()
    }
}

impl IndexHandle for HybridHandle {
    fn build_all(
        &mut self,
        vectors: &[f32],
        ids: &[i64],
        train: Option<&[f32]>,
        config: &Config,
    ) -> Result<()> {
        let dim = config.require_positive(keys::DIM)?;
        check_rebuild_dim(self.engine.dimension(), dim)?;
        let count = checked_count(dim, vectors, ids)?;
        let train = train.unwrap_or(vectors);
        checked_train(dim, train)?;

        let mut staged = IvfEngine::new(IndexType::InvertedFileHybrid);
        staged.train(dim, train, config)?;
        staged.add(vectors, ids)?;
        self.engine = staged;

        info!(
            index_type = %self.index_type(),
            dim,
            count,
            nlist = self.engine.partition_count(),
            "built hybrid index"
        );
        Ok(())
    }

    fn add(&mut self, _vectors: &[f32], _ids: &[i64], _config: &Config) -> Result<()> {
        Err(IndexError::unsupported(
            "hybrid inverted-file index does not support post-build insertion",
        ))
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
        let loaded = IvfEngine::load(set)?;
        if loaded.engine_type() != self.index_type() {
            return Err(IndexError::corrupt(format!(
                "payload variant '{}' does not match handle variant '{}'",
                loaded.engine_type(),
                self.index_type()
            )));
        }
        PartitionedHandle::validate_partitions(&loaded)?;
        check_rebuild_dim(self.engine.dimension(), loaded.dimension())?;

        debug!(count = loaded.count(), "loaded hybrid index");
        self.engine = loaded;
        Ok(())
    }

    fn clone_handle(&self) -> Box<dyn IndexHandle> {
        Box::new(Self::at_device(self.engine.clone(), self.device))
    }

    fn copy_to_gpu(&self, device: u32, config: &Config) -> Result<Box<dyn IndexHandle>> {
        check_device(device, config)?;
        debug!(index_type = %self.index_type(), device, "copying index to gpu");
        Ok(Box::new(Self::at_device(
            self.engine.clone(),
            DeviceId::Gpu(device),
        )))
    }

    fn copy_to_cpu(&self, _config: &Config) -> Result<Box<dyn IndexHandle>> {
        Ok(Box::new(Self::at_device(self.engine.clone(), DeviceId::Cpu)))
    }

    fn index_type(&self) -> IndexType {
        IndexType::InvertedFileHybrid
    }

    fn dimension(&self) -> usize {
        self.engine.dimension()
    }

    fn count(&self) -> usize {
        self.engine.count()
    }

    fn device(&self) -> DeviceId {
        self.device
    }
}

impl TwoPhaseBuild for HybridHandle {
    fn train(&mut self, vectors: &[f32], config: &Config) -> Result<()> {
        let dim = config.require_positive(keys::DIM)?;
        check_rebuild_dim(self.engine.dimension(), dim)?;
        checked_train(dim, vectors)?;

        let mut staged = IvfEngine::new(IndexType::InvertedFileHybrid);
        staged.train(dim, vectors, config)?;
        self.engine = staged;
        Ok(())
    }

    fn is_trained(&self) -> bool {
        self.engine.is_trained()
    }
}

impl DetachableQuantizer for HybridHandle {
    fn load_quantizer(&self, set: &BinarySet, config: &Config) -> Result<Arc<Quantizer>> {
        let quantizer = IvfEngine::decode_quantizer(set)?;
        // An expected dimension in the config guards against wiring a
        // quantizer into the wrong handle fleet
        if let Some(dim) = config.get_usize(keys::DIM)? {
            if dim != quantizer.dimension() {
                return Err(IndexError::dimension_mismatch(dim, quantizer.dimension()));
            }
        }
        Ok(Arc::new(quantizer))
    }

    fn set_quantizer(&mut self, quantizer: Arc<Quantizer>) -> Result<()> {
        self.require_built()?;
        self.engine.set_quantizer(quantizer)?;
        debug!(index_type = %self.index_type(), "quantizer attached");
        Ok(())
    }

    fn unset_quantizer(&mut self) -> Result<()> {
        self.require_built()?;
        self.engine.unset_quantizer();
        debug!(index_type = %self.index_type(), "quantizer detached");
        Ok(())
    }

    fn load_data(
        &mut self,
        quantizer: &Quantizer,
        set: &BinarySet,
        _config: &Config,
    ) -> Result<()> {
        check_rebuild_dim(self.engine.dimension(), quantizer.dimension())?;
        self.engine.load_postings(quantizer, set)?;
        debug!(count = self.engine.count(), "loaded hybrid residual data");
        Ok(())
    }
}
