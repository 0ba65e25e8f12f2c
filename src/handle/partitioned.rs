//! Two-phase (train + add) inverted-file handle.

use tracing::{debug, info};

use crate::config::{keys, Config};
use crate::engine::{IvfEngine, TrainableEngine, VectorEngine};
use crate::error::{IndexError, Result};
use crate::types::{BinarySet, DeviceId, IndexType, SearchHits};

use super::{
    check_device, check_rebuild_dim, checked_count, checked_queries, checked_train,
    IndexHandle, TwoPhaseBuild,
};

/// Handle over an engine whose build is two-phase.
///
/// `build_all` fits partition structures on the training subset (or the
/// full set when none is given), then bulk-adds every vector. `load`
/// additionally validates recovered partition metadata before accepting
/// the state.
pub struct PartitionedHandle {
    engine: IvfEngine,
    device: DeviceId,
}

impl Default for PartitionedHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionedHandle {
    /// Creates an unbuilt, host-resident handle.
    pub fn new() -> Self {
        Self {
            engine: IvfEngine::new(IndexType::InvertedFile),
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

    /// Partition metadata checks shared by this handle and the hybrid
    /// variant on load.
    pub(crate) fn validate_partitions(engine: &IvfEngine) -> Result<()> {
        if engine.partition_count() == 0 {
            return Err(IndexError::corrupt("restored index has no partitions"));
        }
        match engine.quantizer() {
            Some(q) if q.nlist() == engine.partition_count() => Ok(()),
            Some(_) => Err(IndexError::corrupt(
                "restored quantizer disagrees with partition count",
            )),
            None => Err(IndexError::corrupt("restored index has no quantizer")),
        }
    }
}

impl IndexHandle for PartitionedHandle {
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
        let train_count = checked_train(dim, train)?;

        let mut staged = IvfEngine::new(self.engine.engine_type());
        staged.train(dim, train, config)?;
        staged.add(vectors, ids)?;
        self.engine = staged;

        info!(
            index_type = %self.index_type(),
            dim,
            count,
            train_count,
            nlist = self.engine.partition_count(),
            "built partitioned index"
        );
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
        let loaded = IvfEngine::load(set)?;
        if loaded.engine_type() != self.index_type() {
            return Err(IndexError::corrupt(format!(
                "payload variant '{}' does not match handle variant '{}'",
                loaded.engine_type(),
                self.index_type()
            )));
        }
        Self::validate_partitions(&loaded)?;
        check_rebuild_dim(self.engine.dimension(), loaded.dimension())?;

        debug!(
            count = loaded.count(),
            nlist = loaded.partition_count(),
            "loaded partitioned index"
        );
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
        IndexType::InvertedFile
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

impl TwoPhaseBuild for PartitionedHandle {
    fn train(&mut self, vectors: &[f32], config: &Config) -> Result<()> {
        let dim = config.require_positive(keys::DIM)?;
        check_rebuild_dim(self.engine.dimension(), dim)?;
        checked_train(dim, vectors)?;

        let mut staged = IvfEngine::new(self.engine.engine_type());
        staged.train(dim, vectors, config)?;
        self.engine = staged;
        Ok(())
    }

    fn is_trained(&self) -> bool {
        self.engine.is_trained()
    }
}
