//! Generic one-engine wrapper.

use tracing::{debug, info};

use crate::config::{keys, Config};
use crate::engine::VectorEngine;
use crate::error::{IndexError, Result};
use crate::types::{BinarySet, DeviceId, IndexType, SearchHits};

use super::{
    check_device, check_rebuild_dim, checked_count, checked_queries, IndexHandle,
};

/// Generic handle delegating every operation to one engine instance.
///
/// Works with any [`VectorEngine`] whose build is single-shot from the
/// caller's viewpoint; engines with an internal training phase (e.g.
/// [`crate::engine::IvfEngine`]) train on the full vector set.
pub struct StandardHandle<E> {
    engine: E,
    device: DeviceId,
}

impl<E: VectorEngine> StandardHandle<E> {
    /// Wraps an engine instance in a host-resident handle.
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            device: DeviceId::Cpu,
        }
    }

    fn at_device(engine: E, device: DeviceId) -> Self {
        Self { engine, device }
    }

    fn require_built(&self) -> Result<()> {
        if self.engine.dimension() == 0 {
            return Err(IndexError::NotBuilt);
        }
        Ok(())
    }
}

impl<E> IndexHandle for StandardHandle<E>
where
    E: VectorEngine + Clone + 'static,
{
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

        let mut staged = self.engine.clone();
        staged.build(dim, vectors, ids, config)?;
        self.engine = staged;

        info!(index_type = %self.index_type(), dim, count, "built index");
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
        let loaded = E::load(set)?;
        if loaded.engine_type() != self.index_type() {
            return Err(IndexError::corrupt(format!(
                "payload variant '{}' does not match handle variant '{}'",
                loaded.engine_type(),
                self.index_type()
            )));
        }
        check_rebuild_dim(self.engine.dimension(), loaded.dimension())?;

        debug!(index_type = %self.index_type(), count = loaded.count(), "loaded index");
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
        self.engine.engine_type()
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FlatEngine, IvfEngine};

    fn make_vectors(n: usize, dim: usize) -> (Vec<f32>, Vec<i64>) {
        let vectors: Vec<f32> = (0..n)
            .flat_map(|i| (0..dim).map(move |j| (i as f32 * 0.1 + j as f32 * 0.01).sin()))
            .collect();
        let ids: Vec<i64> = (0..n as i64).collect();
        (vectors, ids)
    }

    #[test]
    fn test_unbuilt_introspection() {
        let handle = StandardHandle::new(FlatEngine::new());
        assert_eq!(handle.index_type(), IndexType::BruteForce);
        assert_eq!(handle.dimension(), 0);
        assert_eq!(handle.count(), 0);
        assert_eq!(handle.device(), DeviceId::Cpu);
    }

    #[test]
    fn test_search_before_build_fails() {
        let handle = StandardHandle::new(FlatEngine::new());
        let config = Config::new().with(keys::K, 1);
        assert!(handle.search(&[0.0; 4], &config).unwrap_err().is_not_built());
    }

    #[test]
    fn test_build_and_search() {
        let (vectors, ids) = make_vectors(30, 4);
        let mut handle = StandardHandle::new(FlatEngine::new());
        let config = Config::new().with(keys::DIM, 4);
        handle.build_all(&vectors, &ids, None, &config).unwrap();

        assert_eq!(handle.dimension(), 4);
        assert_eq!(handle.count(), 30);

        let config = Config::new().with(keys::K, 1);
        let hits = handle.search(&vectors[..4], &config).unwrap();
        assert_eq!(hits.ids(), &[0]);
    }

    #[test]
    fn test_empty_build_leaves_state() {
        let mut handle = StandardHandle::new(FlatEngine::new());
        let config = Config::new().with(keys::DIM, 4);
        let err = handle.build_all(&[], &[], None, &config).unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(handle.dimension(), 0);
    }

    #[test]
    fn test_rebuild_replaces_count() {
        let (vectors, ids) = make_vectors(30, 4);
        let mut handle = StandardHandle::new(FlatEngine::new());
        let config = Config::new().with(keys::DIM, 4);

        handle.build_all(&vectors, &ids, None, &config).unwrap();
        handle
            .build_all(&vectors[..10 * 4], &ids[..10], None, &config)
            .unwrap();
        assert_eq!(handle.count(), 10);
    }

    #[test]
    fn test_rebuild_dimension_conflict() {
        let (vectors, ids) = make_vectors(30, 4);
        let mut handle = StandardHandle::new(FlatEngine::new());
        handle
            .build_all(&vectors, &ids, None, &Config::new().with(keys::DIM, 4))
            .unwrap();

        let err = handle
            .build_all(&vectors, &ids, None, &Config::new().with(keys::DIM, 6))
            .unwrap_err();
        assert!(err.is_dimension_mismatch());
        assert_eq!(handle.dimension(), 4);
    }

    #[test]
    fn test_ivf_engine_single_shot() {
        // The generic wrapper drives a trainable engine single-shot
        let (vectors, ids) = make_vectors(100, 8);
        let mut handle = StandardHandle::new(IvfEngine::new(IndexType::InvertedFile));
        let config = Config::new().with(keys::DIM, 8).with(keys::NLIST, 4);
        handle.build_all(&vectors, &ids, None, &config).unwrap();

        assert_eq!(handle.index_type(), IndexType::InvertedFile);
        assert_eq!(handle.count(), 100);
    }

    #[test]
    fn test_load_wrong_variant() {
        let (vectors, ids) = make_vectors(20, 4);
        let mut ivf = StandardHandle::new(IvfEngine::new(IndexType::InvertedFile));
        ivf.build_all(
            &vectors,
            &ids,
            None,
            &Config::new().with(keys::DIM, 4).with(keys::NLIST, 2),
        )
        .unwrap();
        let set = ivf.serialize().unwrap();

        // An inverted-file payload cannot restore a flat handle
        let mut flat = StandardHandle::new(FlatEngine::new());
        assert!(flat.load(&set).unwrap_err().is_corrupt());
        assert_eq!(flat.dimension(), 0);
    }

    #[test]
    fn test_device_migration() {
        let (vectors, ids) = make_vectors(20, 4);
        let mut handle = StandardHandle::new(FlatEngine::new());
        handle
            .build_all(&vectors, &ids, None, &Config::new().with(keys::DIM, 4))
            .unwrap();

        let gpu = handle.copy_to_gpu(0, &Config::new()).unwrap();
        assert_eq!(gpu.device(), DeviceId::Gpu(0));
        assert_eq!(handle.device(), DeviceId::Cpu);

        let back = gpu.copy_to_cpu(&Config::new()).unwrap();
        assert_eq!(back.device(), DeviceId::Cpu);
        assert_eq!(back.count(), 20);
    }

    #[test]
    fn test_migration_device_unavailable() {
        let (vectors, ids) = make_vectors(20, 4);
        let mut handle = StandardHandle::new(FlatEngine::new());
        handle
            .build_all(&vectors, &ids, None, &Config::new().with(keys::DIM, 4))
            .unwrap();

        let err = handle.copy_to_gpu(2, &Config::new()).unwrap_err();
        assert!(err.is_device_unavailable());
    }
}
