//! Index handle hierarchy: one polymorphic contract over heterogeneous
//! engines.
//!
//! The original layered-inheritance design (generic → partitioned →
//! hybrid, plus a brute-force sibling) is flattened into one object-safe
//! [`IndexHandle`] trait and two orthogonal capability traits,
//! [`TwoPhaseBuild`] and [`DetachableQuantizer`], composed into each
//! concrete variant:
//!
//! | Variant               | IndexHandle | TwoPhaseBuild | DetachableQuantizer |
//! |-----------------------|-------------|---------------|---------------------|
//! | [`StandardHandle`]    | yes         |               |                     |
//! | [`PartitionedHandle`] | yes         | yes           |                     |
//! | [`HybridHandle`]      | yes         | yes           | yes                 |
//! | [`BruteForceHandle`]  | yes         |               |                     |
//!
//! # Concurrency
//!
//! Handles hold no internal lock. Mutating operations take `&mut self`,
//! so exclusive access is enforced at compile time; `search` takes
//! `&self` and is safe to call from any number of threads concurrently.
//! Callers sharing a handle across threads wrap it in their own
//! single-writer/multi-reader discipline (e.g. `RwLock`). Clones and
//! migrated copies share no mutable state with their source and need no
//! cross-handle synchronization.

mod brute_force;
mod hybrid;
mod partitioned;
mod standard;

pub use brute_force::BruteForceHandle;
pub use hybrid::HybridHandle;
pub use partitioned::PartitionedHandle;
pub use standard::StandardHandle;

use std::sync::Arc;

use crate::config::{keys, Config};
use crate::engine::Quantizer;
use crate::error::{IndexError, Result};
use crate::types::{BinarySet, DeviceId, IndexType, SearchHits};

/// Uniform contract every index variant implements.
///
/// Lifecycle: construct → `build_all` (or train+add) → `search`,
/// with `serialize`/`load` for persistence and `copy_to_gpu`/
/// `copy_to_cpu` for residency migration. A handle is *unbuilt*
/// (`dimension() == 0`) until its first successful build; `search`,
/// `add`, and `serialize` require the built state.
///
/// Every operation that fails leaves the handle observably unchanged.
pub trait IndexHandle: Send + Sync {
    /// Builds the index from scratch, replacing any prior state.
    ///
    /// `vectors` is row-major with dimension taken from the `dim` config
    /// key; `ids` supplies one external identifier per row. `train`,
    /// when present, designates the subset used to fit internal
    /// structures before the full set is added; single-phase variants
    /// ignore it.
    fn build_all(
        &mut self,
        vectors: &[f32],
        ids: &[i64],
        train: Option<&[f32]>,
        config: &Config,
    ) -> Result<()>;

    /// Incrementally inserts vectors into a built index.
    ///
    /// All-or-nothing: inputs are fully validated before any engine
    /// mutation, so a failed call never partially inserts.
    fn add(&mut self, vectors: &[f32], ids: &[i64], config: &Config) -> Result<()>;

    /// Returns the `k` nearest neighbors for each query row, `k` taken
    /// from config. Never mutates index state.
    fn search(&self, queries: &[f32], config: &Config) -> Result<SearchHits>;

    /// Persists full engine state as a named-blob set.
    fn serialize(&self) -> Result<BinarySet>;

    /// Restores engine state from a serialized set.
    ///
    /// Fails with corrupt-data on missing/malformed tags or a variant
    /// mismatch, and with dimension-mismatch when the restored dimension
    /// conflicts with one already set on this handle instance.
    fn load(&mut self, set: &BinarySet) -> Result<()>;

    /// Produces an independent handle with a freshly copied engine
    /// instance. Mutations on the clone are never observable here.
    fn clone_handle(&self) -> Box<dyn IndexHandle>;

    /// Produces a new handle whose engine instance resides on the given
    /// accelerator. The source handle is left untouched.
    fn copy_to_gpu(&self, device: u32, config: &Config) -> Result<Box<dyn IndexHandle>>;

    /// Produces a new handle whose engine instance resides in host
    /// memory. The source handle is left untouched.
    fn copy_to_cpu(&self, config: &Config) -> Result<Box<dyn IndexHandle>>;

    /// The variant tag of this handle.
    fn index_type(&self) -> IndexType;

    /// Vector dimension; 0 while unbuilt.
    fn dimension(&self) -> usize;

    /// Number of indexed vectors.
    fn count(&self) -> usize;

    /// Current compute residency.
    fn device(&self) -> DeviceId;
}

impl std::fmt::Debug for dyn IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle")
            .field("index_type", &self.index_type())
            .field("dimension", &self.dimension())
            .field("count", &self.count())
            .field("device", &self.device())
            .finish()
    }
}

/// Capability of variants whose build is two-phase: an explicit training
/// pass followed by bulk adds.
pub trait TwoPhaseBuild {
    /// Fits partition structures on `vectors` without adding them.
    /// Replaces any prior trained state; dimension comes from config.
    fn train(&mut self, vectors: &[f32], config: &Config) -> Result<()>;

    /// Returns true once partition structures are fitted.
    fn is_trained(&self) -> bool;
}

/// Capability of variants that decompose into a shareable coarse
/// quantizer and dependent residual data.
///
/// The quantizer is reference-counted and immutable: one instance may be
/// attached to any number of handles simultaneously, and detaching it
/// from a handle never destroys it while others still hold it.
pub trait DetachableQuantizer {
    /// Decodes the quantizer half of a serialized set and returns it as
    /// a shareable resource, without attaching it to this handle.
    fn load_quantizer(&self, set: &BinarySet, config: &Config) -> Result<Arc<Quantizer>>;

    /// Attaches an externally supplied quantizer. Fails with
    /// dimension-mismatch when it disagrees with this handle's residual
    /// data, and with not-built when no residual data is loaded.
    fn set_quantizer(&mut self, quantizer: Arc<Quantizer>) -> Result<()>;

    /// Detaches the attached quantizer, keeping residual data. The
    /// handle transitions to a state where `search` fails with
    /// not-ready until a compatible quantizer is re-attached.
    fn unset_quantizer(&mut self) -> Result<()>;

    /// Loads only the residual/postings half of a serialized set, using
    /// `quantizer` to validate partition assignment. Neither loads nor
    /// replaces the quantizer attached to this handle.
    fn load_data(
        &mut self,
        quantizer: &Quantizer,
        set: &BinarySet,
        config: &Config,
    ) -> Result<()>;
}

/// Validates row-major build/add input and returns the row count.
pub(crate) fn checked_count(dim: usize, vectors: &[f32], ids: &[i64]) -> Result<usize> {
    if vectors.len() % dim != 0 {
        return Err(IndexError::invalid_argument(format!(
            "vector data length {} is not a multiple of dimension {}",
            vectors.len(),
            dim
        )));
    }
    let count = vectors.len() / dim;
    if count == 0 {
        return Err(IndexError::invalid_argument(
            "count must be greater than 0",
        ));
    }
    if ids.len() != count {
        return Err(IndexError::invalid_argument(format!(
            "id count {} does not match vector count {}",
            ids.len(),
            count
        )));
    }
    Ok(count)
}

/// Validates row-major query input and returns the query count.
pub(crate) fn checked_queries(dim: usize, queries: &[f32]) -> Result<usize> {
    if queries.is_empty() || queries.len() % dim != 0 {
        return Err(IndexError::invalid_argument(format!(
            "query data length {} is not a positive multiple of dimension {}",
            queries.len(),
            dim
        )));
    }
    Ok(queries.len() / dim)
}

/// Validates the training subset shape when one is supplied.
pub(crate) fn checked_train(dim: usize, train: &[f32]) -> Result<usize> {
    if train.is_empty() || train.len() % dim != 0 {
        return Err(IndexError::invalid_argument(format!(
            "training data length {} is not a positive multiple of dimension {}",
            train.len(),
            dim
        )));
    }
    Ok(train.len() / dim)
}

/// Rejects migration to a device ordinal outside the visible range.
pub(crate) fn check_device(device: u32, config: &Config) -> Result<()> {
    let visible = config.positive_or(keys::DEVICE_COUNT, 1)? as u32;
    if device >= visible {
        return Err(IndexError::DeviceUnavailable { device, visible });
    }
    Ok(())
}

/// Rebuild dimension check: once set, a handle's dimension is immutable.
pub(crate) fn check_rebuild_dim(current: usize, requested: usize) -> Result<()> {
    if current != 0 && current != requested {
        return Err(IndexError::dimension_mismatch(current, requested));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_count() {
        assert_eq!(checked_count(4, &[0.0; 8], &[1, 2]).unwrap(), 2);
        assert!(checked_count(4, &[], &[]).unwrap_err().is_invalid_argument());
        assert!(checked_count(4, &[0.0; 7], &[1])
            .unwrap_err()
            .is_invalid_argument());
        assert!(checked_count(4, &[0.0; 8], &[1])
            .unwrap_err()
            .is_invalid_argument());
    }

    #[test]
    fn test_checked_queries() {
        assert_eq!(checked_queries(2, &[0.0; 6]).unwrap(), 3);
        assert!(checked_queries(2, &[]).is_err());
        assert!(checked_queries(2, &[0.0; 3]).is_err());
    }

    #[test]
    fn test_check_device() {
        let config = Config::new();
        assert!(check_device(0, &config).is_ok());
        assert!(check_device(1, &config)
            .unwrap_err()
            .is_device_unavailable());

        let config = Config::new().with(keys::DEVICE_COUNT, 4);
        assert!(check_device(3, &config).is_ok());
        assert!(check_device(4, &config).is_err());
    }

    #[test]
    fn test_check_rebuild_dim() {
        assert!(check_rebuild_dim(0, 128).is_ok());
        assert!(check_rebuild_dim(128, 128).is_ok());
        assert!(check_rebuild_dim(128, 64)
            .unwrap_err()
            .is_dimension_mismatch());
    }
}
