//! # vecbridge
//!
//! Uniform handle layer over heterogeneous vector-similarity engines.
//!
//! vecbridge wraps concrete nearest-neighbor engines behind one
//! polymorphic [`IndexHandle`] contract so higher layers can build,
//! query, persist, clone, and migrate indexes without knowing which
//! engine variant sits underneath.
//!
//! ## Quick Start
//!
//! ```rust
//! use vecbridge::{keys, Config, IndexHandle, PartitionedHandle};
//!
//! # fn main() -> vecbridge::Result<()> {
//! let vectors: Vec<f32> = (0..800).map(|i| (i as f32 * 0.1).sin()).collect();
//! let ids: Vec<i64> = (0..100).collect();
//!
//! // Build an inverted-file index over 100 vectors of dimension 8
//! let config = Config::new().with(keys::DIM, 8).with(keys::NLIST, 4);
//! let mut index = PartitionedHandle::new();
//! index.build_all(&vectors, &ids, None, &config)?;
//!
//! // Query the 5 nearest neighbors of the first stored vector
//! let hits = index.search(&vectors[..8], &Config::new().with(keys::K, 5))?;
//! assert_eq!(hits.row(0).0[0], 0);
//!
//! // Persist and restore through a named-blob set
//! let set = index.serialize()?;
//! let mut restored = PartitionedHandle::new();
//! restored.load(&set)?;
//! assert_eq!(restored.count(), 100);
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Handles and engines
//!
//! A **handle** owns exactly one engine instance and enforces the
//! lifecycle contract (built/unbuilt states, input validation, atomic
//! state changes). An **engine** implements the actual data structure:
//! [`FlatEngine`] scans exhaustively, [`IvfEngine`] partitions vectors
//! into inverted lists behind a k-means coarse quantizer.
//!
//! ### Capabilities
//!
//! Extra behaviors are capability traits rather than a deeper
//! hierarchy: [`TwoPhaseBuild`] exposes the explicit train-then-add
//! path, and [`DetachableQuantizer`] lets hybrid handles share one
//! immutable quantizer across many parked indexes.
//!
//! ### Persistence
//!
//! `serialize` produces a [`BinarySet`], a tag-to-blob map with a
//! reserved variant tag; `load` validates the variant and internal
//! consistency before accepting any state.
//!
//! ## Thread Safety
//!
//! Handles are `Send + Sync` and hold no internal lock. `search` takes
//! `&self`; every mutation takes `&mut self`, so aliasing rules enforce
//! the single-writer/multi-reader discipline at compile time.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

mod config;
mod error;
mod types;

pub mod engine;
pub mod handle;

pub use config::{keys, Config};

pub use error::{IndexError, Result};

pub use types::{BinarySet, DeviceId, IndexType, SearchHits, INDEX_TYPE_TAG, INVALID_ID};

pub use engine::{FlatEngine, IvfEngine, Quantizer, TrainableEngine, VectorEngine};

pub use handle::{
    BruteForceHandle, DetachableQuantizer, HybridHandle, IndexHandle, PartitionedHandle,
    StandardHandle, TwoPhaseBuild,
};

/// Convenient imports for common vecbridge usage.
///
/// ```rust
/// use vecbridge::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{keys, Config};
    pub use crate::error::{IndexError, Result};
    pub use crate::handle::{
        BruteForceHandle, DetachableQuantizer, HybridHandle, IndexHandle, PartitionedHandle,
        StandardHandle, TwoPhaseBuild,
    };
    pub use crate::types::{BinarySet, DeviceId, IndexType, SearchHits};
}
