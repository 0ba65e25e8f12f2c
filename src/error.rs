//! Error types for vecbridge.
//!
//! Every contract operation returns [`Result`] with a single structured
//! error enum, [`IndexError`]. There is deliberately no second error
//! channel: the brute-force build path uses the same taxonomy as every
//! other variant.
//!
//! Callers must treat any error as "index state unchanged" — handles
//! validate inputs fully before mutating engine state, and `load`
//! decodes into a scratch engine before swapping it in.

use thiserror::Error;

/// Result type alias for vecbridge operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Error taxonomy shared by all index handle variants.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Bad call arguments: zero count, ragged vector data, id/count mismatch.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A config key is missing, wrong-typed, or out of range.
    #[error("Invalid config key '{key}': {reason}")]
    InvalidConfig {
        /// The offending configuration key.
        key: String,
        /// Why the key's value (or absence) is rejected.
        reason: String,
    },

    /// Operation requires a prior successful build.
    #[error("Index is not built")]
    NotBuilt,

    /// Index is built but missing an attached sub-resource (e.g. a
    /// detached quantizer on a hybrid handle).
    #[error("Index is not ready: {0}")]
    NotReady(String),

    /// The variant does not implement the requested capability.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Migration target device does not exist.
    #[error("Device unavailable: gpu {device} (visible devices: {visible})")]
    DeviceUnavailable {
        /// Requested device ordinal.
        device: u32,
        /// Number of devices visible to the process.
        visible: u32,
    },

    /// Migration target cannot hold the index data.
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// Serialized form has missing, malformed, or inconsistent tags.
    #[error("Corrupt serialized data: {0}")]
    CorruptData(String),

    /// Cross-call dimension inconsistency.
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Dimension already fixed on the handle or sub-resource.
        expected: usize,
        /// Dimension supplied by the conflicting input.
        got: usize,
    },

    /// Failed to encode engine state into a BinarySet blob.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl IndexError {
    /// Creates an invalid-argument error with the given message.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Creates an invalid-config error for the given key.
    pub fn invalid_config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates a not-ready error with the given message.
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }

    /// Creates an unsupported-operation error with the given message.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Creates a corrupt-data error with the given message.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptData(msg.into())
    }

    /// Creates a dimension-mismatch error.
    pub fn dimension_mismatch(expected: usize, got: usize) -> Self {
        Self::DimensionMismatch { expected, got }
    }

    /// Returns true if this is an invalid-argument error.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// Returns true if this is an invalid-config error.
    pub fn is_invalid_config(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }

    /// Returns true if this is a not-built error.
    pub fn is_not_built(&self) -> bool {
        matches!(self, Self::NotBuilt)
    }

    /// Returns true if this is a not-ready error.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady(_))
    }

    /// Returns true if this is an unsupported-operation error.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }

    /// Returns true if this is a corrupt-data error.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::CorruptData(_))
    }

    /// Returns true if this is a dimension-mismatch error.
    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. })
    }

    /// Returns true if this is a device-unavailable error.
    pub fn is_device_unavailable(&self) -> bool {
        matches!(self, Self::DeviceUnavailable { .. })
    }
}

// Encode failures surface through serialize(); decode failures are mapped
// to CorruptData at the call site where the offending tag is known.
impl From<bincode::Error> for IndexError {
    fn from(err: bincode::Error) -> Self {
        IndexError::Serialization(err.to_string())
    }
}
