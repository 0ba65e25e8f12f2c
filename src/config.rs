//! Configuration dictionary for build, search, and migration operations.
//!
//! [`Config`] is an opaque key/value map fed by the surrounding layer's
//! on-disk or network configuration format. Values are JSON values;
//! typed accessors validate on read. Unrecognized keys are ignored,
//! missing required keys fail the operation with an invalid-config error.
//!
//! # Example
//! ```rust
//! use vecbridge::{keys, Config};
//!
//! let config = Config::new()
//!     .with(keys::DIM, 128)
//!     .with(keys::NLIST, 16)
//!     .with(keys::K, 10);
//!
//! assert_eq!(config.require_positive(keys::K).unwrap(), 10);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{IndexError, Result};

/// Recognized configuration keys.
///
/// Engines may read additional engine-specific keys; anything else in the
/// dictionary is silently ignored.
pub mod keys {
    /// Vector dimension (required by build entry points).
    pub const DIM: &str = "dim";

    /// Neighbors requested per query (required by search).
    pub const K: &str = "k";

    /// Partition count for inverted-file training (required by train/build
    /// on partitioned and hybrid variants).
    pub const NLIST: &str = "nlist";

    /// Partitions scanned per query on inverted-file variants.
    /// Optional; defaults to 1 and is clamped to `nlist`.
    pub const NPROBE: &str = "nprobe";

    /// Number of accelerator devices visible to the process.
    /// Optional; defaults to 1. Migration to a device ordinal at or above
    /// this bound fails with device-unavailable.
    pub const DEVICE_COUNT: &str = "device_count";
}

/// Opaque key/value configuration dictionary.
///
/// Cheap to clone; construction is builder-style via [`Config::with`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    entries: BTreeMap<String, Value>,
}

impl Config {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of this configuration with `key` set to `value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Sets `key` to `value` in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Returns the raw value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Returns true if `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Reads `key` as a non-negative integer.
    ///
    /// Returns `Ok(None)` when the key is absent and an invalid-config
    /// error when the value is present but not a non-negative integer.
    pub fn get_usize(&self, key: &str) -> Result<Option<usize>> {
        let Some(value) = self.entries.get(key) else {
            return Ok(None);
        };
        let n = value.as_u64().ok_or_else(|| {
            IndexError::invalid_config(key, "expected a non-negative integer")
        })?;
        Ok(Some(n as usize))
    }

    /// Reads `key` as a strictly positive integer, failing when absent.
    pub fn require_positive(&self, key: &str) -> Result<usize> {
        let n = self
            .get_usize(key)?
            .ok_or_else(|| IndexError::invalid_config(key, "required key is missing"))?;
        if n == 0 {
            return Err(IndexError::invalid_config(key, "must be greater than 0"));
        }
        Ok(n)
    }

    /// Reads `key` as a strictly positive integer with a fallback default.
    pub fn positive_or(&self, key: &str, default: usize) -> Result<usize> {
        match self.get_usize(key)? {
            Some(0) => Err(IndexError::invalid_config(key, "must be greater than 0")),
            Some(n) => Ok(n),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config() {
        let config = Config::new();
        assert!(!config.contains(keys::K));
        assert_eq!(config.get_usize(keys::K).unwrap(), None);
    }

    #[test]
    fn test_with_builder() {
        let config = Config::new().with(keys::DIM, 128).with(keys::K, 10);
        assert_eq!(config.require_positive(keys::DIM).unwrap(), 128);
        assert_eq!(config.require_positive(keys::K).unwrap(), 10);
    }

    #[test]
    fn test_missing_required_key() {
        let config = Config::new();
        let err = config.require_positive(keys::K).unwrap_err();
        assert!(err.is_invalid_config());
    }

    #[test]
    fn test_zero_rejected() {
        let config = Config::new().with(keys::NLIST, 0);
        assert!(config.require_positive(keys::NLIST).is_err());
        assert!(config.positive_or(keys::NLIST, 4).is_err());
    }

    #[test]
    fn test_wrong_type_rejected() {
        let config = Config::new().with(keys::K, "ten");
        let err = config.get_usize(keys::K).unwrap_err();
        assert!(err.is_invalid_config());
    }

    #[test]
    fn test_negative_rejected() {
        let config = Config::new().with(keys::K, -3);
        assert!(config.get_usize(keys::K).is_err());
    }

    #[test]
    fn test_default_fallback() {
        let config = Config::new();
        assert_eq!(config.positive_or(keys::NPROBE, 1).unwrap(), 1);

        let config = config.with(keys::NPROBE, 8);
        assert_eq!(config.positive_or(keys::NPROBE, 1).unwrap(), 8);
    }

    #[test]
    fn test_unrecognized_keys_ignored() {
        // Unknown keys may coexist with recognized ones
        let config = Config::new()
            .with("some_future_knob", true)
            .with(keys::K, 5);
        assert_eq!(config.require_positive(keys::K).unwrap(), 5);
    }

    #[test]
    fn test_config_serialization() {
        // Configs arrive from the query layer as JSON documents
        let config = Config::new().with(keys::DIM, 64).with(keys::NLIST, 8);
        let json = serde_json::to_string(&config).unwrap();
        let restored: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.require_positive(keys::DIM).unwrap(), 64);
        assert_eq!(restored.require_positive(keys::NLIST).unwrap(), 8);
    }
}
