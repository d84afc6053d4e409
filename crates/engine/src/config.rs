//! Engine-wide configuration (SPEC_FULL.md §D; spec.md §6 "Environment /
//! configuration options").
//!
//! Loaded as a plain struct with sensible defaults, optionally overlaid
//! from a `strata.toml` file the way the rest of this codebase's
//! configuration is loaded.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strata_core::{StrataError, StrataResult};
use strata_durability::DurabilityMode;

/// Engine-wide configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    /// Directory to search for backend shared libraries when a requested
    /// backend isn't already registered (spec.md §4.2 lazy load).
    pub backends_dir: Option<PathBuf>,
    /// Default number of worker threads allocated to a freshly created
    /// device run queue (spec.md §4.5).
    pub threads_per_queue: usize,
    /// Byte size used to split a model's serialized blob into chunks for
    /// persistence (spec.md §6).
    pub model_chunk_size: usize,
    /// ONNX cooperative-cancellation deadline, in milliseconds (spec.md
    /// §4.7).
    pub model_execution_timeout_ms: u64,
    /// Intra-op parallelism hint passed through to backends.
    pub intra_op_parallelism: usize,
    /// Inter-op parallelism hint passed through to backends.
    pub inter_op_parallelism: usize,
    /// How aggressively a persisted write is made durable (spec.md §5).
    pub durability_mode: DurabilityMode,
}

impl Default for StrataConfig {
    fn default() -> Self {
        StrataConfig {
            backends_dir: None,
            threads_per_queue: 1,
            model_chunk_size: 1024 * 1024,
            model_execution_timeout_ms: 6_000,
            intra_op_parallelism: 0,
            inter_op_parallelism: 0,
            durability_mode: DurabilityMode::default(),
        }
    }
}

impl StrataConfig {
    /// Parse configuration overrides from a TOML document. Fields absent
    /// from `toml_str` keep their [`Default`] value.
    pub fn from_toml_str(toml_str: &str) -> StrataResult<Self> {
        toml::from_str(toml_str).map_err(|e| StrataError::InvalidInput {
            message: format!("invalid strata.toml: {e}"),
        })
    }

    /// Load configuration from a TOML file on disk.
    pub fn from_file(path: impl AsRef<Path>) -> StrataResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| StrataError::Storage {
            message: format!("failed to read {}: {e}", path.display()),
            source: None,
        })?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_defaults() {
        let cfg = StrataConfig::default();
        assert_eq!(cfg.threads_per_queue, 1);
        assert!(cfg.backends_dir.is_none());
        assert_eq!(cfg.durability_mode, DurabilityMode::None);
    }

    #[test]
    fn durability_mode_overlays_from_toml() {
        let cfg = StrataConfig::from_toml_str("durability_mode = \"sync\"\n").unwrap();
        assert_eq!(cfg.durability_mode, DurabilityMode::Sync);
    }

    #[test]
    fn partial_toml_overlays_onto_defaults() {
        let cfg = StrataConfig::from_toml_str("threads_per_queue = 4\n").unwrap();
        assert_eq!(cfg.threads_per_queue, 4);
        assert_eq!(cfg.model_chunk_size, StrataConfig::default().model_chunk_size);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(StrataConfig::from_toml_str("not valid = = toml").is_err());
    }
}
