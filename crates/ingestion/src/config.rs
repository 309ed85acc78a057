//! Merge configuration: the document the orchestrator supplies.
//!
//! An explicit serde schema, validated eagerly at load time so a missing
//! variable entry fails before any store I/O rather than deep inside the
//! write path.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use zarr_store::{CompressorSpec, Dataset, EncodingProfile, VariableEncoding};

use crate::error::{MergeError, Result};

/// Number of measurement values in the per-cell hash tuple.
pub const HASH_TUPLE_VARS: usize = 4;

fn default_hash_variables() -> Vec<String> {
    ["sst", "err", "ice", "anom"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Chunk shape and compressor for one configured variable.
///
/// Chunks are given per dimension in `(time, [zlev,] lat, lon)` order; the
/// depth entry may be omitted, in which case a depth chunk of 1 is inserted
/// when the profile is resolved against a normalized snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableConfig {
    /// Chunk size per dimension.
    pub chunks: Vec<u64>,
    /// Compressor, or `None` for uncompressed chunks.
    #[serde(default)]
    pub compressor: Option<CompressorSpec>,
}

impl VariableConfig {
    fn validate(&self, name: &str) -> Result<()> {
        if self.chunks.len() != 3 && self.chunks.len() != 4 {
            return Err(MergeError::Config(format!(
                "variable '{}': chunks must have rank 3 (time, lat, lon) or 4 \
                 (time, zlev, lat, lon), got {:?}",
                name, self.chunks
            )));
        }
        if self.chunks.iter().any(|&c| c == 0) {
            return Err(MergeError::Config(format!(
                "variable '{}': chunk sizes must be non-zero, got {:?}",
                name, self.chunks
            )));
        }
        if let Some(compressor) = &self.compressor {
            compressor
                .validate()
                .map_err(|e| MergeError::Config(format!("variable '{}': {}", name, e)))?;
        }
        Ok(())
    }

    /// Chunk shape adjusted to a variable's actual rank.
    fn chunks_for_rank(&self, name: &str, rank: usize) -> Result<Vec<u64>> {
        let mut chunks = self.chunks.clone();
        if chunks.len() == 3 && rank == 4 {
            // Depth entry omitted from the config; normalization always
            // materializes a depth axis of length 1.
            chunks.insert(1, 1);
        }
        if chunks.len() != rank {
            return Err(MergeError::Config(format!(
                "variable '{}': chunk shape {:?} does not fit rank {}",
                name, self.chunks, rank
            )));
        }
        Ok(chunks)
    }
}

/// Configuration document for the merge engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Suffix stripped from the snapshot name before date extraction.
    #[serde(default)]
    pub strip_suffix: Option<String>,

    /// The four measurement variables hashed per cell, in tuple order.
    #[serde(default = "default_hash_variables")]
    pub hash_variables: Vec<String>,

    /// Per-variable chunk shape and compressor, applied at store creation.
    pub variables: BTreeMap<String, VariableConfig>,

    /// Encoding for variables without an explicit entry (the engine's own
    /// string-valued fields, mostly). Unset means contiguous, uncompressed.
    #[serde(default)]
    pub default: Option<VariableConfig>,
}

impl MergeConfig {
    /// Parse and validate a configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| MergeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| MergeError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Validate the configuration. Runs before any I/O.
    pub fn validate(&self) -> Result<()> {
        if self.hash_variables.len() != HASH_TUPLE_VARS {
            return Err(MergeError::Config(format!(
                "hash_variables must name exactly {} variables, got {:?}",
                HASH_TUPLE_VARS, self.hash_variables
            )));
        }
        for name in &self.hash_variables {
            if !self.variables.contains_key(name) {
                return Err(MergeError::Config(format!(
                    "hash variable '{}' has no entry in 'variables'",
                    name
                )));
            }
        }
        for (name, variable) in &self.variables {
            variable.validate(name)?;
        }
        if let Some(default) = &self.default {
            default.validate("default")?;
        }
        Ok(())
    }

    /// Resolve the store-creation encoding profile for a normalized snapshot.
    ///
    /// Configured variables take their entry (with the depth chunk filled
    /// in); anything else falls back to the `default` entry, then to
    /// contiguous uncompressed storage.
    pub fn resolve_profile(&self, snapshot: &Dataset) -> Result<EncodingProfile> {
        let mut profile = EncodingProfile::default();
        for (name, var) in &snapshot.data_vars {
            let rank = var.shape.len();
            let entry = self.variables.get(name).or(self.default.as_ref());
            let encoding = match entry {
                Some(config) => VariableEncoding {
                    chunks: config.chunks_for_rank(name, rank)?,
                    compressor: config.compressor,
                },
                None => VariableEncoding::contiguous(&var.shape),
            };
            encoding
                .validate(name, rank)
                .map_err(|e| MergeError::Config(e.to_string()))?;
            profile.insert(name.clone(), encoding);
        }
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata;

    const CONFIG: &str = r#"{
        "strip_suffix": ".nc",
        "variables": {
            "sst":  { "chunks": [1, 1, 4, 8],
                      "compressor": { "algorithm": "blosc_zstd", "level": 1,
                                      "shuffle": "shuffle" } },
            "err":  { "chunks": [1, 4, 8] },
            "ice":  { "chunks": [1, 4, 8] },
            "anom": { "chunks": [1, 4, 8] }
        }
    }"#;

    #[test]
    fn test_parse_and_validate() {
        let config = MergeConfig::from_json_str(CONFIG).unwrap();
        assert_eq!(config.strip_suffix.as_deref(), Some(".nc"));
        assert_eq!(config.hash_variables, vec!["sst", "err", "ice", "anom"]);
        assert!(config.variables["sst"].compressor.is_some());
    }

    #[test]
    fn test_missing_hash_variable_entry_fails_fast() {
        let json = r#"{
            "variables": {
                "sst": { "chunks": [1, 4, 8] }
            }
        }"#;
        let err = MergeConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, MergeError::Config(_)));
    }

    #[test]
    fn test_zero_chunk_rejected() {
        let json = r#"{
            "hash_variables": ["sst", "err", "ice", "anom"],
            "variables": {
                "sst":  { "chunks": [1, 0, 8] },
                "err":  { "chunks": [1, 4, 8] },
                "ice":  { "chunks": [1, 4, 8] },
                "anom": { "chunks": [1, 4, 8] }
            }
        }"#;
        assert!(MergeConfig::from_json_str(json).is_err());
    }

    #[test]
    fn test_bad_compression_level_rejected() {
        let json = r#"{
            "variables": {
                "sst":  { "chunks": [1, 4, 8],
                          "compressor": { "algorithm": "blosc_lz4", "level": 12 } },
                "err":  { "chunks": [1, 4, 8] },
                "ice":  { "chunks": [1, 4, 8] },
                "anom": { "chunks": [1, 4, 8] }
            }
        }"#;
        assert!(MergeConfig::from_json_str(json).is_err());
    }

    #[test]
    fn test_resolve_profile_inserts_depth_chunk() {
        let config = MergeConfig::from_json_str(CONFIG).unwrap();
        let snapshot = testdata::normalized_snapshot(20250101, 0.0);

        let profile = config.resolve_profile(&snapshot).unwrap();
        // Rank-3 config entries gain a depth chunk of 1.
        assert_eq!(profile.encoding_for("err").unwrap().chunks, vec![1, 1, 4, 8]);
        assert_eq!(profile.encoding_for("sst").unwrap().chunks, vec![1, 1, 4, 8]);
        // Engine-added string fields fall back to contiguous storage.
        let hash = profile.encoding_for(crate::hash::HASH_VARIABLE).unwrap();
        assert_eq!(hash.chunks[0], 1);
        assert!(hash.compressor.is_none());
    }
}
