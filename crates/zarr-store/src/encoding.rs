//! Per-variable encoding: chunk shapes and compressor parameters.
//!
//! An [`EncodingProfile`] is fixed when a store is created and re-captured
//! from the live array metadata when the overwrite path rewrites a store,
//! so a store's encoding never drifts between invocations.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::codec::BytesToBytesCodecTraits;

use crate::error::{Result, StoreError};

/// Compression codec for store arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionAlgorithm {
    /// No compression.
    None,
    /// Blosc with LZ4.
    BloscLz4,
    /// Blosc with Zstd (recommended).
    BloscZstd,
}

impl Default for CompressionAlgorithm {
    fn default() -> Self {
        Self::BloscZstd
    }
}

impl CompressionAlgorithm {
    /// Get the codec name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

/// Blosc byte-shuffle filter mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShuffleMode {
    /// No shuffling.
    None,
    /// Byte shuffle (effective for f32 grids).
    Shuffle,
    /// Bit shuffle.
    Bitshuffle,
}

impl Default for ShuffleMode {
    fn default() -> Self {
        Self::Shuffle
    }
}

/// Compressor parameters for one variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressorSpec {
    /// Compression codec.
    pub algorithm: CompressionAlgorithm,
    /// Compression level (1-9).
    #[serde(default = "default_level")]
    pub level: u8,
    /// Byte shuffle filter.
    #[serde(default)]
    pub shuffle: ShuffleMode,
}

fn default_level() -> u8 {
    1
}

impl CompressorSpec {
    /// Validate the compressor parameters.
    pub fn validate(&self) -> Result<()> {
        if self.level == 0 || self.level > 9 {
            return Err(StoreError::InvalidEncoding(format!(
                "compression level must be 1-9, got {}",
                self.level
            )));
        }
        Ok(())
    }

    /// Build the `zarrs` bytes-to-bytes codec for this spec.
    ///
    /// `typesize` is the element size in bytes; it is required by Blosc
    /// when shuffling is enabled.
    pub fn codec(&self, typesize: usize) -> Result<Option<Arc<dyn BytesToBytesCodecTraits>>> {
        let compressor = match self.algorithm {
            CompressionAlgorithm::None => return Ok(None),
            CompressionAlgorithm::BloscLz4 => BloscCompressor::LZ4,
            CompressionAlgorithm::BloscZstd => BloscCompressor::Zstd,
        };

        let level = BloscCompressionLevel::try_from(self.level)
            .map_err(|_| StoreError::InvalidEncoding("invalid compression level".to_string()))?;

        let (shuffle, typesize) = match self.shuffle {
            ShuffleMode::None => (BloscShuffleMode::NoShuffle, None),
            ShuffleMode::Shuffle => (BloscShuffleMode::Shuffle, Some(typesize)),
            ShuffleMode::Bitshuffle => (BloscShuffleMode::BitShuffle, Some(typesize)),
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| StoreError::InvalidEncoding(e.to_string()))?;
        Ok(Some(Arc::new(codec)))
    }
}

/// Chunk shape and compressor for one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableEncoding {
    /// Chunk size per dimension, in the variable's dimension order.
    pub chunks: Vec<u64>,
    /// Compressor, or `None` for uncompressed chunks.
    #[serde(default)]
    pub compressor: Option<CompressorSpec>,
}

impl VariableEncoding {
    /// Uncompressed, one full slice of the leading dimension per chunk.
    pub fn contiguous(shape: &[u64]) -> Self {
        let mut chunks = shape.to_vec();
        if !chunks.is_empty() {
            chunks[0] = 1;
        }
        Self {
            chunks,
            compressor: None,
        }
    }

    /// Validate chunk sizes against a variable's rank.
    pub fn validate(&self, name: &str, rank: usize) -> Result<()> {
        if self.chunks.len() != rank {
            return Err(StoreError::InvalidEncoding(format!(
                "'{}' has rank {} but chunk shape {:?}",
                name, rank, self.chunks
            )));
        }
        if self.chunks.iter().any(|&c| c == 0) {
            return Err(StoreError::InvalidEncoding(format!(
                "'{}' chunk sizes must be non-zero: {:?}",
                name, self.chunks
            )));
        }
        if let Some(compressor) = &self.compressor {
            compressor.validate()?;
        }
        Ok(())
    }
}

/// Mapping of variable name to its encoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncodingProfile {
    variables: BTreeMap<String, VariableEncoding>,
}

impl EncodingProfile {
    /// Insert or replace one variable's encoding.
    pub fn insert(&mut self, name: impl Into<String>, encoding: VariableEncoding) {
        self.variables.insert(name.into(), encoding);
    }

    /// The encoding for `name`, if one was specified.
    pub fn encoding_for(&self, name: &str) -> Option<&VariableEncoding> {
        self.variables.get(name)
    }

    /// The encoding for `name`, falling back to contiguous storage.
    pub fn encoding_or_contiguous(&self, name: &str, shape: &[u64]) -> VariableEncoding {
        self.variables
            .get(name)
            .cloned()
            .unwrap_or_else(|| VariableEncoding::contiguous(shape))
    }

    /// Re-capture a profile from the array metadata of a live store.
    ///
    /// Used by the overwrite path so a full rewrite reuses the encoding
    /// fixed at creation rather than whatever the current configuration
    /// says. `metadata` maps array name to its `zarr.json` document.
    pub fn from_array_metadata(metadata: &BTreeMap<String, Value>) -> Result<Self> {
        let mut variables = BTreeMap::new();
        for (name, doc) in metadata {
            variables.insert(name.clone(), variable_encoding_from_metadata(name, doc)?);
        }
        Ok(Self { variables })
    }
}

/// Parse chunk shape and Blosc parameters out of one array's metadata.
fn variable_encoding_from_metadata(name: &str, doc: &Value) -> Result<VariableEncoding> {
    let chunks: Vec<u64> = doc
        .pointer("/chunk_grid/configuration/chunk_shape")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_u64).collect())
        .ok_or_else(|| {
            StoreError::invalid_metadata(format!("'{}' is missing a regular chunk grid", name))
        })?;

    let mut compressor = None;
    if let Some(codecs) = doc.get("codecs").and_then(Value::as_array) {
        for codec in codecs {
            if codec.get("name").and_then(Value::as_str) != Some("blosc") {
                continue;
            }
            let config = codec.get("configuration").cloned().unwrap_or_default();
            let algorithm = match config.get("cname").and_then(Value::as_str) {
                Some("lz4") => CompressionAlgorithm::BloscLz4,
                Some("zstd") => CompressionAlgorithm::BloscZstd,
                other => {
                    return Err(StoreError::invalid_metadata(format!(
                        "'{}' uses unsupported blosc compressor {:?}",
                        name, other
                    )))
                }
            };
            let level = config.get("clevel").and_then(Value::as_u64).unwrap_or(1) as u8;
            let shuffle = match config.get("shuffle").and_then(Value::as_str) {
                Some("shuffle") => ShuffleMode::Shuffle,
                Some("bitshuffle") => ShuffleMode::Bitshuffle,
                _ => ShuffleMode::None,
            };
            compressor = Some(CompressorSpec {
                algorithm,
                level,
                shuffle,
            });
        }
    }

    Ok(VariableEncoding { chunks, compressor })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compressor_spec_validation() {
        let mut spec = CompressorSpec {
            algorithm: CompressionAlgorithm::BloscZstd,
            level: 1,
            shuffle: ShuffleMode::Shuffle,
        };
        assert!(spec.validate().is_ok());

        spec.level = 0;
        assert!(spec.validate().is_err());
        spec.level = 10;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_variable_encoding_validation() {
        let encoding = VariableEncoding {
            chunks: vec![1, 1, 720, 1440],
            compressor: None,
        };
        assert!(encoding.validate("sst", 4).is_ok());
        assert!(encoding.validate("sst", 3).is_err());

        let zero = VariableEncoding {
            chunks: vec![1, 0, 720, 1440],
            compressor: None,
        };
        assert!(zero.validate("sst", 4).is_err());
    }

    #[test]
    fn test_contiguous_defaults_to_single_slice_chunks() {
        let encoding = VariableEncoding::contiguous(&[5, 1, 720, 1440]);
        assert_eq!(encoding.chunks, vec![1, 1, 720, 1440]);
        assert!(encoding.compressor.is_none());
    }

    #[test]
    fn test_profile_recapture_from_metadata() {
        let doc = json!({
            "zarr_format": 3,
            "node_type": "array",
            "chunk_grid": {
                "name": "regular",
                "configuration": { "chunk_shape": [1, 1, 720, 1440] }
            },
            "codecs": [
                { "name": "bytes", "configuration": { "endian": "little" } },
                {
                    "name": "blosc",
                    "configuration": {
                        "cname": "zstd",
                        "clevel": 3,
                        "shuffle": "shuffle",
                        "typesize": 4,
                        "blocksize": 0
                    }
                }
            ]
        });
        let mut metadata = BTreeMap::new();
        metadata.insert("sst".to_string(), doc);

        let profile = EncodingProfile::from_array_metadata(&metadata).unwrap();
        let encoding = profile.encoding_for("sst").unwrap();
        assert_eq!(encoding.chunks, vec![1, 1, 720, 1440]);
        assert_eq!(
            encoding.compressor,
            Some(CompressorSpec {
                algorithm: CompressionAlgorithm::BloscZstd,
                level: 3,
                shuffle: ShuffleMode::Shuffle,
            })
        );
    }

    #[test]
    fn test_config_json_round_trip() {
        let spec: CompressorSpec = serde_json::from_str(
            r#"{ "algorithm": "blosc_zstd", "level": 2, "shuffle": "bitshuffle" }"#,
        )
        .unwrap();
        assert_eq!(spec.algorithm, CompressionAlgorithm::BloscZstd);
        assert_eq!(spec.level, 2);
        assert_eq!(spec.shuffle, ShuffleMode::Bitshuffle);
    }
}
