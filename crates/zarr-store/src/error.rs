//! Error types for the array store layer.

use thiserror::Error;

/// Errors that can occur while reading or writing an array store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the store or one of its arrays.
    #[error("failed to open store: {0}")]
    OpenFailed(String),

    /// Failed to read array data.
    #[error("failed to read store data: {0}")]
    ReadFailed(String),

    /// Failed to write array data or metadata.
    #[error("failed to write store data: {0}")]
    WriteFailed(String),

    /// Invalid or missing metadata in the store.
    #[error("invalid store metadata: {0}")]
    InvalidMetadata(String),

    /// The array uses a data type this layer does not handle.
    #[error("unsupported data type for '{array}': {data_type}")]
    UnsupportedDataType { array: String, data_type: String },

    /// The requested array does not exist in the store.
    #[error("array not found: {0}")]
    ArrayNotFound(String),

    /// Two datasets (or a dataset and a store) disagree on dimensions.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Two datasets disagree on their variable sets.
    #[error("variable mismatch: {0}")]
    VariableMismatch(String),

    /// A variable's values do not match its declared shape.
    #[error("shape mismatch for '{array}': {len} values for shape {shape:?}")]
    ShapeMismatch {
        array: String,
        len: usize,
        shape: Vec<u64>,
    },

    /// Invalid encoding (chunk shape or compressor) for a variable.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Underlying storage/IO error.
    #[error("storage error: {0}")]
    StorageError(String),
}

impl StoreError {
    /// Create an OpenFailed error.
    pub fn open_failed(msg: impl Into<String>) -> Self {
        Self::OpenFailed(msg.into())
    }

    /// Create a ReadFailed error.
    pub fn read_failed(msg: impl Into<String>) -> Self {
        Self::ReadFailed(msg.into())
    }

    /// Create a WriteFailed error.
    pub fn write_failed(msg: impl Into<String>) -> Self {
        Self::WriteFailed(msg.into())
    }

    /// Create an InvalidMetadata error.
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }

    /// Create a DimensionMismatch error.
    pub fn dimension_mismatch(msg: impl Into<String>) -> Self {
        Self::DimensionMismatch(msg.into())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMetadata(err.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
