//! Error types for snapshot ingestion.

use thiserror::Error;

/// Errors that can occur while merging a snapshot.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("no date token in '{0}': expected an 8-digit '.YYYYMMDD.' segment")]
    DateExtraction(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot access store at {location}: {reason}")]
    StoreAccess { location: String, reason: String },

    #[error("dimension consistency violated: {0}")]
    DimensionConsistency(String),

    #[error("invalid snapshot: {0}")]
    Snapshot(String),

    #[error(transparent)]
    Store(#[from] zarr_store::StoreError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, MergeError>;
