//! Array store layer for daily gridded snapshots.
//!
//! Provides the pieces the merge engine builds on:
//!
//! - An in-memory dataset model (coordinates + data variables) with the
//!   pure time-axis operations merging needs (drop, concat, sort)
//! - Zarr V3 read/write via `zarrs` with per-variable chunking and Blosc
//!   compression fixed at store creation
//! - A consolidated metadata document at the store root so a store can be
//!   opened and inspected without a directory listing
//! - Store probing that keeps "absent" and "corrupt" apart

pub mod consolidate;
pub mod dataset;
pub mod encoding;
pub mod error;
pub mod read;
pub mod write;

pub use consolidate::{read_consolidated, write_consolidated, StoreIndex};
pub use dataset::{ArrayValues, Dataset, Variable, DIMENSIONS_ATTR};
pub use encoding::{
    CompressionAlgorithm, CompressorSpec, EncodingProfile, ShuffleMode, VariableEncoding,
};
pub use error::{Result, StoreError};
pub use read::{open_store, probe_store, read_dataset, read_variable, StoreProbe};
pub use write::{append_dataset, create_store, write_dataset};

pub use zarrs_filesystem::FilesystemStore;
