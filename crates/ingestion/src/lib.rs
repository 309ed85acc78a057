//! Daily snapshot ingestion library.
//!
//! Merges immutable daily gridded measurement snapshots (OISST-style sea
//! surface temperature grids) into a single growing, chunked, compressed
//! Zarr store, attaching a per-cell BLAKE3 content hash along the way.
//!
//! # Architecture
//!
//! One invocation processes exactly one snapshot end-to-end, synchronously:
//!
//! 1. Extract the snapshot's calendar day from its name ([`date`])
//! 2. Normalize the snapshot: guarantee a depth dimension, stamp the
//!    canonical timestamp ([`normalize`])
//! 3. Attach per-cell spatial content hashes ([`hash`])
//! 4. Create, append to, or rewrite the destination store ([`merge`])
//!
//! Scheduling, retries, credentials and transport belong to the caller;
//! so does serializing writers, since the engine assumes at most one
//! in-flight merge per destination store.

pub mod config;
pub mod date;
pub mod error;
pub mod hash;
pub mod merge;
mod merger;
pub mod normalize;
pub mod testdata;

// Re-exports
pub use config::{MergeConfig, VariableConfig};
pub use date::extract_date_from_name;
pub use error::{MergeError, Result};
pub use hash::{attach_spatial_hashes, cell_hash, HASH_VARIABLE, NAN_SENTINEL};
pub use merge::{merge_into_store, MergeOutcome, MergeStatus};
pub use merger::{merge_snapshot, SnapshotMerger};
pub use normalize::{
    attach_verification_placeholder, normalize_snapshot, DEPTH_DIM, VERIFICATION_VARIABLE,
};
