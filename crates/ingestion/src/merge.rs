//! The store merge engine: create, append, or overwrite.
//!
//! Exactly one of three transitions runs per invocation, decided by probing
//! the destination and checking whether the snapshot's day is already
//! present. Appends reuse the store's encoding; overwrites rewrite the
//! whole store because chunk boundaries along time are not guaranteed to
//! align with a single slice, so in-place slice replacement is unsafe.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use zarr_store::{
    append_dataset, create_store, open_store, probe_store, read_dataset, read_variable,
    write_dataset, Dataset, EncodingProfile, FilesystemStore, StoreIndex, StoreProbe,
};

use crate::error::{MergeError, Result};
use crate::hash::HASH_VARIABLE;
use crate::normalize::TIME_DIM;

/// What the merge engine did with a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStatus {
    /// The destination did not exist; the snapshot became the store.
    Created,
    /// The snapshot's day was new; the store now holds it in time order.
    /// Days later than everything stored grow the arrays in place; late
    /// arrivals are spliced in with a sorted rewrite.
    Appended,
    /// The snapshot's day existed with different content; the store was
    /// rewritten with the day replaced.
    Overwritten,
    /// The snapshot's day existed with identical content; nothing changed.
    Skipped,
}

impl std::fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Appended => "appended",
            Self::Overwritten => "overwritten",
            Self::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Result record returned to the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    /// Location of the snapshot that was merged.
    pub source: String,
    /// Location of the destination store.
    pub destination: String,
    /// What the engine did.
    pub status: MergeStatus,
}

/// Merge one normalized, hashed snapshot into the destination store.
///
/// `profile` is the store-creation encoding; it is only consulted when the
/// destination does not exist yet. Appends and overwrites reuse the
/// encoding captured from the live store. The caller must guarantee at
/// most one in-flight merge per destination.
pub fn merge_into_store(
    destination: &Path,
    snapshot: &Dataset,
    timestamp: DateTime<Utc>,
    profile: &EncodingProfile,
) -> Result<MergeStatus> {
    let location = destination.display().to_string();

    match probe_store(destination) {
        StoreProbe::Absent => {
            let store = create_store(destination)?;
            write_dataset(&store, snapshot, profile)?;
            info!(store = %location, time = %timestamp, "Created new store from snapshot");
            Ok(MergeStatus::Created)
        }
        StoreProbe::Corrupt { reason } => {
            // Never create over something that exists but will not open;
            // recovering a corrupt store is an operator decision.
            warn!(store = %location, reason = %reason, "Destination store is unreadable");
            Err(MergeError::StoreAccess { location, reason })
        }
        StoreProbe::Ok(index) => {
            let store = open_store(destination)?;
            let times = read_variable(&store, TIME_DIM)?.i64s()?.to_vec();
            let when = timestamp.timestamp();

            match times.iter().position(|&t| t == when) {
                None if times.last().is_some_and(|&last| when < last) => {
                    // A late arrival: a plain append would leave the time
                    // coordinate unsorted, so splice it in with a full
                    // sorted rewrite instead.
                    let existing = read_dataset(&store, &index)?;
                    let captured = EncodingProfile::from_array_metadata(&index.metadata)?;
                    let merged = existing.concat_time(snapshot)?.sort_by_time()?;
                    verify_time_consistency(&merged)?;

                    rewrite_store(destination, &merged, &captured)?;
                    info!(
                        store = %location,
                        time = %timestamp,
                        days = merged.time_values()?.len(),
                        "Spliced late-arriving day into store"
                    );
                    Ok(MergeStatus::Appended)
                }
                None => {
                    append_dataset(&store, snapshot, &index)?;
                    verify_time_alignment(&store, snapshot, times.len() + 1)?;
                    info!(
                        store = %location,
                        time = %timestamp,
                        days = times.len() + 1,
                        "Appended new day to store"
                    );
                    Ok(MergeStatus::Appended)
                }
                Some(day_index) => {
                    if day_unchanged(&store, &index, snapshot, day_index)? {
                        info!(
                            store = %location,
                            time = %timestamp,
                            "Day already present with identical content; skipping"
                        );
                        return Ok(MergeStatus::Skipped);
                    }

                    let existing = read_dataset(&store, &index)?;
                    // Reuse the encoding fixed at creation, not whatever the
                    // current configuration says.
                    let captured = EncodingProfile::from_array_metadata(&index.metadata)?;

                    let merged = existing
                        .drop_time_index(day_index)?
                        .concat_time(snapshot)?
                        .sort_by_time()?;
                    verify_time_consistency(&merged)?;

                    rewrite_store(destination, &merged, &captured)?;
                    info!(
                        store = %location,
                        time = %timestamp,
                        days = merged.time_values()?.len(),
                        "Overwrote existing day with full store rewrite"
                    );
                    Ok(MergeStatus::Overwritten)
                }
            }
        }
    }
}

/// Replace the destination with `merged`, keeping the captured encoding.
fn rewrite_store(
    destination: &Path,
    merged: &Dataset,
    profile: &EncodingProfile,
) -> Result<()> {
    std::fs::remove_dir_all(destination)?;
    let store = create_store(destination)?;
    write_dataset(&store, merged, profile)?;
    Ok(())
}

/// True when the stored day's hash slice equals the incoming snapshot's.
///
/// The hash covers every measurement value in the cell tuple, so equal
/// hash slices mean an overwrite would rewrite the store to the same
/// content.
fn day_unchanged(
    store: &std::sync::Arc<FilesystemStore>,
    index: &StoreIndex,
    snapshot: &Dataset,
    day_index: usize,
) -> Result<bool> {
    if !index.contains(HASH_VARIABLE) {
        return Ok(false);
    }
    let incoming = match snapshot.data_vars.get(HASH_VARIABLE) {
        Some(var) => var.strings()?,
        None => return Ok(false),
    };

    let stored = read_variable(store, HASH_VARIABLE)?;
    let block = stored.block_len();
    let values = stored.strings()?;
    if incoming.len() != block || (day_index + 1) * block > values.len() {
        return Ok(false);
    }
    Ok(&values[day_index * block..(day_index + 1) * block] == incoming)
}

/// Check that every appended variable grew to the expected time length.
fn verify_time_alignment(
    store: &std::sync::Arc<FilesystemStore>,
    snapshot: &Dataset,
    expected: usize,
) -> Result<()> {
    let times = read_variable(store, TIME_DIM)?;
    if times.shape[0] as usize != expected {
        return Err(MergeError::DimensionConsistency(format!(
            "time coordinate has length {}, expected {}",
            times.shape[0], expected
        )));
    }
    for name in snapshot.data_vars.keys() {
        let var = read_variable(store, name)?;
        if var.shape[0] as usize != expected {
            return Err(MergeError::DimensionConsistency(format!(
                "variable '{}' has time length {}, expected {}",
                name, var.shape[0], expected
            )));
        }
    }
    Ok(())
}

/// Check that every time-indexed variable agrees with the time coordinate.
fn verify_time_consistency(dataset: &Dataset) -> Result<()> {
    let expected = dataset.time_values()?.len() as u64;
    for (name, var) in &dataset.data_vars {
        if var.is_indexed_by(TIME_DIM) && var.shape[0] != expected {
            return Err(MergeError::DimensionConsistency(format!(
                "variable '{}' has time length {}, expected {}",
                name, var.shape[0], expected
            )));
        }
    }
    Ok(())
}
