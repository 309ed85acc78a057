//! Snapshot pipeline orchestration.
//!
//! [`SnapshotMerger`] runs one snapshot through the full pipeline:
//! date extraction from the source name, normalization to the canonical
//! dimension order, per-cell hashing, the verification placeholder, and
//! finally the store merge. [`merge_snapshot`] is the one-call entry
//! point for callers that hold a config and a pair of paths.

use std::path::Path;

use tracing::info;
use zarr_store::{open_store, probe_store, read_dataset, Dataset, StoreProbe};

use crate::config::MergeConfig;
use crate::date::extract_date_from_name;
use crate::error::{MergeError, Result};
use crate::hash::attach_spatial_hashes;
use crate::merge::{merge_into_store, MergeOutcome};
use crate::normalize::{attach_verification_placeholder, normalize_snapshot};

/// Runs snapshots through normalization, hashing, and the store merge.
pub struct SnapshotMerger {
    config: MergeConfig,
}

impl SnapshotMerger {
    /// Build a merger from a validated configuration.
    pub fn new(config: MergeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Merge a staged snapshot store at `source` into `destination`.
    ///
    /// The source must be a readable single-day store; its name carries
    /// the observation date as a `.YYYYMMDD.` token.
    pub fn merge_path(&self, source: &Path, destination: &Path) -> Result<MergeOutcome> {
        let location = source.display().to_string();
        let raw = match probe_store(source) {
            StoreProbe::Ok(index) => {
                let store = open_store(source)?;
                read_dataset(&store, &index)?
            }
            StoreProbe::Absent => {
                return Err(MergeError::Snapshot(format!(
                    "snapshot store not found at {}",
                    location
                )))
            }
            StoreProbe::Corrupt { reason } => {
                return Err(MergeError::StoreAccess { location, reason })
            }
        };
        self.merge_dataset(raw, &location, destination)
    }

    /// Merge an in-memory snapshot into `destination`.
    ///
    /// `source_name` is only used for date extraction and reporting; the
    /// snapshot itself carries no timestamp until normalization stamps
    /// one onto it.
    pub fn merge_dataset(
        &self,
        raw: Dataset,
        source_name: &str,
        destination: &Path,
    ) -> Result<MergeOutcome> {
        let timestamp = extract_date_from_name(source_name, self.config.strip_suffix.as_deref())?;
        info!(source = %source_name, time = %timestamp, "Merging snapshot");

        let snapshot = normalize_snapshot(raw, timestamp)?;
        let snapshot = attach_spatial_hashes(snapshot, &self.config.hash_variables)?;
        let snapshot = attach_verification_placeholder(snapshot)?;

        let profile = self.config.resolve_profile(&snapshot)?;
        let status = merge_into_store(destination, &snapshot, timestamp, &profile)?;

        Ok(MergeOutcome {
            source: source_name.to_string(),
            destination: destination.display().to_string(),
            status,
        })
    }
}

/// Merge one staged snapshot into a store, end to end.
///
/// `strip_suffix` overrides the configured suffix when given, so a caller
/// processing mixed sources can adjust per invocation.
pub fn merge_snapshot(
    source: &Path,
    destination: &Path,
    strip_suffix: Option<&str>,
    config: &MergeConfig,
) -> Result<MergeOutcome> {
    let mut config = config.clone();
    if strip_suffix.is_some() {
        config.strip_suffix = strip_suffix.map(str::to_string);
    }
    SnapshotMerger::new(config)?.merge_path(source, destination)
}
