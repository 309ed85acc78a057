//! Snapshot normalization.
//!
//! Raw snapshots arrive with or without a depth axis and with whatever
//! time value the upstream producer stamped. Normalization guarantees the
//! fixed dimension convention `(time, zlev, lat, lon)` and overwrites the
//! time coordinate with the canonical timestamp extracted from the
//! snapshot's name.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::debug;
use zarr_store::{ArrayValues, Dataset, Variable};

use crate::error::{MergeError, Result};

/// Name of the time dimension.
pub const TIME_DIM: &str = "time";
/// Name of the depth-level dimension.
pub const DEPTH_DIM: &str = "zlev";
/// Name of the latitude dimension.
pub const LAT_DIM: &str = "lat";
/// Name of the longitude dimension.
pub const LON_DIM: &str = "lon";

/// Name of the reserved per-cell annotation variable.
pub const VERIFICATION_VARIABLE: &str = "verification";
/// Reserved fixed width of one verification entry.
pub const VERIFICATION_CAPACITY: u64 = 10;

/// Normalize one raw snapshot against the canonical timestamp.
///
/// Guarantees: a `zlev` dimension exists (inserted with value `[1.0]` when
/// absent), every data variable has dimensions `(time, zlev, lat, lon)`
/// with a time length of 1, and the time coordinate holds exactly the
/// canonical timestamp. The input is consumed; a normalized dataset is
/// returned.
pub fn normalize_snapshot(mut snapshot: Dataset, timestamp: DateTime<Utc>) -> Result<Dataset> {
    let nlat = snapshot
        .dim_len(LAT_DIM)
        .ok_or_else(|| MergeError::Snapshot("missing 'lat' coordinate".to_string()))?;
    let nlon = snapshot
        .dim_len(LON_DIM)
        .ok_or_else(|| MergeError::Snapshot("missing 'lon' coordinate".to_string()))?;

    // Guarantee the depth axis.
    let added_depth = !snapshot.coords.contains_key(DEPTH_DIM);
    if added_depth {
        let mut zlev = Variable::coord(DEPTH_DIM, ArrayValues::Float32(vec![1.0]));
        zlev.attrs.insert("units".to_string(), json!("meters"));
        snapshot.coords.insert(DEPTH_DIM.to_string(), zlev);
    }
    let nlev = snapshot.dim_len(DEPTH_DIM).unwrap_or(1);

    // Stamp the canonical timestamp, replacing whatever the producer wrote.
    let mut time = Variable::coord(TIME_DIM, ArrayValues::Int64(vec![timestamp.timestamp()]));
    time.attrs.insert(
        "units".to_string(),
        json!("seconds since 1970-01-01T00:00:00Z"),
    );
    time.attrs
        .insert("calendar".to_string(), json!("proleptic_gregorian"));
    snapshot.coords.insert(TIME_DIM.to_string(), time);

    let full_dims = [TIME_DIM, DEPTH_DIM, LAT_DIM, LON_DIM];
    for (name, var) in snapshot.data_vars.iter_mut() {
        if var.dims.len() == 3 {
            if var.dims != [TIME_DIM, LAT_DIM, LON_DIM] {
                return Err(MergeError::Snapshot(format!(
                    "variable '{}' has unexpected dimensions {:?}",
                    name, var.dims
                )));
            }
            var.dims.insert(1, DEPTH_DIM.to_string());
            var.shape.insert(1, 1);
        }
        if var.dims != full_dims {
            return Err(MergeError::Snapshot(format!(
                "variable '{}' has unexpected dimensions {:?}",
                name, var.dims
            )));
        }
        let expected = [1, nlev, nlat, nlon];
        if var.shape != expected {
            return Err(MergeError::Snapshot(format!(
                "variable '{}' has shape {:?}, expected {:?}",
                name, var.shape, expected
            )));
        }
    }

    debug!(
        time = %timestamp,
        zlev = nlev,
        lat = nlat,
        lon = nlon,
        added_depth = added_depth,
        "Normalized snapshot"
    );
    Ok(snapshot)
}

/// Allocate the reserved per-cell annotation field.
///
/// An empty string per cell, aligned to `(time, zlev, lat, lon)`. The
/// reserved fixed width is recorded as a `capacity` attribute; populating
/// the field is an external collaborator's concern, never the engine's.
pub fn attach_verification_placeholder(mut snapshot: Dataset) -> Result<Dataset> {
    let shape: Vec<u64> = [TIME_DIM, DEPTH_DIM, LAT_DIM, LON_DIM]
        .iter()
        .map(|dim| {
            snapshot
                .dim_len(dim)
                .ok_or_else(|| MergeError::Snapshot(format!("missing '{}' coordinate", dim)))
        })
        .collect::<Result<_>>()?;
    let cells = shape.iter().product::<u64>() as usize;

    let mut placeholder = Variable::new(
        VERIFICATION_VARIABLE,
        [TIME_DIM, DEPTH_DIM, LAT_DIM, LON_DIM]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        shape,
        ArrayValues::Strings(vec![String::new(); cells]),
    )?;
    placeholder
        .attrs
        .insert("capacity".to_string(), json!(VERIFICATION_CAPACITY));

    snapshot
        .data_vars
        .insert(VERIFICATION_VARIABLE.to_string(), placeholder);
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata;
    use chrono::TimeZone;

    #[test]
    fn test_depth_axis_inserted_when_absent() {
        let raw = testdata::raw_snapshot_without_depth(4, 8, 0.0);
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();

        let normalized = normalize_snapshot(raw, ts).unwrap();
        assert_eq!(normalized.dim_len(DEPTH_DIM), Some(1));
        assert_eq!(normalized.coords[DEPTH_DIM].f32s().unwrap(), &[1.0]);
        let sst = &normalized.data_vars["sst"];
        assert_eq!(sst.dims, vec!["time", "zlev", "lat", "lon"]);
        assert_eq!(sst.shape, vec![1, 1, 4, 8]);
    }

    #[test]
    fn test_existing_depth_axis_preserved() {
        let raw = testdata::raw_snapshot_with_depth(2, 4, 8, 0.0);
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();

        let normalized = normalize_snapshot(raw, ts).unwrap();
        assert_eq!(normalized.dim_len(DEPTH_DIM), Some(2));
        assert_eq!(normalized.data_vars["sst"].shape, vec![1, 2, 4, 8]);
    }

    #[test]
    fn test_time_coordinate_overwritten() {
        let raw = testdata::raw_snapshot_without_depth(4, 8, 0.0);
        let ts = Utc.with_ymd_and_hms(2025, 1, 8, 12, 0, 0).unwrap();

        let normalized = normalize_snapshot(raw, ts).unwrap();
        assert_eq!(
            normalized.time_values().unwrap(),
            vec![ts.timestamp()]
        );
    }

    #[test]
    fn test_missing_lat_is_an_error() {
        let mut raw = testdata::raw_snapshot_without_depth(4, 8, 0.0);
        raw.coords.remove(LAT_DIM);
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        assert!(matches!(
            normalize_snapshot(raw, ts),
            Err(MergeError::Snapshot(_))
        ));
    }

    #[test]
    fn test_verification_placeholder_allocated_empty() {
        let raw = testdata::raw_snapshot_without_depth(4, 8, 0.0);
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let normalized = normalize_snapshot(raw, ts).unwrap();

        let with_placeholder = attach_verification_placeholder(normalized).unwrap();
        let verification = &with_placeholder.data_vars[VERIFICATION_VARIABLE];
        assert_eq!(verification.shape, vec![1, 1, 4, 8]);
        assert!(verification
            .strings()
            .unwrap()
            .iter()
            .all(String::is_empty));
        assert_eq!(
            verification.attrs.get("capacity"),
            Some(&json!(VERIFICATION_CAPACITY))
        );
    }
}
