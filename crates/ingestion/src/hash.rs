//! Per-cell spatial content hashing.
//!
//! Every grid cell gets a BLAKE3 digest over the ordered tuple
//! `(lat, lon, v1, v2, v3, v4)` packed as six little-endian f32s, with
//! non-finite measurement values replaced by a sentinel first. The digest
//! makes each cell independently verifiable downstream.
//!
//! For multi-level snapshots the hash is computed from the first depth
//! level only and broadcast across all levels. This is a deliberate
//! approximation: it keeps the cost independent of the level count while
//! still giving every water column a stable identity.

use rayon::prelude::*;
use serde_json::json;
use tracing::debug;
use zarr_store::{ArrayValues, Dataset, Variable};

use crate::error::{MergeError, Result};
use crate::normalize::{DEPTH_DIM, LAT_DIM, LON_DIM, TIME_DIM};

/// Sentinel substituted for non-finite measurement values before hashing.
pub const NAN_SENTINEL: f32 = -999.0;

/// Name of the per-cell hash variable.
pub const HASH_VARIABLE: &str = "spatial_hash";

/// Hash one cell's value tuple.
///
/// Pure and stateless: identical inputs always yield the identical
/// 64-character lowercase hex digest. NaN and infinite measurement values
/// are replaced by [`NAN_SENTINEL`], so a missing measurement hashes the
/// same as an explicit sentinel.
pub fn cell_hash(lat: f32, lon: f32, values: [f32; 4]) -> String {
    let mut buf = [0u8; 24];
    buf[0..4].copy_from_slice(&lat.to_le_bytes());
    buf[4..8].copy_from_slice(&lon.to_le_bytes());
    for (i, v) in values.into_iter().enumerate() {
        let v = if v.is_finite() { v } else { NAN_SENTINEL };
        let offset = 8 + i * 4;
        buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
    }
    blake3::hash(&buf).to_hex().to_string()
}

/// Compute and attach the per-cell hash field to a normalized snapshot.
///
/// `hash_variables` names the four measurement variables in tuple order.
/// The result is a string variable aligned to `(time, zlev, lat, lon)`.
/// Cell computations are independent and run data-parallel.
pub fn attach_spatial_hashes(mut snapshot: Dataset, hash_variables: &[String]) -> Result<Dataset> {
    let [v1, v2, v3, v4] = hash_variables else {
        return Err(MergeError::Config(format!(
            "expected exactly 4 hash variables, got {:?}",
            hash_variables
        )));
    };

    let lats = coord_values(&snapshot, LAT_DIM)?;
    let lons = coord_values(&snapshot, LON_DIM)?;
    let nlat = lats.len();
    let nlon = lons.len();
    let cells = nlat * nlon;

    // First depth level only; the leading (time, zlev) axes of a
    // normalized snapshot put that level in the first `cells` elements.
    let a = measurement_values(&snapshot, v1, cells)?;
    let b = measurement_values(&snapshot, v2, cells)?;
    let c = measurement_values(&snapshot, v3, cells)?;
    let d = measurement_values(&snapshot, v4, cells)?;

    let surface: Vec<String> = (0..cells)
        .into_par_iter()
        .map(|idx| {
            let i = idx / nlon;
            let j = idx % nlon;
            cell_hash(lats[i], lons[j], [a[idx], b[idx], c[idx], d[idx]])
        })
        .collect();

    // Broadcast across depth levels.
    let nlev = snapshot.dim_len(DEPTH_DIM).unwrap_or(1) as usize;
    let mut hashes = Vec::with_capacity(cells * nlev);
    for _ in 0..nlev {
        hashes.extend_from_slice(&surface);
    }

    let mut hash_var = Variable::new(
        HASH_VARIABLE,
        [TIME_DIM, DEPTH_DIM, LAT_DIM, LON_DIM]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        vec![1, nlev as u64, nlat as u64, nlon as u64],
        ArrayValues::Strings(hashes),
    )?;
    hash_var.attrs.insert(
        "long_name".to_string(),
        json!("BLAKE3 content hash of (lat, lon, measurement values)"),
    );
    hash_var
        .attrs
        .insert("tuple_order".to_string(), json!(hash_variables));

    snapshot
        .data_vars
        .insert(HASH_VARIABLE.to_string(), hash_var);

    debug!(cells = cells, levels = nlev, "Attached spatial hashes");
    Ok(snapshot)
}

fn coord_values<'a>(snapshot: &'a Dataset, dim: &str) -> Result<&'a [f32]> {
    let coord = snapshot
        .coords
        .get(dim)
        .ok_or_else(|| MergeError::Snapshot(format!("missing '{}' coordinate", dim)))?;
    Ok(coord.f32s()?)
}

fn measurement_values<'a>(snapshot: &'a Dataset, name: &str, cells: usize) -> Result<&'a [f32]> {
    let var = snapshot
        .data_vars
        .get(name)
        .ok_or_else(|| MergeError::Snapshot(format!("missing hash variable '{}'", name)))?;
    let values = var.f32s()?;
    if values.len() < cells {
        return Err(MergeError::Snapshot(format!(
            "variable '{}' has {} values, expected at least {}",
            name,
            values.len(),
            cells
        )));
    }
    Ok(&values[..cells])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_hash_is_deterministic() {
        let a = cell_hash(12.5, -45.25, [10.0, 0.5, 0.0, -1.5]);
        let b = cell_hash(12.5, -45.25, [10.0, 0.5, 0.0, -1.5]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_is_input_sensitive() {
        let base = cell_hash(12.5, -45.25, [10.0, 0.5, 0.0, -1.5]);
        assert_ne!(base, cell_hash(12.6, -45.25, [10.0, 0.5, 0.0, -1.5]));
        assert_ne!(base, cell_hash(12.5, -45.24, [10.0, 0.5, 0.0, -1.5]));
        assert_ne!(base, cell_hash(12.5, -45.25, [10.1, 0.5, 0.0, -1.5]));
        assert_ne!(base, cell_hash(12.5, -45.25, [10.0, 0.6, 0.0, -1.5]));
        assert_ne!(base, cell_hash(12.5, -45.25, [10.0, 0.5, 0.1, -1.5]));
        assert_ne!(base, cell_hash(12.5, -45.25, [10.0, 0.5, 0.0, -1.4]));
    }

    #[test]
    fn test_nan_hashes_like_sentinel() {
        let nan = cell_hash(12.5, -45.25, [f32::NAN, 0.5, 0.0, -1.5]);
        let sentinel = cell_hash(12.5, -45.25, [NAN_SENTINEL, 0.5, 0.0, -1.5]);
        assert_eq!(nan, sentinel);

        let inf = cell_hash(12.5, -45.25, [10.0, f32::INFINITY, 0.0, -1.5]);
        let inf_sentinel = cell_hash(12.5, -45.25, [10.0, NAN_SENTINEL, 0.0, -1.5]);
        assert_eq!(inf, inf_sentinel);
    }

    #[test]
    fn test_attach_hashes_shape_and_alignment() {
        let snapshot = testdata::normalized_snapshot(20250101, 0.0);
        let hash = &snapshot.data_vars[HASH_VARIABLE];
        assert_eq!(hash.dims, vec!["time", "zlev", "lat", "lon"]);
        assert_eq!(hash.shape, vec![1, 1, 4, 8]);

        // Spot-check one cell against the scalar function.
        let lats = snapshot.coords[LAT_DIM].f32s().unwrap();
        let lons = snapshot.coords[LON_DIM].f32s().unwrap();
        let idx = 2 * 8 + 5;
        let expected = cell_hash(
            lats[2],
            lons[5],
            [
                snapshot.data_vars["sst"].f32s().unwrap()[idx],
                snapshot.data_vars["err"].f32s().unwrap()[idx],
                snapshot.data_vars["ice"].f32s().unwrap()[idx],
                snapshot.data_vars["anom"].f32s().unwrap()[idx],
            ],
        );
        assert_eq!(hash.strings().unwrap()[idx], expected);
    }

    #[test]
    fn test_multi_level_broadcasts_first_level() {
        let raw = testdata::raw_snapshot_with_depth(3, 4, 8, 0.0);
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let normalized = crate::normalize::normalize_snapshot(raw, ts).unwrap();
        let hashed =
            attach_spatial_hashes(normalized, &testdata::test_config().hash_variables).unwrap();

        let hash = &hashed.data_vars[HASH_VARIABLE];
        assert_eq!(hash.shape, vec![1, 3, 4, 8]);
        let values = hash.strings().unwrap();
        let cells = 4 * 8;
        // Every level carries the first level's digests.
        assert_eq!(&values[..cells], &values[cells..2 * cells]);
        assert_eq!(&values[..cells], &values[2 * cells..3 * cells]);
    }
}
