//! Synthetic snapshot fixtures shared by unit and integration tests.
//!
//! Deterministic small grids so assertions can name exact cells. The
//! `expect` calls are acceptable here: a fixture that cannot be built is a
//! bug in the fixture, not a runtime condition.

use chrono::{DateTime, TimeZone, Utc};
use zarr_store::{ArrayValues, Dataset, Variable};

use crate::config::MergeConfig;
use crate::hash::attach_spatial_hashes;
use crate::normalize::{
    attach_verification_placeholder, normalize_snapshot, DEPTH_DIM, LAT_DIM, LON_DIM, TIME_DIM,
};

/// Configuration used by the fixtures: the four standard measurement
/// variables on a 4x8 grid, `sst` compressed, the rest plain.
pub fn test_config() -> MergeConfig {
    MergeConfig::from_json_str(
        r#"{
            "strip_suffix": ".nc",
            "variables": {
                "sst":  { "chunks": [1, 1, 4, 8],
                          "compressor": { "algorithm": "blosc_zstd", "level": 1,
                                          "shuffle": "shuffle" } },
                "err":  { "chunks": [1, 4, 8] },
                "ice":  { "chunks": [1, 4, 8] },
                "anom": { "chunks": [1, 4, 8] }
            }
        }"#,
    )
    .expect("fixture config must validate")
}

/// Noon UTC on a `YYYYMMDD`-encoded day.
pub fn noon_utc(yyyymmdd: u32) -> DateTime<Utc> {
    let year = (yyyymmdd / 10_000) as i32;
    let month = (yyyymmdd / 100) % 100;
    let day = yyyymmdd % 100;
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
        .single()
        .expect("fixture date must be valid")
}

fn dims(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn measurement(offset: f32, cells: usize) -> Vec<f32> {
    (0..cells).map(|i| offset + i as f32 * 0.125).collect()
}

/// A raw producer snapshot without a depth axis: `(time, lat, lon)`
/// variables `sst`, `err`, `ice`, `anom` on an `nlat` x `nlon` grid.
///
/// `base` shifts every measurement value, so two snapshots built with
/// different bases disagree in every cell.
pub fn raw_snapshot_without_depth(nlat: u64, nlon: u64, base: f32) -> Dataset {
    let cells = (nlat * nlon) as usize;
    let mut snapshot = Dataset::default();

    snapshot.coords.insert(
        LAT_DIM.to_string(),
        Variable::coord(
            LAT_DIM,
            ArrayValues::Float32((0..nlat).map(|i| -10.0 + i as f32 * 0.25).collect()),
        ),
    );
    snapshot.coords.insert(
        LON_DIM.to_string(),
        Variable::coord(
            LON_DIM,
            ArrayValues::Float32((0..nlon).map(|i| 100.0 + i as f32 * 0.25).collect()),
        ),
    );
    // Producer-stamped time; normalization replaces it.
    snapshot.coords.insert(
        TIME_DIM.to_string(),
        Variable::coord(TIME_DIM, ArrayValues::Int64(vec![0])),
    );

    for (name, offset) in [("sst", 10.0), ("err", 0.5), ("ice", 0.0), ("anom", -2.0)] {
        let var = Variable::new(
            name,
            dims(&[TIME_DIM, LAT_DIM, LON_DIM]),
            vec![1, nlat, nlon],
            ArrayValues::Float32(measurement(base + offset, cells)),
        )
        .expect("fixture variable must match its shape");
        snapshot.data_vars.insert(name.to_string(), var);
    }
    snapshot
}

/// A raw snapshot that already carries `nlev` depth levels.
pub fn raw_snapshot_with_depth(nlev: u64, nlat: u64, nlon: u64, base: f32) -> Dataset {
    let cells = (nlev * nlat * nlon) as usize;
    let mut snapshot = raw_snapshot_without_depth(nlat, nlon, base);

    snapshot.coords.insert(
        DEPTH_DIM.to_string(),
        Variable::coord(
            DEPTH_DIM,
            ArrayValues::Float32((0..nlev).map(|i| 1.0 + i as f32 * 4.0).collect()),
        ),
    );
    for (name, offset) in [("sst", 10.0), ("err", 0.5), ("ice", 0.0), ("anom", -2.0)] {
        let var = Variable::new(
            name,
            dims(&[TIME_DIM, DEPTH_DIM, LAT_DIM, LON_DIM]),
            vec![1, nlev, nlat, nlon],
            ArrayValues::Float32(measurement(base + offset, cells)),
        )
        .expect("fixture variable must match its shape");
        snapshot.data_vars.insert(name.to_string(), var);
    }
    snapshot
}

/// A fully prepared snapshot for the given day: normalized to
/// `(time, zlev, lat, lon)` on a 4x8 grid, hashed, with the verification
/// placeholder attached.
pub fn normalized_snapshot(yyyymmdd: u32, base: f32) -> Dataset {
    let raw = raw_snapshot_without_depth(4, 8, base);
    let snapshot = normalize_snapshot(raw, noon_utc(yyyymmdd)).expect("fixture must normalize");
    let snapshot = attach_spatial_hashes(snapshot, &test_config().hash_variables)
        .expect("fixture must hash");
    attach_verification_placeholder(snapshot).expect("fixture placeholder must attach")
}
