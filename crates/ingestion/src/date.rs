//! Canonical timestamp extraction from snapshot names.
//!
//! Daily snapshots carry their calendar day embedded in the identifying
//! name as an 8-digit run bounded by dots, e.g.
//! `oisst-avhrr-v02r01.20250108.nc`. Each snapshot maps to exactly one
//! day, normalized to 12:00:00 UTC.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::error::{MergeError, Result};

/// Extract the canonical timestamp from a snapshot's identifying name.
///
/// `strip_suffix` is removed from the end of the name first, when present
/// (sources sometimes stage snapshots under a transformed name such as
/// `<original>.zarr`). The first `.YYYYMMDD.` token of the final path
/// component wins; a name with no such token, or whose token is not a real
/// calendar date, fails with [`MergeError::DateExtraction`].
pub fn extract_date_from_name(name: &str, strip_suffix: Option<&str>) -> Result<DateTime<Utc>> {
    let file_name = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name);

    let trimmed = match strip_suffix {
        Some(suffix) if !suffix.is_empty() => {
            file_name.strip_suffix(suffix).unwrap_or(file_name)
        }
        _ => file_name,
    };

    let token = find_dotted_date_token(trimmed)
        .ok_or_else(|| MergeError::DateExtraction(name.to_string()))?;

    let date = NaiveDate::parse_from_str(token, "%Y%m%d")
        .map_err(|_| MergeError::DateExtraction(name.to_string()))?;

    date.and_hms_opt(12, 0, 0)
        .map(|dt| Utc.from_utc_datetime(&dt))
        .ok_or_else(|| MergeError::DateExtraction(name.to_string()))
}

/// Find the first run of exactly 8 ASCII digits opened by a dot and closed
/// by a dot or the end of the name.
///
/// The end-of-name boundary matters: stripping a suffix such as `.nc`
/// consumes the token's closing dot, and the stripped name must still
/// yield its date.
fn find_dotted_date_token(name: &str) -> Option<&str> {
    let bytes = name.as_bytes();
    for start in 0..bytes.len() {
        if bytes[start] != b'.' {
            continue;
        }
        let end = start + 9;
        if end > bytes.len() {
            continue;
        }
        if end < bytes.len() && bytes[end] != b'.' {
            continue;
        }
        if bytes[start + 1..end].iter().all(u8::is_ascii_digit) {
            return Some(&name[start + 1..end]);
        }
    }
    None
}
