//! Zarr V3 store writing: create-mode dataset writes and slice appends.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use crate::consolidate::{write_consolidated, StoreIndex};
use crate::dataset::{ArrayValues, Dataset, Variable, DIMENSIONS_ATTR};
use crate::encoding::{EncodingProfile, VariableEncoding};
use crate::error::{Result, StoreError};
use crate::read::read_variable;

/// Create the store directory (if needed) and open a filesystem store on it.
pub fn create_store(root: &Path) -> Result<Arc<FilesystemStore>> {
    std::fs::create_dir_all(root)?;
    let store = FilesystemStore::new(root).map_err(|e| StoreError::open_failed(e.to_string()))?;
    Ok(Arc::new(store))
}

/// Write a dataset as the entire store, then consolidate metadata.
///
/// Each coordinate and data variable becomes one Zarr array. Data variables
/// take their chunk shape and compressor from the profile (contiguous and
/// uncompressed when unspecified); coordinates are stored whole.
pub fn write_dataset(
    store: &Arc<FilesystemStore>,
    dataset: &Dataset,
    profile: &EncodingProfile,
) -> Result<()> {
    let mut metadata = BTreeMap::new();

    for (name, coord) in &dataset.coords {
        let encoding = VariableEncoding {
            chunks: coord.shape.clone(),
            compressor: None,
        };
        metadata.insert(name.clone(), write_array(store, name, coord, &encoding)?);
    }

    for (name, var) in &dataset.data_vars {
        let encoding = profile.encoding_or_contiguous(name, &var.shape);
        encoding.validate(name, var.shape.len())?;
        metadata.insert(name.clone(), write_array(store, name, var, &encoding)?);
    }

    write_consolidated(store, &dataset.attrs, &metadata)?;

    info!(
        coords = dataset.coords.len(),
        variables = dataset.data_vars.len(),
        "Wrote dataset to store"
    );
    Ok(())
}

/// Append a one-day dataset along the time dimension, then re-consolidate.
///
/// Every time-indexed array grows by one slice using the store's existing
/// encoding; non-time coordinates and trailing dimensions must match the
/// store exactly. The snapshot's variable set must equal the store's.
pub fn append_dataset(
    store: &Arc<FilesystemStore>,
    snapshot: &Dataset,
    index: &StoreIndex,
) -> Result<()> {
    let times = snapshot.time_values()?;
    if times.len() != 1 {
        return Err(StoreError::dimension_mismatch(format!(
            "append expects a single-day snapshot, got {} time values",
            times.len()
        )));
    }

    let mut expected: Vec<&str> = snapshot
        .coords
        .keys()
        .chain(snapshot.data_vars.keys())
        .map(String::as_str)
        .collect();
    expected.sort_unstable();
    let mut stored = index.array_names();
    stored.sort_unstable();
    if expected != stored {
        return Err(StoreError::VariableMismatch(format!(
            "snapshot arrays {:?} do not match store arrays {:?}",
            expected, stored
        )));
    }

    // Non-time coordinates must be identical; they are never rewritten.
    // A same-shape grid with shifted values must not append either, so the
    // stored values are compared, not just the shape.
    for (name, coord) in &snapshot.coords {
        if name == "time" {
            continue;
        }
        let stored_shape = index.array_shape(name)?;
        if stored_shape != coord.shape {
            return Err(StoreError::dimension_mismatch(format!(
                "coordinate '{}' has shape {:?} in store but {:?} in snapshot",
                name, stored_shape, coord.shape
            )));
        }
        let stored = read_variable(store, name)?;
        if stored.values != coord.values {
            return Err(StoreError::dimension_mismatch(format!(
                "coordinate '{}' values differ between store and snapshot",
                name
            )));
        }
    }

    let mut metadata = BTreeMap::new();

    let time = &snapshot.coords["time"];
    metadata.insert("time".to_string(), append_slice(store, "time", time)?);

    for (name, coord) in &snapshot.coords {
        if name == "time" {
            continue;
        }
        let array = open_array(store, name)?;
        metadata.insert(name.clone(), array_metadata(&array)?);
    }

    for (name, var) in &snapshot.data_vars {
        if !var.is_indexed_by("time") {
            return Err(StoreError::dimension_mismatch(format!(
                "variable '{}' is not time-indexed: {:?}",
                name, var.dims
            )));
        }
        metadata.insert(name.clone(), append_slice(store, name, var)?);
    }

    write_consolidated(store, &index.attrs, &metadata)?;

    debug!(
        time = times[0],
        variables = snapshot.data_vars.len(),
        "Appended time slice to store"
    );
    Ok(())
}

/// Grow one array by a single leading slice and write the new values.
fn append_slice(
    store: &Arc<FilesystemStore>,
    name: &str,
    var: &Variable,
) -> Result<Value> {
    let mut array = open_array(store, name)?;

    let old_shape = array.shape().to_vec();
    if old_shape.len() != var.shape.len() || old_shape[1..] != var.shape[1..] {
        return Err(StoreError::dimension_mismatch(format!(
            "'{}' has shape {:?} in store but {:?} in snapshot",
            name, old_shape, var.shape
        )));
    }

    let mut new_shape = old_shape.clone();
    new_shape[0] += 1;
    array.set_shape(new_shape.clone());
    array
        .store_metadata()
        .map_err(|e| StoreError::write_failed(e.to_string()))?;

    let mut start = vec![0u64; new_shape.len()];
    start[0] = old_shape[0];
    let mut slice_shape = new_shape;
    slice_shape[0] = 1;
    let subset = ArraySubset::new_with_start_shape(start, slice_shape)
        .map_err(|e| StoreError::write_failed(e.to_string()))?;
    store_values(&array, &subset, &var.values)?;

    array_metadata(&array)
}

/// Write one variable as a new Zarr array and return its metadata document.
fn write_array(
    store: &Arc<FilesystemStore>,
    name: &str,
    var: &Variable,
    encoding: &VariableEncoding,
) -> Result<Value> {
    let (data_type, fill_value, typesize) = match &var.values {
        ArrayValues::Float32(_) => (DataType::Float32, FillValue::from(f32::NAN), 4),
        ArrayValues::Int64(_) => (DataType::Int64, FillValue::from(0i64), 8),
        ArrayValues::Strings(_) => (DataType::String, FillValue::new(Vec::new()), 1),
    };

    let mut attrs = var.attrs.clone();
    attrs.insert(
        DIMENSIONS_ATTR.to_string(),
        serde_json::json!(var.dims),
    );

    let chunk_grid: zarrs::array::ChunkGrid = encoding
        .chunks
        .clone()
        .try_into()
        .map_err(|e| StoreError::InvalidEncoding(format!("{:?}", e)))?;

    let mut binding = ArrayBuilder::new(var.shape.clone(), data_type, chunk_grid, fill_value);
    let mut builder = binding.attributes(attrs);

    if let Some(compressor) = &encoding.compressor {
        if let Some(codec) = compressor.codec(typesize)? {
            builder = builder.bytes_to_bytes_codecs(vec![codec]);
        }
    }

    let array = builder
        .build(store.clone(), &array_path(name))
        .map_err(|e| StoreError::write_failed(e.to_string()))?;

    array
        .store_metadata()
        .map_err(|e| StoreError::write_failed(e.to_string()))?;

    let subset = ArraySubset::new_with_shape(var.shape.clone());
    store_values(&array, &subset, &var.values)?;

    array_metadata(&array)
}

/// Write values into a subset, dispatching on the value type.
fn store_values(
    array: &Array<FilesystemStore>,
    subset: &ArraySubset,
    values: &ArrayValues,
) -> Result<()> {
    match values {
        ArrayValues::Float32(v) => array
            .store_array_subset_elements(subset, v)
            .map_err(|e| StoreError::write_failed(e.to_string())),
        ArrayValues::Int64(v) => array
            .store_array_subset_elements(subset, v)
            .map_err(|e| StoreError::write_failed(e.to_string())),
        ArrayValues::Strings(v) => array
            .store_array_subset_elements(subset, v)
            .map_err(|e| StoreError::write_failed(e.to_string())),
    }
}

pub(crate) fn open_array(
    store: &Arc<FilesystemStore>,
    name: &str,
) -> Result<Array<FilesystemStore>> {
    Array::open(store.clone(), &array_path(name))
        .map_err(|e| StoreError::open_failed(format!("array '{}': {}", name, e)))
}

pub(crate) fn array_path(name: &str) -> String {
    format!("/{}", name)
}

pub(crate) fn array_metadata(array: &Array<FilesystemStore>) -> Result<Value> {
    serde_json::to_value(array.metadata()).map_err(StoreError::from)
}
