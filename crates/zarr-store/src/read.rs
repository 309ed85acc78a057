//! Zarr V3 store probing and reading.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;
use zarrs::array::DataType;
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use crate::consolidate::{read_consolidated, StoreIndex};
use crate::dataset::{ArrayValues, Dataset, Variable, DIMENSIONS_ATTR};
use crate::error::{Result, StoreError};
use crate::write::{array_path, open_array};

/// Outcome of probing a destination store.
///
/// "Absent" and "corrupt" are deliberately distinct: a store that exists
/// but cannot be opened must never be silently re-created over.
#[derive(Debug)]
pub enum StoreProbe {
    /// Nothing exists at the destination; creating a store is safe.
    Absent,
    /// Something exists but its root document is unreadable or malformed.
    Corrupt {
        /// Why the store could not be opened.
        reason: String,
    },
    /// The store opened cleanly.
    Ok(StoreIndex),
}

/// Open a filesystem store on an existing store directory.
pub fn open_store(root: &Path) -> Result<Arc<FilesystemStore>> {
    let store = FilesystemStore::new(root).map_err(|e| StoreError::open_failed(e.to_string()))?;
    Ok(Arc::new(store))
}

/// Probe the destination: absent, corrupt, or readable.
pub fn probe_store(root: &Path) -> StoreProbe {
    if !root.exists() {
        return StoreProbe::Absent;
    }

    let store = match open_store(root) {
        Ok(store) => store,
        Err(e) => {
            return StoreProbe::Corrupt {
                reason: e.to_string(),
            }
        }
    };

    match read_consolidated(&store) {
        Ok(Some(index)) => StoreProbe::Ok(index),
        // A directory with no root document was never a store.
        Ok(None) => StoreProbe::Absent,
        Err(e) => StoreProbe::Corrupt {
            reason: e.to_string(),
        },
    }
}

/// Read one array fully into a [`Variable`].
pub fn read_variable(store: &Arc<FilesystemStore>, name: &str) -> Result<Variable> {
    let array = open_array(store, name)?;
    let shape = array.shape().to_vec();
    let subset = ArraySubset::new_with_shape(shape.clone());

    let values = match array.data_type() {
        DataType::Float32 => ArrayValues::Float32(
            array
                .retrieve_array_subset_elements::<f32>(&subset)
                .map_err(|e| StoreError::read_failed(format!("'{}': {}", name, e)))?,
        ),
        DataType::Int64 => ArrayValues::Int64(
            array
                .retrieve_array_subset_elements::<i64>(&subset)
                .map_err(|e| StoreError::read_failed(format!("'{}': {}", name, e)))?,
        ),
        DataType::String => ArrayValues::Strings(
            array
                .retrieve_array_subset_elements::<String>(&subset)
                .map_err(|e| StoreError::read_failed(format!("'{}': {}", name, e)))?,
        ),
        other => {
            return Err(StoreError::UnsupportedDataType {
                array: name.to_string(),
                data_type: format!("{:?}", other),
            })
        }
    };

    let mut attrs = array.attributes().clone();
    let dims: Vec<String> = match attrs.remove(DIMENSIONS_ATTR) {
        Some(value) => serde_json::from_value(value).map_err(|e| {
            StoreError::invalid_metadata(format!("'{}' dimension names: {}", name, e))
        })?,
        // 1-D arrays without recorded dimensions are self-named coordinates.
        None if shape.len() == 1 => vec![name.to_string()],
        None => {
            return Err(StoreError::invalid_metadata(format!(
                "array '{}' ({}) has no recorded dimension names",
                name,
                array_path(name)
            )))
        }
    };

    let mut variable = Variable::new(name, dims, shape, values)?;
    variable.attrs = attrs;
    Ok(variable)
}

/// Read the entire store into an in-memory dataset.
///
/// Coordinates are the 1-D arrays named after their single dimension;
/// everything else is a data variable.
pub fn read_dataset(store: &Arc<FilesystemStore>, index: &StoreIndex) -> Result<Dataset> {
    let mut dataset = Dataset {
        attrs: index.attrs.clone(),
        ..Dataset::default()
    };

    for name in index.array_names() {
        let variable = read_variable(store, name)?;
        if variable.dims.len() == 1 && variable.dims[0] == name {
            dataset.coords.insert(name.to_string(), variable);
        } else {
            dataset.data_vars.insert(name.to_string(), variable);
        }
    }

    debug!(
        coords = dataset.coords.len(),
        variables = dataset.data_vars.len(),
        "Read dataset from store"
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::EncodingProfile;
    use crate::write::{create_store, write_dataset};

    fn one_day_dataset() -> Dataset {
        let mut ds = Dataset::default();
        ds.coords.insert(
            "time".to_string(),
            Variable::coord("time", ArrayValues::Int64(vec![1_735_732_800])),
        );
        ds.coords.insert(
            "lat".to_string(),
            Variable::coord("lat", ArrayValues::Float32(vec![-0.5, 0.5])),
        );
        ds.coords.insert(
            "lon".to_string(),
            Variable::coord("lon", ArrayValues::Float32(vec![0.0, 1.0])),
        );
        ds.data_vars.insert(
            "sst".to_string(),
            Variable::new(
                "sst",
                vec!["time".into(), "lat".into(), "lon".into()],
                vec![1, 2, 2],
                ArrayValues::Float32(vec![1.0, 2.0, 3.0, 4.0]),
            )
            .unwrap(),
        );
        ds
    }

    #[test]
    fn test_probe_absent_then_ok() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("store.zarr");
        assert!(matches!(probe_store(&root), StoreProbe::Absent));

        let store = create_store(&root).expect("create");
        write_dataset(&store, &one_day_dataset(), &EncodingProfile::default()).expect("write");
        assert!(matches!(probe_store(&root), StoreProbe::Ok(_)));
    }

    #[test]
    fn test_probe_corrupt_root_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("store.zarr");
        std::fs::create_dir_all(&root).expect("mkdir");
        std::fs::write(root.join("zarr.json"), b"{ not json").expect("write");

        match probe_store(&root) {
            StoreProbe::Corrupt { reason } => assert!(!reason.is_empty()),
            other => panic!("expected corrupt probe, got {:?}", other),
        }
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("store.zarr");
        let store = create_store(&root).expect("create");

        let ds = one_day_dataset();
        write_dataset(&store, &ds, &EncodingProfile::default()).expect("write");

        let index = match probe_store(&root) {
            StoreProbe::Ok(index) => index,
            other => panic!("expected open store, got {:?}", other),
        };
        let read = read_dataset(&store, &index).expect("read");

        assert_eq!(read.time_values().unwrap(), vec![1_735_732_800]);
        assert_eq!(
            read.data_vars["sst"].f32s().unwrap(),
            ds.data_vars["sst"].f32s().unwrap()
        );
        assert_eq!(read.coords["lat"].f32s().unwrap(), &[-0.5, 0.5]);
    }

    #[test]
    fn test_read_variable_dimension_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("store.zarr");
        let store = create_store(&root).expect("create");
        write_dataset(&store, &one_day_dataset(), &EncodingProfile::default()).expect("write");

        let sst = read_variable(&store, "sst").expect("read");
        assert_eq!(sst.dims, vec!["time", "lat", "lon"]);
        assert_eq!(sst.shape, vec![1, 2, 2]);
    }
}
