//! Consolidated metadata for a store.
//!
//! A store's root `zarr.json` is a group document that embeds every array's
//! metadata under `consolidated_metadata` (the inline layout zarr-python v3
//! writes). Opening a store therefore needs a single object read, never a
//! directory listing.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::{json, Map, Value};
use tracing::debug;
use zarrs_filesystem::FilesystemStore;
use zarrs_storage::{ReadableStorageTraits, StoreKey, WritableStorageTraits};

use crate::error::{Result, StoreError};

/// Store key of the root group document.
const ROOT_DOCUMENT: &str = "zarr.json";

/// Parsed consolidated view of a store: group attributes plus every array's
/// metadata document, keyed by array name.
#[derive(Debug, Clone, Default)]
pub struct StoreIndex {
    /// Group-level attributes.
    pub attrs: Map<String, Value>,
    /// Array name -> that array's `zarr.json` document.
    pub metadata: BTreeMap<String, Value>,
}

impl StoreIndex {
    /// Names of all arrays in the store.
    pub fn array_names(&self) -> Vec<&str> {
        self.metadata.keys().map(String::as_str).collect()
    }

    /// True when the store contains an array named `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.metadata.contains_key(name)
    }

    /// Shape of an array, read from its consolidated metadata.
    pub fn array_shape(&self, name: &str) -> Result<Vec<u64>> {
        self.metadata
            .get(name)
            .and_then(|doc| doc.get("shape"))
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_u64).collect())
            .ok_or_else(|| {
                StoreError::invalid_metadata(format!("array '{}' has no shape", name))
            })
    }
}

fn root_key() -> Result<StoreKey> {
    StoreKey::new(ROOT_DOCUMENT).map_err(|e| StoreError::invalid_metadata(e.to_string()))
}

/// Write the consolidated root document for a store.
///
/// `metadata` maps each array name to its current `zarr.json` document.
/// Must be re-run after any operation that changes array shapes.
pub fn write_consolidated(
    store: &Arc<FilesystemStore>,
    attrs: &Map<String, Value>,
    metadata: &BTreeMap<String, Value>,
) -> Result<()> {
    let document = json!({
        "zarr_format": 3,
        "node_type": "group",
        "attributes": attrs,
        "consolidated_metadata": {
            "kind": "inline",
            "must_understand": false,
            "metadata": metadata,
        },
    });

    let bytes = serde_json::to_vec_pretty(&document)?;
    store
        .set(&root_key()?, Bytes::from(bytes))
        .map_err(|e| StoreError::write_failed(e.to_string()))?;

    debug!(arrays = metadata.len(), "Consolidated store metadata");
    Ok(())
}

/// Read the consolidated root document, if one exists.
///
/// Returns `Ok(None)` when the root document is absent. A present but
/// unreadable/unparsable document is an error; callers decide whether that
/// means "corrupt store" (the probe does).
pub fn read_consolidated(store: &Arc<FilesystemStore>) -> Result<Option<StoreIndex>> {
    let bytes = match store
        .get(&root_key()?)
        .map_err(|e| StoreError::read_failed(e.to_string()))?
    {
        Some(bytes) => bytes,
        None => return Ok(None),
    };

    let document: Value = serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::invalid_metadata(format!("root document: {}", e)))?;

    if document.get("node_type").and_then(Value::as_str) != Some("group") {
        return Err(StoreError::invalid_metadata(
            "root document is not a group".to_string(),
        ));
    }

    let attrs = document
        .get("attributes")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let metadata: BTreeMap<String, Value> = document
        .pointer("/consolidated_metadata/metadata")
        .and_then(Value::as_object)
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    Ok(Some(StoreIndex { attrs, metadata }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(FilesystemStore::new(dir.path()).expect("store"));

        let mut attrs = Map::new();
        attrs.insert("title".to_string(), json!("test store"));
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "sst".to_string(),
            json!({ "node_type": "array", "shape": [1, 1, 4, 8] }),
        );

        write_consolidated(&store, &attrs, &metadata).expect("write");
        let index = read_consolidated(&store)
            .expect("read")
            .expect("index present");

        assert_eq!(index.attrs.get("title"), Some(&json!("test store")));
        assert!(index.contains("sst"));
        assert_eq!(index.array_shape("sst").unwrap(), vec![1, 1, 4, 8]);
    }

    #[test]
    fn test_absent_root_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(FilesystemStore::new(dir.path()).expect("store"));
        assert!(read_consolidated(&store).expect("read").is_none());
    }
}
