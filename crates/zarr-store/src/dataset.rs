//! In-memory dataset model.
//!
//! A [`Dataset`] mirrors the structure of a store: named 1-D coordinate
//! variables plus named N-D data variables that share dimensions. Data
//! variables are time-major; the time-axis operations here (`drop`,
//! `concat`, `sort`) are pure and power the merge engine's overwrite path.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

/// Attribute key holding an array's dimension names, in order.
///
/// Same convention xarray uses for Zarr stores, so stores written here stay
/// legible to xarray-based tooling.
pub const DIMENSIONS_ATTR: &str = "_ARRAY_DIMENSIONS";

/// Typed array values. Only the types the snapshot format needs.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValues {
    /// 32-bit floats (measurement fields, spatial coordinates).
    Float32(Vec<f32>),
    /// 64-bit integers (the time coordinate, seconds since the Unix epoch).
    Int64(Vec<i64>),
    /// Variable-length strings (content hashes, verification placeholder).
    Strings(Vec<String>),
}

impl ArrayValues {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Float32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Strings(v) => v.len(),
        }
    }

    /// True if there are no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Data type name as stored in Zarr metadata.
    pub fn data_type_name(&self) -> &'static str {
        match self {
            Self::Float32(_) => "float32",
            Self::Int64(_) => "int64",
            Self::Strings(_) => "string",
        }
    }

    /// Copy the element range `[start, end)` into a new value buffer.
    fn slice(&self, start: usize, end: usize) -> ArrayValues {
        match self {
            Self::Float32(v) => Self::Float32(v[start..end].to_vec()),
            Self::Int64(v) => Self::Int64(v[start..end].to_vec()),
            Self::Strings(v) => Self::Strings(v[start..end].to_vec()),
        }
    }

    /// Append all elements of `other`. Both sides must share a type.
    fn extend(&mut self, other: &ArrayValues) -> Result<()> {
        match (self, other) {
            (Self::Float32(a), Self::Float32(b)) => a.extend_from_slice(b),
            (Self::Int64(a), Self::Int64(b)) => a.extend_from_slice(b),
            (Self::Strings(a), Self::Strings(b)) => a.extend_from_slice(b),
            (a, b) => {
                return Err(StoreError::VariableMismatch(format!(
                    "cannot concatenate {} with {}",
                    a.data_type_name(),
                    b.data_type_name()
                )))
            }
        }
        Ok(())
    }
}

/// A named array with dimensions, shape, values and attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Dimension names, one per axis.
    pub dims: Vec<String>,
    /// Length of each axis.
    pub shape: Vec<u64>,
    /// The values, row-major.
    pub values: ArrayValues,
    /// Arbitrary attributes carried into the store.
    pub attrs: Map<String, Value>,
}

impl Variable {
    /// Create a variable, checking that values match the declared shape.
    pub fn new(
        name: &str,
        dims: Vec<String>,
        shape: Vec<u64>,
        values: ArrayValues,
    ) -> Result<Self> {
        if dims.len() != shape.len() {
            return Err(StoreError::dimension_mismatch(format!(
                "'{}' declares {} dims but a rank-{} shape",
                name,
                dims.len(),
                shape.len()
            )));
        }
        let expected: u64 = shape.iter().product();
        if values.len() as u64 != expected {
            return Err(StoreError::ShapeMismatch {
                array: name.to_string(),
                len: values.len(),
                shape,
            });
        }
        Ok(Self {
            dims,
            shape,
            values,
            attrs: Map::new(),
        })
    }

    /// 1-D coordinate variable named after its single dimension.
    pub fn coord(name: &str, values: ArrayValues) -> Self {
        let len = values.len() as u64;
        Self {
            dims: vec![name.to_string()],
            shape: vec![len],
            values,
            attrs: Map::new(),
        }
    }

    /// Borrow the values as f32, or fail with the variable's actual type.
    pub fn f32s(&self) -> Result<&[f32]> {
        match &self.values {
            ArrayValues::Float32(v) => Ok(v),
            other => Err(StoreError::VariableMismatch(format!(
                "expected float32 values, found {}",
                other.data_type_name()
            ))),
        }
    }

    /// Borrow the values as i64.
    pub fn i64s(&self) -> Result<&[i64]> {
        match &self.values {
            ArrayValues::Int64(v) => Ok(v),
            other => Err(StoreError::VariableMismatch(format!(
                "expected int64 values, found {}",
                other.data_type_name()
            ))),
        }
    }

    /// Borrow the values as strings.
    pub fn strings(&self) -> Result<&[String]> {
        match &self.values {
            ArrayValues::Strings(v) => Ok(v),
            other => Err(StoreError::VariableMismatch(format!(
                "expected string values, found {}",
                other.data_type_name()
            ))),
        }
    }

    /// True when the variable's leading dimension is `dim`.
    pub fn is_indexed_by(&self, dim: &str) -> bool {
        self.dims.first().map(String::as_str) == Some(dim)
    }

    /// Elements per slice of the leading dimension.
    pub fn block_len(&self) -> usize {
        self.shape.iter().skip(1).product::<u64>() as usize
    }
}

/// A set of coordinate and data variables sharing dimensions.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// 1-D index coordinates, keyed by dimension name.
    pub coords: BTreeMap<String, Variable>,
    /// Data variables, keyed by name.
    pub data_vars: BTreeMap<String, Variable>,
    /// Store-level attributes.
    pub attrs: Map<String, Value>,
}

impl Dataset {
    /// Length of a dimension, taken from its coordinate.
    pub fn dim_len(&self, dim: &str) -> Option<u64> {
        self.coords.get(dim).map(|c| c.shape[0])
    }

    /// The time coordinate values (seconds since the Unix epoch).
    pub fn time_values(&self) -> Result<Vec<i64>> {
        let time = self
            .coords
            .get("time")
            .ok_or_else(|| StoreError::dimension_mismatch("dataset has no time coordinate"))?;
        Ok(time.i64s()?.to_vec())
    }

    /// Names of all data variables.
    pub fn var_names(&self) -> Vec<&str> {
        self.data_vars.keys().map(String::as_str).collect()
    }

    /// Remove the time slice at `index`, returning a new dataset.
    ///
    /// Every time-indexed variable loses its `index`-th leading block;
    /// everything else is carried over untouched.
    pub fn drop_time_index(&self, index: usize) -> Result<Dataset> {
        let times = self.time_values()?;
        if index >= times.len() {
            return Err(StoreError::dimension_mismatch(format!(
                "time index {} out of range (len {})",
                index,
                times.len()
            )));
        }

        let mut out = self.clone();
        let remaining: Vec<i64> = times
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, &t)| t)
            .collect();
        if let Some(time) = out.coords.get_mut("time") {
            time.values = ArrayValues::Int64(remaining.clone());
            time.shape = vec![remaining.len() as u64];
        }

        for (name, var) in out.data_vars.iter_mut() {
            if !var.is_indexed_by("time") {
                continue;
            }
            let block = var.block_len();
            let mut values = var.values.slice(0, index * block);
            values.extend(&var.values.slice((index + 1) * block, var.values.len()))?;
            var.shape[0] -= 1;
            let expected: u64 = var.shape.iter().product();
            if values.len() as u64 != expected {
                return Err(StoreError::ShapeMismatch {
                    array: name.clone(),
                    len: values.len(),
                    shape: var.shape.clone(),
                });
            }
            var.values = values;
        }
        Ok(out)
    }

    /// Concatenate `other` after `self` along time, returning a new dataset.
    ///
    /// Both sides must carry identical variable sets and identical non-time
    /// dimensions; any disagreement is an error, never silently repaired.
    pub fn concat_time(&self, other: &Dataset) -> Result<Dataset> {
        let mine: Vec<&str> = self.var_names();
        let theirs: Vec<&str> = other.var_names();
        if mine != theirs {
            return Err(StoreError::VariableMismatch(format!(
                "variable sets differ: {:?} vs {:?}",
                mine, theirs
            )));
        }
        for (dim, coord) in &self.coords {
            if dim == "time" {
                continue;
            }
            let other_coord = other.coords.get(dim).ok_or_else(|| {
                StoreError::dimension_mismatch(format!("missing coordinate '{}'", dim))
            })?;
            if coord.values != other_coord.values {
                return Err(StoreError::dimension_mismatch(format!(
                    "coordinate '{}' differs between datasets",
                    dim
                )));
            }
        }

        let mut out = self.clone();
        let mut times = self.time_values()?;
        times.extend(other.time_values()?);
        if let Some(time) = out.coords.get_mut("time") {
            time.shape = vec![times.len() as u64];
            time.values = ArrayValues::Int64(times);
        }

        for (name, var) in out.data_vars.iter_mut() {
            let other_var = &other.data_vars[name];
            if var.dims != other_var.dims || var.shape[1..] != other_var.shape[1..] {
                return Err(StoreError::dimension_mismatch(format!(
                    "'{}' shapes differ: {:?} vs {:?}",
                    name, var.shape, other_var.shape
                )));
            }
            var.values.extend(&other_var.values)?;
            var.shape[0] += other_var.shape[0];
        }
        Ok(out)
    }

    /// Reorder all time slices so the time coordinate ascends.
    pub fn sort_by_time(&self) -> Result<Dataset> {
        let times = self.time_values()?;
        let mut order: Vec<usize> = (0..times.len()).collect();
        order.sort_by_key(|&i| times[i]);
        if order.iter().enumerate().all(|(i, &o)| i == o) {
            return Ok(self.clone());
        }

        let mut out = self.clone();
        let sorted: Vec<i64> = order.iter().map(|&i| times[i]).collect();
        if let Some(time) = out.coords.get_mut("time") {
            time.values = ArrayValues::Int64(sorted);
        }
        for var in out.data_vars.values_mut() {
            if !var.is_indexed_by("time") {
                continue;
            }
            let block = var.block_len();
            let mut values = var.values.slice(0, 0);
            for &i in &order {
                values.extend(&var.values.slice(i * block, (i + 1) * block))?;
            }
            var.values = values;
        }
        Ok(out)
    }

    /// Values of one time slice of a data variable.
    pub fn time_slice(&self, var: &str, index: usize) -> Result<ArrayValues> {
        let v = self
            .data_vars
            .get(var)
            .ok_or_else(|| StoreError::ArrayNotFound(var.to_string()))?;
        let block = v.block_len();
        if (index + 1) * block > v.values.len() {
            return Err(StoreError::dimension_mismatch(format!(
                "time index {} out of range for '{}'",
                index, var
            )));
        }
        Ok(v.values.slice(index * block, (index + 1) * block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_day_dataset() -> Dataset {
        let mut ds = Dataset::default();
        ds.coords.insert(
            "time".to_string(),
            Variable::coord("time", ArrayValues::Int64(vec![100, 200])),
        );
        ds.coords.insert(
            "lat".to_string(),
            Variable::coord("lat", ArrayValues::Float32(vec![0.0, 1.0])),
        );
        ds.coords.insert(
            "lon".to_string(),
            Variable::coord("lon", ArrayValues::Float32(vec![0.0, 1.0, 2.0])),
        );
        ds.data_vars.insert(
            "sst".to_string(),
            Variable::new(
                "sst",
                vec!["time".into(), "lat".into(), "lon".into()],
                vec![2, 2, 3],
                ArrayValues::Float32((0..12).map(|i| i as f32).collect()),
            )
            .unwrap(),
        );
        ds
    }

    #[test]
    fn test_drop_time_index() {
        let ds = two_day_dataset();
        let dropped = ds.drop_time_index(0).unwrap();
        assert_eq!(dropped.time_values().unwrap(), vec![200]);
        let sst = dropped.data_vars["sst"].f32s().unwrap();
        assert_eq!(sst, &[6.0, 7.0, 8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_drop_time_index_out_of_range() {
        let ds = two_day_dataset();
        assert!(ds.drop_time_index(2).is_err());
    }

    #[test]
    fn test_concat_and_sort() {
        let ds = two_day_dataset();
        let mut later = ds.drop_time_index(0).unwrap();
        if let Some(time) = later.coords.get_mut("time") {
            time.values = ArrayValues::Int64(vec![50]);
        }
        // Concatenating an earlier day after a later one, then sorting,
        // must move its slice to the front.
        let merged = ds
            .drop_time_index(0)
            .unwrap()
            .concat_time(&later)
            .unwrap()
            .sort_by_time()
            .unwrap();
        assert_eq!(merged.time_values().unwrap(), vec![50, 200]);
        let sst = merged.data_vars["sst"].f32s().unwrap();
        assert_eq!(&sst[..6], &[6.0, 7.0, 8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_concat_rejects_coordinate_mismatch() {
        let ds = two_day_dataset();
        let mut other = ds.clone();
        if let Some(lat) = other.coords.get_mut("lat") {
            lat.values = ArrayValues::Float32(vec![0.0, 5.0]);
        }
        assert!(ds.concat_time(&other).is_err());
    }

    #[test]
    fn test_concat_rejects_variable_mismatch() {
        let ds = two_day_dataset();
        let mut other = ds.clone();
        other.data_vars.remove("sst");
        assert!(ds.concat_time(&other).is_err());
    }

    #[test]
    fn test_variable_shape_validation() {
        let bad = Variable::new(
            "sst",
            vec!["time".into(), "lat".into()],
            vec![1, 3],
            ArrayValues::Float32(vec![0.0; 4]),
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_time_slice() {
        let ds = two_day_dataset();
        let slice = ds.time_slice("sst", 1).unwrap();
        assert_eq!(
            slice,
            ArrayValues::Float32(vec![6.0, 7.0, 8.0, 9.0, 10.0, 11.0])
        );
    }
}
