//! Row keys shared by the hash join and hash repartitioning

use arrow::array::{Array, ArrayRef, Float64Array, Int32Array, Int64Array, StringArray};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Join key for hash tables and partitioning
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct JoinKey {
    values: Vec<JoinValue>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum JoinValue {
    Null,
    Int64(i64),
    Float64(ordered_float::OrderedFloat<f64>),
    String(String),
}

impl JoinKey {
    /// Null never equals null, so keys with a null component never match
    pub(crate) fn has_null(&self) -> bool {
        self.values.iter().any(|v| matches!(v, JoinValue::Null))
    }

    /// Stable hash, identical on both sides of a shuffle
    pub(crate) fn partition(&self, partitions: usize) -> usize {
        if self.has_null() || partitions <= 1 {
            return 0;
        }
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        (hasher.finish() % partitions as u64) as usize
    }
}

pub(crate) fn extract_join_key(arrays: &[ArrayRef], row: usize) -> JoinKey {
    let values = arrays
        .iter()
        .map(|arr| {
            if arr.is_null(row) {
                return JoinValue::Null;
            }
            if let Some(a) = arr.as_any().downcast_ref::<StringArray>() {
                return JoinValue::String(a.value(row).to_string());
            }
            if let Some(a) = arr.as_any().downcast_ref::<Int64Array>() {
                return JoinValue::Int64(a.value(row));
            }
            if let Some(a) = arr.as_any().downcast_ref::<Int32Array>() {
                return JoinValue::Int64(a.value(row) as i64);
            }
            if let Some(a) = arr.as_any().downcast_ref::<Float64Array>() {
                return JoinValue::Float64(ordered_float::OrderedFloat(a.value(row)));
            }
            JoinValue::Null
        })
        .collect();

    JoinKey { values }
}
