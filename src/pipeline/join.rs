//! Key-indexed left join of aggregated features onto the main entity table
//!
//! Every feature stage reduces its source to one row per key, collects the
//! result in a [`FeatureTable`] and attaches it with [`FeatureTable::left_join`].
//! The join never adds or removes a row of the main table and keeps its row
//! order; unmatched entities receive nulls.

use std::collections::HashMap;

use polars::prelude::*;

use super::columns::{has_column, key_values};
use crate::error::{PdoResult, SchemaError};

/// Values of one aggregated feature column, aligned with [`FeatureTable`] keys.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValues {
    Float(Vec<Option<f64>>),
    Int(Vec<Option<i64>>),
    Text(Vec<Option<String>>),
}

impl FeatureValues {
    fn len(&self) -> usize {
        match self {
            FeatureValues::Float(v) => v.len(),
            FeatureValues::Int(v) => v.len(),
            FeatureValues::Text(v) => v.len(),
        }
    }

    /// Gather values for the main table rows; `None` positions become null.
    fn gather(&self, name: &str, positions: &[Option<usize>]) -> Column {
        match self {
            FeatureValues::Float(v) => {
                let out: Vec<Option<f64>> =
                    positions.iter().map(|p| p.and_then(|i| v[i])).collect();
                Column::new(name.into(), out)
            }
            FeatureValues::Int(v) => {
                let out: Vec<Option<i64>> =
                    positions.iter().map(|p| p.and_then(|i| v[i])).collect();
                Column::new(name.into(), out)
            }
            FeatureValues::Text(v) => {
                let out: Vec<Option<String>> = positions
                    .iter()
                    .map(|p| p.and_then(|i| v[i].clone()))
                    .collect();
                Column::new(name.into(), out)
            }
        }
    }
}

/// Aggregated features for one source: one row per distinct key.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    source: String,
    key: String,
    keys: Vec<String>,
    columns: Vec<(String, FeatureValues)>,
}

impl FeatureTable {
    /// Start a table for `source`, joined on `key`, with rows in `keys` order.
    pub fn new(source: &str, key: &str, keys: Vec<String>) -> Self {
        Self {
            source: source.to_string(),
            key: key.to_string(),
            keys,
            columns: Vec::new(),
        }
    }

    /// Add a feature column. Its length must match the key count.
    pub fn with_values(mut self, name: &str, values: FeatureValues) -> Self {
        debug_assert_eq!(values.len(), self.keys.len(), "feature '{}' misaligned", name);
        self.columns.push((name.to_string(), values));
        self
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Values of a feature column, for inspection in tests and reports.
    pub fn values(&self, name: &str) -> Option<&FeatureValues> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Position of `key` in this table, if present.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    /// Left join onto `main`.
    ///
    /// Fails when a key repeats in this table or when a feature column name
    /// already exists on `main`.
    pub fn left_join(self, main: DataFrame) -> PdoResult<DataFrame> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(self.keys.len());
        for (i, k) in self.keys.iter().enumerate() {
            if index.insert(k.as_str(), i).is_some() {
                return Err(SchemaError::DuplicateKey {
                    table: self.source.clone(),
                    key: self.key.clone(),
                    value: k.clone(),
                }
                .into());
            }
        }

        for (name, _) in &self.columns {
            if has_column(&main, name) {
                return Err(SchemaError::ColumnCollision {
                    table: "df_main".to_string(),
                    column: name.clone(),
                }
                .into());
            }
        }

        let main_keys = key_values(&main, "df_main", &self.key)?;
        let positions: Vec<Option<usize>> = main_keys
            .iter()
            .map(|k| k.as_deref().and_then(|k| index.get(k).copied()))
            .collect();

        let mut joined = main;
        for (name, values) in &self.columns {
            joined.with_column(values.gather(name, &positions))?;
        }
        Ok(joined)
    }
}
