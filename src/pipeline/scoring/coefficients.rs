//! Coefficient table: intercept plus one log-odds contribution per bucket

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::model::{split_feature_name, ModelVariable, MODEL_VARIABLES};
use crate::error::{CoefficientError, PdoResult};

pub const INTERCEPT_KEY: &str = "intercept";

/// On-disk layout: `{"model": {"coeffs": {"<variable>_<suffix>": f64, "intercept": f64}}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoefficientFile {
    pub model: CoefficientSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoefficientSection {
    pub coeffs: BTreeMap<String, f64>,
}

/// Validated, immutable coefficients aligned with [`MODEL_VARIABLES`].
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientTable {
    intercept: f64,
    /// `values[v][b]` is the coefficient of bucket `b` of variable `v`.
    values: Vec<Vec<f64>>,
}

impl CoefficientTable {
    /// Validate a flat `name -> coefficient` mapping.
    ///
    /// Requires an intercept, rejects names that are not a model bucket and
    /// non-finite values, and requires every model variable to have at least
    /// one bucket. Buckets without an entry take the reference bucket's value,
    /// or `0.0` when the reference is not listed either.
    pub fn from_map(coeffs: &BTreeMap<String, f64>) -> Result<Self, CoefficientError> {
        let intercept = *coeffs.get(INTERCEPT_KEY).ok_or(CoefficientError::MissingIntercept)?;

        let mut given: Vec<Vec<Option<f64>>> = MODEL_VARIABLES
            .iter()
            .map(|v| vec![None; v.buckets.len()])
            .collect();

        for (name, &value) in coeffs {
            if !value.is_finite() {
                return Err(CoefficientError::NonFinite { name: name.clone(), value });
            }
            if name == INTERCEPT_KEY {
                continue;
            }
            let (variable, bucket) = split_feature_name(name)
                .ok_or_else(|| CoefficientError::UnknownCoefficient(name.clone()))?;
            let v = variable_index(variable);
            let b = bucket_index(variable, bucket.suffix);
            given[v][b] = Some(value);
        }

        let mut values = Vec::with_capacity(MODEL_VARIABLES.len());
        for (variable, buckets) in MODEL_VARIABLES.iter().zip(given) {
            if buckets.iter().all(Option::is_none) {
                return Err(CoefficientError::UnmappedVariable(variable.name.to_string()));
            }
            let reference = buckets[bucket_index(variable, variable.reference_bucket().suffix)];
            let filled = buckets
                .iter()
                .zip(variable.buckets)
                .map(|(value, bucket)| {
                    value.unwrap_or_else(|| {
                        log::debug!(
                            "coefficient {} not listed, using reference value",
                            variable.feature_name(bucket)
                        );
                        reference.unwrap_or(0.0)
                    })
                })
                .collect();
            values.push(filled);
        }

        Ok(Self { intercept, values })
    }

    /// Parse and validate the JSON document.
    pub fn from_json(json: &str) -> PdoResult<Self> {
        let file: CoefficientFile = serde_json::from_str(json)?;
        Ok(Self::from_map(&file.model.coeffs)?)
    }

    /// Load and validate a coefficient file.
    pub fn load(path: &Path) -> PdoResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Contribution of `label` for `variable`; null and unknown labels use the reference.
    pub fn contribution(&self, variable: &ModelVariable, label: Option<&str>) -> f64 {
        let v = variable_index(variable);
        let bucket = variable.resolve(label);
        self.values[v][bucket_index(variable, bucket.suffix)]
    }

    /// Coefficient of bucket `b` of model variable `v` (model order).
    pub fn value(&self, v: usize, b: usize) -> f64 {
        self.values[v][b]
    }

    /// Back to the flat on-disk form.
    pub fn to_file(&self) -> CoefficientFile {
        let mut coeffs = BTreeMap::new();
        for (variable, values) in MODEL_VARIABLES.iter().zip(&self.values) {
            for (bucket, value) in variable.buckets.iter().zip(values) {
                coeffs.insert(variable.feature_name(bucket), *value);
            }
        }
        coeffs.insert(INTERCEPT_KEY.to_string(), self.intercept);
        CoefficientFile {
            model: CoefficientSection { coeffs },
        }
    }
}

fn variable_index(variable: &ModelVariable) -> usize {
    MODEL_VARIABLES
        .iter()
        .position(|v| v.name == variable.name)
        .unwrap_or(0)
}

fn bucket_index(variable: &ModelVariable, suffix: &str) -> usize {
    variable
        .buckets
        .iter()
        .position(|b| b.suffix == suffix)
        .unwrap_or(0)
}
