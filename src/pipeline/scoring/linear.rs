//! Linear-model form of the scorer
//!
//! Buckets are one-hot expanded into a fixed 46-wide vector and fed to a
//! logistic-regression style model. A model derived from a coefficient table
//! reproduces the closed form exactly.

use std::collections::HashSet;
use std::path::Path;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::coefficients::CoefficientTable;
use super::model::{one_hot_feature_names, MODEL_VARIABLES};
use super::{append_score_columns, read_model_labels, sigmoid, Orientation, ScoreResult, PDO_COLUMN};
use crate::error::{ModelError, PdoResult};
use crate::pipeline::columns::float_values;

/// Pretrained linear classifier over the one-hot model features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub feature_order: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearModel {
    /// Model that reproduces the closed form of `table`.
    pub fn from_coefficients(table: &CoefficientTable) -> Self {
        let mut feature_order = Vec::new();
        let mut coefficients = Vec::new();
        for (v, variable) in MODEL_VARIABLES.iter().enumerate() {
            for (b, bucket) in variable.buckets.iter().enumerate() {
                feature_order.push(variable.feature_name(bucket));
                coefficients.push(table.value(v, b));
            }
        }
        Self {
            feature_order,
            coefficients,
            intercept: table.intercept(),
        }
    }

    pub fn from_json(json: &str) -> PdoResult<Self> {
        let model: LinearModel =
            serde_json::from_str(json).map_err(|e| ModelError::Malformed(e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    pub fn load(path: &Path) -> PdoResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn save(&self, path: &Path) -> PdoResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check that the model covers exactly the one-hot features with finite weights.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.feature_order.len() != self.coefficients.len() {
            return Err(ModelError::Malformed(format!(
                "{} feature names but {} coefficients",
                self.feature_order.len(),
                self.coefficients.len()
            )));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ModelError::Malformed("non-finite weight".to_string()));
        }

        let expected: HashSet<String> = one_hot_feature_names().into_iter().collect();
        let mut seen = HashSet::new();
        for name in &self.feature_order {
            if !expected.contains(name) {
                return Err(ModelError::Malformed(format!("unknown feature '{}'", name)));
            }
            if !seen.insert(name.as_str()) {
                return Err(ModelError::Malformed(format!("duplicate feature '{}'", name)));
            }
        }
        if seen.len() != expected.len() {
            return Err(ModelError::Malformed(format!(
                "expected {} features, found {}",
                expected.len(),
                seen.len()
            )));
        }
        Ok(())
    }

    /// Linear decision value for one feature vector in `feature_order` order.
    pub fn decision_function(&self, x: &[f64]) -> f64 {
        self.intercept + self.coefficients.iter().zip(x).map(|(w, v)| w * v).sum::<f64>()
    }

    /// Class probabilities `[p0, p1]`.
    pub fn predict_proba(&self, x: &[f64]) -> [f64; 2] {
        let z = self.decision_function(x);
        [sigmoid(-z), sigmoid(z)]
    }
}

/// One-hot encode bucket labels (model order) into `feature_order` positions.
///
/// Null and unknown labels light the variable's reference bucket.
pub fn one_hot(labels: &[Option<&str>], feature_order: &[String]) -> Vec<f64> {
    let mut x = vec![0.0; feature_order.len()];
    for (variable, label) in MODEL_VARIABLES.iter().zip(labels) {
        let name = variable.feature_name(variable.resolve(*label));
        if let Some(pos) = feature_order.iter().position(|f| *f == name) {
            x[pos] = 1.0;
        }
    }
    x
}

/// Score `df` with the linear form.
///
/// Fails with [`ModelError::Absent`] when no model is given, and with a schema
/// error when a model variable column is missing. Adds the one-hot columns,
/// the per-variable contributions and the scoring columns.
pub fn score_with_model(
    df: DataFrame,
    model: Option<&LinearModel>,
    orientation: Orientation,
) -> PdoResult<DataFrame> {
    let model = model.ok_or(ModelError::Absent)?;
    model.validate()?;
    let labels = read_model_labels(&df)?;
    let rows = df.height();
    let class = orientation.class_index();

    let mut matrix: Vec<Vec<f64>> = vec![Vec::with_capacity(rows); model.feature_order.len()];
    let mut results = Vec::with_capacity(rows);
    for row in 0..rows {
        let row_labels: Vec<Option<&str>> = labels.iter().map(|col| col[row].as_deref()).collect();
        let x = one_hot(&row_labels, &model.feature_order);
        for (j, v) in x.iter().enumerate() {
            matrix[j].push(*v);
        }
        let z = model.decision_function(&x);
        let proba = model.predict_proba(&x);
        results.push(ScoreResult::from_probability(z, proba[class]));
    }

    let mut df = df;
    for (name, values) in model.feature_order.iter().zip(&matrix) {
        df.with_column(Column::new(name.as_str().into(), values.clone()))?;
    }
    for variable in MODEL_VARIABLES.iter() {
        let prefix = format!("{}_", variable.name);
        let contribution: Vec<f64> = (0..rows)
            .map(|row| {
                model
                    .feature_order
                    .iter()
                    .zip(&model.coefficients)
                    .enumerate()
                    .filter(|(_, (name, _))| {
                        name.starts_with(&prefix)
                            && variable.bucket_by_suffix(&name[prefix.len()..]).is_some()
                    })
                    .map(|(j, (_, w))| w * matrix[j][row])
                    .sum()
            })
            .collect();
        df.with_column(Column::new(variable.coefficient_column().into(), contribution))?;
    }
    append_score_columns(df, model.intercept, &results)
}

/// Largest absolute `PDO` difference between two scored tables of equal height.
pub fn max_pdo_deviation(a: &DataFrame, b: &DataFrame) -> PdoResult<f64> {
    let left = float_values(a, "closed_form", PDO_COLUMN)?;
    let right = float_values(b, "linear_model", PDO_COLUMN)?;
    Ok(left
        .iter()
        .zip(&right)
        .filter_map(|(x, y)| Some((x.as_ref()? - y.as_ref()?).abs()))
        .fold(0.0, f64::max))
}
