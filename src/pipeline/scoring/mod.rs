//! Probability-of-default scoring
//!
//! Two equivalent forms are provided. The closed form adds the intercept and
//! one coefficient per model variable; the linear form one-hot expands the
//! buckets and applies a [`LinearModel`]. Both feed the same probability
//! transform, floor and rounding.

pub mod coefficients;
pub mod linear;
pub mod model;

pub use coefficients::*;
pub use linear::*;
pub use model::*;

use std::fmt;
use std::str::FromStr;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::columns::{float_values, require_columns, text_values};
use crate::error::PdoResult;

/// Regulatory minimum probability.
pub const PDO_FLOOR: f64 = 0.0001;
/// Decimal places kept in `PDO`.
pub const PDO_DECIMALS: i32 = 4;

pub const INTERCEPT_COLUMN: &str = "intercept";
pub const LOG_ODDS_COLUMN: &str = "sum_total_coeffs";
pub const RAW_PDO_COLUMN: &str = "PDO_compute";
pub const PDO_COLUMN: &str = "PDO";
pub const PDO_FLAG_COLUMN: &str = "flag_pdo_OK";

/// Logistic function, stable over the whole `f64` range.
///
/// Each branch only exponentiates a non-positive number, so nothing overflows
/// and the result stays within `[0, 1]`.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Apply the floor, then round to [`PDO_DECIMALS`] places.
pub fn floor_and_round(probability: f64) -> f64 {
    let p = if probability.is_nan() { PDO_FLOOR } else { probability };
    let scale = 10f64.powi(PDO_DECIMALS);
    let rounded = (p.max(PDO_FLOOR) * scale).round() / scale;
    rounded.clamp(PDO_FLOOR, 1.0)
}

/// Which outcome the calibrated log-odds describe.
///
/// Has no default; every run states it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    /// Log-odds of default: `PDO = sigmoid(log_odds)`.
    DefaultEvent,
    /// Log-odds of non-default: `PDO = 1 - sigmoid(log_odds)`.
    NonDefaultEvent,
}

impl Orientation {
    /// Probability of default for a log-odds value.
    pub fn probability(self, log_odds: f64) -> f64 {
        match self {
            Orientation::DefaultEvent => sigmoid(log_odds),
            Orientation::NonDefaultEvent => sigmoid(-log_odds),
        }
    }

    /// Index of the default class in `[p0, p1]` classifier output.
    pub fn class_index(self) -> usize {
        match self {
            Orientation::DefaultEvent => 1,
            Orientation::NonDefaultEvent => 0,
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::DefaultEvent => write!(f, "default-event"),
            Orientation::NonDefaultEvent => write!(f, "non-default-event"),
        }
    }
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default-event" => Ok(Orientation::DefaultEvent),
            "non-default-event" => Ok(Orientation::NonDefaultEvent),
            _ => Err(format!(
                "Unknown orientation: '{}'. Use 'default-event' or 'non-default-event'.",
                s
            )),
        }
    }
}

/// Which scoring form computes `PDO`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoringMethod {
    #[default]
    ClosedForm,
    LinearModel,
}

impl FromStr for ScoringMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "closed-form" => Ok(ScoringMethod::ClosedForm),
            "linear-model" => Ok(ScoringMethod::LinearModel),
            _ => Err(format!(
                "Unknown scoring method: '{}'. Use 'closed-form' or 'linear-model'.",
                s
            )),
        }
    }
}

/// Score of one entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreResult {
    pub raw_log_odds: f64,
    pub raw_probability: f64,
    pub floored_probability: f64,
    pub success: bool,
}

impl ScoreResult {
    pub fn from_log_odds(log_odds: f64, orientation: Orientation) -> Self {
        Self::from_probability(log_odds, orientation.probability(log_odds))
    }

    pub fn from_probability(log_odds: f64, probability: f64) -> Self {
        let floored = floor_and_round(probability);
        Self {
            raw_log_odds: log_odds,
            raw_probability: probability,
            floored_probability: floored,
            success: probability.is_finite() && floored >= PDO_FLOOR,
        }
    }
}

/// Closed-form scorer over a validated coefficient table.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    coefficients: CoefficientTable,
    orientation: Orientation,
}

impl ScoringEngine {
    pub fn new(coefficients: CoefficientTable, orientation: Orientation) -> Self {
        Self {
            coefficients,
            orientation,
        }
    }

    pub fn coefficients(&self) -> &CoefficientTable {
        &self.coefficients
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Per-variable contributions for one entity, in model order.
    pub fn contributions(&self, labels: &[Option<&str>]) -> Vec<f64> {
        MODEL_VARIABLES
            .iter()
            .zip(labels)
            .map(|(v, label)| self.coefficients.contribution(v, *label))
            .collect()
    }

    /// Score one entity from its bucket labels (model order).
    pub fn score(&self, labels: &[Option<&str>]) -> ScoreResult {
        let log_odds = self.coefficients.intercept() + self.contributions(labels).iter().sum::<f64>();
        ScoreResult::from_log_odds(log_odds, self.orientation)
    }

    /// Score every row of `df` and append the scoring columns.
    ///
    /// Every model variable column must be present.
    pub fn score_frame(&self, df: DataFrame) -> PdoResult<DataFrame> {
        let labels = read_model_labels(&df)?;
        let rows = df.height();

        let mut contributions: Vec<Vec<f64>> = vec![Vec::with_capacity(rows); MODEL_VARIABLES.len()];
        let mut results = Vec::with_capacity(rows);
        for row in 0..rows {
            let row_labels: Vec<Option<&str>> = labels.iter().map(|col| col[row].as_deref()).collect();
            let parts = self.contributions(&row_labels);
            for (v, c) in parts.iter().enumerate() {
                contributions[v].push(*c);
            }
            let log_odds = self.coefficients.intercept() + parts.iter().sum::<f64>();
            results.push(ScoreResult::from_log_odds(log_odds, self.orientation));
        }

        let mut df = df;
        for (variable, values) in MODEL_VARIABLES.iter().zip(contributions) {
            df.with_column(Column::new(variable.coefficient_column().into(), values))?;
        }
        append_score_columns(df, self.coefficients.intercept(), &results)
    }
}

/// Read the model variable columns as text, in model order.
pub(crate) fn read_model_labels(df: &DataFrame) -> PdoResult<Vec<Vec<Option<String>>>> {
    let names = model_variable_names();
    require_columns(df, "df_main", &names)?;
    names.iter().map(|name| text_values(df, "df_main", name)).collect()
}

/// Append `intercept`, `sum_total_coeffs`, `PDO_compute`, `PDO` and `flag_pdo_OK`.
pub(crate) fn append_score_columns(
    mut df: DataFrame,
    intercept: f64,
    results: &[ScoreResult],
) -> PdoResult<DataFrame> {
    let rows = results.len();
    df.with_column(Column::new(INTERCEPT_COLUMN.into(), vec![intercept; rows]))?;
    df.with_column(Column::new(
        LOG_ODDS_COLUMN.into(),
        results.iter().map(|r| r.raw_log_odds).collect::<Vec<_>>(),
    ))?;
    df.with_column(Column::new(
        RAW_PDO_COLUMN.into(),
        results.iter().map(|r| r.raw_probability).collect::<Vec<_>>(),
    ))?;
    df.with_column(Column::new(
        PDO_COLUMN.into(),
        results.iter().map(|r| r.floored_probability).collect::<Vec<_>>(),
    ))?;
    df.with_column(Column::new(
        PDO_FLAG_COLUMN.into(),
        results.iter().map(|r| r.success).collect::<Vec<_>>(),
    ))?;
    Ok(df)
}

/// Summary statistics of the `PDO` column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PdoStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub at_floor: usize,
}

impl PdoStats {
    /// Statistics over non-null `PDO` values; `None` for an empty table.
    pub fn from_frame(df: &DataFrame) -> PdoResult<Option<Self>> {
        let mut values: Vec<f64> = float_values(df, "df_main", PDO_COLUMN)?
            .into_iter()
            .flatten()
            .collect();
        if values.is_empty() {
            return Ok(None);
        }
        values.sort_by(|a, b| a.total_cmp(b));

        let count = values.len();
        let median = if count % 2 == 1 {
            values[count / 2]
        } else {
            (values[count / 2 - 1] + values[count / 2]) / 2.0
        };
        Ok(Some(Self {
            count,
            min: values[0],
            max: values[count - 1],
            mean: values.iter().sum::<f64>() / count as f64,
            median,
            at_floor: values.iter().filter(|v| **v <= PDO_FLOOR).count(),
        }))
    }

    pub fn log(&self) {
        log::info!(
            "PDO over {} entities: min={:.4} max={:.4} mean={:.4} median={:.4} ({} at floor)",
            self.count,
            self.min,
            self.max,
            self.mean,
            self.median,
            self.at_floor
        );
    }
}
