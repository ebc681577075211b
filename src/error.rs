//! Error types for the PDO pipeline core.
//!
//! Schema and model problems are fatal for the stage that hits them; the
//! orchestrator logs them with the stage context and aborts the run.

use polars::prelude::PolarsError;
use thiserror::Error;

/// A table does not satisfy the column contract of the operation using it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// A required column is absent.
    #[error("missing required column '{column}' in table '{table}'")]
    MissingColumn { table: String, column: String },

    /// A feature join would overwrite a column already on the main table.
    #[error("column '{column}' already present in table '{table}'")]
    ColumnCollision { table: String, column: String },

    /// The aggregated side of a join holds the same key twice.
    #[error("join key '{key}' is not unique in aggregated '{table}' (value '{value}')")]
    DuplicateKey {
        table: String,
        key: String,
        value: String,
    },
}

/// The linear scoring model cannot be used.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// No model object was supplied to the linear scorer.
    #[error("scoring model is absent")]
    Absent,

    /// The model object is present but unusable.
    #[error("malformed scoring model: {0}")]
    Malformed(String),
}

/// The coefficient table failed validation at load time.
#[derive(Debug, Error, PartialEq)]
pub enum CoefficientError {
    #[error("coefficient table has no 'intercept' entry")]
    MissingIntercept,

    #[error("unknown coefficient '{0}': no model variable/bucket matches it")]
    UnknownCoefficient(String),

    #[error("coefficient '{name}' is not finite ({value})")]
    NonFinite { name: String, value: f64 },

    #[error("model variable '{0}' has no bucket coefficient")]
    UnmappedVariable(String),
}

/// Errors raised by the pipeline core.
#[derive(Debug, Error)]
pub enum PdoError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Coefficients(#[from] CoefficientError),

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type PdoResult<T> = Result<T, PdoError>;

impl PdoError {
    /// Shorthand for the most common schema failure.
    pub fn missing_column(table: &str, column: &str) -> Self {
        PdoError::Schema(SchemaError::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        })
    }
}
