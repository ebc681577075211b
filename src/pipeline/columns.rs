//! Column access helpers shared by every stage
//!
//! Sources arrive with loosely typed columns (CSV text, Parquet decimals,
//! integer codes). Stages read them through these helpers so that casting
//! rules are the same everywhere: text is taken verbatim, numbers are cast
//! non-strictly (unparseable values become null).

use polars::prelude::*;

use crate::error::{PdoError, PdoResult};

/// Fail with a schema error unless every column in `required` exists in `df`.
pub fn require_columns(df: &DataFrame, table: &str, required: &[&str]) -> PdoResult<()> {
    for column in required {
        if !has_column(df, column) {
            return Err(PdoError::missing_column(table, column));
        }
    }
    Ok(())
}

/// Whether `df` carries a column named `name`.
pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

/// Read a column as optional strings.
///
/// Integer codes are rendered without a decimal part, so `26i64` reads as `"26"`.
pub fn text_values(df: &DataFrame, table: &str, name: &str) -> PdoResult<Vec<Option<String>>> {
    let col = df
        .column(name)
        .map_err(|_| PdoError::missing_column(table, name))?;

    let values: Vec<Option<String>> = match col.dtype() {
        DataType::String => col
            .str()?
            .into_iter()
            .map(|v| v.map(|s| s.to_string()))
            .collect(),
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            let cast = col.cast(&DataType::Int64)?;
            cast.i64()?
                .into_iter()
                .map(|v| v.map(|n| n.to_string()))
                .collect()
        }
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
            let cast = col.cast(&DataType::UInt64)?;
            cast.u64()?
                .into_iter()
                .map(|v| v.map(|n| n.to_string()))
                .collect()
        }
        _ => {
            let cast = col.cast(&DataType::String)?;
            cast.str()?
                .into_iter()
                .map(|v| v.map(|s| s.to_string()))
                .collect()
        }
    };

    Ok(values)
}

/// Read a column as optional `f64`, casting non-strictly.
///
/// Text that does not parse as a number becomes `None`.
pub fn float_values(df: &DataFrame, table: &str, name: &str) -> PdoResult<Vec<Option<f64>>> {
    let col = df
        .column(name)
        .map_err(|_| PdoError::missing_column(table, name))?;
    let cast = col.cast(&DataType::Float64)?;
    Ok(cast.f64()?.into_iter().collect())
}

/// Read the entity key column of a table, as text.
pub fn key_values(df: &DataFrame, table: &str, key: &str) -> PdoResult<Vec<Option<String>>> {
    text_values(df, table, key)
}

/// Replace a column's content with normalized text, keeping its name and position.
pub fn normalize_to_text(df: &mut DataFrame, table: &str, name: &str) -> PdoResult<()> {
    let values = text_values(df, table, name)?;
    df.with_column(Column::new(name.into(), values))?;
    Ok(())
}
