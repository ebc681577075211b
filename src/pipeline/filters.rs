//! Row selection on the main entity table: key preparation and PDO scope

use std::collections::HashSet;

use polars::prelude::*;

use super::columns::{key_values, normalize_to_text, require_columns, text_values};
use crate::error::PdoResult;

pub const MAIN_TABLE: &str = "df_main";
pub const INTERNAL_KEY: &str = "i_intrn";
pub const KPI_KEY: &str = "i_uniq_kpi";
pub const SEGMENT_COLUMN: &str = "c_seg_nae";

/// Rows kept by a row filter, with the input height for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterStats {
    pub input_rows: usize,
    pub output_rows: usize,
}

impl FilterStats {
    pub fn removed(&self) -> usize {
        self.input_rows - self.output_rows
    }

    pub fn removed_pct(&self) -> f64 {
        if self.input_rows == 0 {
            0.0
        } else {
            self.removed() as f64 / self.input_rows as f64 * 100.0
        }
    }
}

fn apply_mask(df: &DataFrame, mask: &[bool]) -> PdoResult<DataFrame> {
    let mask = BooleanChunked::from_slice("mask".into(), mask);
    Ok(df.filter(&mask)?)
}

/// Normalise both entity keys to text and keep the first row per `i_uniq_kpi`.
///
/// Rows with a null `i_uniq_kpi` are kept here; the scope filter drops them.
pub fn prepare_main_table(mut df: DataFrame) -> PdoResult<(DataFrame, FilterStats)> {
    require_columns(&df, MAIN_TABLE, &[INTERNAL_KEY, KPI_KEY])?;
    normalize_to_text(&mut df, MAIN_TABLE, INTERNAL_KEY)?;
    normalize_to_text(&mut df, MAIN_TABLE, KPI_KEY)?;

    let keys = key_values(&df, MAIN_TABLE, KPI_KEY)?;
    let mut seen = HashSet::with_capacity(keys.len());
    let mask: Vec<bool> = keys
        .iter()
        .map(|k| match k {
            Some(k) => seen.insert(k.as_str()),
            None => true,
        })
        .collect();

    let stats = FilterStats {
        input_rows: df.height(),
        output_rows: mask.iter().filter(|m| **m).count(),
    };
    if stats.removed() > 0 {
        log::warn!(
            "{}: {} duplicate {} row(s) removed (first kept)",
            MAIN_TABLE,
            stats.removed(),
            KPI_KEY
        );
        df = apply_mask(&df, &mask)?;
    }
    Ok((df, stats))
}

/// Keep entities that can be scored.
///
/// Drops rows with a null key and, when `segments` is non-empty, rows whose
/// `c_seg_nae` is not listed.
pub fn filter_pdo_scope(df: DataFrame, segments: &[String]) -> PdoResult<(DataFrame, FilterStats)> {
    let internal = key_values(&df, MAIN_TABLE, INTERNAL_KEY)?;
    let kpi = key_values(&df, MAIN_TABLE, KPI_KEY)?;
    let segment = if segments.is_empty() {
        None
    } else {
        Some(text_values(&df, MAIN_TABLE, SEGMENT_COLUMN)?)
    };

    let mask: Vec<bool> = (0..df.height())
        .map(|row| {
            let keyed = internal[row].is_some() && kpi[row].is_some();
            let in_scope = match &segment {
                Some(values) => values[row]
                    .as_deref()
                    .is_some_and(|s| segments.iter().any(|wanted| wanted == s)),
                None => true,
            };
            keyed && in_scope
        })
        .collect();

    let stats = FilterStats {
        input_rows: df.height(),
        output_rows: mask.iter().filter(|m| **m).count(),
    };
    log::info!(
        "PDO scope: {} of {} row(s) filtered out ({:.2}%)",
        stats.removed(),
        stats.input_rows,
        stats.removed_pct()
    );

    let df = if stats.removed() > 0 { apply_mask(&df, &mask)? } else { df };
    Ok((df, stats))
}
