//! Consolidated and company financial ratios (SAFIR)

use polars::prelude::*;

use super::KeyGroups;
use crate::error::PdoResult;
use crate::pipeline::columns::{float_values, key_values, require_columns};
use crate::pipeline::join::{FeatureTable, FeatureValues};

pub const SAFIR_KEY: &str = "i_uniq_kpi";

/// A financial-ratio source and the single ratio column it contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatioSource {
    pub table: &'static str,
    pub column: &'static str,
}

/// Consolidated statements: turnover ratio and self-financing over medium/long-term debt.
pub const SAFIR_CONSO: [RatioSource; 2] = [
    RatioSource { table: "safir_cc", column: "rn_ca_conso_023b" },
    RatioSource { table: "safir_cd", column: "caf_dmlt_005" },
];

/// Company statements: result and fixed assets over total liabilities.
pub const SAFIR_SOC: [RatioSource; 2] = [
    RatioSource { table: "safir_sc", column: "res_total_passif_035" },
    RatioSource { table: "safir_sd", column: "immob_total_passif_055" },
];

#[derive(Default)]
struct FirstValue {
    seen: bool,
    value: Option<f64>,
}

/// One ratio per entity; a repeated key keeps its first row.
pub fn dedup_ratio(df: &DataFrame, source: RatioSource) -> PdoResult<FeatureTable> {
    require_columns(df, source.table, &[SAFIR_KEY, source.column])?;
    let keys = key_values(df, source.table, SAFIR_KEY)?;
    let values = float_values(df, source.table, source.column)?;

    let mut groups: KeyGroups<FirstValue> = KeyGroups::new();
    let mut duplicates = 0usize;
    for (key, value) in keys.iter().zip(values) {
        let Some(key) = key else { continue };
        let first = groups.entry(key);
        if first.seen {
            duplicates += 1;
        } else {
            first.seen = true;
            first.value = value;
        }
    }
    if duplicates > 0 {
        log::info!("{}: {} duplicate key row(s) dropped (first kept)", source.table, duplicates);
    }

    let (keys, firsts) = groups.into_parts();
    let values = firsts.into_iter().map(|f| f.value).collect();
    Ok(FeatureTable::new(source.table, SAFIR_KEY, keys).with_values(source.column, FeatureValues::Float(values)))
}

/// Attach one ratio column to the main table.
pub fn add_ratio_feature(main: DataFrame, df: &DataFrame, source: RatioSource) -> PdoResult<DataFrame> {
    dedup_ratio(df, source)?.left_join(main)
}
