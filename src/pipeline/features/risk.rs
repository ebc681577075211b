//! Overdraft-risk feature: days over the authorised limit

use polars::prelude::*;

use super::KeyGroups;
use crate::error::PdoResult;
use crate::pipeline::columns::{float_values, key_values, require_columns};
use crate::pipeline::join::{FeatureTable, FeatureValues};

pub const RSC_TABLE: &str = "rsc";
pub const RSC_KEY: &str = "i_intrn";
pub const RSC_METRIC: &str = "k_dep_auth_10j";
pub const RSC_OUTPUT: &str = "Q_JJ_DEPST_MM";

/// Per-entity maximum of the overdraft-days metric.
///
/// Negative day counts are reported with a warning and kept as they are.
pub fn aggregate_overdraft_days(rsc: &DataFrame) -> PdoResult<FeatureTable> {
    require_columns(rsc, RSC_TABLE, &[RSC_KEY, RSC_METRIC])?;
    let keys = key_values(rsc, RSC_TABLE, RSC_KEY)?;
    let days = float_values(rsc, RSC_TABLE, RSC_METRIC)?;

    let mut groups: KeyGroups<Option<f64>> = KeyGroups::new();
    let mut negative = 0usize;
    for (key, value) in keys.iter().zip(days) {
        let Some(key) = key else { continue };
        if matches!(value, Some(v) if v < 0.0) {
            negative += 1;
        }
        let max = groups.entry(key);
        if let Some(v) = value {
            *max = Some(max.map_or(v, |m| m.max(v)));
        }
    }

    if negative > 0 {
        log::warn!(
            "{}: {} record(s) with negative {} kept unfiltered",
            RSC_TABLE,
            negative,
            RSC_METRIC
        );
    }

    let (keys, maxima) = groups.into_parts();
    Ok(FeatureTable::new(RSC_TABLE, RSC_KEY, keys).with_values(RSC_OUTPUT, FeatureValues::Float(maxima)))
}

/// Attach `Q_JJ_DEPST_MM` to the main table.
pub fn add_overdraft_feature(main: DataFrame, rsc: &DataFrame) -> PdoResult<DataFrame> {
    aggregate_overdraft_days(rsc)?.left_join(main)
}
