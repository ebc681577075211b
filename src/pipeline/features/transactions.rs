//! Transaction features: per-category sums and derived indicator flags
//!
//! Source rows are already aggregated per entity and raw category. Raw
//! categories are merged into five canonical groups (everything else is
//! discarded), summed per entity and group, and spread into
//! `<group>__<measure>` columns.

use polars::prelude::*;

use super::{add_nullable, KeyGroups};
use crate::error::PdoResult;
use crate::pipeline::columns::{float_values, key_values, require_columns, text_values};
use crate::pipeline::join::{FeatureTable, FeatureValues};

pub const TRANSAC_TABLE: &str = "donnees_transac";
pub const TRANSAC_KEY: &str = "i_uniq_kpi";
pub const CATEGORY: &str = "category";

/// Canonical groups, in output column order.
pub const TRANSACTION_GROUPS: [&str; 5] = [
    "interets__",
    "turnover__",
    "prlv_sepa_retourne__",
    "rembt_prlv_sepa__",
    "saisie__",
];

const INTEREST: usize = 0;
const TURNOVER: usize = 1;
const RETURNED_DEBIT: usize = 2;
const DEBIT_REFUND: usize = 3;
const SEIZURE: usize = 4;

/// Input measure column and its output suffix.
const MEASURES: [(&str, &str); 4] = [
    ("netamount", "netamount"),
    ("nops_category", "nops"),
    ("min_amount", "min_amount"),
    ("max_amount", "max_amount"),
];
const NET_AMOUNT: usize = 0;
const NOPS: usize = 1;
const MAX_AMOUNT: usize = 3;

pub const NOPS_TOTAL: &str = "nops_total";
pub const NOPS_OUTPUT: &str = "nops";
pub const RATIO_OUTPUT: &str = "net_interets_sur_turnover";
pub const LARGE_REFUND_FLAG: &str = "remb_sepa_max";
pub const RETURNED_DEBIT_FLAG: &str = "pres_prlv_retourne";
pub const SEIZURE_FLAG: &str = "pres_saisie";
pub const INTEREST_RATIO_FLAG: &str = "net_int_turnover";
pub const TRANSAC_CHECK: &str = "flag_transac";

/// Refund amount above which `remb_sepa_max` is raised.
pub const LARGE_REFUND_THRESHOLD: f64 = 3493.57007;
/// Minimum total operation count for the interest-ratio flag.
pub const MIN_OPERATIONS: f64 = 60.0;
/// Interest-to-turnover ratio below which the interest-ratio flag is raised.
pub const INTEREST_RATIO_THRESHOLD: f64 = -0.00143675995;

const FLAG_RAISED: &str = "1";
const FLAG_CLEAR: &str = "2";

/// Canonical group index for a raw category, if it is kept.
pub fn canonical_group(category: &str) -> Option<usize> {
    match category {
        "interets" => Some(INTEREST),
        "turnover" => Some(TURNOVER),
        "prlv_sepa_retourne" => Some(RETURNED_DEBIT),
        "rembt_prlv_sepa" => Some(DEBIT_REFUND),
        "attri_blocage" | "atd_tres_pub" => Some(SEIZURE),
        _ => None,
    }
}

/// Interest over turnover, `0.0` whenever either side is null or zero.
pub fn interest_turnover_ratio(interest: Option<f64>, turnover: Option<f64>) -> f64 {
    match (interest, turnover) {
        (Some(i), Some(t)) if i != 0.0 && t != 0.0 => {
            let ratio = i / t;
            if ratio.is_finite() {
                ratio
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

fn flag(raised: bool) -> Option<String> {
    Some(if raised { FLAG_RAISED } else { FLAG_CLEAR }.to_string())
}

/// Sums of the four measures for one canonical group; `None` until the group is seen.
type GroupSums = Option<[Option<f64>; 4]>;

#[derive(Default)]
struct EntityTransactions {
    groups: [GroupSums; 5],
    nops: Option<f64>,
}

impl EntityTransactions {
    fn measure(&self, group: usize, measure: usize) -> Option<f64> {
        self.groups[group].and_then(|sums| sums[measure])
    }
}

/// Reduce transaction rows to one row of features per entity.
pub fn aggregate_transactions(transac: &DataFrame) -> PdoResult<FeatureTable> {
    let mut required = vec![TRANSAC_KEY, CATEGORY, NOPS_TOTAL];
    required.extend(MEASURES.iter().map(|(input, _)| *input));
    require_columns(transac, TRANSAC_TABLE, &required)?;

    let keys = key_values(transac, TRANSAC_TABLE, TRANSAC_KEY)?;
    let categories = text_values(transac, TRANSAC_TABLE, CATEGORY)?;
    let nops_total = float_values(transac, TRANSAC_TABLE, NOPS_TOTAL)?;
    let measures = MEASURES
        .iter()
        .map(|(input, _)| float_values(transac, TRANSAC_TABLE, input))
        .collect::<PdoResult<Vec<_>>>()?;

    let mut entities: KeyGroups<EntityTransactions> = KeyGroups::new();
    let mut discarded = 0usize;
    for (row, key) in keys.iter().enumerate() {
        let Some(key) = key else { continue };
        let Some(group) = categories[row].as_deref().and_then(canonical_group) else {
            discarded += 1;
            continue;
        };
        let entity = entities.entry(key);
        let sums = entity.groups[group].get_or_insert([None; 4]);
        for (m, values) in measures.iter().enumerate() {
            add_nullable(&mut sums[m], values[row]);
        }
        add_nullable(&mut entity.nops, nops_total[row]);
    }
    log::debug!("{}: {} row(s) outside the kept categories", TRANSAC_TABLE, discarded);

    let (keys, states) = entities.into_parts();
    let mut table = FeatureTable::new(TRANSAC_TABLE, TRANSAC_KEY, keys);

    for (g, group) in TRANSACTION_GROUPS.iter().enumerate() {
        for (m, (_, suffix)) in MEASURES.iter().enumerate() {
            let values = states.iter().map(|s| s.measure(g, m)).collect();
            table = table.with_values(&format!("{}{}", group, suffix), FeatureValues::Float(values));
        }
    }

    let nops: Vec<Option<f64>> = states.iter().map(|s| s.nops).collect();
    let ratios: Vec<f64> = states
        .iter()
        .map(|s| interest_turnover_ratio(s.measure(INTEREST, NET_AMOUNT), s.measure(TURNOVER, NET_AMOUNT)))
        .collect();

    let large_refund = states
        .iter()
        .map(|s| flag(matches!(s.measure(DEBIT_REFUND, MAX_AMOUNT), Some(v) if v > LARGE_REFUND_THRESHOLD)))
        .collect();
    let returned_debit = states
        .iter()
        .map(|s| flag(matches!(s.measure(RETURNED_DEBIT, NOPS), Some(v) if v > 0.0)))
        .collect();
    let seizure = states
        .iter()
        .map(|s| flag(matches!(s.measure(SEIZURE, NOPS), Some(v) if v > 0.0)))
        .collect();
    let interest_ratio = nops
        .iter()
        .zip(&ratios)
        .map(|(n, r)| flag(matches!(n, Some(n) if *n >= MIN_OPERATIONS) && *r < INTEREST_RATIO_THRESHOLD))
        .collect();

    Ok(table
        .with_values(NOPS_OUTPUT, FeatureValues::Float(nops))
        .with_values(RATIO_OUTPUT, FeatureValues::Float(ratios.into_iter().map(Some).collect()))
        .with_values(LARGE_REFUND_FLAG, FeatureValues::Text(large_refund))
        .with_values(RETURNED_DEBIT_FLAG, FeatureValues::Text(returned_debit))
        .with_values(SEIZURE_FLAG, FeatureValues::Text(seizure))
        .with_values(INTEREST_RATIO_FLAG, FeatureValues::Text(interest_ratio)))
}

/// Attach the transaction features and stamp `flag_transac = "OK"` on every row.
pub fn add_transaction_features(main: DataFrame, transac: &DataFrame) -> PdoResult<DataFrame> {
    let mut joined = aggregate_transactions(transac)?.left_join(main)?;
    let check = Column::new(TRANSAC_CHECK.into(), vec!["OK"; joined.height()]);
    joined.with_column(check)?;
    Ok(joined)
}
