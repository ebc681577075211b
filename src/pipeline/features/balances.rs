//! Account balance features: net balance and account count per entity

use polars::prelude::*;

use super::{add_nullable, KeyGroups};
use crate::error::PdoResult;
use crate::pipeline::columns::{float_values, key_values, require_columns, text_values};
use crate::pipeline::join::{FeatureTable, FeatureValues};

pub const SOLDES_TABLE: &str = "soldes";
pub const SOLDES_KEY: &str = "i_intrn";
pub const ACCOUNT_ID: &str = "pref_i_uniq_cpt";
pub const BALANCE_CENTS: &str = "pref_m_ctrvl_sld_arr";
pub const BALANCE_OUTPUT: &str = "solde_cav";
pub const ACCOUNT_COUNT_OUTPUT: &str = "solde_nb";

/// Minor units per currency unit.
const CENTS_PER_UNIT: f64 = 100.0;

#[derive(Default)]
struct BalanceState {
    total: Option<f64>,
    accounts: i64,
}

/// Signed sum of balances (in currency units) and account row count.
///
/// Every row with a non-null account id counts, so a repeated id counts again.
pub fn aggregate_balances(soldes: &DataFrame) -> PdoResult<FeatureTable> {
    require_columns(soldes, SOLDES_TABLE, &[SOLDES_KEY, ACCOUNT_ID, BALANCE_CENTS])?;
    let keys = key_values(soldes, SOLDES_TABLE, SOLDES_KEY)?;
    let accounts = text_values(soldes, SOLDES_TABLE, ACCOUNT_ID)?;
    let cents = float_values(soldes, SOLDES_TABLE, BALANCE_CENTS)?;

    let mut groups: KeyGroups<BalanceState> = KeyGroups::new();
    for ((key, account), amount) in keys.iter().zip(accounts).zip(cents) {
        let Some(key) = key else { continue };
        let state = groups.entry(key);
        add_nullable(&mut state.total, amount.map(|c| c / CENTS_PER_UNIT));
        if account.is_some() {
            state.accounts += 1;
        }
    }

    let (keys, states) = groups.into_parts();
    let totals: Vec<Option<f64>> = states.iter().map(|s| s.total).collect();
    let counts: Vec<Option<i64>> = states.iter().map(|s| Some(s.accounts)).collect();

    Ok(FeatureTable::new(SOLDES_TABLE, SOLDES_KEY, keys)
        .with_values(BALANCE_OUTPUT, FeatureValues::Float(totals))
        .with_values(ACCOUNT_COUNT_OUTPUT, FeatureValues::Int(counts)))
}

/// Attach `solde_cav` and `solde_nb` to the main table.
pub fn add_balance_features(main: DataFrame, soldes: &DataFrame) -> PdoResult<DataFrame> {
    aggregate_balances(soldes)?.left_join(main)
}
