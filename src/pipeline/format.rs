//! Formatting of joined features into the fifteen model variables
//!
//! Every model variable is produced by a [`CategoricalEncoder`] reading one
//! source column. Numeric cutpoints are carried by [`FormatCutpoints`] so a
//! run configuration can override them.

use anyhow::{ensure, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::encoding::{CategoricalEncoder, Predicate};
use super::scoring::MODEL_VARIABLES;
use crate::error::PdoResult;

/// Numeric cutpoints of the bucketed model variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatCutpoints {
    /// `nbj`: days over limit at or below this value are `<=12`.
    pub overdraft_days: f64,
    /// `solde_cav_char`: lower bounds of classes 2, 3 and 4 (ascending).
    pub balance: Vec<f64>,
    /// `reboot_score_char2`: upper bounds (exclusive) of classes 1 to 8 (ascending).
    pub reboot_probability: Vec<f64>,
    /// `rn_ca_conso_023b`: upper bounds (exclusive) of classes 1 and 2.
    pub net_result_to_turnover: Vec<f64>,
    /// `caf_dmlt_005`: values above this are class 2.
    pub cash_flow_to_debt: f64,
    /// `res_total_passif_035`: upper bounds (exclusive) of classes 1 to 3.
    pub result_to_liabilities: Vec<f64>,
    /// `immob_total_passif_055`: upper bounds (exclusive) of classes 1 and 2.
    pub fixed_assets_to_liabilities: Vec<f64>,
}

impl Default for FormatCutpoints {
    fn default() -> Self {
        Self {
            overdraft_days: 12.0,
            balance: vec![-9.0, 15_000.0, 76_000.0],
            reboot_probability: vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8],
            net_result_to_turnover: vec![0.0043, 0.03],
            cash_flow_to_debt: 0.6622,
            result_to_liabilities: vec![0.0, 0.02, 0.06],
            fixed_assets_to_liabilities: vec![0.1, 0.3],
        }
    }
}

impl FormatCutpoints {
    /// Check counts, finiteness and ordering of every cutpoint list.
    pub fn validate(&self) -> Result<()> {
        let lists: [(&str, &[f64], usize); 6] = [
            ("balance", self.balance.as_slice(), 3),
            ("reboot_probability", self.reboot_probability.as_slice(), 8),
            ("net_result_to_turnover", self.net_result_to_turnover.as_slice(), 2),
            ("result_to_liabilities", self.result_to_liabilities.as_slice(), 3),
            ("fixed_assets_to_liabilities", self.fixed_assets_to_liabilities.as_slice(), 2),
            ("overdraft_days", std::slice::from_ref(&self.overdraft_days), 1),
        ];
        for (name, values, expected) in lists {
            ensure!(
                values.len() == expected,
                "cutpoints '{}' need {} values, got {}",
                name,
                expected,
                values.len()
            );
            ensure!(values.iter().all(|v| v.is_finite()), "cutpoints '{}' must be finite", name);
            ensure!(
                values.windows(2).all(|w| w[0] < w[1]),
                "cutpoints '{}' must be strictly ascending",
                name
            );
        }
        ensure!(self.cash_flow_to_debt.is_finite(), "cutpoint 'cash_flow_to_debt' must be finite");
        Ok(())
    }
}

/// One model variable: its source column and encoder.
#[derive(Debug, Clone)]
pub struct FormatRule {
    pub source: &'static str,
    pub encoder: CategoricalEncoder,
}

/// Classes `1..=n+1` by exclusive upper bounds; null goes to `null_bucket`.
fn classes_below(target: &str, bounds: &[f64], null_bucket: Option<&str>) -> CategoricalEncoder {
    let top = (bounds.len() + 1).to_string();
    let mut encoder = CategoricalEncoder::new(target, &top);
    if let Some(bucket) = null_bucket {
        encoder = encoder.rule(Predicate::IsNull, bucket);
    }
    for (i, bound) in bounds.iter().enumerate() {
        encoder = encoder.rule(Predicate::Below(*bound), &(i + 1).to_string());
    }
    encoder
}

/// Binary flag kept as `"1"`, anything else (null included) is `"2"`.
fn flag(target: &str) -> CategoricalEncoder {
    CategoricalEncoder::new(target, "2").rule(Predicate::one_of(&["1"]), "1")
}

/// The fifteen formatting rules, in model order.
pub fn format_rules(cutpoints: &FormatCutpoints) -> Vec<FormatRule> {
    let mut balance = CategoricalEncoder::new("solde_cav_char", "1");
    for (i, bound) in cutpoints.balance.iter().enumerate().rev() {
        balance = balance.rule(Predicate::AtLeast(*bound), &(i + 2).to_string());
    }

    vec![
        FormatRule {
            source: "c_njur_prsne_enc",
            encoder: CategoricalEncoder::new("nat_jur_a", ">=7")
                .rule(Predicate::one_of(&["1-3"]), "1-3")
                .rule(Predicate::one_of(&["4-6"]), "4-6"),
        },
        FormatRule {
            source: "c_sectrl_1_enc",
            encoder: CategoricalEncoder::new("secto_b", "3")
                .rule(Predicate::one_of(&["1"]), "1")
                .rule(Predicate::one_of(&["2"]), "2")
                .rule(Predicate::one_of(&["4"]), "4"),
        },
        FormatRule {
            source: "c_seg_nae",
            encoder: CategoricalEncoder::new("seg_nae", "autres").rule(Predicate::one_of(&["ME"]), "ME"),
        },
        FormatRule {
            source: "top_ga",
            encoder: CategoricalEncoder::new("top_ga", "1").rule(Predicate::one_of(&["0"]), "0"),
        },
        FormatRule {
            source: "Q_JJ_DEPST_MM",
            encoder: CategoricalEncoder::new("nbj", ">12").rule(Predicate::AtMost(cutpoints.overdraft_days), "<=12"),
        },
        FormatRule {
            source: "solde_cav",
            encoder: balance,
        },
        FormatRule {
            source: "reboot_score2",
            encoder: classes_below("reboot_score_char2", &cutpoints.reboot_probability, None),
        },
        FormatRule {
            source: "remb_sepa_max",
            encoder: flag("remb_sepa_max"),
        },
        FormatRule {
            source: "pres_prlv_retourne",
            encoder: flag("pres_prlv_retourne"),
        },
        FormatRule {
            source: "pres_saisie",
            encoder: flag("pres_saisie"),
        },
        FormatRule {
            source: "net_int_turnover",
            encoder: flag("net_int_turnover"),
        },
        FormatRule {
            source: "rn_ca_conso_023b",
            encoder: classes_below("rn_ca_conso_023b", &cutpoints.net_result_to_turnover, Some("1")),
        },
        FormatRule {
            source: "caf_dmlt_005",
            encoder: CategoricalEncoder::new("caf_dmlt_005", "1").rule(Predicate::Above(cutpoints.cash_flow_to_debt), "2"),
        },
        FormatRule {
            source: "res_total_passif_035",
            encoder: classes_below("res_total_passif_035", &cutpoints.result_to_liabilities, Some("1")),
        },
        FormatRule {
            source: "immob_total_passif_055",
            encoder: classes_below("immob_total_passif_055", &cutpoints.fixed_assets_to_liabilities, Some("1")),
        },
    ]
}

/// Build every model variable column from its source column.
///
/// Model variables sharing a name with their source replace it in place.
pub fn format_model_variables(df: DataFrame, cutpoints: &FormatCutpoints) -> PdoResult<DataFrame> {
    let rules = format_rules(cutpoints);
    debug_assert_eq!(rules.len(), MODEL_VARIABLES.len());

    let columns = rules
        .iter()
        .map(|rule| rule.encoder.encode_column(&df, "df_main", rule.source, rule.encoder.name()))
        .collect::<PdoResult<Vec<_>>>()?;

    let mut df = df;
    for column in columns {
        df.with_column(column)?;
    }
    Ok(df)
}
