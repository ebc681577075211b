//! Tests for per-source feature aggregation and the left join onto the main table

use pdo::error::{PdoError, SchemaError};
use pdo::pipeline::features::*;
use pdo::pipeline::{FeatureTable, FeatureValues};
use polars::prelude::*;

#[path = "common/mod.rs"]
mod common;

use common::*;

fn main_keys() -> DataFrame {
    df! {
        "i_intrn" => [Some("A"), Some("B"), None, Some("C")],
        "i_uniq_kpi" => [Some("K1"), Some("K2"), Some("K3"), None],
    }
    .unwrap()
}

#[test]
fn test_join_keeps_height_and_order() {
    let rsc = df! {
        "i_intrn" => ["C", "A", "A", "Z"],
        "k_dep_auth_10j" => [4.0f64, 2.0, 9.0, 1.0],
    }
    .unwrap();

    let joined = add_overdraft_feature(main_keys(), &rsc).unwrap();

    assert_eq!(joined.height(), 4, "left join must not add or drop rows");
    assert_eq!(
        strings(&joined, "i_intrn"),
        vec![Some("A".into()), Some("B".into()), None, Some("C".into())]
    );
    assert_eq!(
        floats(&joined, RSC_OUTPUT),
        vec![Some(9.0), None, None, Some(4.0)],
        "unmatched and null-key rows get null, matched rows the max"
    );
}

#[test]
fn test_join_rejects_duplicate_aggregated_key() {
    let table = FeatureTable::new("rsc", "i_intrn", vec!["A".into(), "A".into()])
        .with_values("x", FeatureValues::Float(vec![Some(1.0), Some(2.0)]));

    let err = table.left_join(main_keys()).unwrap_err();
    assert!(err.to_string().contains("not unique"), "got: {}", err);
}

#[test]
fn test_join_rejects_column_collision() {
    let table = FeatureTable::new("rsc", "i_intrn", vec!["A".into()])
        .with_values("i_uniq_kpi", FeatureValues::Text(vec![Some("X".into())]));

    match table.left_join(main_keys()) {
        Err(PdoError::Schema(SchemaError::ColumnCollision { column, .. })) => {
            assert_eq!(column, "i_uniq_kpi")
        }
        other => panic!("expected a column collision, got {:?}", other.map(|df| df.shape())),
    }
}

#[test]
fn test_missing_source_column_is_schema_error() {
    let rsc = df! { "i_intrn" => ["A"] }.unwrap();
    match add_overdraft_feature(main_keys(), &rsc) {
        Err(PdoError::Schema(SchemaError::MissingColumn { table, column })) => {
            assert_eq!(table, "rsc");
            assert_eq!(column, RSC_METRIC);
        }
        other => panic!("expected a missing column, got {:?}", other.map(|df| df.shape())),
    }
}

#[test]
fn test_balances_net_to_zero_and_count_accounts() {
    let soldes = df! {
        "i_intrn" => ["A", "A", "A", "B", "B"],
        "pref_i_uniq_cpt" => ["C1", "C2", "C3", "C4", "C4"],
        "pref_m_ctrvl_sld_arr" => [Some(500_000.0f64), Some(-300_000.0), Some(-200_000.0), Some(1_000.0), None],
    }
    .unwrap();

    let joined = add_balance_features(main_keys(), &soldes).unwrap();

    let balance = floats(&joined, BALANCE_OUTPUT);
    assert_eq!(balance[0], Some(0.0), "balances netting to zero stay 0.0, not null");
    assert_eq!(balance[1], Some(10.0), "a null amount is skipped, not zeroed");
    assert_eq!(balance[3], None);

    let count = floats(&joined, ACCOUNT_COUNT_OUTPUT);
    assert_eq!(count[0], Some(3.0));
    assert_eq!(count[1], Some(2.0), "every account row counts, repeated ids included");
}

#[test]
fn test_balances_near_integer_limit_stay_finite() {
    let soldes = df! {
        "i_intrn" => ["A"],
        "pref_i_uniq_cpt" => ["C1"],
        "pref_m_ctrvl_sld_arr" => [i64::MAX],
    }
    .unwrap();

    let joined = add_balance_features(main_keys(), &soldes).unwrap();

    let balance = floats(&joined, BALANCE_OUTPUT)[0].unwrap();
    assert!(balance.is_finite());
    assert!((balance - 9.223372036854776e16).abs() < 1e3);
}

#[test]
fn test_empty_source_leaves_nulls() {
    let soldes = df! {
        "i_intrn" => Vec::<String>::new(),
        "pref_i_uniq_cpt" => Vec::<String>::new(),
        "pref_m_ctrvl_sld_arr" => Vec::<f64>::new(),
    }
    .unwrap();

    let joined = add_balance_features(main_keys(), &soldes).unwrap();

    assert_eq!(joined.height(), 4);
    assert!(floats(&joined, BALANCE_OUTPUT).iter().all(Option::is_none));
}

fn reboot_rows(keys: &[&str], scores: &[&str], dates: &[&str]) -> DataFrame {
    let n = keys.len();
    df! {
        "i_uniq_kpi" => keys,
        "q_score" => scores,
        "d_histo" => dates,
        "c_int_modele" => vec!["M1"; n],
        "d_rev_notation" => vec!["2023-06-30"; n],
        "c_not" => vec!["B"; n],
        "c_type_prsne" => vec!["PM"; n],
        "b_bddf_gestionnaire" => vec!["1"; n],
    }
    .unwrap()
}

#[test]
fn test_reboot_keeps_most_recent_history() {
    let reboot = reboot_rows(
        &["K1", "K1", "K1"],
        &["1,0", "3,0", "2,0"],
        &["2024-01-01", "2024-01-31", "2024-01-15"],
    );

    let table = aggregate_reboot_scores(&reboot).unwrap();

    assert_eq!(table.len(), 1);
    assert_eq!(
        table.values(REBOOT_SCORE_OUTPUT),
        Some(&FeatureValues::Float(vec![Some(3.0)]))
    );
}

#[test]
fn test_reboot_sums_within_identical_group() {
    let reboot = reboot_rows(
        &["K1", "K1", "K1"],
        &["1,5", "2,5", "2"],
        &["2024-01-31", "2024-01-31", "2024-01-31"],
    );

    let table = aggregate_reboot_scores(&reboot).unwrap();

    assert_eq!(
        table.values(REBOOT_SCORE_OUTPUT),
        Some(&FeatureValues::Float(vec![Some(6.0)]))
    );
}

#[test]
fn test_reboot_probability_is_bounded() {
    let reboot = reboot_rows(&["K1", "K2", "K3"], &["-100", "100", "N/A"], &["2024-01-31"; 3]);

    let joined = add_reboot_features(main_keys(), &reboot).unwrap();
    let proba = floats(&joined, REBOOT_PROBA_OUTPUT);

    let low = proba[0].unwrap();
    let high = proba[1].unwrap();
    assert!((0.0..1e-40).contains(&low), "got {}", low);
    assert!(high > 0.999_999 && high <= 1.0, "got {}", high);
    assert_eq!(proba[2], None, "an unparseable score stays null");
    assert_eq!(proba[3], None);
}

fn transactions(rows: &[(&str, &str, f64, f64, f64)]) -> DataFrame {
    df! {
        "i_uniq_kpi" => rows.iter().map(|r| r.0).collect::<Vec<_>>(),
        "category" => rows.iter().map(|r| r.1).collect::<Vec<_>>(),
        "netamount" => rows.iter().map(|r| r.2).collect::<Vec<_>>(),
        "nops_category" => rows.iter().map(|r| r.3).collect::<Vec<_>>(),
        "min_amount" => rows.iter().map(|r| r.4).collect::<Vec<_>>(),
        "max_amount" => rows.iter().map(|r| r.4).collect::<Vec<_>>(),
        "nops_total" => rows.iter().map(|r| r.3).collect::<Vec<_>>(),
    }
    .unwrap()
}

#[test]
fn test_transaction_flags() {
    let df = transactions(&[
        ("K1", "rembt_prlv_sepa", 4000.0, 1.0, 4000.0),
        ("K1", "prlv_sepa_retourne", -50.0, 2.0, -50.0),
        ("K1", "atd_tres_pub", -10.0, 1.0, -10.0),
        ("K2", "interets", -500.0, 50.0, -10.0),
        ("K2", "turnover", 100_000.0, 30.0, 5000.0),
        ("K2", "frais", 1.0, 1000.0, 1.0),
    ]);

    let joined = add_transaction_features(main_keys(), &df).unwrap();

    let s = |name| strings(&joined, name);
    assert_eq!(s(LARGE_REFUND_FLAG)[0].as_deref(), Some("1"));
    assert_eq!(s(RETURNED_DEBIT_FLAG)[0].as_deref(), Some("1"));
    assert_eq!(s(SEIZURE_FLAG)[0].as_deref(), Some("1"));
    assert_eq!(s(INTEREST_RATIO_FLAG)[0].as_deref(), Some("2"), "too few operations");

    assert_eq!(s(LARGE_REFUND_FLAG)[1].as_deref(), Some("2"));
    assert_eq!(s(RETURNED_DEBIT_FLAG)[1].as_deref(), Some("2"));
    assert_eq!(s(SEIZURE_FLAG)[1].as_deref(), Some("2"));
    assert_eq!(
        s(INTEREST_RATIO_FLAG)[1].as_deref(),
        Some("1"),
        "80 operations and a -0.005 ratio raise the flag"
    );

    assert_eq!(floats(&joined, NOPS_OUTPUT)[1], Some(80.0), "discarded categories do not count");
    let ratio = floats(&joined, RATIO_OUTPUT)[1].unwrap();
    assert!((ratio + 0.005).abs() < 1e-12);

    assert_eq!(s(LARGE_REFUND_FLAG)[2], None, "no transactions: flag stays null");
    assert!(s(TRANSAC_CHECK).iter().all(|v| v.as_deref() == Some("OK")));
}

#[test]
fn test_interest_ratio_guards() {
    assert_eq!(interest_turnover_ratio(None, Some(10.0)), 0.0);
    assert_eq!(interest_turnover_ratio(Some(5.0), Some(0.0)), 0.0);
    assert_eq!(interest_turnover_ratio(Some(0.0), Some(10.0)), 0.0);
    assert_eq!(interest_turnover_ratio(Some(-5.0), Some(10.0)), -0.5);
}

#[test]
fn test_financial_ratio_first_row_wins() {
    let safir = df! {
        "i_uniq_kpi" => ["K2", "K1", "K2"],
        "res_total_passif_035" => [0.3f64, 0.1, 0.9],
    }
    .unwrap();

    let joined = add_ratio_feature(main_keys(), &safir, SAFIR_SOC[0]).unwrap();

    assert_eq!(
        floats(&joined, "res_total_passif_035"),
        vec![Some(0.1), Some(0.3), None, None]
    );
}

#[test]
fn test_all_sources_attach_to_fixture() {
    let mut sources = create_sources();
    let main = sources.remove("df_main").unwrap();
    let main = add_overdraft_feature(main, &sources["rsc"]).unwrap();
    let main = add_balance_features(main, &sources["soldes"]).unwrap();
    let main = add_reboot_features(main, &sources["reboot"]).unwrap();
    let main = add_transaction_features(main, &sources["donnees_transac"]).unwrap();

    assert_eq!(main.height(), 5);
    // K1 appears twice in the main table; both rows get the same features.
    let reboot = floats(&main, REBOOT_SCORE_OUTPUT);
    assert_eq!(reboot[0], Some(-2.5));
    assert_eq!(reboot[4], Some(-2.5));
}
