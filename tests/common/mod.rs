//! Shared test utilities and fixture generators

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use pdo::pipeline::scoring::{CoefficientTable, LinearModel};
use pdo::pipeline::{ArtifactStore, DataSource};
use polars::prelude::*;
use tempfile::TempDir;

/// Intercept of the production coefficient table.
pub const INTERCEPT: f64 = -3.864;

/// Coefficients in the production layout. Reference buckets are 0.0 and the
/// protective buckets carry the calibrated weights.
pub const COEFFICIENTS: &[(&str, f64)] = &[
    ("nat_jur_a_1_3", 0.0),
    ("nat_jur_a_4_6", 0.438),
    ("nat_jur_a_sup7", 1.146),
    ("secto_b_1", 0.946),
    ("secto_b_2", 0.711),
    ("secto_b_3", 0.302),
    ("secto_b_4", 0.0),
    ("seg_nae_ME", 0.0),
    ("seg_nae_autres", 0.699),
    ("top_ga_0", 0.0),
    ("top_ga_1", 0.382),
    ("nbj_inf_equal_12", 0.739),
    ("nbj_sup_12", 0.0),
    ("solde_cav_char_1", 0.0),
    ("solde_cav_char_2", 0.301),
    ("solde_cav_char_3", 0.612),
    ("solde_cav_char_4", 0.924),
    ("reboot_score_char2_1", 3.924),
    ("reboot_score_char2_2", 3.1),
    ("reboot_score_char2_3", 2.5),
    ("reboot_score_char2_4", 2.0),
    ("reboot_score_char2_5", 1.6),
    ("reboot_score_char2_6", 1.2),
    ("reboot_score_char2_7", 0.8),
    ("reboot_score_char2_8", 0.4),
    ("reboot_score_char2_9", 0.0),
    ("remb_sepa_max_1", 0.0),
    ("remb_sepa_max_2", 1.346),
    ("pres_prlv_retourne_1", 0.0),
    ("pres_prlv_retourne_2", 0.917),
    ("pres_saisie_1", 0.0),
    ("pres_saisie_2", 0.805),
    ("net_int_turnover_1", 0.0),
    ("net_int_turnover_2", 0.479),
    ("rn_ca_conso_023b_1", 0.0),
    ("rn_ca_conso_023b_2", 0.8),
    ("rn_ca_conso_023b_3", 1.645),
    ("caf_dmlt_005_1", 0.0),
    ("caf_dmlt_005_2", 0.553),
    ("res_total_passif_035_1", 0.0),
    ("res_total_passif_035_2", 0.4),
    ("res_total_passif_035_3", 0.7),
    ("res_total_passif_035_4", 0.977),
    ("immob_total_passif_055_1", 0.0),
    ("immob_total_passif_055_2", 0.3),
    ("immob_total_passif_055_3", 0.573),
];

/// Bucket labels of the riskiest profile: every variable at its reference.
pub const REFERENCE_PROFILE: [&str; 15] = [
    "1-3", "4", "ME", "0", ">12", "1", "9", "1", "1", "1", "1", "1", "1", "1", "1",
];

/// Bucket labels of the safest profile: every variable at its protective bucket.
pub const PROTECTIVE_PROFILE: [&str; 15] = [
    ">=7", "1", "autres", "1", "<=12", "4", "1", "2", "2", "2", "2", "3", "2", "4", "3",
];

/// Sum of the protective coefficients.
pub const PROTECTIVE_SUM: f64 = 16.055;

/// The coefficient file as JSON.
pub fn coefficient_json() -> String {
    let mut coeffs = serde_json::Map::new();
    coeffs.insert("intercept".to_string(), serde_json::json!(INTERCEPT));
    for (name, value) in COEFFICIENTS {
        coeffs.insert(name.to_string(), serde_json::json!(value));
    }
    serde_json::json!({ "model": { "coeffs": coeffs } }).to_string()
}

pub fn coefficient_table() -> CoefficientTable {
    CoefficientTable::from_json(&coefficient_json()).unwrap()
}

/// Write the coefficient file into `dir` and return its path.
pub fn write_coefficients(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("coefficients.json");
    std::fs::write(&path, coefficient_json()).unwrap();
    path
}

/// A formatted table holding one row per profile, model variables only.
pub fn model_frame(profiles: &[[&str; 15]]) -> DataFrame {
    let columns: Vec<Column> = pdo::pipeline::scoring::model_variable_names()
        .iter()
        .enumerate()
        .map(|(v, name)| {
            let values: Vec<&str> = profiles.iter().map(|p| p[v]).collect();
            Column::new((*name).into(), values)
        })
        .collect();
    DataFrame::new(columns).unwrap()
}

/// Main entity table.
///
/// - `0001/K1`: corporate form 1-3, sector 1, in a business group, ME
/// - `0002/K2`: form 7, sector 4, no group, other segment
/// - `0003/K3`: form 4-6, unknown sector, blank group id, ME
/// - `0004/-`: no KPI key, dropped from scope
/// - `0005/K1`: repeats K1, dropped as a duplicate
pub fn create_main_table() -> DataFrame {
    df! {
        "i_intrn" => ["0001", "0002", "0003", "0004", "0005"],
        "i_uniq_kpi" => [Some("K1"), Some("K2"), Some("K3"), None, Some("K1")],
        "c_njur_prsne" => ["26", "22", "20", "26", "26"],
        "c_sectrl_1" => ["420053", "010010", "999999", "420053", "420053"],
        "i_g_affre_rmpm" => [Some("G1"), None, Some(""), None, Some("G1")],
        "c_seg_nae" => ["ME", "PME", "ME", "ME", "ME"],
    }
    .unwrap()
}

/// Every source table, keyed by source name.
pub fn create_sources() -> HashMap<String, DataFrame> {
    let mut sources = HashMap::new();
    sources.insert("df_main".to_string(), create_main_table());
    sources.insert(
        "rsc".to_string(),
        df! {
            "i_intrn" => ["0001", "0001", "0002"],
            "k_dep_auth_10j" => [3.0f64, 10.0, 20.0],
        }
        .unwrap(),
    );
    sources.insert(
        "soldes".to_string(),
        df! {
            "i_intrn" => ["0001", "0001", "0002"],
            "pref_i_uniq_cpt" => ["C1", "C2", "C3"],
            "pref_m_ctrvl_sld_arr" => [1_500_000.0f64, 500_000.0, -500_000.0],
        }
        .unwrap(),
    );
    sources.insert(
        "reboot".to_string(),
        df! {
            "i_uniq_kpi" => ["K1", "K1", "K2"],
            "q_score" => ["0,5", "-2,5", "1,0"],
            "d_histo" => ["2024-01-01", "2024-01-31", "2024-01-31"],
            "c_int_modele" => ["M1", "M1", "M1"],
            "d_rev_notation" => ["2023-12-01", "2023-12-01", "2023-12-01"],
            "c_not" => ["A", "A", "B"],
            "c_type_prsne" => ["PM", "PM", "PM"],
            "b_bddf_gestionnaire" => ["1", "1", "1"],
        }
        .unwrap(),
    );
    sources.insert(
        "donnees_transac".to_string(),
        df! {
            "i_uniq_kpi" => ["K1", "K2", "K2", "K2"],
            "category" => ["rembt_prlv_sepa", "interets", "turnover", "autre"],
            "netamount" => [5000.0f64, -10.0, 100_000.0, 7.0],
            "nops_category" => [1.0f64, 40.0, 40.0, 3.0],
            "min_amount" => [5000.0f64, -10.0, 10.0, 7.0],
            "max_amount" => [5000.0f64, -1.0, 9000.0, 7.0],
            "nops_total" => [1.0f64, 40.0, 40.0, 3.0],
        }
        .unwrap(),
    );
    sources.insert(
        "safir_cc".to_string(),
        df! { "i_uniq_kpi" => ["K1", "K2"], "rn_ca_conso_023b" => [0.05f64, 0.001] }.unwrap(),
    );
    sources.insert(
        "safir_cd".to_string(),
        df! { "i_uniq_kpi" => ["K1", "K2"], "caf_dmlt_005" => [0.9f64, 0.1] }.unwrap(),
    );
    sources.insert(
        "safir_sc".to_string(),
        df! { "i_uniq_kpi" => ["K1", "K3"], "res_total_passif_035" => [0.1f64, -0.2] }.unwrap(),
    );
    sources.insert(
        "safir_sd".to_string(),
        df! { "i_uniq_kpi" => ["K1", "K3"], "immob_total_passif_055" => [0.5f64, 0.05] }.unwrap(),
    );
    sources
}

/// In-memory source tables.
pub struct MemorySource {
    pub tables: HashMap<String, DataFrame>,
}

impl MemorySource {
    pub fn new(tables: HashMap<String, DataFrame>) -> Self {
        Self { tables }
    }
}

impl DataSource for MemorySource {
    fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    fn load(&self, name: &str) -> Result<DataFrame> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no table '{}'", name))
    }
}

/// In-memory scoring artifacts.
pub struct MemoryArtifacts {
    pub coefficients: CoefficientTable,
    pub linear_model: Option<LinearModel>,
}

impl MemoryArtifacts {
    pub fn closed_form() -> Self {
        Self {
            coefficients: coefficient_table(),
            linear_model: None,
        }
    }

    pub fn with_linear_model() -> Self {
        let coefficients = coefficient_table();
        let linear_model = Some(LinearModel::from_coefficients(&coefficients));
        Self {
            coefficients,
            linear_model,
        }
    }
}

impl ArtifactStore for MemoryArtifacts {
    fn coefficients(&self) -> Result<CoefficientTable> {
        Ok(self.coefficients.clone())
    }

    fn linear_model(&self) -> Result<Option<LinearModel>> {
        Ok(self.linear_model.clone())
    }
}

/// Create a temporary directory for test outputs.
pub fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Write every source as CSV under `dir`.
pub fn write_sources_csv(dir: &TempDir) {
    for (name, df) in create_sources() {
        let mut df = df;
        let path = dir.path().join(format!("{}.csv", name));
        let mut file = std::fs::File::create(&path).unwrap();
        CsvWriter::new(&mut file).finish(&mut df).unwrap();
    }
}

/// Read a string column of `df`.
pub fn strings(df: &DataFrame, name: &str) -> Vec<Option<String>> {
    df.column(name)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|v| v.map(String::from))
        .collect()
}

/// Read a float column of `df`.
pub fn floats(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
    df.column(name)
        .unwrap()
        .cast(&DataType::Float64)
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .collect()
}
