//! Batch orchestration: the fixed sequence of stages from sources to scores
//!
//! Stages run strictly in order. Each one is recorded in the run's
//! [`RunMetrics`]; the first failure is returned and no later stage starts.
//! Each source is loaded by the stage that consumes it and released when that
//! stage ends, so only the running stage's sources are held beside the main table.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Local;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::encoding::{encode_main_attributes, AffiliationPolicy};
use super::features::{
    add_balance_features, add_overdraft_feature, add_ratio_feature, add_reboot_features,
    add_transaction_features, RatioSource, SAFIR_CONSO, SAFIR_SOC,
};
use super::filters::{filter_pdo_scope, prepare_main_table, INTERNAL_KEY, KPI_KEY};
use super::format::{format_model_variables, FormatCutpoints};
use super::scoring::{
    max_pdo_deviation, model_variable_names, score_with_model, Orientation, PdoStats,
    ScoringEngine, ScoringMethod, INTERCEPT_COLUMN, LOG_ODDS_COLUMN, MODEL_VARIABLES, PDO_COLUMN,
    PDO_FLAG_COLUMN, RAW_PDO_COLUMN,
};
use super::sources::{check_available, load_source, release, ArtifactStore, DataSource, SOURCE_NAMES};
use crate::error::PdoResult;
use crate::report::{RunMetrics, StageHandle};

/// Number of the last stage.
pub const LAST_STAGE: u8 = 13;

/// Largest tolerated `PDO` gap between the linear and the closed form.
pub const FORM_AGREEMENT_TOLERANCE: f64 = 1e-4;

pub const RUN_DATE_COLUMN: &str = "d_calcul";
pub const VERSION_COLUMN: &str = "version";

/// Run configuration, read from JSON and/or the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub scoring_method: ScoringMethod,
    /// Required; a run without it stops at the configuration stage.
    pub orientation: Option<Orientation>,
    pub affiliation_policy: AffiliationPolicy,
    pub cutpoints: FormatCutpoints,
    /// `c_seg_nae` values in scope; empty keeps every segment.
    pub scope_segments: Vec<String>,
    pub summary_top_n: usize,
    /// Stamped into the `version` output column.
    pub model_version: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scoring_method: ScoringMethod::default(),
            orientation: None,
            affiliation_policy: AffiliationPolicy::default(),
            cutpoints: FormatCutpoints::default(),
            scope_segments: Vec::new(),
            summary_top_n: 3,
            model_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Check the configuration and return the probability orientation.
    pub fn validate(&self) -> Result<Orientation> {
        let Some(orientation) = self.orientation else {
            bail!(
                "probability orientation is not configured; set \"orientation\" to \
                 \"default-event\" or \"non-default-event\" (or pass --orientation)"
            );
        };
        self.cutpoints.validate()?;
        Ok(orientation)
    }
}

/// Result of a successful run.
pub struct RunOutcome {
    pub scored: DataFrame,
    pub stats: Option<PdoStats>,
}

/// The batch, wired to its collaborators.
pub struct Pipeline<'a> {
    config: PipelineConfig,
    source: &'a dyn DataSource,
    artifacts: &'a dyn ArtifactStore,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: PipelineConfig, source: &'a dyn DataSource, artifacts: &'a dyn ArtifactStore) -> Self {
        Self {
            config,
            source,
            artifacts,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage in order.
    pub fn run(&self, metrics: &mut RunMetrics) -> Result<RunOutcome> {
        let (engine, linear) = metrics.run_stage(0, "CONFIGURATION", |_| {
            let orientation = self.config.validate()?;
            let coefficients = self.artifacts.coefficients()?;
            let linear = match self.config.scoring_method {
                ScoringMethod::LinearModel => self.artifacts.linear_model()?,
                ScoringMethod::ClosedForm => None,
            };
            log::info!(
                "scoring: {:?}, orientation: {}, intercept: {}",
                self.config.scoring_method,
                orientation,
                coefficients.intercept()
            );
            Ok((ScoringEngine::new(coefficients, orientation), linear))
        })?;

        let raw = metrics.run_stage(1, "CHARGEMENT DONNÉES SQL", |stage| {
            check_available(self.source, &SOURCE_NAMES)?;
            let raw = load_source(self.source, "df_main")?;
            stage.record_input("df_main", &raw);
            Ok(raw)
        })?;

        let main = metrics.run_stage(2, "PREPROCESSING DF_MAIN", |stage| {
            stage.record_input("unfiltered_df_main", &raw);
            let (main, _) = prepare_main_table(raw)?;
            stage.record_output("df_main", &main);
            Ok(main)
        })?;

        let main = metrics.run_stage(3, "ENCODING FEATURES", |stage| {
            stage.record_input("df_main", &main);
            let encoded = encode_main_attributes(main, self.config.affiliation_policy)?;
            stage.record_output("df_main_encoded", &encoded);
            Ok(encoded)
        })?;

        let main = join_stage(metrics, self.source, 4, "FEATURES RSC", main, &["rsc"], |m, s| {
            add_overdraft_feature(m, &s[0])
        })?;
        let main = join_stage(metrics, self.source, 5, "FEATURES SOLDES", main, &["soldes"], |m, s| {
            add_balance_features(m, &s[0])
        })?;
        let main = join_stage(metrics, self.source, 6, "FEATURES REBOOT", main, &["reboot"], |m, s| {
            add_reboot_features(m, &s[0])
        })?;
        let main = join_stage(metrics, self.source, 7, "FEATURES TRANSAC", main, &["donnees_transac"], |m, s| {
            add_transaction_features(m, &s[0])
        })?;
        let main = ratio_stage(metrics, self.source, 8, "FEATURES SAFIR CONSO", main, SAFIR_CONSO)?;
        let main = ratio_stage(metrics, self.source, 9, "FEATURES SAFIR SOC", main, SAFIR_SOC)?;
        let main = metrics.run_stage(10, "FILTRES PDO SCOPE", |stage| {
            stage.record_input("df_main", &main);
            let (filtered, _) = filter_pdo_scope(main, &self.config.scope_segments)?;
            stage.record_output("df_main_filtered", &filtered);
            Ok(filtered)
        })?;

        let main = metrics.run_stage(11, "FORMATAGE VARIABLES", |stage| {
            stage.record_input("df_main", &main);
            let formatted = format_model_variables(main, &self.config.cutpoints)?;
            stage.record_output("df_main_format", &formatted);
            Ok(formatted)
        })?;

        let (scored, stats) = metrics.run_stage(12, "CALCUL PDO", |stage| {
            stage.record_input("df_main", &main);
            let scored = match self.config.scoring_method {
                ScoringMethod::ClosedForm => engine.score_frame(main)?,
                ScoringMethod::LinearModel => {
                    let closed = engine.score_frame(main.clone())?;
                    let scored = score_with_model(main, linear.as_ref(), engine.orientation())?;
                    check_form_agreement(&closed, &scored)?;
                    scored
                }
            };
            stage.record_output("df_main_pdo", &scored);
            let stats = PdoStats::from_frame(&scored)?;
            if let Some(stats) = &stats {
                stats.log();
            }
            Ok((scored, stats))
        })?;

        let run_date = Local::now().format("%Y-%m-%d").to_string();
        let final_df = metrics.run_stage(LAST_STAGE, "POSTPROCESSING", |stage| {
            stage.record_input("df_main_pdo", &scored);
            let final_df = postprocess(scored, &run_date, &self.config.model_version)?;
            stage.record_output("df_main_final", &final_df);
            Ok(final_df)
        })?;

        metrics.finish(final_df.height());
        Ok(RunOutcome {
            scored: final_df,
            stats,
        })
    }
}

/// Load `names` from `source`, join them onto `main` with `join`, release them.
fn join_stage<F>(
    metrics: &mut RunMetrics,
    source: &dyn DataSource,
    number: u8,
    name: &str,
    main: DataFrame,
    names: &[&str],
    join: F,
) -> Result<DataFrame>
where
    F: FnOnce(DataFrame, &[DataFrame]) -> PdoResult<DataFrame>,
{
    metrics.run_stage(number, name, |stage: &mut StageHandle| {
        stage.record_input("df_main", &main);
        let mut sources = Vec::with_capacity(names.len());
        for table in names.iter().copied() {
            let df = load_source(source, table)?;
            stage.record_input(table, &df);
            sources.push(df);
        }
        let before = main.width();
        let joined = join(main, &sources).with_context(|| format!("join of {} failed", names.join(", ")))?;
        log::info!("{} joined onto df_main (+{} columns)", names.join(", "), joined.width() - before);
        stage.record_output("df_main", &joined);
        for (table, df) in names.iter().zip(sources) {
            release(table, df);
        }
        Ok(joined)
    })
}

fn ratio_stage(
    metrics: &mut RunMetrics,
    source: &dyn DataSource,
    number: u8,
    name: &str,
    main: DataFrame,
    ratios: [RatioSource; 2],
) -> Result<DataFrame> {
    let names = [ratios[0].table, ratios[1].table];
    join_stage(metrics, source, number, name, main, &names, |m, s| {
        let m = add_ratio_feature(m, &s[0], ratios[0])?;
        add_ratio_feature(m, &s[1], ratios[1])
    })
}

/// Log how far the linear form is from the closed form.
fn check_form_agreement(closed: &DataFrame, linear: &DataFrame) -> Result<()> {
    let deviation = max_pdo_deviation(closed, linear)?;
    if deviation > FORM_AGREEMENT_TOLERANCE {
        log::warn!(
            "linear model deviates from the closed form by up to {:.6} PDO",
            deviation
        );
    } else {
        log::info!("linear model agrees with the closed form (max deviation {:.2e})", deviation);
    }
    Ok(())
}

/// Keep keys, model variables and scoring columns; stamp run date and version.
pub fn postprocess(df: DataFrame, run_date: &str, version: &str) -> PdoResult<DataFrame> {
    let mut columns: Vec<String> = vec![INTERNAL_KEY.to_string(), KPI_KEY.to_string()];
    columns.extend(model_variable_names().into_iter().map(String::from));
    columns.extend(MODEL_VARIABLES.iter().map(|v| v.coefficient_column()));
    columns.extend(
        [INTERCEPT_COLUMN, LOG_ODDS_COLUMN, RAW_PDO_COLUMN, PDO_COLUMN, PDO_FLAG_COLUMN]
            .iter()
            .map(|c| c.to_string()),
    );
    super::columns::require_columns(
        &df,
        "df_main_pdo",
        &columns.iter().map(String::as_str).collect::<Vec<_>>(),
    )?;

    let mut out = df.select(columns)?;
    let rows = out.height();
    out.with_column(Column::new(RUN_DATE_COLUMN.into(), vec![run_date; rows]))?;
    out.with_column(Column::new(VERSION_COLUMN.into(), vec![version; rows]))?;
    Ok(out)
}
