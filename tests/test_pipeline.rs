//! Integration tests for the full batch: sources to scored table

use pdo::pipeline::scoring::{Orientation, ScoringEngine, ScoringMethod, MODEL_VARIABLES, PDO_COLUMN};
use pdo::pipeline::*;
use pdo::report::{RunMetrics, RunStatus};
use polars::prelude::*;

#[path = "common/mod.rs"]
mod common;

use common::*;

fn config() -> PipelineConfig {
    PipelineConfig {
        orientation: Some(Orientation::DefaultEvent),
        ..PipelineConfig::default()
    }
}

fn run(config: PipelineConfig, source: &MemorySource, artifacts: &MemoryArtifacts) -> (anyhow::Result<RunOutcome>, RunMetrics) {
    let mut metrics = RunMetrics::new(LAST_STAGE);
    let result = Pipeline::new(config, source, artifacts).run(&mut metrics);
    (result, metrics)
}

fn labels_of(df: &DataFrame, row: usize) -> Vec<String> {
    MODEL_VARIABLES
        .iter()
        .map(|v| strings(df, v.name)[row].clone().unwrap())
        .collect()
}

#[test]
fn test_full_run_scores_every_entity_in_scope() {
    let source = MemorySource::new(create_sources());
    let artifacts = MemoryArtifacts::closed_form();

    let (result, metrics) = run(config(), &source, &artifacts);
    let outcome = result.unwrap();
    let df = outcome.scored;

    assert_eq!(metrics.status(), RunStatus::Success);
    assert_eq!(metrics.stages().len(), LAST_STAGE as usize + 1);
    assert_eq!(metrics.final_rows(), Some(3));

    assert_eq!(
        strings(&df, "i_uniq_kpi"),
        vec![Some("K1".into()), Some("K2".into()), Some("K3".into())],
        "null and duplicate keys are gone, order is kept"
    );
    assert_eq!(strings(&df, "i_intrn")[0].as_deref(), Some("0001"), "first K1 row kept");

    assert_eq!(
        labels_of(&df, 0),
        vec!["1-3", "1", "ME", "1", "<=12", "3", "1", "1", "2", "2", "2", "3", "2", "4", "3"]
    );
    assert_eq!(
        labels_of(&df, 1),
        vec![">=7", "4", "autres", "0", ">12", "1", "8", "2", "2", "2", "2", "1", "1", "1", "1"]
    );
    assert_eq!(
        labels_of(&df, 2),
        vec!["4-6", "3", "ME", "1", ">12", "1", "9", "2", "2", "2", "2", "1", "1", "1", "1"]
    );

    let engine = ScoringEngine::new(coefficient_table(), Orientation::DefaultEvent);
    let pdo = floats(&df, PDO_COLUMN);
    for (row, p) in pdo.iter().enumerate() {
        let labels = labels_of(&df, row);
        let refs: Vec<Option<&str>> = labels.iter().map(|l| Some(l.as_str())).collect();
        assert_eq!(*p, Some(engine.score(&refs).floored_probability));
    }

    assert!(strings(&df, "version").iter().all(|v| v.as_deref() == Some(env!("CARGO_PKG_VERSION"))));
    assert!(strings(&df, "d_calcul")[0].as_deref().is_some_and(|d| d.len() == 10));
    assert_eq!(df.width(), 2 + 15 + 15 + 5 + 2);

    let stats = outcome.stats.unwrap();
    assert_eq!(stats.count, 3);
}

#[test]
fn test_linear_method_matches_closed_form() {
    let source = MemorySource::new(create_sources());

    let (closed, _) = run(config(), &source, &MemoryArtifacts::closed_form());
    let linear_config = PipelineConfig {
        scoring_method: ScoringMethod::LinearModel,
        ..config()
    };
    let (linear, metrics) = run(linear_config, &source, &MemoryArtifacts::with_linear_model());

    assert_eq!(metrics.status(), RunStatus::Success);
    assert_eq!(
        floats(&closed.unwrap().scored, PDO_COLUMN),
        floats(&linear.unwrap().scored, PDO_COLUMN)
    );
}

#[test]
fn test_missing_orientation_stops_at_configuration() {
    let source = MemorySource::new(create_sources());
    let artifacts = MemoryArtifacts::closed_form();

    let (result, metrics) = run(PipelineConfig::default(), &source, &artifacts);

    let err = result.err().unwrap();
    assert!(format!("{:#}", err).contains("orientation"), "got: {:#}", err);
    assert_eq!(metrics.status(), RunStatus::Failed);
    assert_eq!(metrics.stages().len(), 1);
    assert_eq!(metrics.failed_stage().unwrap().number, 0);
}

#[test]
fn test_failing_stage_is_recorded_and_later_stages_skipped() {
    let mut sources = create_sources();
    sources.insert("soldes".to_string(), df! { "i_intrn" => ["0001"] }.unwrap());
    let source = MemorySource::new(sources);
    let artifacts = MemoryArtifacts::closed_form();

    let (result, metrics) = run(config(), &source, &artifacts);

    assert!(result.is_err());
    assert_eq!(metrics.status(), RunStatus::Failed);
    let failed = metrics.failed_stage().unwrap();
    assert_eq!(failed.number, 5);
    assert!(failed.error.as_deref().unwrap().contains("pref_i_uniq_cpt"));
    assert_eq!(metrics.stages().last().unwrap().number, 5, "no stage after the failure");
    assert_eq!(metrics.final_rows(), None);
}

#[test]
fn test_missing_source_fails_loading() {
    let mut sources = create_sources();
    sources.remove("safir_sd");
    let source = MemorySource::new(sources);

    let (result, metrics) = run(config(), &source, &MemoryArtifacts::closed_form());

    assert!(format!("{:#}", result.err().unwrap()).contains("safir_sd"));
    assert_eq!(metrics.failed_stage().unwrap().number, 1);
}

/// Records every load, in order.
struct RecordingSource {
    inner: MemorySource,
    loads: std::cell::RefCell<Vec<String>>,
}

impl DataSource for RecordingSource {
    fn contains(&self, name: &str) -> bool {
        self.inner.contains(name)
    }

    fn load(&self, name: &str) -> anyhow::Result<DataFrame> {
        self.loads.borrow_mut().push(name.to_string());
        self.inner.load(name)
    }
}

#[test]
fn test_sources_load_in_their_own_stage() {
    let source = RecordingSource {
        inner: MemorySource::new(create_sources()),
        loads: Default::default(),
    };
    let artifacts = MemoryArtifacts::closed_form();
    let mut metrics = RunMetrics::new(LAST_STAGE);

    Pipeline::new(config(), &source, &artifacts).run(&mut metrics).unwrap();

    assert_eq!(*source.loads.borrow(), SOURCE_NAMES.to_vec());
    let loading = &metrics.stages()[1];
    assert_eq!(loading.inputs.len(), 1, "stage 1 reads only df_main");
    assert_eq!(loading.inputs[0].label, "df_main");
    let soldes = &metrics.stages()[5];
    assert!(soldes.inputs.iter().any(|t| t.label == "soldes"));
}

#[test]
fn test_sources_after_a_failed_stage_are_never_read() {
    let mut sources = create_sources();
    sources.insert("soldes".to_string(), df! { "i_intrn" => ["0001"] }.unwrap());
    let source = RecordingSource {
        inner: MemorySource::new(sources),
        loads: Default::default(),
    };
    let artifacts = MemoryArtifacts::closed_form();
    let mut metrics = RunMetrics::new(LAST_STAGE);

    assert!(Pipeline::new(config(), &source, &artifacts).run(&mut metrics).is_err());

    assert_eq!(*source.loads.borrow(), vec!["df_main", "rsc", "soldes"]);
}

#[test]
fn test_linear_method_without_model_fails() {
    let source = MemorySource::new(create_sources());
    let linear_config = PipelineConfig {
        scoring_method: ScoringMethod::LinearModel,
        ..config()
    };

    let (result, metrics) = run(linear_config, &source, &MemoryArtifacts::closed_form());

    assert!(format!("{:#}", result.err().unwrap()).contains("absent"));
    assert_eq!(metrics.failed_stage().unwrap().number, 12);
}

#[test]
fn test_scope_segments_and_affiliation_policy() {
    let source = MemorySource::new(create_sources());
    let scoped = PipelineConfig {
        scope_segments: vec!["ME".to_string()],
        affiliation_policy: AffiliationPolicy::BlankAsNone,
        ..config()
    };

    let (result, _) = run(scoped, &source, &MemoryArtifacts::closed_form());
    let df = result.unwrap().scored;

    assert_eq!(
        strings(&df, "i_uniq_kpi"),
        vec![Some("K1".into()), Some("K3".into())]
    );
    assert_eq!(
        strings(&df, "top_ga"),
        vec![Some("1".into()), Some("0".into())],
        "a blank group id reads as no group"
    );
}

#[test]
fn test_config_from_json() {
    let dir = create_temp_dir();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"orientation": "non-default-event", "scoring_method": "linear-model",
            "cutpoints": {"overdraft_days": 30}}"#,
    )
    .unwrap();

    let config = PipelineConfig::from_json_file(&path).unwrap();

    assert_eq!(config.orientation, Some(Orientation::NonDefaultEvent));
    assert_eq!(config.scoring_method, ScoringMethod::LinearModel);
    assert_eq!(config.cutpoints.overdraft_days, 30.0);
    assert_eq!(config.cutpoints.balance, FormatCutpoints::default().balance);
    assert_eq!(config.affiliation_policy, AffiliationPolicy::NullOnly);
    assert_eq!(config.validate().unwrap(), Orientation::NonDefaultEvent);
}

#[test]
fn test_postprocess_requires_scores() {
    let df = model_frame(&[REFERENCE_PROFILE]);
    assert!(postprocess(df, "2024-01-31", "1.0.0").is_err());
}
