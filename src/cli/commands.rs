//! Subcommand implementations

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, Table};
use console::style;

use super::args::RunArgs;
use crate::pipeline::scoring::{CoefficientTable, LinearModel, MODEL_VARIABLES};
use crate::pipeline::{save_dataset, FileArtifacts, FileSource, Pipeline, PipelineConfig};
use crate::report::{display_run_summary, export_run_report, RunMetrics, RunReport};
use crate::utils::{
    print_banner, print_completion, print_config, print_info, print_success, ConfigCard,
};

/// Build the run configuration: file values first, flags on top.
pub fn resolve_config(args: &RunArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(orientation) = args.orientation {
        config.orientation = Some(orientation);
    }
    if let Some(method) = args.method {
        config.scoring_method = method;
    }
    if let Some(policy) = args.affiliation_policy {
        config.affiliation_policy = policy;
    }
    if !args.scope_segments.is_empty() {
        config.scope_segments = args.scope_segments.clone();
    }
    if let Some(top_n) = args.top_n {
        config.summary_top_n = top_n;
    }
    Ok(config)
}

/// `pdo run`
pub fn run_batch(args: &RunArgs) -> Result<()> {
    let config = resolve_config(args)?;
    let output = args.output_path();

    print_banner(env!("CARGO_PKG_VERSION"));
    let method = format!("{:?}", config.scoring_method);
    let orientation = config
        .orientation
        .map(|o| o.to_string())
        .unwrap_or_else(|| "(not set)".to_string());
    print_config(&ConfigCard {
        sources: &args.sources,
        coefficients: &args.coefficients,
        output: &output,
        method: &method,
        orientation: &orientation,
    });

    let source = FileSource::new(&args.sources);
    let artifacts = FileArtifacts {
        coefficients: args.coefficients.clone(),
        linear_model: args.model.clone(),
    };
    let top_n = config.summary_top_n;
    let pipeline = Pipeline::new(config, &source, &artifacts);

    let mut metrics = RunMetrics::new(crate::pipeline::LAST_STAGE);
    let result = pipeline.run(&mut metrics).and_then(|mut outcome| {
        save_dataset(&mut outcome.scored, &output)?;
        Ok(outcome)
    });
    if result.is_err() {
        metrics.fail();
    }

    display_run_summary(&metrics, top_n);
    if let Some(path) = &args.metrics_report {
        let stats = result.as_ref().ok().and_then(|o| o.stats);
        export_run_report(&RunReport::new(&metrics, top_n, stats), path)?;
        print_info(&format!("Run report written to {}", path.display()));
    }

    result?;
    print_completion(&output);
    Ok(())
}

/// `pdo check-coefficients`
pub fn check_coefficients(path: &Path) -> Result<()> {
    let table = CoefficientTable::load(path)
        .with_context(|| format!("Invalid coefficient file: {}", path.display()))?;

    let mut out = Table::new();
    out.load_preset(UTF8_FULL_CONDENSED);
    out.set_header(vec![
        Cell::new("Variable").add_attribute(Attribute::Bold),
        Cell::new("Bucket").add_attribute(Attribute::Bold),
        Cell::new("Coefficient").add_attribute(Attribute::Bold),
    ]);
    for (v, variable) in MODEL_VARIABLES.iter().enumerate() {
        for (b, bucket) in variable.buckets.iter().enumerate() {
            let label = if bucket.label == variable.reference {
                format!("{} (ref)", bucket.label)
            } else {
                bucket.label.to_string()
            };
            out.add_row(vec![
                Cell::new(variable.name),
                Cell::new(label),
                Cell::new(format!("{:+.6}", table.value(v, b))),
            ]);
        }
    }
    for line in out.to_string().lines() {
        println!("    {}", line);
    }
    println!();
    println!("    Intercept: {}", style(format!("{:+.6}", table.intercept())).yellow());
    print_success("Coefficient table is valid");
    Ok(())
}

/// `pdo export-model`
pub fn export_model(coefficients: &Path, output: &Path) -> Result<()> {
    let table = CoefficientTable::load(coefficients)
        .with_context(|| format!("Invalid coefficient file: {}", coefficients.display()))?;
    let model = LinearModel::from_coefficients(&table);
    model
        .save(output)
        .with_context(|| format!("Failed to write model file: {}", output.display()))?;
    print_success(&format!(
        "Linear model with {} features written to {}",
        model.feature_order.len(),
        output.display()
    ));
    Ok(())
}
