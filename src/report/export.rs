//! JSON run report

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use super::metrics::{RunMetrics, TableShape};
use crate::pipeline::scoring::PdoStats;

/// Metadata about the run
#[derive(Serialize)]
pub struct RunMetadata {
    /// Start of the run (RFC 3339, local time)
    pub started_at: String,
    pub pdo_version: String,
    pub status: String,
    pub duration_secs: f64,
    /// Rows in the scored output, when the run reached it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scored_rows: Option<usize>,
}

#[derive(Serialize)]
pub struct TableEntry {
    pub label: String,
    pub rows: usize,
    pub columns: usize,
}

impl From<&TableShape> for TableEntry {
    fn from(shape: &TableShape) -> Self {
        Self {
            label: shape.label.clone(),
            rows: shape.rows,
            columns: shape.columns,
        }
    }
}

/// One stage in the report
#[derive(Serialize)]
pub struct StageEntry {
    pub step: u8,
    pub name: String,
    pub success: bool,
    pub duration_secs: f64,
    pub inputs: Vec<TableEntry>,
    pub outputs: Vec<TableEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Complete run report
#[derive(Serialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub stages: Vec<StageEntry>,
    /// Names of the longest stages, longest first
    pub longest_stages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdo: Option<PdoStats>,
}

impl RunReport {
    pub fn new(metrics: &RunMetrics, top_n: usize, pdo: Option<PdoStats>) -> Self {
        let stages = metrics
            .stages()
            .iter()
            .map(|s| StageEntry {
                step: s.number,
                name: s.name.clone(),
                success: s.success,
                duration_secs: s.duration.as_secs_f64(),
                inputs: s.inputs.iter().map(TableEntry::from).collect(),
                outputs: s.outputs.iter().map(TableEntry::from).collect(),
                error: s.error.clone(),
            })
            .collect();

        Self {
            metadata: RunMetadata {
                started_at: metrics.started_at().to_rfc3339(),
                pdo_version: env!("CARGO_PKG_VERSION").to_string(),
                status: metrics.status().as_str().to_string(),
                duration_secs: metrics.elapsed().as_secs_f64(),
                scored_rows: metrics.final_rows(),
            },
            stages,
            longest_stages: metrics.top_stages(top_n).iter().map(|s| s.name.clone()).collect(),
            pdo,
        }
    }
}

/// Write the run report as pretty JSON.
pub fn export_run_report(report: &RunReport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
    std::fs::write(output_path, json)
        .with_context(|| format!("Failed to write run report: {}", output_path.display()))?;
    Ok(())
}
