//! Run-scoped stage metrics
//!
//! A [`RunMetrics`] value is created per run and passed to every stage. A stage
//! opens a [`StageHandle`], records the tables it reads and produces, and is
//! closed with [`RunMetrics::end_stage`] whatever its outcome.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Local};
use polars::prelude::DataFrame;

/// Lifecycle of a run: `Running` until it ends in `Success` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
        }
    }
}

/// Rows and columns of one table seen by a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableShape {
    pub label: String,
    pub rows: usize,
    pub columns: usize,
}

/// An open stage.
#[derive(Debug)]
pub struct StageHandle {
    number: u8,
    name: String,
    started: Instant,
    inputs: Vec<TableShape>,
    outputs: Vec<TableShape>,
}

impl StageHandle {
    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_input(&mut self, label: &str, df: &DataFrame) {
        self.record_input_shape(label, df.height(), df.width());
    }

    pub fn record_input_shape(&mut self, label: &str, rows: usize, columns: usize) {
        log::info!("  input  {:<24} {:>10} rows × {} cols", label, rows, columns);
        self.inputs.push(TableShape {
            label: label.to_string(),
            rows,
            columns,
        });
    }

    pub fn record_output(&mut self, label: &str, df: &DataFrame) {
        log::info!("  output {:<24} {:>10} rows × {} cols", label, df.height(), df.width());
        self.outputs.push(TableShape {
            label: label.to_string(),
            rows: df.height(),
            columns: df.width(),
        });
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// A closed stage.
#[derive(Debug, Clone)]
pub struct StageMetrics {
    pub number: u8,
    pub name: String,
    pub success: bool,
    pub duration: Duration,
    pub inputs: Vec<TableShape>,
    pub outputs: Vec<TableShape>,
    pub error: Option<String>,
}

/// Metrics of one pipeline run.
#[derive(Debug)]
pub struct RunMetrics {
    total_stages: u8,
    started: Instant,
    started_at: DateTime<Local>,
    status: RunStatus,
    stages: Vec<StageMetrics>,
    final_rows: Option<usize>,
}

impl RunMetrics {
    /// Start a run of stages numbered `0..=last_stage`.
    pub fn new(last_stage: u8) -> Self {
        Self {
            total_stages: last_stage,
            started: Instant::now(),
            started_at: Local::now(),
            status: RunStatus::Running,
            stages: Vec::new(),
            final_rows: None,
        }
    }

    pub fn begin_stage(&self, number: u8, name: &str) -> StageHandle {
        log::info!("━━━ STEP {}/{} │ {} ━━━", number, self.total_stages, name);
        StageHandle {
            number,
            name: name.to_string(),
            started: Instant::now(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Close a stage. A failure marks the whole run as failed.
    pub fn end_stage(&mut self, handle: StageHandle, outcome: std::result::Result<(), String>) {
        let duration = handle.elapsed();
        let error = outcome.err();
        match &error {
            None => log::info!("✓ STEP {} {} done in {:.2}s", handle.number, handle.name, duration.as_secs_f64()),
            Some(e) => {
                log::error!(
                    "✗ STEP {} {} failed after {:.2}s (run time {:.2}s): {}",
                    handle.number,
                    handle.name,
                    duration.as_secs_f64(),
                    self.elapsed().as_secs_f64(),
                    e
                );
                self.status = RunStatus::Failed;
            }
        }
        self.stages.push(StageMetrics {
            number: handle.number,
            name: handle.name,
            success: error.is_none(),
            duration,
            inputs: handle.inputs,
            outputs: handle.outputs,
            error,
        });
    }

    /// Run `body` as a stage; the stage is closed on both exit paths and the
    /// error, if any, is returned unchanged.
    ///
    /// A panicking body is recorded as a failed stage before the panic resumes.
    pub fn run_stage<T, F>(&mut self, number: u8, name: &str, body: F) -> Result<T>
    where
        F: FnOnce(&mut StageHandle) -> Result<T>,
    {
        let mut handle = self.begin_stage(number, name);
        let result = match panic::catch_unwind(AssertUnwindSafe(|| body(&mut handle))) {
            Ok(result) => result,
            Err(payload) => {
                self.end_stage(handle, Err(format!("panicked: {}", panic_message(&*payload))));
                panic::resume_unwind(payload);
            }
        };
        let outcome = match &result {
            Ok(_) => Ok(()),
            Err(e) => Err(format!("{:#}", e)),
        };
        self.end_stage(handle, outcome);
        result
    }

    /// Mark the run successful unless a stage already failed.
    pub fn finish(&mut self, final_rows: usize) {
        self.final_rows = Some(final_rows);
        if self.status == RunStatus::Running {
            self.status = RunStatus::Success;
        }
    }

    /// Mark the run failed (error outside any stage).
    pub fn fail(&mut self) {
        self.status = RunStatus::Failed;
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn stages(&self) -> &[StageMetrics] {
        &self.stages
    }

    pub fn failed_stage(&self) -> Option<&StageMetrics> {
        self.stages.iter().find(|s| !s.success)
    }

    pub fn final_rows(&self) -> Option<usize> {
        self.final_rows
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// The `n` longest stages, longest first.
    pub fn top_stages(&self, n: usize) -> Vec<&StageMetrics> {
        let mut sorted: Vec<&StageMetrics> = self.stages.iter().collect();
        sorted.sort_by(|a, b| b.duration.cmp(&a.duration));
        sorted.truncate(n);
        sorted
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
