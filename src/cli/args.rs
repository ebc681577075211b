//! Command-line argument definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::pipeline::scoring::{Orientation, ScoringMethod};
use crate::pipeline::AffiliationPolicy;

/// PDO - Probability of Default batch scoring for corporate clients
#[derive(Parser, Debug)]
#[command(name = "pdo")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full batch: load sources, build features and score every entity
    Run(RunArgs),

    /// Validate a coefficient file and print its table
    CheckCoefficients {
        /// Coefficient file (JSON: {"model": {"coeffs": {...}}})
        coefficients: PathBuf,
    },

    /// Derive a linear model artifact that reproduces a coefficient file
    ExportModel {
        /// Coefficient file (JSON)
        coefficients: PathBuf,

        /// Output model file (JSON)
        output: PathBuf,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Directory holding one <source>.parquet or <source>.csv per source table
    #[arg(short, long)]
    pub sources: PathBuf,

    /// Coefficient file (JSON)
    #[arg(short, long)]
    pub coefficients: PathBuf,

    /// Output file for the scored table (CSV or Parquet, by extension).
    /// Defaults to <sources>/pdo_scores.parquet.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Run configuration (JSON). Command-line flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Outcome the coefficients were calibrated for: "default-event" (PDO = sigmoid)
    /// or "non-default-event" (PDO = 1 - sigmoid). Required here or in --config.
    #[arg(long)]
    pub orientation: Option<Orientation>,

    /// Scoring form: "closed-form" or "linear-model"
    #[arg(long)]
    pub method: Option<ScoringMethod>,

    /// Linear model artifact (JSON), used with --method linear-model
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Reading of blank business-group ids: "null-only" or "blank-as-none"
    #[arg(long)]
    pub affiliation_policy: Option<AffiliationPolicy>,

    /// Segments (c_seg_nae) in PDO scope, comma-separated. Default: all.
    #[arg(long, value_delimiter = ',')]
    pub scope_segments: Vec<String>,

    /// Number of longest stages listed in the final summary
    #[arg(long)]
    pub top_n: Option<usize>,

    /// Write a JSON run report to this path
    #[arg(long)]
    pub metrics_report: Option<PathBuf>,
}

impl RunArgs {
    /// Output path, defaulting to `<sources>/pdo_scores.parquet`.
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.sources.join("pdo_scores.parquet"))
    }
}
