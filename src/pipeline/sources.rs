//! Input boundary: source tables, scoring artifacts and the scored output file

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use polars::prelude::*;

use super::scoring::{CoefficientTable, LinearModel};
use crate::utils::{create_spinner, finish_with_success};

/// Every source a run loads, in load order.
pub const SOURCE_NAMES: [&str; 9] = [
    "df_main",
    "rsc",
    "soldes",
    "reboot",
    "donnees_transac",
    "safir_cc",
    "safir_cd",
    "safir_sc",
    "safir_sd",
];

/// Something that hands out source tables by name.
pub trait DataSource {
    /// Whether `name` can be loaded, without reading it.
    fn contains(&self, name: &str) -> bool;

    fn load(&self, name: &str) -> Result<DataFrame>;
}

/// Something that hands out the scoring artifacts.
pub trait ArtifactStore {
    fn coefficients(&self) -> Result<CoefficientTable>;

    /// The linear model, when one is configured.
    fn linear_model(&self) -> Result<Option<LinearModel>>;
}

/// Reads `<dir>/<name>.parquet` or `<dir>/<name>.csv`.
///
/// CSV columns are all read as text so that codes keep their leading zeros.
#[derive(Debug, Clone)]
pub struct FileSource {
    dir: PathBuf,
}

impl FileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file backing `name`, Parquet first.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        ["parquet", "csv"]
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", name, ext)))
            .find(|p| p.exists())
    }
}

impl DataSource for FileSource {
    fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    fn load(&self, name: &str) -> Result<DataFrame> {
        let path = self
            .resolve(name)
            .with_context(|| format!("No {}.parquet or {}.csv in {}", name, name, self.dir.display()))?;
        let spinner = create_spinner(&format!("Loading {}...", name));
        let df = load_dataset(&path)?;
        finish_with_success(
            &spinner,
            &format!("{} ({} rows × {} columns)", name, df.height(), df.width()),
        );
        Ok(df)
    }
}

/// Load a CSV or Parquet file into memory.
pub fn load_dataset(path: &Path) -> Result<DataFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let lf = match extension.as_str() {
        "csv" => LazyCsvReader::new(path)
            .with_infer_schema_length(Some(0))
            .finish()
            .with_context(|| format!("Failed to load CSV file: {}", path.display()))?,
        "parquet" => LazyFrame::scan_parquet(path, Default::default())
            .with_context(|| format!("Failed to load Parquet file: {}", path.display()))?,
        _ => anyhow::bail!(
            "Unsupported file format: {}. Supported formats: csv, parquet",
            extension
        ),
    };

    lf.collect()
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// Save the scored table (CSV or Parquet based on extension).
pub fn save_dataset(df: &mut DataFrame, path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "csv" => {
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            CsvWriter::new(&mut file)
                .finish(df)
                .with_context(|| format!("Failed to write CSV file: {}", path.display()))?;
        }
        "parquet" => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            ParquetWriter::new(file)
                .finish(df)
                .with_context(|| format!("Failed to write Parquet file: {}", path.display()))?;
        }
        _ => anyhow::bail!(
            "Unsupported output format: {}. Supported formats: csv, parquet",
            extension
        ),
    }

    Ok(())
}

/// Coefficients and optional linear model read from JSON files.
#[derive(Debug, Clone)]
pub struct FileArtifacts {
    pub coefficients: PathBuf,
    pub linear_model: Option<PathBuf>,
}

impl ArtifactStore for FileArtifacts {
    fn coefficients(&self) -> Result<CoefficientTable> {
        CoefficientTable::load(&self.coefficients)
            .with_context(|| format!("Invalid coefficient file: {}", self.coefficients.display()))
    }

    fn linear_model(&self) -> Result<Option<LinearModel>> {
        self.linear_model
            .as_ref()
            .map(|path| {
                LinearModel::load(path)
                    .with_context(|| format!("Invalid model file: {}", path.display()))
            })
            .transpose()
    }
}

/// Fail with every missing name if any of `names` cannot be loaded.
pub fn check_available(source: &dyn DataSource, names: &[&str]) -> Result<()> {
    let missing: Vec<&str> = names.iter().copied().filter(|n| !source.contains(n)).collect();
    if !missing.is_empty() {
        anyhow::bail!("Missing source(s): {}", missing.join(", "));
    }
    Ok(())
}

/// Load one source, naming it in the error.
pub fn load_source(source: &dyn DataSource, name: &str) -> Result<DataFrame> {
    source
        .load(name)
        .with_context(|| format!("Failed to load source '{}'", name))
}

/// Drop a table no later stage needs, and say so.
pub fn release(name: &str, df: DataFrame) {
    let mb = df.estimated_size() as f64 / (1024.0 * 1024.0);
    drop(df);
    log::info!("Released '{}' (~{:.2} MB)", name, mb);
}
