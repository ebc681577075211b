//! PDO: Probability of Default batch CLI

use anyhow::Result;
use clap::Parser;

use pdo::cli::{check_coefficients, export_model, run_batch, Cli, Commands};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Run(args) => run_batch(args),
        Commands::CheckCoefficients { coefficients } => check_coefficients(coefficients),
        Commands::ExportModel {
            coefficients,
            output,
        } => export_model(coefficients, output),
    }
}
