//! Terminal styling for the batch banner and configuration card

use console::{style, Emoji};
use std::path::Path;

pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "[*] ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", ">> ");
pub static FOLDER: Emoji<'_, '_> = Emoji("📂 ", "");
pub static TARGET: Emoji<'_, '_> = Emoji("🎯 ", "");
pub static SAVE: Emoji<'_, '_> = Emoji("💾 ", "");
pub static CHART: Emoji<'_, '_> = Emoji("📊 ", "");

/// Print the application banner
pub fn print_banner(version: &str) {
    println!();
    println!(
        "    {} {}",
        style("PDO").cyan().bold(),
        style("Probability of Default batch scoring").dim()
    );
    println!("    {}", style(format!("v{}", version)).dim());
    println!("    {}", style("━".repeat(50)).dim());
    println!();
}

/// Values shown on the configuration card
pub struct ConfigCard<'a> {
    pub sources: &'a Path,
    pub coefficients: &'a Path,
    pub output: &'a Path,
    pub method: &'a str,
    pub orientation: &'a str,
}

/// Print configuration card
pub fn print_config(card: &ConfigCard<'_>) {
    let box_width = 56;
    let line = "─".repeat(box_width - 2);

    println!("    ┌{}┐", line);
    println!(
        "    │ {}{}│",
        style("⚙️  Configuration").cyan().bold(),
        " ".repeat(box_width - 20)
    );
    println!("    ├{}┤", line);
    println!("    │  {} Sources: {:<38}│", FOLDER, truncate_path(card.sources, 37));
    println!("    │  {} Coeffs:  {:<38}│", CHART, truncate_path(card.coefficients, 37));
    println!("    │  {} Output:  {:<38}│", SAVE, truncate_path(card.output, 37));
    println!("    ├{}┤", line);
    println!(
        "    │  {} Method:      {:<32}│",
        TARGET,
        style(truncate_string(card.method, 30)).yellow()
    );
    println!(
        "    │  {} Orientation: {:<32}│",
        TARGET,
        style(truncate_string(card.orientation, 30)).yellow()
    );
    println!("    └{}┘", line);
    println!();
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("    {} {}", style("✓").green().bold(), style(message).green());
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("    {} {}", INFO, message);
}

/// Print the final completion message
pub fn print_completion(output: &Path) {
    println!();
    println!(
        "    {} {} {}",
        ROCKET,
        style("PDO scores written to").green().bold(),
        style(output.display()).dim()
    );
    println!();
}

fn truncate_path(path: &Path, max_len: usize) -> String {
    let path_str = path.display().to_string();
    truncate_string(&path_str, max_len)
}

fn truncate_string(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        s.to_string()
    } else {
        let tail: String = chars[chars.len() - (max_len - 3)..].iter().collect();
        format!("...{}", tail)
    }
}
