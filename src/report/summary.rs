//! Final run summary, printed on success and on failure

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, Color, Table};
use console::style;

use super::metrics::{RunMetrics, RunStatus};

/// Print the per-stage table, the slowest stages and the run outcome.
pub fn display_run_summary(metrics: &RunMetrics, top_n: usize) {
    println!();
    println!(
        "    {} {}",
        style("📋").cyan(),
        style("RUN SUMMARY").white().bold()
    );
    println!("    {}", style("─".repeat(50)).dim());
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("Step").add_attribute(Attribute::Bold),
        Cell::new("Stage").add_attribute(Attribute::Bold),
        Cell::new("Status").add_attribute(Attribute::Bold),
        Cell::new("Duration").add_attribute(Attribute::Bold),
        Cell::new("Rows out").add_attribute(Attribute::Bold),
    ]);

    for stage in metrics.stages() {
        let status = if stage.success {
            Cell::new("✅ OK").fg(Color::Green)
        } else {
            Cell::new("❌ FAILED").fg(Color::Red).add_attribute(Attribute::Bold)
        };
        let rows_out = stage
            .outputs
            .last()
            .map(|o| o.rows.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(stage.number),
            Cell::new(&stage.name),
            status,
            Cell::new(format!("{:.2}s", stage.duration.as_secs_f64())),
            Cell::new(rows_out),
        ]);
    }

    for line in table.to_string().lines() {
        println!("    {}", line);
    }

    let top = metrics.top_stages(top_n);
    if !top.is_empty() {
        println!();
        println!(
            "      {} {}:",
            style("Longest stages").yellow(),
            style(format!("(top {})", top.len())).dim()
        );
        for stage in top {
            println!(
                "        {} {:<28} {}",
                style("•").dim(),
                stage.name,
                style(format!("{:.2}s", stage.duration.as_secs_f64())).cyan()
            );
        }
    }

    println!();
    let total = metrics.elapsed().as_secs_f64();
    match metrics.status() {
        RunStatus::Success => println!(
            "    {} {} in {:.2}s ({} scored rows)",
            style("✓").green().bold(),
            style("Run succeeded").green().bold(),
            total,
            metrics.final_rows().unwrap_or(0)
        ),
        RunStatus::Failed => {
            println!(
                "    {} {} after {:.2}s",
                style("✗").red().bold(),
                style("Run failed").red().bold(),
                total
            );
            if let Some(stage) = metrics.failed_stage() {
                println!(
                    "      Stage {} {}: {}",
                    stage.number,
                    style(&stage.name).bold(),
                    stage.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        RunStatus::Running => println!(
            "    {} Run interrupted after {:.2}s",
            style("…").yellow(),
            total
        ),
    }
    println!();
}
