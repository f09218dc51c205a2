use civicfeeds_lib::{RunOutcome, RunSummary, SourceReport};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::commands::status::DirStatus;

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Records")]
    records: String,
    #[tabled(rename = "Output")]
    output: String,
}

fn build_summary_rows(summary: &RunSummary) -> Vec<SummaryRow> {
    summary
        .reports
        .iter()
        .map(|r| {
            let (records, output) = match &r.outcome {
                RunOutcome::Success { records, path } => {
                    (records.to_string(), path.display().to_string())
                }
                RunOutcome::NoData => ("0".to_string(), String::new()),
                RunOutcome::Failed { reason } => ("-".to_string(), reason.clone()),
            };
            SummaryRow {
                source: r.name.clone(),
                status: r.outcome.label().to_string(),
                records,
                output,
            }
        })
        .collect()
}

pub fn print_summary_table(summary: &RunSummary) {
    let mut table = Table::new(build_summary_rows(summary));
    table.with(Style::rounded());
    println!("{}", table);
}

/// One console line per finished source.
pub fn status_line(report: &SourceReport) -> String {
    match &report.outcome {
        RunOutcome::Success { records, .. } => {
            format!("✓ {} completed successfully ({} records)", report.name, records)
        }
        RunOutcome::NoData => format!("✗ {} produced no data", report.name),
        RunOutcome::Failed { reason } => format!("✗ {} failed: {}", report.name, reason),
    }
}

pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b >= MB {
        format!("{:.2} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "Size")]
    size: String,
}

pub fn print_status(dirs: &[DirStatus]) {
    println!("Data Directory Status");
    for dir in dirs {
        println!();
        match &dir.files {
            None => println!("{}: Not found", dir.name.to_uppercase()),
            Some(files) if files.is_empty() => {
                println!("{}: {}", dir.name.to_uppercase(), dir.path.display());
                println!("  (no CSV files)");
            }
            Some(files) => {
                println!("{}: {}", dir.name.to_uppercase(), dir.path.display());
                let rows: Vec<StatusRow> = files
                    .iter()
                    .map(|(name, size)| StatusRow {
                        file: name.clone(),
                        size: format_size(*size),
                    })
                    .collect();
                let mut table = Table::new(rows);
                table.with(Style::psql());
                println!("{}", table);
            }
        }
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
