//! Coloured terminal summaries for backup/restore jobs, adapted from the
//! teacher's `print_summary`/`print_perf_summary` — same `colored`/`tabled`
//! pairing, same rounded-table style, generalised from `Changeset` rows to
//! [`JobStatus`] rows.

use colored::*;
use tabled::settings::{object::Columns, Alignment, Modify, Style};
use tabled::{Table, Tabled};

use crate::application::monitoring::PerfReport;
use crate::domain::error::JobStatus;

#[derive(Tabled)]
struct SummaryRow {
    metric: String,
    value: String,
}

pub fn print_backup_summary(status: &JobStatus) {
    println!();
    println!("{}", "CROSSTAB BACKUP SUMMARY".bold().cyan());
    print_job_status(status);
}

pub fn print_restore_summary(status: &JobStatus) {
    println!();
    println!("{}", "CROSSTAB RESTORE SUMMARY".bold().cyan());
    print_job_status(status);
}

fn print_job_status(status: &JobStatus) {
    let outcome = if status.success {
        "success".green().to_string()
    } else {
        "failed".red().to_string()
    };

    let rows = vec![
        SummaryRow {
            metric: "Outcome".into(),
            value: outcome,
        },
        SummaryRow {
            metric: "Duration".into(),
            value: format!("{:.2}s", status.duration_seconds),
        },
        SummaryRow {
            metric: "Statements executed".into(),
            value: status.statements_executed.to_string().green().to_string(),
        },
        SummaryRow {
            metric: "Statements failed".into(),
            value: status.statements_failed.to_string().red().to_string(),
        },
    ];

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..=1)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    if let Some(err) = &status.error {
        println!("{} {}", "error:".bold().red(), err);
    }

    if !status.errors.is_empty() {
        println!();
        println!("{}", "FAILED STATEMENTS".bold().yellow());
        for e in &status.errors {
            println!(
                "  [{}] {} — {}",
                e.statement_index.to_string().dimmed(),
                e.statement.dimmed(),
                e.error.red()
            );
        }
    }
    println!();
}

#[derive(Tabled)]
struct PerfRow {
    operation: String,
    table: String,
    #[tabled(rename = "rows")]
    rows: String,
    #[tabled(rename = "time (ms)")]
    duration_ms: String,
}

/// Same shape as the teacher's `print_perf_summary`, driving our own
/// [`PerfReport`] instead of diffly's.
pub fn print_perf_summary(report: &PerfReport) {
    if report.timings.is_empty() {
        return;
    }

    println!("{}", "PERFORMANCE".bold().cyan());

    let rows: Vec<PerfRow> = report
        .timings
        .iter()
        .map(|t| PerfRow {
            operation: t.operation.dimmed().to_string(),
            table: t.table.bold().to_string(),
            rows: t.rows.to_string(),
            duration_ms: format_duration(t.duration_ms),
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..=3)).with(Alignment::right()))
        .to_string();

    println!("{table}");

    println!(
        "  Total: {} row(s)  ·  {} ms elapsed",
        report.total_rows_fetched().to_string().bold(),
        format_duration(report.total_ms()),
    );
    println!();
}

fn format_duration(ms: u128) -> String {
    if ms >= 1_000 {
        format!("{:.1}s", ms as f64 / 1_000.0).yellow().to_string()
    } else if ms >= 100 {
        ms.to_string().yellow().to_string()
    } else {
        ms.to_string().green().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_duration_buckets_by_magnitude() {
        assert!(format_duration(50).contains("50"));
        assert!(format_duration(500).contains("500"));
        assert!(format_duration(1_500).contains("1.5"));
    }

    #[test]
    fn print_job_status_does_not_panic_on_empty_errors() {
        let status = JobStatus::success(1.5, 10);
        print_backup_summary(&status);
    }
}
