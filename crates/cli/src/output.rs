use crate::error::CliError;
use engine_config::report::{reconcile::ReconcileSummary, summary::RunSummaryReport};
use engine_core::status::RunStatusView;
use engine_processing::client::health::HealthReport;
use model::execution::run::RunCounters;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

pub fn print_run_summary(report: &RunSummaryReport) {
    println!("Run '{}' for connection '{}':", report.run_id, report.connection_id);
    println!("-----------------------------");
    println!("{:<16} {}", "Status", report.status);
    print_counters(&report.counters);
    println!("{:<16} {}", "Chunks", or_na(report.chunks));
    println!("{:<16} {}", "Duration (s)", or_na(report.duration_secs));
    if let Some(diagnostic) = &report.diagnostic {
        println!("{:<16} {}", "Diagnostic", diagnostic);
    }
    print_errors(&report.errors);
}

pub fn print_status(view: &RunStatusView) {
    println!("Run '{}' for connection '{}':", view.run_id, view.connection_id);
    println!("-----------------------------");
    println!("{:<16} {}", "Status", view.status);
    if view.cancel_requested && !view.status.is_terminal() {
        println!("{:<16} yes", "Cancelling");
    }
    print_counters(&view.counters);
    println!("{:<16} {}", "Chunks", or_na(view.chunk_count));
    println!("{:<16} {}", "Started", view.started_at.to_rfc3339());
    println!(
        "{:<16} {}",
        "Finished",
        or_na(view.finished_at.map(|ts| ts.to_rfc3339()))
    );
    println!("{:<16} {}", "Duration (s)", or_na(view.duration_secs));
    if let Some(diagnostic) = &view.diagnostic {
        println!("{:<16} {}", "Diagnostic", diagnostic);
    }
    print_errors(&view.recent_errors);
}

pub fn print_history(views: &[RunStatusView]) {
    println!(
        "{:<38} {:<22} {:>9} {:>8} {:>8} {:>8} {:>7}",
        "Run", "Status", "Processed", "Created", "Updated", "Skipped", "Failed"
    );
    for view in views {
        let c = &view.counters;
        println!(
            "{:<38} {:<22} {:>9} {:>8} {:>8} {:>8} {:>7}",
            view.run_id.as_str(),
            view.status.to_string(),
            c.processed,
            c.created,
            c.updated,
            c.skipped,
            c.failed
        );
    }
}

pub fn print_reconcile(summary: &ReconcileSummary) {
    for report in &summary.reports {
        let mode = if report.dry_run { " (dry run)" } else { "" };
        println!("Connection '{}'{mode}:", report.connection_id);
        match report.action {
            None => println!("  no stale policy, skipped"),
            Some(action) => {
                println!("  {:<14} {}", "Action", action);
                println!(
                    "  {:<14} {}",
                    "Cutoff",
                    or_na(report.cutoff.map(|c| c.to_rfc3339()))
                );
                println!("  {:<14} {}", "Scanned", report.scanned);
                println!("  {:<14} {}", "Stale", report.stale);
                println!("  {:<14} {}", "Applied", report.applied);
                println!("  {:<14} {}", "Failed", report.failed);
            }
        }
        for error in &report.errors {
            println!("  ! {error}");
        }
    }
    for failure in &summary.failures {
        println!("Connection '{}': FAILED: {}", failure.connection_id, failure.error);
    }
}

pub fn print_health(report: &HealthReport) {
    println!("{:<16} {}", "Destination", report.destination);
    println!("{:<16} {}", "Status", report.status);
    println!("{:<16} {}", "Latency (ms)", or_na(report.latency_ms));
    if let Some(message) = &report.message {
        println!("{:<16} {}", "Message", message);
    }
}

fn print_counters(counters: &RunCounters) {
    println!("{:<16} {}", "Processed", counters.processed);
    println!("{:<16} {}", "Created", counters.created);
    println!("{:<16} {}", "Updated", counters.updated);
    println!("{:<16} {}", "Skipped", counters.skipped);
    println!("{:<16} {}", "Failed", counters.failed);
}

fn print_errors(errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    println!("Recent errors:");
    for error in errors {
        println!("  - {error}");
    }
}

fn or_na<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "n/a".to_string())
}
