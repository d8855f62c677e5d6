use chrono::{DateTime, Utc};
use model::execution::run::{ImportRun, RunCounters, RunStatus};
use serde::Serialize;

/// End-of-run report printed by the CLI and emitted in JSON mode.
#[derive(Serialize, Debug, Clone)]
pub struct RunSummaryReport {
    pub run_id: String,
    pub connection_id: String,
    pub status: RunStatus,
    pub succeeded: bool,
    pub counters: RunCounters,
    pub chunks: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl RunSummaryReport {
    pub fn from_run(run: &ImportRun) -> Self {
        RunSummaryReport {
            run_id: run.id.to_string(),
            connection_id: run.connection_id.to_string(),
            status: run.status,
            succeeded: matches!(
                run.status,
                RunStatus::Completed | RunStatus::CompletedWithErrors
            ),
            counters: run.counters,
            chunks: run.chunk_count,
            started_at: run.started_at,
            finished_at: run.finished_at,
            duration_secs: run.duration_secs(),
            diagnostic: run.diagnostic.clone(),
            errors: run.errors.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::identifiers::ConnectionId;

    #[test]
    fn completed_with_errors_counts_as_success() {
        let mut run = ImportRun::new(ConnectionId::new("acme"));
        run.status = RunStatus::CompletedWithErrors;
        assert!(RunSummaryReport::from_run(&run).succeeded);

        run.status = RunStatus::Failed;
        let json = serde_json::to_value(RunSummaryReport::from_run(&run)).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["succeeded"], false);
        assert!(json.get("errors").is_none());
    }
}
