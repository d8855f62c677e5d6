use chrono::{DateTime, Utc};
use model::execution::connection::StaleAction;
use serde::Serialize;

/// Outcome of one stale-product pass for one connection.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    pub connection_id: String,
    pub dry_run: bool,
    /// `None` when the connection has no stale policy.
    pub action: Option<StaleAction>,
    pub cutoff: Option<DateTime<Utc>>,
    pub scanned: usize,
    pub stale: usize,
    /// Products the action was applied to (0 in dry-run mode).
    pub applied: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stale_ids: Vec<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ReconcileReport {
    pub fn skipped(connection_id: &str, dry_run: bool) -> Self {
        ReconcileReport {
            connection_id: connection_id.to_string(),
            dry_run,
            action: None,
            cutoff: None,
            scanned: 0,
            stale: 0,
            applied: 0,
            failed: 0,
            stale_ids: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// A connection whose reconciliation could not complete.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ReconcileFailure {
    pub connection_id: String,
    pub error: String,
}

/// Result of reconciling several connections; one failure never hides the
/// others.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct ReconcileSummary {
    pub reports: Vec<ReconcileReport>,
    pub failures: Vec<ReconcileFailure>,
}

impl ReconcileSummary {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty() && self.reports.iter().all(|r| r.failed == 0)
    }

    pub fn total_stale(&self) -> usize {
        self.reports.iter().map(|r| r.stale).sum()
    }
}
