use crate::core::identifiers::{ConnectionId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of an import run. Transitions only move forward; `Failed` is
/// reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Downloading,
    Downloaded,
    Chunking,
    Processing,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Downloading => "downloading",
            RunStatus::Downloaded => "downloaded",
            RunStatus::Chunking => "chunking",
            RunStatus::Processing => "processing",
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::CompletedWithErrors | RunStatus::Failed
        )
    }

    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        use RunStatus::*;

        if self.is_terminal() {
            return false;
        }

        matches!(
            (self, next),
            (_, Failed)
                | (Pending, Downloading)
                | (Downloading, Downloaded)
                | (Downloaded, Chunking)
                | (Chunking, Processing)
                | (Processing, Completed)
                | (Processing, CompletedWithErrors)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl RunCounters {
    pub fn apply(&mut self, delta: &CounterDelta) {
        self.processed += delta.processed;
        self.created += delta.created;
        self.updated += delta.updated;
        self.skipped += delta.skipped;
        self.failed += delta.failed;
    }

    /// Folds one product's outcome in, given what was recorded for it
    /// before. A product counts once; the only later move is from failed to
    /// persisted. Returns whether the counters changed.
    pub fn settle(&mut self, previous: Option<ItemOutcome>, next: ItemOutcome) -> bool {
        match previous {
            None => {}
            Some(ItemOutcome::Failed) if next.is_persisted() => {
                self.failed = self.failed.saturating_sub(1);
            }
            Some(_) => return false,
        }
        match next {
            ItemOutcome::Created => self.created += 1,
            ItemOutcome::Updated => self.updated += 1,
            ItemOutcome::Failed => self.failed += 1,
        }
        true
    }
}

/// Increment applied to a run's counters. Deltas only ever add, so the order
/// in which chunks report does not affect the totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDelta {
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl CounterDelta {
    pub fn is_zero(&self) -> bool {
        *self == CounterDelta::default()
    }
}

/// How one product of a chunk ended up at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    Created,
    Updated,
    Failed,
}

impl ItemOutcome {
    pub fn is_persisted(&self) -> bool {
        !matches!(self, ItemOutcome::Failed)
    }
}

/// Outcome of one product, keyed by its identity within the chunk. A retried
/// chunk reports the same keys again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemResult {
    pub key: String,
    pub outcome: ItemOutcome,
    /// Logged on the run the first time this key is recorded as failed.
    pub error: Option<String>,
}

/// One execution of the pipeline for a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRun {
    pub id: RunId,
    pub connection_id: ConnectionId,
    pub status: RunStatus,
    pub counters: RunCounters,
    pub errors: Vec<String>,
    /// Operator-facing reason for a `failed` status.
    pub diagnostic: Option<String>,
    pub cancel_requested: bool,
    pub chunk_count: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ImportRun {
    /// Errors kept on the run record; older entries are dropped first.
    pub const MAX_ERRORS: usize = 100;

    pub fn new(connection_id: ConnectionId) -> Self {
        ImportRun {
            id: RunId::generate(),
            connection_id,
            status: RunStatus::Pending,
            counters: RunCounters::default(),
            errors: Vec::new(),
            diagnostic: None,
            cancel_requested: false,
            chunk_count: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        if self.errors.len() > Self::MAX_ERRORS {
            let excess = self.errors.len() - Self::MAX_ERRORS;
            self.errors.drain(..excess);
        }
    }

    pub fn duration_secs(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_one_directional() {
        use RunStatus::*;
        assert!(Pending.can_transition_to(Downloading));
        assert!(Chunking.can_transition_to(Processing));
        assert!(Processing.can_transition_to(CompletedWithErrors));
        assert!(!Processing.can_transition_to(Downloading));
        assert!(!Downloading.can_transition_to(Downloading));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn failed_is_reachable_until_terminal() {
        use RunStatus::*;
        for status in [Pending, Downloading, Downloaded, Chunking, Processing] {
            assert!(status.can_transition_to(Failed), "{status} -> failed");
        }
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Failed));
    }

    #[test]
    fn counters_are_order_independent() {
        let deltas = [
            CounterDelta { processed: 3, created: 2, skipped: 1, ..Default::default() },
            CounterDelta { processed: 5, updated: 4, failed: 1, ..Default::default() },
            CounterDelta { processed: 1, created: 1, ..Default::default() },
        ];

        let mut forward = RunCounters::default();
        deltas.iter().for_each(|d| forward.apply(d));
        let mut backward = RunCounters::default();
        deltas.iter().rev().for_each(|d| backward.apply(d));

        assert_eq!(forward, backward);
        assert_eq!(forward.processed, 9);
    }

    #[test]
    fn each_product_is_counted_once() {
        use ItemOutcome::*;
        let mut counters = RunCounters::default();

        assert!(counters.settle(None, Created));
        // Created earlier, found again as an update on a retry.
        assert!(!counters.settle(Some(Created), Updated));
        assert!(counters.settle(None, Failed));
        assert!(!counters.settle(Some(Failed), Failed));
        assert!(counters.settle(Some(Failed), Created));

        assert_eq!(counters.created, 2);
        assert_eq!(counters.updated, 0);
        assert_eq!(counters.failed, 0);
    }

    #[test]
    fn error_log_is_bounded() {
        let mut run = ImportRun::new(ConnectionId::new("c"));
        for i in 0..(ImportRun::MAX_ERRORS + 5) {
            run.push_error(format!("e{i}"));
        }
        assert_eq!(run.errors.len(), ImportRun::MAX_ERRORS);
        assert_eq!(run.errors[0], "e5");
    }
}
