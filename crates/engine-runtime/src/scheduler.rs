use crate::{
    coordinator::{RunCoordinator, RunHandle},
    reconciler::StaleReconciler,
};
use chrono::Utc;
use engine_config::settings::SchedulerSettings;
use model::{core::identifiers::ConnectionId, execution::connection::FeedConnection};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// True when nothing ran yet or `interval` has elapsed since `last`.
pub fn is_due(last: Option<Instant>, interval: Duration, now: Instant) -> bool {
    last.is_none_or(|last| now.saturating_duration_since(last) >= interval)
}

/// Daemon loop: starts imports on each connection's cadence and runs stale
/// reconciliation on its own interval until cancelled.
pub struct Scheduler {
    coordinator: RunCoordinator,
    reconciler: Arc<StaleReconciler>,
    connections: Vec<Arc<FeedConnection>>,
    settings: SchedulerSettings,
    cancel: CancellationToken,
    last_import: HashMap<ConnectionId, Instant>,
    last_reconcile: Option<Instant>,
    in_flight: Vec<RunHandle>,
    reconciling: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(
        coordinator: RunCoordinator,
        reconciler: Arc<StaleReconciler>,
        connections: Vec<FeedConnection>,
        settings: SchedulerSettings,
        cancel: CancellationToken,
    ) -> Self {
        Scheduler {
            coordinator,
            reconciler,
            connections: connections.into_iter().map(Arc::new).collect(),
            settings,
            cancel,
            last_import: HashMap::new(),
            last_reconcile: None,
            in_flight: Vec::new(),
            reconciling: None,
        }
    }

    pub async fn run(mut self) {
        info!(
            connections = self.connections.len(),
            tick_secs = self.settings.tick_secs,
            "Scheduler started"
        );
        let mut ticker = tokio::time::interval(self.settings.tick());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => self.tick(Instant::now()).await,
            }
        }

        self.drain().await;
        info!("Scheduler stopped");
    }

    async fn tick(&mut self, now: Instant) {
        self.in_flight.retain(|h| !h.is_finished());

        for connection in self.connections.clone() {
            let minutes = connection
                .import_interval_minutes
                .unwrap_or(self.settings.default_import_interval_minutes);
            let interval = Duration::from_secs(minutes.saturating_mul(60));
            if !is_due(self.last_import.get(&connection.id).copied(), interval, now) {
                continue;
            }

            match self.coordinator.start(connection.clone()).await {
                Ok(handle) => {
                    info!(connection_id = %connection.id, run_id = %handle.run_id, "Scheduled import started");
                    self.last_import.insert(connection.id.clone(), now);
                    self.in_flight.push(handle);
                }
                Err(e) if e.is_already_active() => {
                    debug!(connection_id = %connection.id, "Import skipped, run already active");
                }
                Err(e) => {
                    warn!(connection_id = %connection.id, error = %e, "Scheduled import could not start");
                    self.last_import.insert(connection.id.clone(), now);
                }
            }
        }

        let busy = self.reconciling.as_ref().is_some_and(|h| !h.is_finished());
        if !busy && is_due(self.last_reconcile, self.settings.reconcile_interval(), now) {
            self.last_reconcile = Some(now);
            let reconciler = self.reconciler.clone();
            let connections: Vec<FeedConnection> =
                self.connections.iter().map(|c| c.as_ref().clone()).collect();
            self.reconciling = Some(tokio::spawn(async move {
                let summary = reconciler.reconcile_all(&connections, false, Utc::now()).await;
                info!(
                    reconciled = summary.reports.len(),
                    failed = summary.failures.len(),
                    stale = summary.total_stale(),
                    "Scheduled reconciliation finished"
                );
            }));
        }
    }

    /// Asks in-flight runs to stop and waits for them to finalise.
    async fn drain(&mut self) {
        for handle in &self.in_flight {
            if !handle.is_finished() {
                if let Err(e) = self.coordinator.cancel(&handle.run_id).await {
                    debug!(run_id = %handle.run_id, error = %e, "Run ended before cancellation");
                }
            }
        }
        for handle in self.in_flight.drain(..) {
            let run_id = handle.run_id.clone();
            match handle.wait().await {
                Ok(run) => info!(run_id = %run_id, status = %run.status, "In-flight run finished"),
                Err(e) => error!(run_id = %run_id, error = %e, "In-flight run did not finish cleanly"),
            }
        }
        if let Some(reconciling) = self.reconciling.take() {
            let _ = reconciling.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_is_always_due() {
        let now = Instant::now();
        assert!(is_due(None, Duration::from_secs(3600), now));
    }

    #[test]
    fn due_once_interval_elapsed() {
        let start = Instant::now();
        let interval = Duration::from_secs(60);
        assert!(!is_due(Some(start), interval, start + Duration::from_secs(59)));
        assert!(is_due(Some(start), interval, start + Duration::from_secs(60)));
    }
}
