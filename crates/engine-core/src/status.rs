use crate::{error::StatusError, state::RunStore};
use chrono::{DateTime, Utc};
use model::{
    core::identifiers::{ConnectionId, RunId},
    execution::run::{ImportRun, RunCounters, RunStatus},
};
use serde::Serialize;
use std::sync::Arc;

/// Operator view of one import run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatusView {
    pub run_id: RunId,
    pub connection_id: ConnectionId,
    pub status: RunStatus,
    pub counters: RunCounters,
    pub chunk_count: Option<u32>,
    pub cancel_requested: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub diagnostic: Option<String>,
    pub recent_errors: Vec<String>,
}

impl RunStatusView {
    pub const RECENT_ERRORS: usize = 10;

    pub fn from_run(run: &ImportRun) -> Self {
        let skip = run.errors.len().saturating_sub(Self::RECENT_ERRORS);
        RunStatusView {
            run_id: run.id.clone(),
            connection_id: run.connection_id.clone(),
            status: run.status,
            counters: run.counters,
            chunk_count: run.chunk_count,
            cancel_requested: run.cancel_requested,
            started_at: run.started_at,
            finished_at: run.finished_at,
            duration_secs: run
                .duration_secs()
                .or_else(|| Some((Utc::now() - run.started_at).num_seconds())),
            diagnostic: run.diagnostic.clone(),
            recent_errors: run.errors[skip..].to_vec(),
        }
    }
}

#[derive(Clone)]
pub struct StatusService {
    pub store: Arc<dyn RunStore>,
}

impl StatusService {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        StatusService { store }
    }

    pub async fn run_status(&self, run_id: &RunId) -> Result<RunStatusView, StatusError> {
        let run = self
            .store
            .load_run(run_id)
            .await?
            .ok_or_else(|| StatusError::NotFound(format!("run {run_id}")))?;
        Ok(RunStatusView::from_run(&run))
    }

    /// The connection's active run, or its most recent one.
    pub async fn connection_status(
        &self,
        connection: &ConnectionId,
    ) -> Result<RunStatusView, StatusError> {
        if let Some(active) = self.store.active_run(connection).await?
            && let Some(run) = self.store.load_run(&active).await?
        {
            return Ok(RunStatusView::from_run(&run));
        }

        self.store
            .list_runs(Some(connection))
            .await?
            .first()
            .map(RunStatusView::from_run)
            .ok_or_else(|| StatusError::NotFound(format!("connection {connection}")))
    }

    pub async fn history(
        &self,
        connection: &ConnectionId,
        limit: usize,
    ) -> Result<Vec<RunStatusView>, StatusError> {
        Ok(self
            .store
            .list_runs(Some(connection))
            .await?
            .iter()
            .take(limit)
            .map(RunStatusView::from_run)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::sled_store::SledRunStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reports_active_run_before_history() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn RunStore> = Arc::new(SledRunStore::open(dir.path()).expect("open sled"));
        let service = StatusService::new(store.clone());
        let conn = ConnectionId::new("acme");

        let done = ImportRun::new(conn.clone());
        store.create_run(&done).await.unwrap();
        store.finish(&done.id, RunStatus::Failed, Some("boom".into())).await.unwrap();

        let live = ImportRun::new(conn.clone());
        store.create_run(&live).await.unwrap();
        store.transition(&live.id, RunStatus::Downloading).await.unwrap();

        let view = service.connection_status(&conn).await.unwrap();
        assert_eq!(view.run_id, live.id);
        assert_eq!(view.status, RunStatus::Downloading);

        let view = service.run_status(&done.id).await.unwrap();
        assert_eq!(view.diagnostic.as_deref(), Some("boom"));
        assert!(view.finished_at.is_some());
    }

    #[tokio::test]
    async fn keeps_only_recent_errors() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn RunStore> = Arc::new(SledRunStore::open(dir.path()).expect("open sled"));
        let run = ImportRun::new(ConnectionId::new("acme"));
        store.create_run(&run).await.unwrap();
        for i in 0..15 {
            store.append_error(&run.id, &format!("record {i} failed")).await.unwrap();
        }

        let view = StatusService::new(store).run_status(&run.id).await.unwrap();
        assert_eq!(view.recent_errors.len(), RunStatusView::RECENT_ERRORS);
        assert_eq!(view.recent_errors[0], "record 5 failed");
    }

    #[tokio::test]
    async fn unknown_connection_is_not_found() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn RunStore> = Arc::new(SledRunStore::open(dir.path()).expect("open sled"));
        let err = StatusService::new(store)
            .connection_status(&ConnectionId::new("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, StatusError::NotFound(_)));
    }
}
