use crate::{
    barrier::{CompletionActions, CompletionBarrier, finalize_when_done},
    destinations::DestinationRegistry,
    error::{JobError, RunError},
    pool::{Job, JobFn, WorkerPool},
};
use connectors::feed::{FeedError, FeedIngestor, scratch::ScratchDir};
use engine_config::settings::EngineSettings;
use engine_core::{metrics::Metrics, state::RunStore};
use engine_processing::{
    chunk::{ChunkProcessor, RunContext},
    client::DestinationClient,
    identity::IdentityResolver,
    retry::classify_chunk_error,
};
use futures::FutureExt;
use model::{
    core::identifiers::RunId,
    execution::{
        connection::FeedConnection,
        run::{ImportRun, RunStatus},
    },
    records::chunk::ChunkRef,
};
use std::{sync::Arc, time::Instant};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub const CANCELLED_DIAGNOSTIC: &str = "cancelled by operator";
pub const INTERRUPTED_DIAGNOSTIC: &str = "interrupted: process exited before the run finished";

/// A run that has been created and is being driven in the background.
pub struct RunHandle {
    pub run_id: RunId,
    task: JoinHandle<Result<ImportRun, RunError>>,
}

impl RunHandle {
    /// Waits for the run to reach a terminal status.
    pub async fn wait(self) -> Result<ImportRun, RunError> {
        self.task.await?
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Drives import runs through their lifecycle: download, chunking, fan-out
/// of chunk work to the pool, and finalisation once every chunk is done.
#[derive(Clone)]
pub struct RunCoordinator {
    store: Arc<dyn RunStore>,
    ingestor: FeedIngestor,
    destinations: Arc<DestinationRegistry>,
    pool: Arc<WorkerPool>,
    settings: Arc<EngineSettings>,
    metrics: Metrics,
}

impl RunCoordinator {
    pub fn new(
        store: Arc<dyn RunStore>,
        ingestor: FeedIngestor,
        destinations: Arc<DestinationRegistry>,
        pool: Arc<WorkerPool>,
        settings: EngineSettings,
        metrics: Metrics,
    ) -> Self {
        RunCoordinator {
            store,
            ingestor,
            destinations,
            pool,
            settings: Arc::new(settings),
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    /// Creates a run for `connection` and starts driving it. Fails with
    /// `RunAlreadyActive` if the connection has a non-terminal run.
    pub async fn start(&self, connection: Arc<FeedConnection>) -> Result<RunHandle, RunError> {
        let client = self.destinations.get(&connection.destination)?;

        let run = ImportRun::new(connection.id.clone());
        self.store.create_run(&run).await?;
        info!(run_id = %run.id, connection_id = %connection.id, "Import run created");

        let run_id = run.id.clone();
        let this = self.clone();
        let task = tokio::spawn(async move { this.drive(run, connection, client).await });
        Ok(RunHandle { run_id, task })
    }

    /// Creates a run and waits for its terminal state.
    pub async fn run(&self, connection: Arc<FeedConnection>) -> Result<ImportRun, RunError> {
        self.start(connection).await?.wait().await
    }

    /// Flags a non-terminal run as cancelled. Chunk workers stop before their
    /// next batch; submitted work stays.
    pub async fn cancel(&self, run_id: &RunId) -> Result<ImportRun, RunError> {
        let run = self.store.request_cancel(run_id).await?;
        info!(run_id = %run_id, status = %run.status, "Cancellation requested");
        Ok(run)
    }

    /// Fails runs left non-terminal by a previous process, releasing their
    /// connections. Returns how many were recovered.
    pub async fn recover_interrupted(&self) -> Result<usize, RunError> {
        let mut recovered = 0;
        for run in self.store.list_runs(None).await? {
            if run.status.is_terminal() {
                continue;
            }
            warn!(run_id = %run.id, status = %run.status, "Recovering interrupted run");
            self.store
                .finish(&run.id, RunStatus::Failed, Some(INTERRUPTED_DIAGNOSTIC.to_string()))
                .await?;
            recovered += 1;
        }
        Ok(recovered)
    }

    async fn drive(
        &self,
        run: ImportRun,
        connection: Arc<FeedConnection>,
        client: Arc<DestinationClient>,
    ) -> Result<ImportRun, RunError> {
        let started = Instant::now();
        let run_id = run.id.clone();

        let scratch = match self.ingestor.scratch_for(&run_id) {
            Ok(scratch) => scratch,
            Err(e) => return self.fail_early(&run_id, None, e.to_string()).await,
        };

        let chunks = match self.prepare(&run_id, &connection, &scratch).await {
            Ok(chunks) => chunks,
            Err(e) => return self.fail_early(&run_id, Some(&scratch), e.to_string()).await,
        };

        let ctx = RunContext {
            run_id: run_id.clone(),
            connection,
            started_at: run.started_at,
        };
        let processor = Arc::new(ChunkProcessor::new(
            client.clone(),
            IdentityResolver::new(client),
            self.store.clone(),
            self.metrics.clone(),
        ));

        let barrier = Arc::new(CompletionBarrier::new());
        for chunk in chunks {
            let job = Job::new(chunk.label(), chunk_job(processor.clone(), ctx.clone(), chunk))
                .with_barrier(barrier.clone());
            if let Err(e) = self.pool.submit(job) {
                error!(run_id = %run_id, error = %e, "Chunk dispatch failed");
                break;
            }
        }
        barrier.seal();

        let actions = self.completion_actions(&run_id, scratch);
        finalize_when_done(&barrier, actions, self.settings.jobs.finalize_recheck()).await;

        let run = self.load(&run_id).await?;
        info!(
            run_id = %run_id,
            status = %run.status,
            duration_ms = started.elapsed().as_millis() as u64,
            "Import run finished"
        );
        Ok(run)
    }

    /// Download and chunking. Any error here fails the run before a single
    /// record is processed.
    async fn prepare(
        &self,
        run_id: &RunId,
        connection: &FeedConnection,
        scratch: &ScratchDir,
    ) -> Result<Vec<ChunkRef>, RunError> {
        self.store.transition(run_id, RunStatus::Downloading).await?;
        let feed_path = self.ingestor.download(&connection.feed, scratch).await?;
        self.store.transition(run_id, RunStatus::Downloaded).await?;

        self.store.transition(run_id, RunStatus::Chunking).await?;
        let chunk_size = connection
            .chunk_size
            .unwrap_or(self.settings.default_chunk_size)
            .max(1);
        let ingestor = self.ingestor.clone();
        let source = connection.feed.clone();
        let id = run_id.clone();
        let dir = scratch.clone();
        let chunks = tokio::task::spawn_blocking(move || {
            ingestor
                .chunks(&feed_path, &source, &id, chunk_size, &dir)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| FeedError::SourceUnavailable(format!("chunking failed: {e}")))
        })
        .await??;

        self.store
            .record_chunk_count(run_id, chunks.len() as u32)
            .await?;
        self.store.transition(run_id, RunStatus::Processing).await?;
        info!(run_id = %run_id, chunks = chunks.len(), chunk_size, "Feed chunked");
        Ok(chunks)
    }

    async fn fail_early(
        &self,
        run_id: &RunId,
        scratch: Option<&ScratchDir>,
        diagnostic: String,
    ) -> Result<ImportRun, RunError> {
        error!(run_id = %run_id, error = %diagnostic, "Import run failed before processing");
        let finished = self
            .store
            .finish(run_id, RunStatus::Failed, Some(diagnostic))
            .await;
        if let Some(scratch) = scratch {
            remove_scratch(run_id, scratch);
        }
        Ok(finished?)
    }

    fn completion_actions(&self, run_id: &RunId, scratch: ScratchDir) -> CompletionActions {
        let (success_store, success_id) = (self.store.clone(), run_id.clone());
        let (failure_store, failure_id) = (self.store.clone(), run_id.clone());
        let cleanup_id = run_id.clone();

        CompletionActions {
            on_success: Box::new(move || {
                async move { conclude(success_store.as_ref(), &success_id, None).await }.boxed()
            }),
            on_failure: Box::new(move |reason| {
                async move { conclude(failure_store.as_ref(), &failure_id, Some(reason)).await }.boxed()
            }),
            always: Box::new(move || async move { remove_scratch(&cleanup_id, &scratch) }.boxed()),
        }
    }

    async fn load(&self, run_id: &RunId) -> Result<ImportRun, RunError> {
        self.store
            .load_run(run_id)
            .await?
            .ok_or_else(|| RunError::RunNotFound(run_id.to_string()))
    }
}

fn chunk_job(processor: Arc<ChunkProcessor>, ctx: RunContext, chunk: ChunkRef) -> JobFn {
    Arc::new(move |_attempt: usize| {
        let processor = processor.clone();
        let ctx = ctx.clone();
        let chunk = chunk.clone();
        async move {
            processor
                .process(&ctx, &chunk)
                .await
                .map(|_| ())
                .map_err(|e| JobError {
                    message: format!("chunk {}: {e}", chunk.sequence),
                    disposition: classify_chunk_error(&e),
                })
        }
        .boxed()
    })
}

/// Moves a fully processed run to its terminal status. `failure` is the
/// first chunk failure, if any.
async fn conclude(store: &dyn RunStore, run_id: &RunId, failure: Option<String>) {
    let cancelled = match store.is_cancel_requested(run_id).await {
        Ok(cancelled) => cancelled,
        Err(e) => {
            error!(run_id = %run_id, error = %e, "Could not read cancellation flag");
            false
        }
    };

    let (status, diagnostic) = if cancelled {
        (RunStatus::Failed, Some(CANCELLED_DIAGNOSTIC.to_string()))
    } else if let Some(reason) = failure {
        (RunStatus::Failed, Some(reason))
    } else {
        match store.load_run(run_id).await {
            Ok(Some(run)) if run.counters.failed > 0 || !run.errors.is_empty() => {
                (RunStatus::CompletedWithErrors, None)
            }
            Ok(_) => (RunStatus::Completed, None),
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Could not load run counters");
                (RunStatus::CompletedWithErrors, None)
            }
        }
    };

    match store.finish(run_id, status, diagnostic).await {
        Ok(run) if run.status == RunStatus::Failed => error!(
            run_id = %run_id,
            diagnostic = run.diagnostic.as_deref().unwrap_or_default(),
            processed = run.counters.processed,
            "Import run failed"
        ),
        Ok(run) => info!(
            run_id = %run_id,
            status = %run.status,
            processed = run.counters.processed,
            created = run.counters.created,
            updated = run.counters.updated,
            skipped = run.counters.skipped,
            failed = run.counters.failed,
            "Import run completed"
        ),
        Err(e) => error!(run_id = %run_id, error = %e, "Could not finalize run"),
    }
}

fn remove_scratch(run_id: &RunId, scratch: &ScratchDir) {
    match scratch.remove() {
        Ok(()) => info!(run_id = %run_id, path = %scratch.path().display(), "Scratch directory removed"),
        Err(e) => warn!(run_id = %run_id, error = %e, "Failed to remove scratch directory"),
    }
}
