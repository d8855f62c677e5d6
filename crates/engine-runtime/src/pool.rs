use crate::{
    barrier::CompletionBarrier,
    error::{JobError, RunError},
};
use engine_config::settings::JobSettings;
use engine_core::{metrics::Metrics, retry::RetryPolicy};
use futures::{FutureExt, future::BoxFuture};
use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

/// Body of a unit of work. Called once per attempt with the 1-based attempt
/// number.
pub type JobFn = Arc<dyn Fn(usize) -> BoxFuture<'static, Result<(), JobError>> + Send + Sync>;

pub struct Job {
    pub label: String,
    pub run: JobFn,
    /// Notified with the final result once retries are over.
    pub barrier: Option<Arc<CompletionBarrier>>,
}

impl Job {
    pub fn new(label: impl Into<String>, run: JobFn) -> Self {
        Job {
            label: label.into(),
            run,
            barrier: None,
        }
    }

    pub fn with_barrier(mut self, barrier: Arc<CompletionBarrier>) -> Self {
        barrier.register();
        self.barrier = Some(barrier);
        self
    }
}

/// Fixed set of workers draining one shared queue. Each worker runs a job to
/// completion, including its retries, before taking the next one.
pub struct WorkerPool {
    tx: mpsc::UnboundedSender<Job>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(workers: usize, settings: &JobSettings, metrics: Metrics) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let retry = RetryPolicy::linear(settings.max_attempts, settings.backoff_step());
        let timeout = settings.timeout();

        let handles = (0..workers.max(1))
            .map(|worker| {
                let rx = rx.clone();
                let retry = retry.clone();
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    loop {
                        let job = { rx.lock().await.recv().await };
                        let Some(job) = job else {
                            break;
                        };
                        execute(worker, job, &retry, timeout, &metrics).await;
                    }
                    debug!(worker, "Worker stopped");
                })
            })
            .collect();

        info!(workers = workers.max(1), "Worker pool started");
        WorkerPool { tx, handles }
    }

    pub fn submit(&self, job: Job) -> Result<(), RunError> {
        self.tx.send(job).map_err(|rejected| {
            if let Some(barrier) = &rejected.0.barrier {
                barrier.complete(Err("worker pool is shut down".into()));
            }
            RunError::PoolClosed
        })
    }

    /// Stops accepting work and waits for queued jobs to drain.
    pub async fn shutdown(self) {
        drop(self.tx);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn execute(worker: usize, job: Job, retry: &RetryPolicy, timeout: Duration, metrics: &Metrics) {
    let mut attempt = 0;
    let result = retry
        .run(
            || {
                attempt += 1;
                if attempt > 1 {
                    metrics.increment_retries(1);
                    warn!(worker, job = %job.label, attempt, "Retrying job");
                }
                let call = (job.run)(attempt);
                async move {
                    match tokio::time::timeout(timeout, AssertUnwindSafe(call).catch_unwind()).await {
                        Ok(Ok(result)) => result,
                        Ok(Err(_)) => Err(JobError::fatal("job panicked")),
                        Err(_) => Err(JobError::retryable(format!(
                            "timed out after {}s",
                            timeout.as_secs()
                        ))),
                    }
                }
            },
            |e: &JobError| e.disposition,
        )
        .await
        .map_err(|e| e.into_inner());

    match &result {
        Ok(()) => debug!(worker, job = %job.label, attempts = attempt, "Job finished"),
        Err(e) => error!(worker, job = %job.label, attempts = attempt, error = %e, "Job failed"),
    }

    if let Some(barrier) = &job.barrier {
        barrier.complete(result.map_err(|e| e.message));
    }
}
