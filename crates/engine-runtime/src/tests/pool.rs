use crate::{
    barrier::{CompletionBarrier, Finalize},
    error::JobError,
    pool::{Job, JobFn, WorkerPool},
};
use engine_config::settings::JobSettings;
use engine_core::metrics::Metrics;
use futures::FutureExt;
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

fn job_settings(max_attempts: usize, timeout_secs: u64) -> JobSettings {
    JobSettings {
        max_attempts,
        timeout_secs,
        backoff_step_secs: 0,
        finalize_recheck_ms: 5,
    }
}

/// Fails with `error` until attempt `succeed_on`.
fn flaky(calls: Arc<AtomicUsize>, succeed_on: usize, error: JobError) -> JobFn {
    Arc::new(move |attempt: usize| {
        calls.fetch_add(1, Ordering::SeqCst);
        let error = error.clone();
        async move {
            if attempt >= succeed_on {
                Ok(())
            } else {
                Err(error)
            }
        }
        .boxed()
    })
}

async fn settle(barrier: &CompletionBarrier) -> Result<(), String> {
    loop {
        match barrier.try_finalize() {
            Finalize::Ready(outcome) => return outcome,
            Finalize::Outstanding(_) => tokio::time::sleep(Duration::from_millis(5)).await,
            Finalize::AlreadyFired => panic!("barrier already concluded"),
        }
    }
}

#[tokio::test]
async fn retryable_errors_are_retried_until_success() {
    let metrics = Metrics::new();
    let pool = WorkerPool::new(2, &job_settings(3, 10), metrics.clone());
    let barrier = Arc::new(CompletionBarrier::new());
    let calls = Arc::new(AtomicUsize::new(0));

    pool.submit(
        Job::new("flaky", flaky(calls.clone(), 3, JobError::retryable("503")))
            .with_barrier(barrier.clone()),
    )
    .unwrap();
    barrier.seal();

    assert_eq!(settle(&barrier).await, Ok(()));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(metrics.snapshot().retry_count, 2);
    pool.shutdown().await;
}

#[tokio::test]
async fn fatal_errors_are_not_retried() {
    let pool = WorkerPool::new(1, &job_settings(3, 10), Metrics::new());
    let barrier = Arc::new(CompletionBarrier::new());
    let calls = Arc::new(AtomicUsize::new(0));

    pool.submit(
        Job::new("auth", flaky(calls.clone(), 99, JobError::fatal("401 unauthorized")))
            .with_barrier(barrier.clone()),
    )
    .unwrap();
    barrier.seal();

    assert_eq!(settle(&barrier).await, Err("401 unauthorized".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    pool.shutdown().await;
}

#[tokio::test]
async fn exhausted_attempts_report_last_error() {
    let pool = WorkerPool::new(1, &job_settings(2, 10), Metrics::new());
    let barrier = Arc::new(CompletionBarrier::new());
    let calls = Arc::new(AtomicUsize::new(0));

    pool.submit(
        Job::new("down", flaky(calls.clone(), 99, JobError::retryable("gateway timeout")))
            .with_barrier(barrier.clone()),
    )
    .unwrap();
    barrier.seal();

    assert_eq!(settle(&barrier).await, Err("gateway timeout".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    pool.shutdown().await;
}

#[tokio::test]
async fn attempts_are_bounded_by_the_outer_timeout() {
    let pool = WorkerPool::new(1, &job_settings(1, 1), Metrics::new());
    let barrier = Arc::new(CompletionBarrier::new());
    let slow: JobFn = Arc::new(|_: usize| {
        async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<(), JobError>(())
        }
        .boxed()
    });

    pool.submit(Job::new("slow", slow).with_barrier(barrier.clone()))
        .unwrap();
    barrier.seal();

    let outcome = settle(&barrier).await;
    assert!(outcome.unwrap_err().contains("timed out"));
    pool.shutdown().await;
}

#[tokio::test]
async fn many_jobs_all_complete() {
    let pool = WorkerPool::new(4, &job_settings(1, 10), Metrics::new());
    let barrier = Arc::new(CompletionBarrier::new());
    let calls = Arc::new(AtomicUsize::new(0));

    for i in 0..20 {
        pool.submit(
            Job::new(format!("job-{i}"), flaky(calls.clone(), 1, JobError::fatal("unused")))
                .with_barrier(barrier.clone()),
        )
        .unwrap();
    }
    barrier.seal();

    assert_eq!(settle(&barrier).await, Ok(()));
    assert_eq!(calls.load(Ordering::SeqCst), 20);
    pool.shutdown().await;
}
