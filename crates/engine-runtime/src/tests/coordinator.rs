use super::common::{connection, harness, write_feed};
use crate::coordinator::CANCELLED_DIAGNOSTIC;
use connectors::rest::error::ApiError;
use engine_core::state::RunStore;
use model::{
    core::identifiers::ConnectionId,
    execution::run::{ImportRun, RunStatus},
    records::product::ProductStatus,
};
use std::sync::Arc;

#[tokio::test]
async fn run_completes_and_removes_scratch() {
    let h = harness();
    let feed = write_feed(
        h.dir.path(),
        "feed.csv",
        &[("1", "10"), ("2", "11"), ("3", "12"), ("4", "13"), ("5", "14")],
    );

    let run = h
        .coordinator
        .run(Arc::new(connection("acme", &feed)))
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.chunk_count, Some(3));
    assert_eq!(run.counters.processed, 5);
    assert_eq!(run.counters.created, 5);
    assert!(run.finished_at.is_some());
    assert!(!h.scratch_root().join(run.id.as_str()).exists());

    let products = h.dest.products();
    assert_eq!(products.len(), 5);
    assert!(products.iter().all(|p| p.status == Some(ProductStatus::Publish)));
    assert_eq!(h.store.active_run(&run.connection_id).await.unwrap(), None);
}

#[tokio::test]
async fn rerun_updates_instead_of_creating() {
    let h = harness();
    let feed = write_feed(h.dir.path(), "feed.csv", &[("1", "10"), ("2", "11"), ("3", "12")]);
    let conn = Arc::new(connection("acme", &feed));

    h.coordinator.run(conn.clone()).await.unwrap();
    let second = h.coordinator.run(conn).await.unwrap();

    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.counters.created, 0);
    assert_eq!(second.counters.updated, 3);
    assert_eq!(h.dest.products().len(), 3);
}

#[tokio::test]
async fn missing_feed_fails_without_processing() {
    let h = harness();
    let conn = connection("acme", &h.dir.path().join("nope.csv"));

    let run = h.coordinator.run(Arc::new(conn)).await.unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.diagnostic.unwrap().contains("nope.csv"));
    assert_eq!(run.counters.processed, 0);
    assert_eq!(h.dest.network_calls(), 0);
    assert!(!h.scratch_root().join(run.id.as_str()).exists());
}

#[tokio::test]
async fn header_only_feed_is_source_unavailable() {
    let h = harness();
    let feed = write_feed(h.dir.path(), "empty.csv", &[]);

    let run = h.coordinator.run(Arc::new(connection("acme", &feed))).await.unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.diagnostic.unwrap().contains("no records"));
}

#[tokio::test]
async fn chunk_failure_fails_run_and_still_cleans_up() {
    let h = harness();
    h.dest.fail_batches_with(|_, _| Some(ApiError::auth("consumer key revoked")));
    let feed = write_feed(h.dir.path(), "feed.csv", &[("1", "10"), ("2", "11"), ("3", "12")]);

    let run = h.coordinator.run(Arc::new(connection("acme", &feed))).await.unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.diagnostic.unwrap().contains("chunk"));
    // Auth errors are not retried: one create call per chunk.
    assert_eq!(h.dest.batch_calls(), 2);
    assert!(!h.scratch_root().join(run.id.as_str()).exists());
}

#[tokio::test]
async fn item_failures_complete_with_errors() {
    let h = harness();
    let seeded = model::records::product::ProductData {
        sku: Some("SKU-2".into()),
        ..Default::default()
    };
    h.dest.seed(seeded);
    let feed = write_feed(h.dir.path(), "feed.csv", &[("1", "10"), ("2", "11")]);

    let run = h.coordinator.run(Arc::new(connection("acme", &feed))).await.unwrap();

    assert_eq!(run.status, RunStatus::CompletedWithErrors);
    assert_eq!(run.counters.created, 1);
    assert_eq!(run.counters.failed, 1);
    assert!(!run.errors.is_empty());
}

#[tokio::test]
async fn second_start_is_rejected_while_active() {
    let h = harness();
    let feed = write_feed(h.dir.path(), "feed.csv", &[("1", "10")]);
    let conn = Arc::new(connection("acme", &feed));

    let first = h.coordinator.start(conn.clone()).await.unwrap();
    let err = h.coordinator.start(conn.clone()).await.err().unwrap();
    assert!(err.is_already_active());

    first.wait().await.unwrap();
    let third = h.coordinator.run(conn).await.unwrap();
    assert_eq!(third.status, RunStatus::Completed);
}

#[tokio::test]
async fn cancelled_run_fails_without_submitting() {
    let h = harness();
    let feed = write_feed(h.dir.path(), "feed.csv", &[("1", "10"), ("2", "11"), ("3", "12")]);

    let handle = h
        .coordinator
        .start(Arc::new(connection("acme", &feed)))
        .await
        .unwrap();
    h.coordinator.cancel(&handle.run_id).await.unwrap();
    let run = handle.wait().await.unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.diagnostic.as_deref(), Some(CANCELLED_DIAGNOSTIC));
    assert_eq!(h.dest.batch_calls(), 0);
}

#[tokio::test]
async fn interrupted_runs_are_recovered() {
    let h = harness();
    let orphan = ImportRun::new(ConnectionId::new("acme"));
    h.store.create_run(&orphan).await.unwrap();
    h.store
        .transition(&orphan.id, RunStatus::Downloading)
        .await
        .unwrap();

    assert_eq!(h.coordinator.recover_interrupted().await.unwrap(), 1);
    let run = h.store.load_run(&orphan.id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(h.store.active_run(&orphan.connection_id).await.unwrap(), None);
}

#[tokio::test]
async fn unknown_destination_is_rejected_before_creating_a_run() {
    let h = harness();
    let feed = write_feed(h.dir.path(), "feed.csv", &[("1", "10")]);
    let mut conn = connection("acme", &feed);
    conn.destination = "elsewhere".into();

    let err = h.coordinator.start(Arc::new(conn)).await.err().unwrap();
    assert!(matches!(err, crate::error::RunError::UnknownDestination(_)));
    assert!(h.store.list_runs(None).await.unwrap().is_empty());
    assert!(h.registry.get("shop").is_ok());
}
