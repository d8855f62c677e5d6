use super::common::{connection, harness};
use crate::reconciler::StaleReconciler;
use chrono::{Duration, Utc};
use engine_config::settings::ReconcileSettings;
use model::{
    execution::connection::{StaleAction, StalePolicy},
    records::product::{META_CONNECTION, META_LAST_SEEN, ProductData, StockStatus},
};
use std::path::Path;

fn tagged(connection: &str, name: &str, last_seen: Option<i64>) -> ProductData {
    let mut p = ProductData {
        name: Some(name.into()),
        ..Default::default()
    };
    p.set_meta(META_CONNECTION, connection);
    if let Some(ts) = last_seen {
        p.set_meta(META_LAST_SEEN, ts);
    }
    p
}

fn reconciler(h: &super::common::Harness) -> StaleReconciler {
    StaleReconciler::new(
        h.registry.clone(),
        ReconcileSettings {
            batch_size: 2,
            page_size: 2,
        },
    )
}

#[tokio::test]
async fn finds_old_and_untagged_products_but_not_recent_ones() {
    let h = harness();
    let now = Utc::now();
    let a = h.dest.seed(tagged("acme", "A", Some((now - Duration::days(31)).timestamp())));
    let b = h.dest.seed(tagged("acme", "B", Some((now - Duration::days(29)).timestamp())));
    let c = h.dest.seed(tagged("acme", "C", None));
    h.dest.seed(tagged("globex", "other", None));

    let conn = connection("acme", Path::new("unused.csv"));
    let client = h.registry.get("shop").unwrap();
    let (scanned, stale) = reconciler(&h)
        .find_stale(&client, &conn, &conn.stale_policy.unwrap(), now)
        .await
        .unwrap();

    let ids: Vec<_> = stale.iter().filter_map(|p| p.id).collect();
    assert_eq!(scanned, 3);
    assert_eq!(ids, vec![a, c]);
    assert!(!ids.contains(&b));
}

#[tokio::test]
async fn dry_run_reports_without_mutating() {
    let h = harness();
    let now = Utc::now();
    for i in 0..3 {
        h.dest.seed(tagged("acme", &format!("old-{i}"), Some((now - Duration::days(90)).timestamp())));
    }

    let conn = connection("acme", Path::new("unused.csv"));
    let report = reconciler(&h).reconcile(&conn, true, now).await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.stale, 3);
    assert_eq!(report.applied, 0);
    assert_eq!(h.dest.batch_calls(), 0);
    assert_eq!(h.dest.products().len(), 3);
}

#[tokio::test]
async fn delete_action_runs_in_bounded_batches() {
    let h = harness();
    let now = Utc::now();
    for i in 0..5 {
        h.dest.seed(tagged("acme", &format!("old-{i}"), None));
    }

    let conn = connection("acme", Path::new("unused.csv"));
    let report = reconciler(&h).reconcile(&conn, false, now).await.unwrap();

    assert_eq!(report.applied, 5);
    assert_eq!(h.dest.batch_calls(), 3);
    assert!(h.dest.products().is_empty());
}

#[tokio::test]
async fn zero_stock_action_keeps_products() {
    let h = harness();
    let now = Utc::now();
    let id = h.dest.seed(tagged("acme", "old", None));

    let mut conn = connection("acme", Path::new("unused.csv"));
    conn.stale_policy = Some(StalePolicy {
        action: StaleAction::ZeroStock,
        stale_after_days: 7,
    });
    let report = reconciler(&h).reconcile(&conn, false, now).await.unwrap();

    assert_eq!(report.applied, 1);
    let product = h.dest.product(id).unwrap();
    assert_eq!(product.stock_quantity, Some(0));
    assert_eq!(product.stock_status, Some(StockStatus::OutOfStock));
}

#[tokio::test]
async fn one_failing_connection_does_not_block_others() {
    let h = harness();
    let now = Utc::now();
    h.dest.seed(tagged("acme", "old", None));

    let mut broken = connection("broken", Path::new("unused.csv"));
    broken.destination = "missing".into();
    let mut unmanaged = connection("plain", Path::new("unused.csv"));
    unmanaged.stale_policy = None;
    let connections = vec![broken, connection("acme", Path::new("unused.csv")), unmanaged];

    let summary = reconciler(&h).reconcile_all(&connections, false, now).await;

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].connection_id, "broken");
    assert_eq!(summary.reports.len(), 2);
    assert_eq!(summary.total_stale(), 1);
    assert!(h.dest.products().is_empty());
    assert!(!summary.succeeded());
}
