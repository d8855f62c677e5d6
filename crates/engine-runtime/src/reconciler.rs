use crate::{destinations::DestinationRegistry, error::ReconcileError};
use chrono::{DateTime, Utc};
use connectors::rest::wire::MetaQuery;
use engine_config::{
    report::reconcile::{ReconcileFailure, ReconcileReport, ReconcileSummary},
    settings::ReconcileSettings,
};
use engine_processing::client::DestinationClient;
use model::{
    execution::connection::{FeedConnection, StaleAction, StalePolicy},
    records::product::{META_CONNECTION, ProductData, StockStatus},
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// A product is stale when its last-seen stamp is missing or strictly older
/// than `cutoff`.
pub fn is_stale(last_seen: Option<i64>, cutoff: DateTime<Utc>) -> bool {
    last_seen.is_none_or(|seen| seen < cutoff.timestamp())
}

/// Finds and retires destination products a connection no longer feeds.
///
/// Works from destination state alone: the connection tag and last-seen
/// stamp written on every upsert.
pub struct StaleReconciler {
    destinations: Arc<DestinationRegistry>,
    settings: ReconcileSettings,
}

impl StaleReconciler {
    pub fn new(destinations: Arc<DestinationRegistry>, settings: ReconcileSettings) -> Self {
        StaleReconciler {
            destinations,
            settings,
        }
    }

    /// Tagged products of `connection` that are stale under `policy`.
    pub async fn find_stale(
        &self,
        client: &DestinationClient,
        connection: &FeedConnection,
        policy: &StalePolicy,
        now: DateTime<Utc>,
    ) -> Result<(usize, Vec<ProductData>), ReconcileError> {
        let cutoff = policy.cutoff(now);
        let query = MetaQuery::single(META_CONNECTION, connection.id.as_str());
        let tagged = client
            .find_all_by_meta_paged(&query, self.settings.page_size)
            .await
            .map_err(ReconcileError::Lookup)?;

        let scanned = tagged.len();
        let stale = tagged
            .into_iter()
            .filter(|p| p.id.is_some() && is_stale(p.last_seen(), cutoff))
            .collect();
        Ok((scanned, stale))
    }

    pub async fn reconcile(
        &self,
        connection: &FeedConnection,
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> Result<ReconcileReport, ReconcileError> {
        let Some(policy) = connection.stale_policy else {
            info!(connection_id = %connection.id, "No stale policy, skipping reconciliation");
            return Ok(ReconcileReport::skipped(connection.id.as_str(), dry_run));
        };
        let client = self
            .destinations
            .get(&connection.destination)
            .map_err(|_| ReconcileError::UnknownDestination(connection.destination.clone()))?;

        let (scanned, stale) = self.find_stale(&client, connection, &policy, now).await?;
        let stale_ids: Vec<u64> = stale.iter().filter_map(|p| p.id).collect();
        let mut report = ReconcileReport {
            connection_id: connection.id.to_string(),
            dry_run,
            action: Some(policy.action),
            cutoff: Some(policy.cutoff(now)),
            scanned,
            stale: stale_ids.len(),
            applied: 0,
            failed: 0,
            stale_ids,
            errors: Vec::new(),
        };

        if dry_run || report.stale_ids.is_empty() {
            info!(
                connection_id = %connection.id,
                dry_run,
                scanned,
                stale = report.stale,
                "Reconciliation scan finished"
            );
            return Ok(report);
        }

        let batch_size = self.settings.batch_size.max(1);
        let ids = report.stale_ids.clone();
        for batch in ids.chunks(batch_size) {
            let outcome = match policy.action {
                StaleAction::Delete => client.batch_upsert(Vec::new(), Vec::new(), batch.to_vec()).await,
                StaleAction::ZeroStock => {
                    let updates = batch.iter().map(|id| zero_stock(*id)).collect();
                    client.batch_upsert(Vec::new(), updates, Vec::new()).await
                }
            };
            match outcome {
                Ok(outcome) => {
                    report.applied += outcome.deleted.len() + outcome.updated.len();
                    report.failed += outcome.failed.len();
                    report
                        .errors
                        .extend(outcome.failed.iter().map(|f| format!("product {:?}: {}", f.id, f.reason)));
                }
                Err(err) => {
                    report.applied += err.partial.deleted.len() + err.partial.updated.len();
                    warn!(
                        connection_id = %connection.id,
                        applied = report.applied,
                        error = %err,
                        "Stale action aborted"
                    );
                    return Err(ReconcileError::Apply(err));
                }
            }
        }

        info!(
            connection_id = %connection.id,
            action = %policy.action,
            scanned,
            stale = report.stale,
            applied = report.applied,
            failed = report.failed,
            "Reconciliation finished"
        );
        Ok(report)
    }

    /// Reconciles each connection independently; a failure is recorded and
    /// the rest still run.
    pub async fn reconcile_all(
        &self,
        connections: &[FeedConnection],
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        for connection in connections {
            match self.reconcile(connection, dry_run, now).await {
                Ok(report) => summary.reports.push(report),
                Err(e) => {
                    error!(connection_id = %connection.id, error = %e, "Reconciliation failed");
                    summary.failures.push(ReconcileFailure {
                        connection_id: connection.id.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        summary
    }
}

fn zero_stock(id: u64) -> ProductData {
    ProductData {
        id: Some(id),
        manage_stock: Some(true),
        stock_quantity: Some(0),
        stock_status: Some(StockStatus::OutOfStock),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cutoff_is_exclusive() {
        let cutoff = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let t = cutoff.timestamp();

        assert!(is_stale(Some(t - 1), cutoff));
        assert!(!is_stale(Some(t), cutoff));
        assert!(!is_stale(Some(t + 1), cutoff));
        assert!(is_stale(None, cutoff));
    }
}
