use crate::{
    client::DestinationClient,
    error::{BatchError, ClientError},
};
use connectors::rest::{
    error::ApiErrorKind,
    wire::{BatchItem, BatchRequest},
};
use model::{core::identifiers::Gupid, records::product::ProductData};
use serde::Serialize;
use std::{collections::VecDeque, fmt};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchOp {
    Create,
    Update,
    Delete,
}

impl fmt::Display for BatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchOp::Create => f.write_str("create"),
            BatchOp::Update => f.write_str("update"),
            BatchOp::Delete => f.write_str("delete"),
        }
    }
}

/// An item the destination did not persist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedItem {
    pub op: BatchOp,
    pub id: Option<u64>,
    pub gupid: Option<Gupid>,
    pub reason: String,
}

/// Per-item results of a batch upsert. Partial failure is data, not an
/// error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub created: Vec<ProductData>,
    pub updated: Vec<ProductData>,
    pub deleted: Vec<u64>,
    pub failed: Vec<FailedItem>,
}

impl BatchOutcome {
    pub fn failed_for(&self, op: BatchOp) -> usize {
        self.failed.iter().filter(|f| f.op == op).count()
    }
}

/// Items of one operation kind, kept together so a split keeps the kind.
#[derive(Debug, Clone)]
enum Items {
    Create(Vec<ProductData>),
    Update(Vec<ProductData>),
    Delete(Vec<u64>),
}

impl Items {
    fn len(&self) -> usize {
        match self {
            Items::Create(v) | Items::Update(v) => v.len(),
            Items::Delete(v) => v.len(),
        }
    }

    fn op(&self) -> BatchOp {
        match self {
            Items::Create(_) => BatchOp::Create,
            Items::Update(_) => BatchOp::Update,
            Items::Delete(_) => BatchOp::Delete,
        }
    }

    fn split(self, size: usize) -> Vec<Items> {
        let size = size.max(1);
        match self {
            Items::Create(v) => v.chunks(size).map(|c| Items::Create(c.to_vec())).collect(),
            Items::Update(v) => v.chunks(size).map(|c| Items::Update(c.to_vec())).collect(),
            Items::Delete(v) => v.chunks(size).map(|c| Items::Delete(c.to_vec())).collect(),
        }
    }

    fn request(&self) -> BatchRequest {
        match self {
            Items::Create(v) => BatchRequest {
                create: v.clone(),
                ..Default::default()
            },
            Items::Update(v) => BatchRequest {
                update: v.clone(),
                ..Default::default()
            },
            Items::Delete(v) => BatchRequest {
                delete: v.clone(),
                ..Default::default()
            },
        }
    }

    fn fail_all(&self, reason: &str, outcome: &mut BatchOutcome) {
        let op = self.op();
        let failed = |id: Option<u64>, gupid: Option<Gupid>| FailedItem {
            op,
            id,
            gupid,
            reason: reason.to_string(),
        };
        match self {
            Items::Create(v) | Items::Update(v) => outcome
                .failed
                .extend(v.iter().map(|p| failed(p.id, p.gupid()))),
            Items::Delete(v) => outcome
                .failed
                .extend(v.iter().map(|id| failed(Some(*id), None))),
        }
    }
}

struct Pending {
    items: Items,
    /// Produced by splitting after a timeout.
    split: bool,
}

/// Size of each sub-batch after a timeout on `n` items: a third, or a fifth
/// for a gateway timeout.
pub fn split_size(n: usize, gateway_timeout: bool) -> usize {
    let divisor = if gateway_timeout { 5 } else { 3 };
    n.div_ceil(divisor).max(1)
}

impl DestinationClient {
    /// Submits creates, updates and deletes as separate batch operations.
    ///
    /// Items the destination rejects are reported in `failed`. A timeout on
    /// more than three items splits the batch and retries the parts; any
    /// other call-level failure stops submission and returns what was
    /// already acknowledged alongside the error.
    pub async fn batch_upsert(
        &self,
        creates: Vec<ProductData>,
        updates: Vec<ProductData>,
        deletes: Vec<u64>,
    ) -> Result<BatchOutcome, BatchError> {
        let size = self.preferred_batch_size();
        let mut queue: VecDeque<Pending> = [
            Items::Create(creates),
            Items::Update(updates),
            Items::Delete(deletes),
        ]
        .into_iter()
        .filter(|items| items.len() > 0)
        .flat_map(|items| items.split(size))
        .map(|items| Pending { items, split: false })
        .collect();

        let mut outcome = BatchOutcome::default();

        while let Some(pending) = queue.pop_front() {
            if pending.split && !self.settings.inter_batch_delay().is_zero() {
                tokio::time::sleep(self.settings.inter_batch_delay()).await;
            }

            let n = pending.items.len();
            let op = pending.items.op();
            match self.send_batch(&pending.items.request()).await {
                Ok(response) => {
                    if pending.split {
                        self.breaker().remember_batch_size(n);
                    }
                    let items = match op {
                        BatchOp::Create => response.create,
                        BatchOp::Update => response.update,
                        BatchOp::Delete => response.delete,
                    };
                    collect_items(&pending.items, items, &mut outcome);
                    debug!(destination = %self.key(), op = %op, batch_size = n, "Batch acknowledged");
                }
                Err(ClientError::Api(err)) if err.kind == ApiErrorKind::Timeout && n > 3 => {
                    let sub = split_size(n, err.is_gateway_timeout());
                    self.metrics().increment_splits();
                    warn!(
                        destination = %self.key(),
                        op = %op,
                        batch_size = n,
                        sub_batch_size = sub,
                        gateway = err.is_gateway_timeout(),
                        "Batch timed out, splitting"
                    );
                    for items in pending.items.split(sub).into_iter().rev() {
                        queue.push_front(Pending { items, split: true });
                    }
                }
                Err(ClientError::Api(err)) if err.kind == ApiErrorKind::Validation => {
                    warn!(destination = %self.key(), op = %op, batch_size = n, error = %err, "Batch rejected as invalid");
                    pending.items.fail_all(&err.message, &mut outcome);
                }
                Err(source) => {
                    return Err(BatchError {
                        partial: outcome,
                        source,
                    });
                }
            }
        }

        info!(
            destination = %self.key(),
            created = outcome.created.len(),
            updated = outcome.updated.len(),
            deleted = outcome.deleted.len(),
            failed = outcome.failed.len(),
            "Batch upsert finished"
        );
        Ok(outcome)
    }
}

/// Matches response items to the submitted items by position.
fn collect_items(sent: &Items, received: Vec<BatchItem>, outcome: &mut BatchOutcome) {
    let op = sent.op();
    let sent_len = sent.len();
    let mut received = received.into_iter();

    for idx in 0..sent_len {
        let (sent_id, sent_gupid) = match sent {
            Items::Create(v) | Items::Update(v) => (v[idx].id, v[idx].gupid()),
            Items::Delete(v) => (Some(v[idx]), None),
        };

        let Some(item) = received.next() else {
            outcome.failed.push(FailedItem {
                op,
                id: sent_id,
                gupid: sent_gupid,
                reason: "missing from batch response".into(),
            });
            continue;
        };

        match item.destination_id() {
            Some(id) => match op {
                BatchOp::Create => outcome.created.push(item.product),
                BatchOp::Update => outcome.updated.push(item.product),
                BatchOp::Delete => outcome.deleted.push(id),
            },
            None => outcome.failed.push(FailedItem {
                op,
                id: sent_id,
                gupid: sent_gupid,
                reason: item
                    .error
                    .map(|e| format!("{}: {}", e.code, e.message))
                    .unwrap_or_else(|| "no destination id in response".into()),
            }),
        }
    }
}
