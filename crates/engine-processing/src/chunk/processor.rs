use crate::{
    chunk::RunContext,
    client::{BatchOutcome, DestinationClient, FailedItem},
    error::{BatchError, ChunkError},
    identity::IdentityResolver,
    transform::{TransformOutcome, Transformer},
};
use connectors::feed::read_chunk;
use engine_core::{metrics::Metrics, state::RunStore};
use model::{
    execution::run::{CounterDelta, ItemOutcome, ItemResult},
    records::{
        chunk::ChunkRef,
        product::{DestinationPayload, META_LAST_SEEN, ProductData, ProductStatus},
    },
};
use std::{collections::HashSet, sync::Arc, time::Instant};
use tracing::{debug, info, warn};

/// Counters one chunk contributed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkReport {
    pub sequence: u32,
    pub delta: CounterDelta,
    /// Created products left as drafts because publishing failed.
    pub unpublished: usize,
}

/// Runs one chunk through transform, identity and the two-phase upsert.
pub struct ChunkProcessor {
    client: Arc<DestinationClient>,
    resolver: IdentityResolver,
    store: Arc<dyn RunStore>,
    metrics: Metrics,
}

impl ChunkProcessor {
    pub fn new(
        client: Arc<DestinationClient>,
        resolver: IdentityResolver,
        store: Arc<dyn RunStore>,
        metrics: Metrics,
    ) -> Self {
        ChunkProcessor {
            client,
            resolver,
            store,
            metrics,
        }
    }

    pub async fn process(&self, ctx: &RunContext, chunk: &ChunkRef) -> Result<ChunkReport, ChunkError> {
        let started = Instant::now();
        let records = read_chunk(&chunk.path).map_err(|source| ChunkError::Read {
            chunk: chunk.label(),
            source,
        })?;

        let mut report = ChunkReport {
            sequence: chunk.sequence,
            ..Default::default()
        };

        // Transform
        let transformer = Transformer::new(ctx.connection.id.clone(), ctx.connection.rules.clone());
        let last_seen = ctx.started_at.timestamp();
        let mut payloads: Vec<DestinationPayload> = Vec::with_capacity(records.len());
        let mut seen = HashSet::new();
        let mut transform = CounterDelta {
            processed: records.len() as u64,
            ..Default::default()
        };
        let mut errors = Vec::new();

        for record in &records {
            match transformer.apply(record) {
                TransformOutcome::Ok(mut payload) => {
                    if !seen.insert(payload.gupid.clone()) {
                        transform.skipped += 1;
                        continue;
                    }
                    payload.product.set_meta(META_LAST_SEEN, last_seen);
                    payloads.push(payload);
                }
                TransformOutcome::Skip(_) => transform.skipped += 1,
                TransformOutcome::Fail(err) => {
                    transform.skipped += 1;
                    warn!(
                        run_id = %ctx.run_id,
                        chunk = chunk.sequence,
                        position = record.position,
                        error = %err,
                        "Record failed transformation"
                    );
                    errors.push(format!("record {}: {err}", record.position));
                }
            }
        }
        self.metrics.increment_records(records.len() as u64);
        let applied = self
            .store
            .record_transform(&ctx.run_id, chunk.sequence, &transform, &errors)
            .await?;
        if !applied {
            debug!(
                run_id = %ctx.run_id,
                chunk = chunk.sequence,
                "Transform counters already recorded by an earlier attempt"
            );
        }
        report.delta.processed = transform.processed;
        report.delta.skipped = transform.skipped;

        if payloads.is_empty() {
            return Ok(report);
        }

        // Identity
        self.ensure_not_cancelled(ctx).await?;
        let resolution = self.resolver.resolve(&ctx.connection.id, payloads).await?;

        // Create as drafts
        let creates: Vec<ProductData> = resolution
            .to_create
            .into_iter()
            .map(|p| ProductData {
                status: Some(ProductStatus::Draft),
                ..p.product
            })
            .collect();
        let created_ids = if creates.is_empty() {
            Vec::new()
        } else {
            self.ensure_not_cancelled(ctx).await?;
            let outcome = self
                .submit(ctx, chunk, creates, Vec::new(), &mut report)
                .await?;
            outcome.created.iter().filter_map(|p| p.id).collect()
        };

        // Update existing
        let updates: Vec<ProductData> = resolution
            .to_update
            .into_iter()
            .map(|p| ProductData {
                status: Some(ProductStatus::Publish),
                ..p.product
            })
            .collect();
        if !updates.is_empty() {
            self.ensure_not_cancelled(ctx).await?;
            self.submit(ctx, chunk, Vec::new(), updates, &mut report)
                .await?;
        }

        // Publish created drafts
        if !created_ids.is_empty() {
            self.ensure_not_cancelled(ctx).await?;
            report.unpublished = self.publish(ctx, chunk, &created_ids).await?;
        }

        info!(
            run_id = %ctx.run_id,
            chunk = chunk.sequence,
            processed = report.delta.processed,
            created = report.delta.created,
            updated = report.delta.updated,
            skipped = report.delta.skipped,
            failed = report.delta.failed,
            duration_ms = started.elapsed().as_millis() as u64,
            "Chunk processed"
        );
        Ok(report)
    }

    /// Submits one phase and records its per-product outcomes, including
    /// when the call aborts after partial submission.
    async fn submit(
        &self,
        ctx: &RunContext,
        chunk: &ChunkRef,
        creates: Vec<ProductData>,
        updates: Vec<ProductData>,
        report: &mut ChunkReport,
    ) -> Result<BatchOutcome, ChunkError> {
        let (outcome, error) = match self.client.batch_upsert(creates, updates, Vec::new()).await {
            Ok(outcome) => (outcome, None),
            Err(BatchError { partial, source }) => (partial, Some(source)),
        };

        let items = item_results(&outcome);
        let changed = self.store.record_items(&ctx.run_id, chunk.sequence, &items).await?;
        if changed < items.len() {
            debug!(
                run_id = %ctx.run_id,
                chunk = chunk.sequence,
                recorded = items.len() - changed,
                "Products already counted by an earlier attempt"
            );
        }
        report.delta.created += outcome.created.len() as u64;
        report.delta.updated += outcome.updated.len() as u64;
        report.delta.failed += outcome.failed.len() as u64;

        match error {
            Some(source) => Err(ChunkError::Destination {
                chunk: chunk.label(),
                source,
            }),
            None => Ok(outcome),
        }
    }

    /// Flips created drafts to published. Failures leave drafts in place and
    /// are logged, never rolled back.
    async fn publish(&self, ctx: &RunContext, chunk: &ChunkRef, ids: &[u64]) -> Result<usize, ChunkError> {
        let flips: Vec<ProductData> = ids
            .iter()
            .map(|id| ProductData {
                id: Some(*id),
                status: Some(ProductStatus::Publish),
                ..Default::default()
            })
            .collect();

        let (unpublished, reason) = match self.client.batch_upsert(Vec::new(), flips, Vec::new()).await {
            Ok(outcome) if outcome.failed.is_empty() => return Ok(0),
            Ok(outcome) => (
                outcome.failed.len(),
                outcome
                    .failed
                    .first()
                    .map(|f| f.reason.clone())
                    .unwrap_or_default(),
            ),
            Err(err) => (ids.len() - err.partial.updated.len(), err.source.to_string()),
        };

        warn!(
            run_id = %ctx.run_id,
            chunk = chunk.sequence,
            unpublished,
            error = %reason,
            "Publish phase failed, products remain drafts"
        );
        self.store
            .append_error(
                &ctx.run_id,
                &format!("chunk {}: {unpublished} product(s) left as draft: {reason}", chunk.sequence),
            )
            .await?;
        Ok(unpublished)
    }

    async fn ensure_not_cancelled(&self, ctx: &RunContext) -> Result<(), ChunkError> {
        if self.store.is_cancel_requested(&ctx.run_id).await? {
            info!(run_id = %ctx.run_id, "Run cancelled, stopping chunk");
            return Err(ChunkError::Cancelled);
        }
        Ok(())
    }
}

/// Ledger entries for a batch outcome, keyed by GUPID where the product
/// carries one and by destination id otherwise.
fn item_results(outcome: &BatchOutcome) -> Vec<ItemResult> {
    let persisted = |product: &ProductData, outcome: ItemOutcome| {
        product_key(product.gupid().as_ref().map(ToString::to_string), product.id).map(|key| {
            ItemResult {
                key,
                outcome,
                error: None,
            }
        })
    };
    let failed = |item: &FailedItem| {
        let gupid = item.gupid.as_ref().map(ToString::to_string);
        let subject = gupid
            .clone()
            .or_else(|| item.id.map(|id| format!("product {id}")))
            .unwrap_or_else(|| "item".to_string());
        let error = format!("{} {subject}: {}", item.op, item.reason);
        let key = product_key(gupid, item.id).unwrap_or_else(|| format!("unkeyed:{error}"));
        ItemResult {
            key,
            outcome: ItemOutcome::Failed,
            error: Some(error),
        }
    };

    outcome
        .created
        .iter()
        .filter_map(|p| persisted(p, ItemOutcome::Created))
        .chain(outcome.updated.iter().filter_map(|p| persisted(p, ItemOutcome::Updated)))
        .chain(outcome.failed.iter().map(failed))
        .collect()
}

fn product_key(gupid: Option<String>, id: Option<u64>) -> Option<String> {
    gupid.or_else(|| id.map(|id| format!("id:{id}")))
}
