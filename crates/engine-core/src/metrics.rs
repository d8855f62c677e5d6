use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    records_processed: AtomicU64,
    batches_submitted: AtomicU64,
    batch_splits: AtomicU64,
    failure_count: AtomicU64,
    retry_count: AtomicU64,
    circuit_rejections: AtomicU64,
    rate_limit_waits: AtomicU64,
}

/// Process-wide pipeline counters, cheap to clone and share across workers.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub records_processed: u64,
    pub batches_submitted: u64,
    pub batch_splits: u64,
    pub failure_count: u64,
    pub retry_count: u64,
    pub circuit_rejections: u64,
    pub rate_limit_waits: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn increment_records(&self, count: u64) {
        self.inner
            .records_processed
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_batches(&self, count: u64) {
        self.inner
            .batches_submitted
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_splits(&self) {
        self.inner.batch_splits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failures(&self, count: u64) {
        self.inner.failure_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_retries(&self, count: u64) {
        self.inner.retry_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_circuit_rejections(&self) {
        self.inner
            .circuit_rejections
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rate_limit_waits(&self) {
        self.inner.rate_limit_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_processed: self.inner.records_processed.load(Ordering::Relaxed),
            batches_submitted: self.inner.batches_submitted.load(Ordering::Relaxed),
            batch_splits: self.inner.batch_splits.load(Ordering::Relaxed),
            failure_count: self.inner.failure_count.load(Ordering::Relaxed),
            retry_count: self.inner.retry_count.load(Ordering::Relaxed),
            circuit_rejections: self.inner.circuit_rejections.load(Ordering::Relaxed),
            rate_limit_waits: self.inner.rate_limit_waits.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
