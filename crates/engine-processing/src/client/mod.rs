use crate::{
    cb::{CircuitBreaker, CircuitState, CircuitStore},
    error::ClientError,
};
use connectors::rest::{
    DestinationApi,
    error::ApiError,
    wire::{BatchRequest, BatchResponse, MetaQuery},
};
use engine_config::settings::ClientSettings;
use engine_core::{metrics::Metrics, rate_limit::KeyedRateLimiter};
use model::records::product::ProductData;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::debug;

pub mod batch;
pub mod health;

pub use batch::{BatchOp, BatchOutcome, FailedItem};
pub use health::{HealthReport, HealthStatus};

/// Resilient wrapper around one destination's API.
///
/// Every call goes through the same gate: fail fast on an open circuit, wait
/// for the rate limiter, run under a timeout, then feed the outcome back into
/// the shared circuit state.
pub struct DestinationClient {
    api: Arc<dyn DestinationApi>,
    breaker: CircuitBreaker,
    limiter: Arc<KeyedRateLimiter>,
    settings: ClientSettings,
    metrics: Metrics,
}

impl DestinationClient {
    pub fn new(
        api: Arc<dyn DestinationApi>,
        circuits: Arc<CircuitStore>,
        limiter: Arc<KeyedRateLimiter>,
        settings: ClientSettings,
        metrics: Metrics,
    ) -> Self {
        let breaker = CircuitBreaker::new(circuits, api.key());
        DestinationClient {
            api,
            breaker,
            limiter,
            settings,
            metrics,
        }
    }

    pub fn key(&self) -> &str {
        self.api.key()
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn circuit(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Batch size to start with: the configured maximum, or the smallest
    /// size known to succeed if that is lower.
    pub fn preferred_batch_size(&self) -> usize {
        let max = self.settings.max_batch_size.max(1);
        self.circuit()
            .min_successful_batch_size
            .map_or(max, |safe| safe.clamp(1, max))
    }

    /// Batch timeout, shrinking linearly from the configured maximum to the
    /// floor as the failure count climbs to the open threshold.
    pub fn batch_timeout(&self) -> Duration {
        let max = self.settings.batch_timeout();
        let min = self.settings.min_batch_timeout();
        let pressure = (self.circuit().failure_count / 5.0).clamp(0.0, 1.0);
        max - (max - min).mul_f64(pressure)
    }

    async fn guarded<T, F, Fut>(
        &self,
        operation: &'static str,
        timeout: Duration,
        call: F,
    ) -> Result<T, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if self.breaker.is_open() {
            self.metrics.increment_circuit_rejections();
            debug!(destination = %self.key(), operation, "Circuit open, failing fast");
            return Err(ClientError::CircuitOpen(self.key().to_string()));
        }

        let waited = self.limiter.acquire(self.key(), operation).await;
        if !waited.is_zero() {
            self.metrics.increment_rate_limit_waits();
        }

        let result = match tokio::time::timeout(timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::timeout(format!(
                "{operation} timed out after {}s",
                timeout.as_secs_f32()
            ))),
        };

        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(e) => {
                self.metrics.increment_failures(1);
                self.breaker.record_failure(e.kind);
            }
        }
        result.map_err(ClientError::Api)
    }

    /// One page of products whose `query.key` meta matches.
    pub async fn find_by_meta(
        &self,
        query: &MetaQuery,
        page: u32,
    ) -> Result<Vec<ProductData>, ClientError> {
        self.find_page(query, page, self.settings.lookup_page_size).await
    }

    /// Every product matching `query`, following pages until a short one.
    pub async fn find_all_by_meta(&self, query: &MetaQuery) -> Result<Vec<ProductData>, ClientError> {
        self.find_all_by_meta_paged(query, self.settings.lookup_page_size)
            .await
    }

    pub async fn find_all_by_meta_paged(
        &self,
        query: &MetaQuery,
        per_page: u32,
    ) -> Result<Vec<ProductData>, ClientError> {
        let per_page = per_page.max(1);
        let mut found = Vec::new();
        let mut page = 1;
        loop {
            let items = self.find_page(query, page, per_page).await?;
            let short = items.len() < per_page as usize;
            found.extend(items);
            if short {
                return Ok(found);
            }
            page += 1;
        }
    }

    async fn find_page(
        &self,
        query: &MetaQuery,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ProductData>, ClientError> {
        let per_page = per_page.max(1);
        debug!(destination = %self.key(), key = %query.key, values = query.values.len(), page, "Meta lookup");
        self.guarded("lookup", self.batch_timeout(), || {
            self.api.find_by_meta(query, page, per_page)
        })
        .await
    }

    pub(crate) async fn send_batch(&self, request: &BatchRequest) -> Result<BatchResponse, ClientError> {
        self.metrics.increment_batches(1);
        self.guarded("batch", self.batch_timeout(), || self.api.batch(request))
            .await
    }

    pub(crate) async fn ping(&self) -> Result<(), ClientError> {
        self.guarded("ping", self.settings.health_timeout(), || self.api.ping())
            .await
    }

    pub(crate) fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub(crate) fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use connectors::rest::memory::MemoryDestination;

    pub(crate) fn test_settings() -> ClientSettings {
        ClientSettings {
            inter_batch_delay_ms: 0,
            rate_limit_per_minute: 0,
            ..Default::default()
        }
    }

    pub(crate) fn client_for(dest: Arc<MemoryDestination>, settings: ClientSettings) -> DestinationClient {
        DestinationClient::new(
            dest,
            Arc::new(CircuitStore::new(settings.circuit_ttl())),
            Arc::new(KeyedRateLimiter::unlimited()),
            settings,
            Metrics::new(),
        )
    }

    #[tokio::test]
    async fn open_circuit_fails_fast_without_network() {
        let dest = Arc::new(MemoryDestination::new("shop"));
        dest.fail_batches_with(|_, _| Some(ApiError::gateway_timeout()));
        let client = client_for(dest.clone(), test_settings());
        let request = BatchRequest {
            delete: vec![1],
            ..Default::default()
        };

        for _ in 0..3 {
            let _ = client.send_batch(&request).await;
        }
        let calls = dest.batch_calls();
        assert!(client.circuit().open);

        let err = client.send_batch(&request).await.unwrap_err();
        assert!(matches!(err, ClientError::CircuitOpen(_)));
        assert_eq!(dest.batch_calls(), calls);
    }

    #[tokio::test]
    async fn timeout_degrades_with_failures() {
        let dest = Arc::new(MemoryDestination::new("shop"));
        let client = client_for(dest, test_settings());
        assert_eq!(client.batch_timeout(), Duration::from_secs(120));

        client.breaker().record_failure(connectors::rest::error::ApiErrorKind::Other);
        client.breaker().record_failure(connectors::rest::error::ApiErrorKind::Other);
        let degraded = client.batch_timeout();
        assert!(degraded < Duration::from_secs(120));
        assert!(degraded >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn pages_through_meta_lookups() {
        let dest = Arc::new(MemoryDestination::new("shop"));
        for i in 0..5 {
            let mut p = ProductData::default();
            p.set_meta("_tag", "x");
            p.name = Some(format!("p{i}"));
            dest.seed(p);
        }
        let client = client_for(
            dest.clone(),
            ClientSettings {
                lookup_page_size: 2,
                ..test_settings()
            },
        );

        let all = client
            .find_all_by_meta(&MetaQuery::single("_tag", "x"))
            .await
            .unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(dest.lookup_calls(), 3);
    }
}
