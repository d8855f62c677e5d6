#[cfg(test)]
mod tests {
    use crate::utils::{Stack, client_settings, connection, memory_client};
    use connectors::rest::{error::ApiError, memory::MemoryDestination};
    use engine_config::settings::ClientSettings;
    use engine_processing::{client::HealthStatus, error::ClientError};
    use engine_core::state::RunStore;
    use model::{
        core::identifiers::ConnectionId, execution::run::RunStatus, records::product::ProductData,
    };
    use std::{sync::Arc, time::Duration};
    use tracing_test::traced_test;

    fn product(name: &str) -> ProductData {
        ProductData {
            name: Some(name.into()),
            regular_price: Some("1.00".into()),
            ..Default::default()
        }
    }

    // Scenario: five consecutive server errors against one destination.
    // Expected: the circuit opens, further calls fail without touching the
    // network, health reports critical, and the circuit closes once its
    // state expires.
    #[traced_test]
    #[tokio::test]
    async fn circuit_opens_fails_fast_and_recovers() {
        let dest = Arc::new(MemoryDestination::new("shop"));
        dest.fail_batches_with(|_, call| (call < 5).then(|| ApiError::server(500, "fatal error")));
        let client = memory_client(dest.clone(), Duration::from_millis(300));

        for i in 0..5 {
            let err = client
                .batch_upsert(vec![product(&format!("p{i}"))], vec![], vec![])
                .await
                .unwrap_err();
            assert!(matches!(err.source, ClientError::Api(_)));
        }
        assert!(client.circuit().open);
        assert!(logs_contain("Circuit opened"));

        let err = client.batch_upsert(vec![product("blocked")], vec![], vec![]).await.unwrap_err();
        assert!(matches!(err.source, ClientError::CircuitOpen(_)));
        assert_eq!(dest.batch_calls(), 5);

        let health = client.health_check().await;
        assert_eq!(health.status, HealthStatus::Critical);
        assert_eq!(dest.ping_calls(), 0);

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(!client.circuit().open);
        let outcome = client.batch_upsert(vec![product("after")], vec![], vec![]).await.unwrap();
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(dest.batch_calls(), 6);
        assert_eq!(client.health_check().await.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn slow_ping_is_degraded_and_failed_ping_is_down() {
        let dest = Arc::new(MemoryDestination::new("shop"));
        let client = memory_client(dest.clone(), Duration::from_secs(60));

        dest.set_ping_latency(Duration::from_millis(1_600));
        let report = client.health_check().await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.latency_ms.unwrap() >= 1_500);

        dest.set_ping_latency(Duration::ZERO);
        dest.fail_next_ping(ApiError::auth("invalid signature"));
        let report = client.health_check().await;
        assert_eq!(report.status, HealthStatus::Down);
        assert!(report.message.unwrap().contains("invalid signature"));
    }

    // Scenario: a 30-product chunk against a destination that times out on
    // any create batch larger than 10.
    // Expected: the batch is split, every product is created, and later
    // batches start at the remembered size.
    #[traced_test]
    #[tokio::test]
    async fn oversized_batches_are_split_and_the_safe_size_remembered() {
        let stack = Stack::with_client(ClientSettings {
            max_batch_size: 100,
            ..client_settings()
        });
        stack.dest.fail_batches_with(|request, _| {
            (request.create.len() > 10).then(|| ApiError::timeout("upstream took too long"))
        });
        let rows: Vec<(String, String)> = (1..=30).map(|i| (i.to_string(), "5".to_string())).collect();
        let rows: Vec<(&str, &str)> = rows.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        let feed = stack.feed("feed.csv", &rows);

        let run = stack
            .coordinator
            .run(Arc::new(connection("acme", &feed, 30)))
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.counters.created, 30);
        assert_eq!(stack.dest.products().len(), 30);

        let client = stack.client();
        assert_eq!(client.circuit().min_successful_batch_size, Some(10));
        assert_eq!(client.preferred_batch_size(), 10);
        assert!(stack.metrics.snapshot().batch_splits >= 1);
        assert!(logs_contain("Batch timed out, splitting"));

        let sizes: Vec<usize> = stack
            .dest
            .batch_requests()
            .iter()
            .filter(|r| !r.create.is_empty())
            .map(|r| r.create.len())
            .collect();
        assert_eq!(sizes, vec![30, 10, 10, 10]);
    }

    #[tokio::test]
    async fn whole_batch_rejection_completes_with_errors() {
        let stack = Stack::new();
        stack.dest.fail_batches_with(|request, _| {
            (!request.create.is_empty()).then(|| ApiError::validation("Invalid parameter(s): regular_price"))
        });
        let feed = stack.feed("feed.csv", &[("1", "10"), ("2", "11")]);

        let run = stack.coordinator.run(Arc::new(connection("acme", &feed, 5))).await.unwrap();

        assert_eq!(run.status, RunStatus::CompletedWithErrors);
        assert_eq!(run.counters.processed, 2);
        assert_eq!(run.counters.failed, 2);
        assert_eq!(run.counters.created, 0);
        assert!(stack.dest.products().is_empty());
        // Validation errors are never retried.
        assert_eq!(stack.dest.batch_calls(), 1);
    }

    #[tokio::test]
    async fn revoked_credentials_fail_the_run_without_retries() {
        let stack = Stack::new();
        stack.dest.fail_batches_with(|_, _| Some(ApiError::auth("consumer key revoked")));
        let feed = stack.feed("feed.csv", &[("1", "10"), ("2", "11"), ("3", "12")]);

        let run = stack.coordinator.run(Arc::new(connection("acme", &feed, 3))).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(stack.dest.batch_calls(), 1);
        assert_eq!(stack.metrics.snapshot().retry_count, 0);
        let active = stack.store.active_run(&ConnectionId::new("acme")).await.unwrap();
        assert_eq!(active, None);
    }
}
