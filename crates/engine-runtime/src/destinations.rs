use crate::error::RunError;
use connectors::rest::{DestinationApi, woo::WooCommerceApi};
use engine_config::{document::FeedsyncConfig, settings::ClientSettings};
use engine_core::{metrics::Metrics, rate_limit::KeyedRateLimiter};
use engine_processing::{cb::CircuitStore, client::DestinationClient};
use std::{collections::HashMap, sync::Arc};

/// Resilient clients by destination id. All clients share one circuit store
/// and one rate limiter.
pub struct DestinationRegistry {
    clients: HashMap<String, Arc<DestinationClient>>,
    circuits: Arc<CircuitStore>,
    limiter: Arc<KeyedRateLimiter>,
    settings: ClientSettings,
    metrics: Metrics,
}

impl DestinationRegistry {
    pub fn new(settings: ClientSettings, metrics: Metrics) -> Self {
        DestinationRegistry {
            clients: HashMap::new(),
            circuits: Arc::new(CircuitStore::new(settings.circuit_ttl())),
            limiter: Arc::new(KeyedRateLimiter::new(
                settings.rate_limit_per_minute,
                settings.rate_limit_burst,
            )),
            settings,
            metrics,
        }
    }

    /// One WooCommerce client per configured destination.
    pub fn from_config(config: &FeedsyncConfig, metrics: Metrics) -> Result<Self, RunError> {
        let mut registry = Self::new(config.engine.client.clone(), metrics);
        let http = reqwest::Client::builder()
            .user_agent(concat!("feedsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        for endpoint in &config.destinations {
            registry.register(Arc::new(WooCommerceApi::new(endpoint.clone(), http.clone())));
        }
        Ok(registry)
    }

    /// Wraps `api` in a client keyed by `api.key()`.
    pub fn register(&mut self, api: Arc<dyn DestinationApi>) -> Arc<DestinationClient> {
        let key = api.key().to_string();
        let client = Arc::new(DestinationClient::new(
            api,
            self.circuits.clone(),
            self.limiter.clone(),
            self.settings.clone(),
            self.metrics.clone(),
        ));
        self.clients.insert(key, client.clone());
        client
    }

    pub fn get(&self, id: &str) -> Result<Arc<DestinationClient>, RunError> {
        self.clients
            .get(id)
            .cloned()
            .ok_or_else(|| RunError::UnknownDestination(id.to_string()))
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<_> = self.clients.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
