use chrono::{DateTime, Utc};
use connectors::rest::error::ApiErrorKind;
use engine_core::ttl::TtlStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Failure bookkeeping for one destination, shared by every worker talking
/// to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CircuitState {
    pub open: bool,
    pub failure_count: f64,
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Smallest batch size that succeeded after a split; preferred from then
    /// on.
    pub min_successful_batch_size: Option<usize>,
}

impl CircuitState {
    const SUCCESS_DECAY: f64 = 0.5;
    const CLOSE_BELOW: f64 = 2.0;
    const OPEN_AT_TIMEOUT: f64 = 3.0;
    const OPEN_AT_OTHER: f64 = 5.0;

    /// Returns `true` when this success closed an open circuit.
    pub fn record_success(&mut self) -> bool {
        self.failure_count = (self.failure_count - Self::SUCCESS_DECAY).max(0.0);
        if self.open && self.failure_count < Self::CLOSE_BELOW {
            self.open = false;
            return true;
        }
        false
    }

    /// Returns `true` when this failure opened the circuit.
    pub fn record_failure(&mut self, kind: ApiErrorKind, at: DateTime<Utc>) -> bool {
        let (weight, threshold) = match kind {
            ApiErrorKind::Timeout => (2.0, Self::OPEN_AT_TIMEOUT),
            _ => (1.0, Self::OPEN_AT_OTHER),
        };
        self.failure_count += weight;
        self.last_failure_at = Some(at);

        if !self.open && self.failure_count >= threshold {
            self.open = true;
            return true;
        }
        false
    }

    pub fn remember_batch_size(&mut self, size: usize) {
        self.min_successful_batch_size = Some(
            self.min_successful_batch_size
                .map_or(size, |current| current.min(size)),
        );
    }
}

/// Circuit state for all destinations, expiring after a quiet period.
pub type CircuitStore = TtlStore<String, CircuitState>;

/// Handle on one destination's entry in the shared circuit store.
#[derive(Clone)]
pub struct CircuitBreaker {
    store: Arc<CircuitStore>,
    key: String,
}

impl CircuitBreaker {
    pub fn new(store: Arc<CircuitStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.store.get(&self.key).unwrap_or_default()
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }

    pub fn record_success(&self) {
        let (closed, failures) = self.store.update(&self.key, |s| (s.record_success(), s.failure_count));
        if closed {
            info!(destination = %self.key, failure_count = failures, "Circuit closed");
        }
    }

    pub fn record_failure(&self, kind: ApiErrorKind) {
        let (opened, failures) = self
            .store
            .update(&self.key, |s| (s.record_failure(kind, Utc::now()), s.failure_count));
        if opened {
            warn!(destination = %self.key, failure_count = failures, error_kind = %kind, "Circuit opened");
        }
    }

    pub fn remember_batch_size(&self, size: usize) {
        self.store.update(&self.key, |s| s.remember_batch_size(size));
    }
}
