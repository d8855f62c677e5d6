use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DefaultKeyedStateStore,
};
use std::{num::NonZeroU32, time::Duration};
use tracing::debug;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Token bucket per `(destination, operation)`. Callers that hit the limit
/// sleep for the bucket's indicated wait instead of failing.
pub struct KeyedRateLimiter {
    limiter: Option<KeyedLimiter>,
    clock: DefaultClock,
    max_wait: Duration,
}

impl KeyedRateLimiter {
    pub const MAX_WAIT: Duration = Duration::from_secs(60);

    /// `per_minute == 0` disables limiting.
    pub fn new(per_minute: u32, burst: u32) -> Self {
        let limiter = NonZeroU32::new(per_minute).map(|rate| {
            let burst = NonZeroU32::new(burst).unwrap_or(rate);
            RateLimiter::keyed(Quota::per_minute(rate).allow_burst(burst))
        });
        KeyedRateLimiter {
            limiter,
            clock: DefaultClock::default(),
            max_wait: Self::MAX_WAIT,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0, 0)
    }

    /// Takes a token for `destination:operation`, sleeping once for the
    /// bucket's indicated wait when it is empty. The sleep is capped at 60s
    /// and the call proceeds afterwards. Returns the time spent waiting.
    pub async fn acquire(&self, destination: &str, operation: &str) -> Duration {
        let Some(limiter) = &self.limiter else {
            return Duration::ZERO;
        };

        let key = format!("{destination}:{operation}");
        let Err(not_until) = limiter.check_key(&key) else {
            return Duration::ZERO;
        };

        let indicated = not_until.wait_time_from(self.clock.now());
        let wait = indicated.min(self.max_wait).max(Duration::from_millis(1));
        debug!(
            key = %key,
            wait_ms = wait.as_millis() as u64,
            capped = indicated > self.max_wait,
            "Rate limit reached, waiting"
        );
        tokio::time::sleep(wait).await;
        // Claims the refilled token; after a capped wait the bucket may
        // still be empty and the call goes ahead regardless.
        let _ = limiter.check_key(&key);
        wait
    }
}
