pub mod error;
pub mod metrics;
pub mod rate_limit;
pub mod retry;
pub mod state;
pub mod status;
pub mod ttl;
