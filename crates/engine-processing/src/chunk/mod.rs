use chrono::{DateTime, Utc};
use model::{core::identifiers::RunId, execution::connection::FeedConnection};
use std::sync::Arc;

pub mod processor;

pub use processor::{ChunkProcessor, ChunkReport};

/// What every chunk of one run shares.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub connection: Arc<FeedConnection>,
    /// Stamped on every product as its last-seen time.
    pub started_at: DateTime<Utc>,
}
