use crate::error::StateError;
use async_trait::async_trait;
use model::{
    core::identifiers::{ConnectionId, RunId},
    execution::run::{CounterDelta, ImportRun, ItemResult, RunStatus},
};

pub mod sled_store;

/// Durable home of import runs. Every mutation is atomic at the storage
/// layer; callers never read-modify-write a run in memory.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persists a new run. Fails with `RunAlreadyActive` when the connection
    /// already has a non-terminal run.
    async fn create_run(&self, run: &ImportRun) -> Result<(), StateError>;

    async fn load_run(&self, run_id: &RunId) -> Result<Option<ImportRun>, StateError>;

    /// Moves a non-terminal run to the next non-terminal status.
    async fn transition(&self, run_id: &RunId, next: RunStatus) -> Result<ImportRun, StateError>;

    async fn record_chunk_count(&self, run_id: &RunId, chunks: u32) -> Result<(), StateError>;

    /// Adds a chunk's transform counters and record errors, once per chunk.
    /// Returns `false` when an earlier attempt already recorded them.
    async fn record_transform(
        &self,
        run_id: &RunId,
        sequence: u32,
        delta: &CounterDelta,
        errors: &[String],
    ) -> Result<bool, StateError>;

    /// Folds per-product outcomes of a chunk into the counters. A product
    /// already recorded for the chunk only moves from failed to persisted,
    /// and its error is logged the first time it fails. Returns how many
    /// results changed the counters.
    async fn record_items(
        &self,
        run_id: &RunId,
        sequence: u32,
        items: &[ItemResult],
    ) -> Result<usize, StateError>;

    async fn append_error(&self, run_id: &RunId, message: &str) -> Result<(), StateError>;

    async fn request_cancel(&self, run_id: &RunId) -> Result<ImportRun, StateError>;

    async fn is_cancel_requested(&self, run_id: &RunId) -> Result<bool, StateError>;

    /// Moves the run to a terminal status and releases the connection.
    async fn finish(
        &self,
        run_id: &RunId,
        status: RunStatus,
        diagnostic: Option<String>,
    ) -> Result<ImportRun, StateError>;

    async fn active_run(&self, connection: &ConnectionId) -> Result<Option<RunId>, StateError>;

    /// Runs, newest first, optionally restricted to one connection.
    async fn list_runs(&self, connection: Option<&ConnectionId>) -> Result<Vec<ImportRun>, StateError>;
}
