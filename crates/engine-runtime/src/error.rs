use connectors::feed::FeedError;
use engine_core::{error::StateError, retry::RetryDisposition};
use engine_processing::error::{BatchError, ClientError};
use thiserror::Error;

/// Top-level errors for driving an import run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Unknown destination '{0}'")]
    UnknownDestination(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// Includes `RunAlreadyActive` when the connection is busy.
    #[error(transparent)]
    State(#[from] StateError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    /// An error occurred while joining a task.
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Worker pool is shut down")]
    PoolClosed,
}

impl RunError {
    pub fn is_already_active(&self) -> bool {
        matches!(self, RunError::State(StateError::RunAlreadyActive { .. }))
    }
}

/// Failure of one unit of work, with whether the job system may retry it.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct JobError {
    pub message: String,
    pub disposition: RetryDisposition,
}

impl JobError {
    pub fn retryable(message: impl Into<String>) -> Self {
        JobError {
            message: message.into(),
            disposition: RetryDisposition::Retry,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        JobError {
            message: message.into(),
            disposition: RetryDisposition::Stop,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Unknown destination '{0}'")]
    UnknownDestination(String),

    #[error("Stale lookup failed: {0}")]
    Lookup(#[source] ClientError),

    #[error("Applying stale action failed: {0}")]
    Apply(#[from] BatchError),
}
