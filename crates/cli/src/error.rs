use connectors::feed::FeedError;
use engine_config::error::ConfigError;
use engine_core::error::{StateError, StatusError};
use engine_runtime::error::{ReconcileError, RunError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    ConfigDocument(#[from] ConfigError),

    #[error("Failed to open run state: {0}")]
    State(#[from] StateError),

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error("Failed to prepare feed ingestion: {0}")]
    Feed(#[from] FeedError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),

    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shutdown requested")]
    ShutdownRequested,
}
