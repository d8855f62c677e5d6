use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Connection {connection} already has an active run ({run})")]
    RunAlreadyActive { connection: String, run: String },

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Invalid status transition for run {run}: {from} -> {to}")]
    InvalidTransition {
        run: String,
        from: String,
        to: String,
    },

    #[error("State storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("State encoding error: {0}")]
    Codec(#[from] bincode::Error),
}

#[derive(Error, Debug)]
pub enum StatusError {
    #[error("No run found for {0}")]
    NotFound(String),

    #[error(transparent)]
    State(#[from] StateError),
}
