use crate::client::BatchOutcome;
use connectors::{
    file::error::FileError,
    rest::error::{ApiError, ApiErrorKind},
};
use engine_core::error::StateError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ClientError {
    #[error("Circuit open for destination '{0}'; call not attempted")]
    CircuitOpen(String),

    #[error("Destination call failed: {0}")]
    Api(#[from] ApiError),
}

impl ClientError {
    pub fn kind(&self) -> Option<ApiErrorKind> {
        match self {
            ClientError::CircuitOpen(_) => None,
            ClientError::Api(e) => Some(e.kind),
        }
    }
}

/// A batch upsert that stopped early. `partial` holds everything the
/// destination already acknowledged.
#[derive(Error, Debug)]
#[error("Batch upsert aborted after partial submission: {source}")]
pub struct BatchError {
    pub partial: BatchOutcome,
    #[source]
    pub source: ClientError,
}

#[derive(Error, Debug)]
pub enum IdentityError {
    /// The destination could not be asked. Never treated as "not found".
    #[error("Identity lookup unavailable: {source}")]
    LookupUnavailable {
        #[source]
        source: ClientError,
    },
}

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("Failed to read chunk {chunk}: {source}")]
    Read {
        chunk: String,
        #[source]
        source: FileError,
    },

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Destination rejected chunk {chunk}: {source}")]
    Destination {
        chunk: String,
        #[source]
        source: ClientError,
    },

    #[error("Run state error: {0}")]
    State(#[from] StateError),

    #[error("cancelled by operator")]
    Cancelled,
}
