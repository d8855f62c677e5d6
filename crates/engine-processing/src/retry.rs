use crate::error::{ChunkError, ClientError, IdentityError};
use connectors::rest::error::{ApiError, ApiErrorKind};
use engine_core::retry::RetryDisposition;

pub fn classify_api_error(err: &ApiError) -> RetryDisposition {
    match err.kind {
        ApiErrorKind::Timeout | ApiErrorKind::Other => RetryDisposition::Retry,
        ApiErrorKind::Auth | ApiErrorKind::Validation => RetryDisposition::Stop,
    }
}

pub fn classify_client_error(err: &ClientError) -> RetryDisposition {
    match err {
        // The job system's backoff may outlast the open period.
        ClientError::CircuitOpen(_) => RetryDisposition::Retry,
        ClientError::Api(api) => classify_api_error(api),
    }
}

/// Lookups are retried in place only for server-side trouble.
pub fn classify_lookup_error(err: &ClientError) -> RetryDisposition {
    match err {
        ClientError::CircuitOpen(_) => RetryDisposition::Stop,
        ClientError::Api(api) if api.kind == ApiErrorKind::Timeout || api.is_server_error() => {
            RetryDisposition::Retry
        }
        ClientError::Api(_) => RetryDisposition::Stop,
    }
}

pub fn classify_chunk_error(err: &ChunkError) -> RetryDisposition {
    match err {
        ChunkError::Read { .. } => RetryDisposition::Stop,
        ChunkError::Identity(IdentityError::LookupUnavailable { source }) => {
            classify_client_error(source)
        }
        ChunkError::Destination { source, .. } => classify_client_error(source),
        ChunkError::State(_) => RetryDisposition::Retry,
        ChunkError::Cancelled => RetryDisposition::Stop,
    }
}
