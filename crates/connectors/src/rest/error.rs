use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// 504, gateway failures and client-side timeouts. Signals overload.
    Timeout,
    /// 401/403. Will not resolve by retrying.
    Auth,
    /// 400. The request itself was rejected.
    Validation,
    Other,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApiErrorKind::Timeout => "timeout",
            ApiErrorKind::Auth => "auth",
            ApiErrorKind::Validation => "validation",
            ApiErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// A failed call against the destination API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        ApiError {
            kind,
            status,
            message: message.into(),
        }
    }

    /// Derives the kind from the HTTP status first, then from the message.
    pub fn classify(status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = match status {
            Some(504) | Some(408) => ApiErrorKind::Timeout,
            Some(401) | Some(403) => ApiErrorKind::Auth,
            Some(400) => ApiErrorKind::Validation,
            _ if mentions_timeout(&message) => ApiErrorKind::Timeout,
            _ => ApiErrorKind::Other,
        };
        ApiError::new(kind, status, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        ApiError::new(ApiErrorKind::Timeout, None, message)
    }

    pub fn gateway_timeout() -> Self {
        ApiError::new(ApiErrorKind::Timeout, Some(504), "504 Gateway Timeout")
    }

    pub fn auth(message: impl Into<String>) -> Self {
        ApiError::new(ApiErrorKind::Auth, Some(401), message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ApiErrorKind::Validation, Some(400), message)
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        ApiError::classify(Some(status), message)
    }

    pub fn is_gateway_timeout(&self) -> bool {
        self.status == Some(504)
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self.status, Some(s) if s >= 500)
    }
}

fn mentions_timeout(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["timeout", "timed out", "gateway"]
        .iter()
        .any(|needle| lower.contains(needle))
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} error (HTTP {status}): {}", self.kind, self.message),
            None => write!(f, "{} error: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        let message = err.without_url().to_string();
        if let Some(status) = status {
            return ApiError::classify(Some(status), message);
        }
        // No response at all: connect failures count as generic errors.
        let kind = if mentions_timeout(&message) {
            ApiErrorKind::Timeout
        } else {
            ApiErrorKind::Other
        };
        ApiError::new(kind, None, message)
    }
}
