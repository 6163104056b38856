use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure category reported by an external model provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// The call did not finish within its deadline.
    Timeout,
    /// Connection refused, DNS failure, 5xx.
    Unavailable,
    RateLimited,
    /// Missing or rejected credentials.
    Authentication,
    /// The provider refused the request (4xx other than auth/rate limit).
    Rejected,
    /// The provider answered with something we cannot use.
    InvalidResponse,
}

impl ProviderErrorKind {
    /// Transient kinds are worth another attempt after a backoff.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable | Self::RateLimited)
    }

    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            408 => Self::Timeout,
            429 => Self::RateLimited,
            500..=599 => Self::Unavailable,
            _ => Self::Rejected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Unavailable => "unavailable",
            Self::RateLimited => "rate_limited",
            Self::Authentication => "authentication",
            Self::Rejected => "rejected",
            Self::InvalidResponse => "invalid_response",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by an embedding provider or a generative model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unavailable, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidResponse, message)
    }

    /// Classify a transport-level failure (no HTTP status available).
    pub fn transport(is_timeout: bool, message: impl Into<String>) -> Self {
        let kind = if is_timeout { ProviderErrorKind::Timeout } else { ProviderErrorKind::Unavailable };
        Self::new(kind, message)
    }

    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self::new(ProviderErrorKind::from_http_status(status), format!("HTTP {status}: {body}"))
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Whose fault an error is, as seen by a request/response layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Caller,
    Infra,
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Index is not initialized: ingest documents before querying")]
    NotInitialized,

    #[error("Dimension mismatch: store holds {expected}-d vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding provider failed ({0})")]
    Embedding(ProviderError),

    #[error("Generation failed ({0})")]
    Generation(ProviderError),

    #[error("Store operation failed: {0}")]
    Store(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl RagError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) | Self::InvalidConfig(_) | Self::NotInitialized | Self::DimensionMismatch { .. } => {
                ErrorClass::Caller
            }
            Self::Embedding(_) | Self::Generation(_) | Self::Store(_) | Self::Cancelled => ErrorClass::Infra,
        }
    }

    /// HTTP-equivalent status for a request/response layer.
    pub fn status_code(&self) -> u16 {
        match self.class() {
            ErrorClass::Caller => 400,
            ErrorClass::Infra => 500,
        }
    }

    /// Provider error kind, when the failure came from an external model.
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            Self::Embedding(e) | Self::Generation(e) => Some(e.kind),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RagError {
    fn from(e: std::io::Error) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<serde_json::Error> for RagError {
    fn from(e: serde_json::Error) -> Self {
        Self::Store(format!("snapshot encoding: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_separates_caller_from_infra() {
        assert_eq!(RagError::NotInitialized.status_code(), 400);
        assert_eq!(RagError::validation("empty").status_code(), 400);
        assert_eq!(RagError::DimensionMismatch { expected: 3, actual: 4 }.status_code(), 400);
        assert_eq!(RagError::Embedding(ProviderError::timeout("slow")).status_code(), 500);
        assert_eq!(RagError::store("disk full").status_code(), 500);
    }

    #[test]
    fn http_status_classification() {
        assert_eq!(ProviderErrorKind::from_http_status(401), ProviderErrorKind::Authentication);
        assert_eq!(ProviderErrorKind::from_http_status(429), ProviderErrorKind::RateLimited);
        assert_eq!(ProviderErrorKind::from_http_status(503), ProviderErrorKind::Unavailable);
        assert_eq!(ProviderErrorKind::from_http_status(404), ProviderErrorKind::Rejected);
        assert!(ProviderErrorKind::RateLimited.is_transient());
        assert!(!ProviderErrorKind::Authentication.is_transient());
    }
}
