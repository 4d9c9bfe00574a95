//! Error types for Gamma API extraction.
//!
//! Separates transient connectivity failures, which are retried with
//! backoff, from everything else, which fails the page immediately.

use thiserror::Error;

/// Errors that can occur while fetching a page from the Gamma API.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection could not be established (refused, reset, DNS, TLS handshake).
    #[error("connection error: {0}")]
    Connect(String),

    /// Request exceeded the configured timeout.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Server answered with a non-success status.
    #[error("API error: {status} - {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// Body was not valid JSON.
    #[error("decode error: {0}")]
    Decode(String),

    /// Body was JSON but not an array of records.
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),

    /// Any other request failure.
    #[error("request error: {0}")]
    Request(String),

    /// HTTP client could not be built from the configuration.
    #[error("client configuration error: {0}")]
    Client(String),

    /// Transient failures persisted through every allowed attempt.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error returned by the final attempt.
        last: Box<FetchError>,
    },
}

const MAX_BODY_CHARS: usize = 200;

impl FetchError {
    /// Creates an HTTP status error, truncating long bodies.
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        let body: String = body.into();
        let body = if body.chars().count() > MAX_BODY_CHARS {
            let mut cut: String = body.chars().take(MAX_BODY_CHARS).collect();
            cut.push_str("...");
            cut
        } else {
            body
        };
        Self::Http { status, body }
    }

    /// Returns true if another attempt may succeed.
    ///
    /// Only connectivity failures qualify; HTTP status errors are final even
    /// for 5xx responses.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout(_))
    }

    /// Returns the HTTP status, if the server answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if err.is_builder() {
            Self::Client(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result type alias for fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_and_timeout_are_transient() {
        assert!(FetchError::Connect("refused".into()).is_transient());
        assert!(FetchError::Timeout("30s".into()).is_transient());
    }

    #[test]
    fn test_http_errors_are_final() {
        assert!(!FetchError::http(500, "boom").is_transient());
        assert!(!FetchError::http(404, "missing").is_transient());
        assert!(!FetchError::Decode("eof".into()).is_transient());
    }

    #[test]
    fn test_http_body_truncated() {
        let err = FetchError::http(502, "x".repeat(1_000));
        match err {
            FetchError::Http { body, .. } => assert_eq!(body.len(), MAX_BODY_CHARS + 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_exhausted_reports_last_status() {
        let err = FetchError::RetriesExhausted {
            attempts: 5,
            last: Box::new(FetchError::Connect("reset".into())),
        };
        assert!(err.to_string().contains("5 attempts"));
        assert!(!err.is_transient());
        assert_eq!(err.status(), None);
    }
}
