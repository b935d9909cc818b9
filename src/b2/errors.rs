//! B2 API Error Types
//!
//! Maps HTTP status codes to specific error variants for retry decisions and
//! for the engine-facing [`RemoteError`] classification.

use crate::remote::RemoteError;

/// B2 API error types
#[derive(Debug, thiserror::Error)]
pub enum B2Error {
    #[error("Authentication expired, token needs refresh")]
    AuthExpired,

    #[error("Rate limited, try again after backoff")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("Request timeout")]
    Timeout,

    #[error("Request error: {0}")]
    Request(String),
}

impl B2Error {
    /// Whether this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            B2Error::RateLimited
                | B2Error::Timeout
                | B2Error::Network(_)
                | B2Error::Server(_, _)
                | B2Error::AuthExpired
        )
    }

    /// Create a B2Error from an HTTP status code and response body
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => B2Error::AuthExpired,
            403 => B2Error::Forbidden(body.to_string()),
            404 => B2Error::NotFound(body.to_string()),
            408 => B2Error::Timeout,
            429 => B2Error::RateLimited,
            500..=599 => B2Error::Server(status, body.to_string()),
            _ => B2Error::Request(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl From<reqwest::Error> for B2Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            B2Error::Timeout
        } else {
            B2Error::Network(e.to_string())
        }
    }
}

impl From<B2Error> for RemoteError {
    fn from(e: B2Error) -> Self {
        match e {
            B2Error::NotFound(what) => RemoteError::NotFound(what),
            B2Error::Forbidden(_) => RemoteError::Permanent(e.to_string()),
            other => RemoteError::Transient(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert!(matches!(B2Error::from_status(401, ""), B2Error::AuthExpired));
        assert!(matches!(B2Error::from_status(404, "x"), B2Error::NotFound(_)));
        assert!(matches!(B2Error::from_status(503, "x"), B2Error::Server(503, _)));
        assert!(matches!(B2Error::from_status(400, "bad"), B2Error::Request(_)));
    }

    #[test]
    fn test_retryable_classes() {
        assert!(B2Error::RateLimited.is_retryable());
        assert!(B2Error::Server(500, String::new()).is_retryable());
        assert!(!B2Error::NotFound(String::new()).is_retryable());
        assert!(!B2Error::Forbidden(String::new()).is_retryable());
    }

    #[test]
    fn test_remote_classification() {
        let not_found: RemoteError = B2Error::NotFound("a.txt".into()).into();
        assert!(not_found.is_not_found());
        let forbidden: RemoteError = B2Error::Forbidden("no".into()).into();
        assert!(matches!(forbidden, RemoteError::Permanent(_)));
        let server: RemoteError = B2Error::Server(502, "bad gateway".into()).into();
        assert!(matches!(server, RemoteError::Transient(_)));
    }
}
