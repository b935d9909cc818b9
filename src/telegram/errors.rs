//! Telegram Bot API error types
//!
//! Messages never contain request URLs: the bot token is part of every
//! Bot API URL, so reqwest errors are stripped before formatting.

use crate::remote::RemoteError;

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    /// `ok: false` response from the Bot API
    #[error("Bot API error {code}: {description}")]
    Api { code: u16, description: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Unexpected response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for TelegramError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TelegramError::Timeout
        } else if e.is_decode() {
            TelegramError::Malformed(e.without_url().to_string())
        } else {
            TelegramError::Network(e.without_url().to_string())
        }
    }
}

impl From<TelegramError> for RemoteError {
    fn from(e: TelegramError) -> Self {
        match e {
            TelegramError::Api { code: 400, ref description }
                if description.contains("file") || description.contains("not found") =>
            {
                RemoteError::NotFound(e.to_string())
            }
            TelegramError::Api { code: 401 | 403, .. } => RemoteError::Permanent(e.to_string()),
            other => RemoteError::Transient(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_classification() {
        let missing: RemoteError = TelegramError::Api {
            code: 400,
            description: "Bad Request: invalid file_id".into(),
        }
        .into();
        assert!(missing.is_not_found());

        let unauthorized: RemoteError = TelegramError::Api {
            code: 401,
            description: "Unauthorized".into(),
        }
        .into();
        assert!(matches!(unauthorized, RemoteError::Permanent(_)));

        let busy: RemoteError = TelegramError::Api {
            code: 429,
            description: "Too Many Requests: retry after 5".into(),
        }
        .into();
        assert!(matches!(busy, RemoteError::Transient(_)));
    }
}
