//! Provider call failures and their retry classification.

use std::time::Duration;

/// A single failed provider call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Request exceeded the per-call timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure before a response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// HTTP 429.
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// HTTP 401/403 or a missing key.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Any other non-success HTTP status.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Success status but no usable text in the body.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Timeouts, connection failures, 429 and 5xx are worth retrying on the
    /// same provider. Everything else moves on to the next one.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Auth(_) | Self::InvalidResponse(_) => false,
        }
    }

    /// Map an HTTP error status and body to a typed error.
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let message = truncate(body, 300);
        match status {
            401 | 403 => Self::Auth(message),
            429 => Self::RateLimited { retry_after },
            _ => Self::Api { status, message },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_status(status.as_u16(), &e.to_string(), None)
        } else {
            Self::Network(e.to_string())
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(ProviderError::Timeout.is_retryable());
        assert!(ProviderError::Network("reset".into()).is_retryable());
        assert!(ProviderError::RateLimited { retry_after: None }.is_retryable());
        assert!(ProviderError::from_status(503, "busy", None).is_retryable());

        assert!(!ProviderError::from_status(401, "bad key", None).is_retryable());
        assert!(!ProviderError::from_status(400, "bad request", None).is_retryable());
        assert!(!ProviderError::InvalidResponse("empty".into()).is_retryable());
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            ProviderError::from_status(403, "", None),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            ProviderError::from_status(429, "", Some(Duration::from_secs(2))),
            ProviderError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(2)
        ));
        let long = "x".repeat(1_000);
        match ProviderError::from_status(500, &long, None) {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 500);
                assert!(message.len() < 400);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
