use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the library. All remote failures propagate directly
/// to the caller; the only internal recovery is the watcher resetting an
/// expired history checkpoint.
#[derive(Debug, Error)]
pub enum Error {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("history checkpoint expired: {0}")]
    CheckpointExpired(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gmail api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("oauth flow failed: {0}")]
    OAuth(String),

    #[error("invalid draft: {0}")]
    Draft(String),

    #[error("invalid client secrets: {0}")]
    Secrets(String),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid response payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("handler failed: {0}")]
    Handler(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap an arbitrary failure raised inside a watch handler.
    pub fn handler<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Handler(err.into())
    }

    /// Map a non-success Gmail API response to the error taxonomy.
    pub(crate) fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            401 => Error::Auth(message),
            403 if is_rate_limit_reason(&message) => Error::RateLimit(message),
            403 => Error::Auth(message),
            404 => Error::NotFound(message),
            429 => Error::RateLimit(message),
            _ => Error::Api {
                status: status.as_u16(),
                message,
            },
        }
    }
}

// Gmail reports quota exhaustion as 403 with one of these reason codes in
// the error body, not only as 429.
fn is_rate_limit_reason(body: &str) -> bool {
    body.contains("rateLimitExceeded")
        || body.contains("userRateLimitExceeded")
        || body.contains("dailyLimitExceeded")
        || body.contains("quotaExceeded")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            Error::from_status(StatusCode::UNAUTHORIZED, String::new()),
            Error::Auth(_)
        ));
        assert!(matches!(
            Error::from_status(StatusCode::NOT_FOUND, String::new()),
            Error::NotFound(_)
        ));
        assert!(matches!(
            Error::from_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            Error::RateLimit(_)
        ));
        assert!(matches!(
            Error::from_status(StatusCode::INTERNAL_SERVER_ERROR, String::new()),
            Error::Api { status: 500, .. }
        ));
    }

    #[test]
    fn test_403_rate_limit_reason() {
        let body = r#"{"error":{"errors":[{"reason":"userRateLimitExceeded"}]}}"#.to_string();
        assert!(matches!(
            Error::from_status(StatusCode::FORBIDDEN, body),
            Error::RateLimit(_)
        ));
        assert!(matches!(
            Error::from_status(StatusCode::FORBIDDEN, "denied".to_string()),
            Error::Auth(_)
        ));
    }
}
