//! Error types for Parley gateway

use thiserror::Error;

/// Result type alias for Parley operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of one call to a remote translation, recognition or synthesis service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Transient failure (network, rate limit, 5xx, empty response)
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The service rejected the request itself
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Speech was received but could not be understood
    #[error("could not understand audio: {0}")]
    NotUnderstood(String),

    /// No response within the call deadline
    #[error("timed out: {0}")]
    Timeout(String),
}

impl ServiceError {
    /// Whether another attempt may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }

    /// Classify a non-success HTTP status from a remote service.
    ///
    /// Rate limits (429), request timeouts (408) and server errors (5xx) are
    /// transient; every other status means the request itself was refused.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = format!("HTTP {status}: {}", crate::preview(body));
        if status == 408 || status == 429 || (500..600).contains(&status) {
            Self::Unavailable(message)
        } else {
            Self::InvalidInput(message)
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_decode() {
            Self::Unavailable(format!("malformed response: {e}"))
        } else {
            Self::Unavailable(e.to_string())
        }
    }
}

/// Coarse classification used by presentation layers (HTTP status, UI colour)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing input; never retried
    Client,
    /// Recognition definitively failed
    NotUnderstood,
    /// Remote service unavailable after retries
    UpstreamUnavailable,
    /// Local failure (I/O, configuration)
    Internal,
}

/// Errors that can occur in Parley gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Text was empty after trimming
    #[error("text is empty")]
    EmptyText,

    /// Text exceeds the configured maximum length
    #[error("text too long: {len} characters (max {max})")]
    TextTooLong { len: usize, max: usize },

    /// Language name or code not in the registry
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Malformed request payload
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Audio payload was empty
    #[error("audio input is empty")]
    EmptyInput,

    /// Audio processing error
    #[error("audio error: {0}")]
    Audio(String),

    /// Translation service failure
    #[error("translation failed: {0}")]
    Translation(#[source] ServiceError),

    /// Speech recognition service failure
    #[error("speech recognition failed: {0}")]
    Recognition(#[source] ServiceError),

    /// Speech synthesis service failure
    #[error("speech synthesis failed: {0}")]
    Synthesis(#[source] ServiceError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Classify this error for callers
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyText
            | Self::TextTooLong { .. }
            | Self::UnsupportedLanguage(_)
            | Self::InvalidRequest(_)
            | Self::EmptyInput => ErrorKind::Client,
            Self::Translation(e) | Self::Recognition(e) | Self::Synthesis(e) => match e {
                ServiceError::InvalidInput(_) => ErrorKind::Client,
                ServiceError::NotUnderstood(_) => ErrorKind::NotUnderstood,
                ServiceError::Unavailable(_) | ServiceError::Timeout(_) => {
                    ErrorKind::UpstreamUnavailable
                }
            },
            Self::Config(_)
            | Self::Audio(_)
            | Self::Io(_)
            | Self::Toml(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses_are_retryable() {
        for status in [408, 429, 500, 502, 503, 599] {
            let err = ServiceError::from_status(status, "");
            assert!(err.is_retryable(), "status {status} should be retryable");
        }
    }

    #[test]
    fn client_statuses_are_definitive() {
        for status in [400, 401, 403, 404, 413] {
            let err = ServiceError::from_status(status, "bad");
            assert!(matches!(err, ServiceError::InvalidInput(_)), "status {status}");
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn not_understood_is_not_retryable() {
        assert!(!ServiceError::NotUnderstood("mumble".into()).is_retryable());
        assert!(ServiceError::Timeout("15s".into()).is_retryable());
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(Error::EmptyText.kind(), ErrorKind::Client);
        assert_eq!(
            Error::UnsupportedLanguage("Klingon".into()).kind(),
            ErrorKind::Client
        );
        assert_eq!(
            Error::Recognition(ServiceError::NotUnderstood(String::new())).kind(),
            ErrorKind::NotUnderstood
        );
        assert_eq!(
            Error::Translation(ServiceError::Timeout(String::new())).kind(),
            ErrorKind::UpstreamUnavailable
        );
        assert_eq!(
            Error::Translation(ServiceError::InvalidInput(String::new())).kind(),
            ErrorKind::Client
        );
        assert_eq!(Error::Audio("boom".into()).kind(), ErrorKind::Internal);
    }
}
