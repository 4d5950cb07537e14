//! Notifier error type.

use thiserror::Error;

/// Errors returned by a notifier's `deliver` method.
///
/// The dispatcher uses the variant to decide retry behaviour:
/// - `Retryable`: retried with exponential back-off, then re-queued.
/// - `Fatal`: the attempt is recorded as failed without retrying.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// Transient failure (network, 429, 5xx).
    #[error("retryable delivery error: {0}")]
    Retryable(String),

    /// Permanent failure (bad request, bad credentials, malformed payload).
    #[error("fatal delivery error: {0}")]
    Fatal(String),
}

impl NotifyError {
    /// Classify a non-success HTTP status returned by a remote endpoint.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let msg = format!("{status}: {body}");
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Self::Retryable(msg)
        } else {
            Self::Fatal(msg)
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        // Connection and timeout failures are worth another attempt; a body
        // that failed to encode is not.
        if err.is_builder() {
            Self::Fatal(err.to_string())
        } else {
            Self::Retryable(err.to_string())
        }
    }
}
