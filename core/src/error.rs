//! Error types for the events API client.
//!
//! # Design
//! Aborted attempts (timeout or upstream cancellation) share the
//! `"AbortError"` name so callers can tell "the connection took too long"
//! apart from every other failure without matching on variants. Non-2xx
//! responses carry status, status text and body so a single message describes
//! the failure.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by the request client and the typed API on top of it.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The attempt did not settle within its timeout budget.
    #[error("request aborted after {}ms", after.as_millis())]
    Timeout { after: Duration },

    /// An upstream cancellation token fired while the attempt was in flight.
    #[error("request aborted by caller")]
    Cancelled,

    /// Transport failure before any HTTP status was received.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} {status_text}: {body}")]
    Http {
        status: u16,
        status_text: String,
        body: String,
    },

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// The response payload could not be mapped into the expected type.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// A list response matched none of the known envelope shapes.
    #[error("unrecognized list envelope: {0}")]
    UnrecognizedEnvelope(String),

    /// Caller input rejected before any request was sent.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// True when the attempt was cut short by a timeout or a cancellation.
    pub fn is_abort(&self) -> bool {
        matches!(self, ApiError::Timeout { .. } | ApiError::Cancelled)
    }

    /// Name of the error kind, in the spirit of a JS `Error.name`.
    pub fn name(&self) -> &'static str {
        match self {
            ApiError::Timeout { .. } | ApiError::Cancelled => "AbortError",
            ApiError::Http { .. } => "HttpError",
            _ => "Error",
        }
    }

    /// HTTP status for `Http` failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_message_carries_status_text_and_body() {
        let err = ApiError::Http {
            status: 500,
            status_text: "Internal Server Error".to_string(),
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 500 Internal Server Error: boom");
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.name(), "HttpError");
    }

    #[test]
    fn timeout_and_cancel_are_abort_flavored() {
        let timeout = ApiError::Timeout {
            after: Duration::from_millis(25_000),
        };
        assert!(timeout.is_abort());
        assert_eq!(timeout.name(), "AbortError");
        assert_eq!(timeout.to_string(), "request aborted after 25000ms");

        assert!(ApiError::Cancelled.is_abort());
        assert_eq!(ApiError::Cancelled.name(), "AbortError");
    }

    #[test]
    fn network_error_is_not_abort() {
        let err = ApiError::Network("connection refused".to_string());
        assert!(!err.is_abort());
        assert_eq!(err.name(), "Error");
        assert_eq!(err.status(), None);
    }
}
