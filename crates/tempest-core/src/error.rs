//! Error types for tempest-core.
//!
//! The taxonomy follows how failures are handled, not where they occur:
//!
//! | Variant | Handling |
//! |---------|----------|
//! | [`Error::Transport`] | Recoverable; the orchestrator falls back or retries |
//! | [`Error::Decode`] | The offending frame is dropped and logged, never propagated |
//! | [`Error::Fetch`] | Surfaced as a user-visible error string; cached data remains available |
//! | [`Error::Auth`] | Surfaced distinctly; halts further fetches until re-authenticated |
//!
//! Transport failures never unwind through consumer code: the orchestrator
//! absorbs them and exposes only a `last_error` string plus the resulting
//! connection type.

use std::time::Duration;

use thiserror::Error;

use tempest_types::ParseError;

/// Errors that can occur in tempest-core.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A transport failed to connect, bind or subscribe.
    #[error("{transport} transport failed: {reason}")]
    Transport {
        /// Which transport failed (`udp`, `websocket`).
        transport: &'static str,
        /// Human-readable failure reason.
        reason: String,
    },

    /// A frame failed to decode.
    #[error("Decode failed: {0}")]
    Decode(#[from] ParseError),

    /// A REST call failed.
    #[error("Fetch failed: {message}")]
    Fetch {
        /// HTTP status, when the server answered at all.
        status: Option<u16>,
        /// Human-readable message.
        message: String,
    },

    /// The access token was rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// An operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Cache read/write error.
    #[error("Cache error: {0}")]
    Cache(#[from] tempest_cache::Error),

    /// No station is selected for an operation that needs one.
    #[error("No station selected")]
    NoStationSelected,

    /// Station id not present in the known station list.
    #[error("Unknown station: {0}")]
    UnknownStation(i64),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a transport failure.
    pub fn transport(transport: &'static str, reason: impl Into<String>) -> Self {
        Self::Transport {
            transport,
            reason: reason.into(),
        }
    }

    /// Create a fetch failure without an HTTP status.
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            status: None,
            message: message.into(),
        }
    }

    /// Create a fetch failure carrying an HTTP status.
    pub fn fetch_status(status: u16, message: impl Into<String>) -> Self {
        Self::Fetch {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Whether this error means the token must be refreshed before any
    /// further fetch can succeed.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::timeout("http request", crate::rest::REQUEST_TIMEOUT);
        }
        let status = err.status().map(|s| s.as_u16());
        match status {
            Some(401) | Some(403) => Self::Auth(err.to_string()),
            _ => Self::Fetch {
                status,
                message: err.to_string(),
            },
        }
    }
}

/// Result type alias using tempest-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::transport("udp", "address in use");
        assert_eq!(err.to_string(), "udp transport failed: address in use");

        let err = Error::fetch_status(503, "service unavailable");
        assert!(err.to_string().contains("service unavailable"));
        assert!(matches!(err, Error::Fetch { status: Some(503), .. }));

        let err = Error::timeout("get_forecast", Duration::from_secs(10));
        assert!(err.to_string().contains("get_forecast"));
    }

    #[test]
    fn test_is_auth() {
        assert!(Error::Auth("expired".into()).is_auth());
        assert!(!Error::fetch("nope").is_auth());
    }
}
