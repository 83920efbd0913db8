//! Error types for envwatch-core.
//!
//! Adapters never return these to their callers: every failure is resolved
//! into a degraded [`Observation`](envwatch_types::Observation). The errors
//! still flow through the internals (provider fetches, retries, the cache
//! and history seams) and end up as the `error` annotation of an
//! unavailable observation or in the logs.
//!
//! # Error Classification
//!
//! | Error | Taxonomy | Retried | Recovery |
//! |-------|----------|---------|----------|
//! | [`Error::Network`] | network failure | yes | fallback chain |
//! | [`Error::Timeout`] | network failure | yes | fallback chain |
//! | [`Error::Status`] | network failure | 5xx only | fallback chain |
//! | [`Error::RateLimited`] | network failure | yes, after `Retry-After` | fallback chain |
//! | [`Error::MalformedResponse`] | malformed response | no | fallback chain |
//! | [`Error::NoDataAvailable`] | no data | no | unavailable observation |
//! | [`Error::MissingCredentials`] | network failure | no | fallback chain |
//! | [`Error::Persistence`] | persistence failure | no | logged and swallowed |
//! | [`Error::InvalidConfig`] | | no | fix configuration and restart |

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while acquiring observations.
///
/// `Clone` so a single in-flight fetch can hand the same outcome to every
/// waiting caller.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// Connection-level failure talking to a provider.
    #[error("Network error from {provider}: {message}")]
    Network { provider: String, message: String },

    /// Provider call exceeded its time budget.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Provider answered with a non-success HTTP status.
    #[error("{provider} returned HTTP {status}")]
    Status { provider: String, status: u16 },

    /// Provider answered 429, possibly naming how long to wait.
    #[error("{provider} rate limited the request")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    /// Provider answered with a payload that could not be interpreted.
    #[error("Malformed response from {provider}: {message}")]
    MalformedResponse { provider: String, message: String },

    /// Provider has nothing for the requested place.
    #[error("No data available: {0}")]
    NoDataAvailable(String),

    /// API key required but not configured.
    #[error("Missing credentials for {0}")]
    MissingCredentials(String),

    /// Cache or history storage failed.
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a network error.
    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            provider: provider.into(),
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

    /// Create a malformed response error.
    pub fn malformed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether retrying the same request could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network { .. } | Error::Timeout { .. } | Error::RateLimited { .. } => true,
            Error::Status { status, .. } => *status >= 500,
            Error::MalformedResponse { .. }
            | Error::NoDataAvailable(_)
            | Error::MissingCredentials(_)
            | Error::Persistence(_)
            | Error::InvalidConfig(_) => false,
        }
    }

    /// Delay the provider asked for before the next attempt.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias using envwatch-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::network("openweather", "connection refused");
        assert_eq!(
            err.to_string(),
            "Network error from openweather: connection refused"
        );

        let err = Error::Status {
            provider: "firms".to_string(),
            status: 503,
        };
        assert_eq!(err.to_string(), "firms returned HTTP 503");

        let err = Error::timeout("fetch weather", Duration::from_secs(10));
        assert!(err.to_string().contains("fetch weather"));
        assert!(err.to_string().contains("10s"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::network("p", "reset").is_retryable());
        assert!(Error::timeout("op", Duration::from_secs(1)).is_retryable());
        assert!(
            Error::Status {
                provider: "p".into(),
                status: 502
            }
            .is_retryable()
        );
        assert!(
            Error::RateLimited {
                provider: "p".into(),
                retry_after: None
            }
            .is_retryable()
        );
        assert!(
            !Error::Status {
                provider: "p".into(),
                status: 404
            }
            .is_retryable()
        );
        assert!(!Error::malformed("p", "missing indexes").is_retryable());
        assert!(!Error::NoDataAvailable("outside coverage".into()).is_retryable());
        assert!(!Error::MissingCredentials("pollen".into()).is_retryable());
    }

    #[test]
    fn test_retry_after_only_from_rate_limit() {
        let limited = Error::RateLimited {
            provider: "p".into(),
            retry_after: Some(Duration::from_secs(4)),
        };
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(4)));
        assert_eq!(limited.to_string(), "p rate limited the request");
        assert_eq!(Error::network("p", "reset").retry_after(), None);
    }
}
