//! Retry policy for provider requests.
//!
//! Upstream environmental APIs fail transiently: connection resets, 5xx
//! responses and rate limiting. [`with_retry`] re-issues a request while the
//! error is [retryable](crate::Error::is_retryable), waiting between attempts
//! according to a [`Backoff`] schedule. A provider's `Retry-After` replaces
//! the computed delay, clamped to [`RetryConfig::max_delay`] so one slow
//! upstream cannot stall the lookup.
//!
//! Adapters run [`with_retry`] inside their overall fetch timeout, so the
//! whole retry sequence is still bounded by that budget.
//!
//! # Example
//!
//! ```
//! use envwatch_core::{Error, RetryConfig, with_retry};
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::for_provider();
//!
//! let value = with_retry(&config, "fetch_weather", || async {
//!     Ok::<_, Error>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// How many times and how patiently to retry.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 means a single attempt).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single wait, including a provider's `Retry-After`.
    pub max_delay: Duration,
    /// Growth factor applied per retry.
    pub backoff_multiplier: f64,
    /// Shave a random 0-25% off each computed delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// A single attempt.
    pub fn none() -> Self {
        Self::new(0)
    }

    /// Two quick retries, capped at two seconds each.
    ///
    /// Lookups sit on a user-facing path, so a slow upstream should fall
    /// through to history rather than be waited on.
    pub fn for_provider() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Start a fresh schedule for one operation.
    pub fn backoff(&self) -> Backoff<'_> {
        Backoff {
            config: self,
            retries: 0,
        }
    }
}

/// Delay schedule for one retried operation.
#[derive(Debug)]
pub struct Backoff<'a> {
    config: &'a RetryConfig,
    retries: u32,
}

impl Backoff<'_> {
    /// Retries already granted.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// How long to wait before retrying after `error`, or `None` when the
    /// error is final or the retry allowance is spent.
    pub fn next_delay(&mut self, error: &Error) -> Option<Duration> {
        if !error.is_retryable() || self.retries >= self.config.max_retries {
            return None;
        }
        let delay = match error.retry_after() {
            Some(requested) => requested.min(self.config.max_delay),
            None => self.computed_delay(),
        };
        self.retries += 1;
        Some(delay)
    }

    fn computed_delay(&self) -> Duration {
        let config = self.config;
        let exponent = i32::try_from(self.retries).unwrap_or(i32::MAX);
        let secs = (config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent))
            .min(config.max_delay.as_secs_f64());

        let secs = if config.jitter {
            secs * (1.0 - rand::rng().random::<f64>() * 0.25)
        } else {
            secs
        };
        Duration::from_secs_f64(secs)
    }
}

/// Run `operation` until it succeeds, fails with a final error, or the
/// configured retries are used up; the last error is returned in the
/// latter two cases.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = config.backoff();
    loop {
        let error = match operation().await {
            Ok(value) => {
                if backoff.retries() > 0 {
                    debug!("{} succeeded after {} retries", operation_name, backoff.retries());
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        let Some(delay) = backoff.next_delay(&error) else {
            return Err(error);
        };
        warn!(
            "{} failed (attempt {}/{}): {}, retrying in {:?}",
            operation_name,
            backoff.retries(),
            config.max_retries + 1,
            error,
            delay
        );
        sleep(delay).await;
    }
}
