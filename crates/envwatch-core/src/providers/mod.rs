//! External data sources, one per [`ProviderKind`].
//!
//! A [`Provider`] knows how to fetch one kind of data for a point and
//! transform the upstream payload into a canonical [`Measurement`]. It
//! knows nothing about caching or fallback; that is the job of
//! [`Adapter`](crate::adapter::Adapter).

use std::time::Duration;

use async_trait::async_trait;

use envwatch_types::{Coordinates, DataSource, Measurement, ProviderKind};

use crate::error::{Error, Result};

pub mod air_quality;
pub mod pollen;
pub mod radon;
pub mod weather;
pub mod wildfire;

pub use air_quality::AirQualityProvider;
pub use pollen::PollenProvider;
pub use radon::RadonProvider;
pub use weather::WeatherProvider;
pub use wildfire::WildfireProvider;

/// A single upstream data source.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Kind of data this provider returns.
    fn kind(&self) -> ProviderKind;

    /// Short name for logs and error context.
    fn name(&self) -> &str;

    /// How long a fetched result stays fresh in the cache.
    fn ttl(&self) -> Duration;

    /// Query parameters that change the result and so belong in the cache key.
    fn cache_params(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// Source label for successful fetches.
    fn live_source(&self) -> DataSource {
        DataSource::Live
    }

    /// Fetch and transform current data for a point.
    async fn fetch(&self, at: Coordinates) -> Result<Measurement>;
}

/// Settings shared by every HTTP-backed provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    /// Base URL of the upstream API, without a trailing slash.
    pub base_url: String,
    /// API key, if the upstream requires one.
    pub api_key: Option<String>,
    /// Cache TTL.
    pub ttl: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ProviderSettings {
    pub fn new(base_url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            ttl,
            timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The API key, or [`Error::MissingCredentials`].
    pub fn require_key(&self, provider: &str) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::MissingCredentials(provider.to_string()))
    }

    /// Join a path onto the base URL.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_url_join() {
        let settings = ProviderSettings::new("https://api.example.test/", Duration::from_secs(60));
        assert_eq!(
            settings.url("/v1/lookup"),
            "https://api.example.test/v1/lookup"
        );
        assert_eq!(settings.url("v1/lookup"), "https://api.example.test/v1/lookup");
    }

    #[test]
    fn test_require_key() {
        let settings = ProviderSettings::new("https://x", Duration::from_secs(1));
        assert!(matches!(
            settings.require_key("pollen"),
            Err(Error::MissingCredentials(_))
        ));
        assert!(settings.clone().api_key("").require_key("pollen").is_err());
        assert_eq!(settings.api_key("k").require_key("pollen").unwrap(), "k");
    }
}
