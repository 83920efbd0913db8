//! The fallback chain around a provider.
//!
//! [`Adapter::fetch_current`] always produces an [`Observation`]:
//!
//! 1. An unexpired cache entry for the point and parameters is returned as
//!    [`DataSource::Cached`].
//! 2. Otherwise the provider is called, with retries, inside a single
//!    overall timeout. Concurrent misses for the same key share one call.
//!    A success is cached for the provider's TTL.
//! 3. On failure, the latest history record for the location is returned
//!    as [`DataSource::HistoricalFallback`], regardless of its age.
//! 4. With no history, the result is an explicit unavailable observation
//!    carrying the error.
//!
//! Cache and history failures are logged and never fail the lookup.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use envwatch_types::{Coordinates, DataSource, LocationRef, Observation, ProviderKind};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::geo::cache_key;
use crate::providers::Provider;
use crate::retry::{RetryConfig, with_retry};
use crate::singleflight::SingleFlight;
use crate::traits::{ObservationCache, ObservationHistory};

/// Default overall time budget for one live lookup, retries included.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Standard cache TTL for a provider kind.
#[must_use]
pub fn default_ttl(kind: ProviderKind) -> Duration {
    const MINUTE: u64 = 60;
    Duration::from_secs(match kind {
        ProviderKind::AirQuality => 30 * MINUTE,
        ProviderKind::Weather => 60 * MINUTE,
        ProviderKind::Pollen => 120 * MINUTE,
        ProviderKind::Wildfire => 60 * MINUTE,
        ProviderKind::Radon => 7 * 24 * 60 * MINUTE,
    })
}

/// One provider wrapped in cache, retry, timeout and history fallback.
pub struct Adapter {
    provider: Arc<dyn Provider>,
    cache: Arc<dyn ObservationCache>,
    history: Arc<dyn ObservationHistory>,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
    timeout: Duration,
    inflight: SingleFlight<Result<Observation>>,
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("kind", &self.provider.kind())
            .field("provider", &self.provider.name())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Adapter {
    pub fn new(
        provider: Arc<dyn Provider>,
        cache: Arc<dyn ObservationCache>,
        history: Arc<dyn ObservationHistory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            cache,
            history,
            clock,
            retry: RetryConfig::for_provider(),
            timeout: DEFAULT_FETCH_TIMEOUT,
            inflight: SingleFlight::new(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Overall budget for a live lookup, including every retry.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    /// Overall budget for one live lookup.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    /// Cache key for a point, including the provider's parameters.
    pub fn cache_key(&self, at: Coordinates) -> String {
        cache_key(self.kind(), at, &self.provider.cache_params())
    }

    /// Current observation for a location. Never fails.
    pub async fn fetch_current(&self, location: &LocationRef) -> Observation {
        let kind = self.kind();
        let key = self.cache_key(location.coordinates);

        if let Some(mut cached) = self.cached(&key).await {
            debug!("Cache hit for {}", key);
            cached.location = location.clone();
            cached.source = DataSource::Cached;
            return cached;
        }

        let outcome = self
            .inflight
            .run(&key, || self.fetch_live(&key, location.coordinates))
            .await;
        let error = match outcome {
            Ok(mut observation) => {
                observation.location = location.clone();
                return observation;
            }
            Err(e) => e,
        };

        if matches!(error, Error::NoDataAvailable(_)) {
            debug!("{} has no data for {}: {}", kind, key, error);
        } else {
            warn!("{} lookup failed for {}: {}", kind, key, error);
        }
        if let Some(previous) = self.previous(location).await {
            return previous;
        }

        Observation::unavailable(kind, location.clone(), self.clock.now(), error.to_string())
    }

    async fn cached(&self, key: &str) -> Option<Observation> {
        let payload = match self.cache.get(key, self.clock.now()).await {
            Ok(payload) => payload?,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };
        match serde_json::from_str::<Observation>(&payload) {
            Ok(observation) if observation.kind == self.kind() => Some(observation),
            Ok(observation) => {
                warn!(
                    "Cache entry {} holds {} data, expected {}",
                    key,
                    observation.kind,
                    self.kind()
                );
                None
            }
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    async fn fetch_live(&self, key: &str, at: Coordinates) -> Result<Observation> {
        let provider = self.provider.as_ref();
        let operation = format!("{} lookup", provider.name());

        let measurement = tokio::time::timeout(
            self.timeout,
            with_retry(&self.retry, &operation, || provider.fetch(at)),
        )
        .await
        .map_err(|_| Error::timeout(operation.as_str(), self.timeout))??;

        let now = self.clock.now();
        let observation = Observation::new(
            LocationRef::point(at),
            now,
            provider.live_source(),
            measurement,
        );

        match serde_json::to_string(&observation) {
            Ok(payload) => {
                let expires_at = now + provider.ttl();
                if let Err(e) = self.cache.put(key, &payload, expires_at).await {
                    warn!("Cache write failed for {}: {}", key, e);
                }
            }
            Err(e) => warn!("Could not encode observation for {}: {}", key, e),
        }
        Ok(observation)
    }

    async fn previous(&self, location: &LocationRef) -> Option<Observation> {
        let id = location.location_id.as_deref()?;
        match self.history.most_recent(id, self.kind()).await {
            Ok(Some(mut previous)) => {
                debug!(
                    "Serving {} history from {} for {}",
                    self.kind(),
                    previous.timestamp,
                    id
                );
                previous.source = DataSource::HistoricalFallback;
                Some(previous)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("History read failed for {}: {}", id, e);
                None
            }
        }
    }
}

/// One adapter per provider kind.
#[derive(Debug, Clone, Default)]
pub struct AdapterSet {
    adapters: BTreeMap<ProviderKind, Arc<Adapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an adapter, replacing any previous one of the same kind.
    pub fn insert(&mut self, adapter: Adapter) -> Option<Arc<Adapter>> {
        self.adapters.insert(adapter.kind(), Arc::new(adapter))
    }

    #[must_use]
    pub fn with(mut self, adapter: Adapter) -> Self {
        self.insert(adapter);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&Arc<Adapter>> {
        self.adapters.get(&kind)
    }

    /// Configured kinds in collection order.
    pub fn kinds(&self) -> impl Iterator<Item = ProviderKind> + '_ {
        self.adapters.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Adapter>> {
        self.adapters.values()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
