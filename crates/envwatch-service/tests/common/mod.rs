//! Shared fixtures: in-memory backends, mock providers and a frozen clock.

#![allow(dead_code)]

use std::sync::Arc;

use time::OffsetDateTime;
use time::macros::datetime;

use envwatch_core::{
    Adapter, AdapterSet, ManualClock, MemoryCache, MemoryHistory, MemorySessions, MockProvider,
    RetryConfig, StaticDirectory,
};
use envwatch_service::{Backends, Scheduler, SchedulerSettings};
use envwatch_types::{Coordinates, MonitoredLocation, ProviderKind};

pub const START: OffsetDateTime = datetime!(2026-06-01 12:00 UTC);

pub fn pin(id: &str, latitude: f64, longitude: f64) -> MonitoredLocation {
    MonitoredLocation {
        id: id.to_string(),
        owner_id: "owner-1".to_string(),
        name: Some(id.to_string()),
        latitude,
        longitude,
        active: true,
    }
}

/// Three pins far enough apart not to share cache keys.
pub fn three_pins() -> Vec<MonitoredLocation> {
    vec![
        pin("boulder", 40.015, -105.2705),
        pin("denver", 39.7392, -104.9903),
        pin("golden", 39.7555, -105.2211),
    ]
}

pub fn coords(location: &MonitoredLocation) -> Coordinates {
    location.coordinates()
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub cache: MemoryCache,
    pub history: MemoryHistory,
    pub sessions: MemorySessions,
    pub directory: StaticDirectory,
    pub providers: Vec<Arc<MockProvider>>,
    pub adapters: AdapterSet,
    pub backends: Backends,
}

impl Harness {
    pub fn new(locations: Vec<MonitoredLocation>, kinds: &[ProviderKind]) -> Self {
        let clock = Arc::new(ManualClock::new(START));
        let cache = MemoryCache::new();
        let history = MemoryHistory::new();
        let sessions = MemorySessions::new();
        let directory = StaticDirectory::new(locations);

        let backends = Backends {
            directory: Arc::new(directory.clone()),
            cache: Arc::new(cache.clone()),
            history: Arc::new(history.clone()),
            sessions: Arc::new(sessions.clone()),
        };

        let mut adapters = AdapterSet::new();
        let mut providers = Vec::new();
        for kind in kinds {
            let provider = Arc::new(MockProvider::new(*kind));
            adapters.insert(
                Adapter::new(
                    provider.clone(),
                    backends.cache.clone(),
                    backends.history.clone(),
                    clock.clone(),
                )
                .with_retry(RetryConfig::none()),
            );
            providers.push(provider);
        }

        Self {
            clock,
            cache,
            history,
            sessions,
            directory,
            providers,
            adapters,
            backends,
        }
    }

    pub fn provider(&self, kind: ProviderKind) -> &Arc<MockProvider> {
        self.providers
            .iter()
            .find(|p| envwatch_core::Provider::kind(p.as_ref()) == kind)
            .expect("provider configured")
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        self.scheduler_with(SchedulerSettings::default())
    }

    pub fn scheduler_with(&self, settings: SchedulerSettings) -> Arc<Scheduler> {
        Arc::new(Scheduler::new(
            self.adapters.clone(),
            self.backends.clone(),
            self.clock.clone(),
            settings,
        ))
    }
}
