//! In-process implementations of the storage seams.
//!
//! Used by tests and by embedders that do not need persistence across
//! restarts. Semantics match the SQLite store: expired cache entries are
//! misses, history appends are deduplicated on (location, kind, millisecond).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use envwatch_types::{MonitoredLocation, Observation, ProviderKind};

use crate::error::Result;
use crate::traits::{LocationDirectory, ObservationCache, ObservationHistory, SessionJanitor};

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: String,
    expires_at: OffsetDateTime,
}

/// Thread-safe in-memory cache.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    inner: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl ObservationCache for MemoryCache {
    async fn get(&self, key: &str, now: OffsetDateTime) -> Result<Option<String>> {
        let map = self.inner.read().await;
        Ok(map
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.payload.clone()))
    }

    async fn put(&self, key: &str, payload: &str, expires_at: OffsetDateTime) -> Result<()> {
        let mut map = self.inner.write().await;
        map.insert(
            key.to_string(),
            CacheEntry {
                payload: payload.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> Result<usize> {
        let mut map = self.inner.write().await;
        let before = map.len();
        map.retain(|_, entry| entry.expires_at > now);
        Ok(before - map.len())
    }
}

type SeriesKey = (String, ProviderKind);

/// Thread-safe in-memory history.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    // Each series is kept sorted oldest first.
    inner: Arc<RwLock<HashMap<SeriesKey, Vec<Observation>>>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all series.
    pub async fn len(&self) -> usize {
        self.inner.read().await.values().map(Vec::len).sum()
    }

    /// Drop every record for a location, mirroring a cascade delete.
    pub async fn remove_location(&self, location_id: &str) {
        self.inner
            .write()
            .await
            .retain(|(id, _), _| id != location_id);
    }
}

#[async_trait]
impl ObservationHistory for MemoryHistory {
    async fn append(&self, location_id: &str, observation: &Observation) -> Result<bool> {
        let mut map = self.inner.write().await;
        let series = map
            .entry((location_id.to_string(), observation.kind))
            .or_default();

        let millis = |at: OffsetDateTime| at.unix_timestamp_nanos().div_euclid(1_000_000);
        let key = millis(observation.timestamp);
        if series.iter().any(|o| millis(o.timestamp) == key) {
            return Ok(false);
        }

        let pos = series.partition_point(|o| o.timestamp <= observation.timestamp);
        series.insert(pos, observation.clone());
        Ok(true)
    }

    async fn query(
        &self,
        location_id: &str,
        kind: ProviderKind,
        since: OffsetDateTime,
    ) -> Result<Vec<Observation>> {
        let map = self.inner.read().await;
        let Some(series) = map.get(&(location_id.to_string(), kind)) else {
            return Ok(Vec::new());
        };
        Ok(series
            .iter()
            .rev()
            .filter(|o| o.timestamp >= since)
            .cloned()
            .collect())
    }

    async fn most_recent(
        &self,
        location_id: &str,
        kind: ProviderKind,
    ) -> Result<Option<Observation>> {
        let map = self.inner.read().await;
        Ok(map
            .get(&(location_id.to_string(), kind))
            .and_then(|series| series.last().cloned()))
    }

    async fn prune_older_than(&self, cutoff: OffsetDateTime) -> Result<usize> {
        let mut map = self.inner.write().await;
        let mut removed = 0;
        for series in map.values_mut() {
            let before = series.len();
            series.retain(|o| o.timestamp >= cutoff);
            removed += before - series.len();
        }
        map.retain(|_, series| !series.is_empty());
        Ok(removed)
    }
}

/// Fixed set of monitored locations.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    locations: Arc<RwLock<Vec<MonitoredLocation>>>,
}

impl StaticDirectory {
    pub fn new(locations: Vec<MonitoredLocation>) -> Self {
        Self {
            locations: Arc::new(RwLock::new(locations)),
        }
    }

    /// Remove a location, as the pin collaborator would.
    pub async fn remove(&self, id: &str) {
        self.locations.write().await.retain(|l| l.id != id);
    }
}

#[async_trait]
impl LocationDirectory for StaticDirectory {
    async fn list_active_locations(&self) -> Result<Vec<MonitoredLocation>> {
        Ok(self
            .locations
            .read()
            .await
            .iter()
            .filter(|l| l.active)
            .cloned()
            .collect())
    }

    async fn find_location(&self, id: &str) -> Result<Option<MonitoredLocation>> {
        Ok(self
            .locations
            .read()
            .await
            .iter()
            .find(|l| l.id == id)
            .cloned())
    }
}

/// Session janitor that tracks expiry times in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySessions {
    sessions: Arc<RwLock<HashMap<String, OffsetDateTime>>>,
}

impl MemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, token: &str, expires_at: OffsetDateTime) {
        self.sessions
            .write()
            .await
            .insert(token.to_string(), expires_at);
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionJanitor for MemorySessions {
    async fn delete_expired_sessions(&self, now: OffsetDateTime) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, expires_at| *expires_at > now);
        Ok(before - sessions.len())
    }
}
