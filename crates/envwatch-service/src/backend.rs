//! SQLite implementations of the core's storage seams.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use envwatch_core::{
    Clock, LocationDirectory, ObservationCache, ObservationHistory, SessionJanitor,
};
use envwatch_store::{ObservationQuery, Store};
use envwatch_types::{MonitoredLocation, Observation, ProviderKind};

fn persistence(e: envwatch_store::Error) -> envwatch_core::Error {
    envwatch_core::Error::persistence(e.to_string())
}

/// Cache, history, location directory and session sweeper over one
/// SQLite database.
///
/// The store is shared behind an async mutex; each call holds it for a
/// single statement.
#[derive(Clone)]
pub struct SqliteBackend {
    store: Arc<Mutex<Store>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend").finish_non_exhaustive()
    }
}

impl SqliteBackend {
    pub fn new(store: Arc<Mutex<Store>>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<Mutex<Store>> {
        &self.store
    }
}

#[async_trait]
impl ObservationCache for SqliteBackend {
    async fn get(&self, key: &str, now: OffsetDateTime) -> envwatch_core::Result<Option<String>> {
        self.store.lock().await.cache_get(key, now).map_err(persistence)
    }

    async fn put(
        &self,
        key: &str,
        payload: &str,
        expires_at: OffsetDateTime,
    ) -> envwatch_core::Result<()> {
        let now = self.clock.now();
        self.store
            .lock()
            .await
            .cache_put(key, payload, expires_at, now)
            .map_err(persistence)
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> envwatch_core::Result<usize> {
        self.store
            .lock()
            .await
            .purge_expired_cache(now)
            .map_err(persistence)
    }
}

#[async_trait]
impl ObservationHistory for SqliteBackend {
    async fn append(
        &self,
        location_id: &str,
        observation: &Observation,
    ) -> envwatch_core::Result<bool> {
        let now = self.clock.now();
        self.store
            .lock()
            .await
            .insert_observation(location_id, observation, now)
            .map_err(persistence)
    }

    async fn query(
        &self,
        location_id: &str,
        kind: ProviderKind,
        since: OffsetDateTime,
    ) -> envwatch_core::Result<Vec<Observation>> {
        let query = ObservationQuery::new()
            .location(location_id)
            .kind(kind)
            .since(since);
        let records = self
            .store
            .lock()
            .await
            .query_observations(&query)
            .map_err(persistence)?;
        Ok(records
            .into_iter()
            .map(|record| record.into_observation())
            .collect())
    }

    async fn most_recent(
        &self,
        location_id: &str,
        kind: ProviderKind,
    ) -> envwatch_core::Result<Option<Observation>> {
        let record = self
            .store
            .lock()
            .await
            .latest_observation(location_id, kind)
            .map_err(persistence)?;
        Ok(record.map(|r| r.into_observation()))
    }

    async fn prune_older_than(&self, cutoff: OffsetDateTime) -> envwatch_core::Result<usize> {
        self.store
            .lock()
            .await
            .prune_observations(cutoff)
            .map_err(persistence)
    }
}

#[async_trait]
impl LocationDirectory for SqliteBackend {
    async fn list_active_locations(&self) -> envwatch_core::Result<Vec<MonitoredLocation>> {
        self.store
            .lock()
            .await
            .list_active_locations()
            .map_err(persistence)
    }

    async fn find_location(&self, id: &str) -> envwatch_core::Result<Option<MonitoredLocation>> {
        self.store.lock().await.get_location(id).map_err(persistence)
    }
}

#[async_trait]
impl SessionJanitor for SqliteBackend {
    async fn delete_expired_sessions(&self, now: OffsetDateTime) -> envwatch_core::Result<usize> {
        self.store
            .lock()
            .await
            .delete_expired_sessions(now)
            .map_err(persistence)
    }
}

/// The four storage seams the scheduler and monitor need.
#[derive(Clone)]
pub struct Backends {
    pub directory: Arc<dyn LocationDirectory>,
    pub cache: Arc<dyn ObservationCache>,
    pub history: Arc<dyn ObservationHistory>,
    pub sessions: Arc<dyn SessionJanitor>,
}

impl Backends {
    /// Every seam served by the same SQLite backend.
    pub fn sqlite(backend: SqliteBackend) -> Self {
        let backend = Arc::new(backend);
        Self {
            directory: backend.clone(),
            cache: backend.clone(),
            history: backend.clone(),
            sessions: backend,
        }
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envwatch_core::ManualClock;
    use envwatch_core::mock::sample_measurement;
    use envwatch_types::DataSource;
    use time::Duration;
    use time::macros::datetime;

    fn pin(id: &str) -> MonitoredLocation {
        MonitoredLocation {
            id: id.to_string(),
            owner_id: "owner".to_string(),
            name: None,
            latitude: 39.7392,
            longitude: -104.9903,
            active: true,
        }
    }

    fn backend_at(now: OffsetDateTime) -> (SqliteBackend, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        (SqliteBackend::new(store, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_cache_round_trip_and_expiry() {
        let now = datetime!(2026-05-01 10:00 UTC);
        let (backend, _) = backend_at(now);

        backend
            .put("air_quality:1.0000:2.0000", "{\"x\":1}", now + Duration::minutes(30))
            .await
            .unwrap();
        assert!(backend.get("air_quality:1.0000:2.0000", now).await.unwrap().is_some());
        assert!(
            backend
                .get("air_quality:1.0000:2.0000", now + Duration::minutes(30))
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(
            backend.purge_expired(now + Duration::hours(1)).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_history_through_backend() {
        let now = datetime!(2026-05-01 10:00 UTC);
        let (backend, _) = backend_at(now);
        let location = pin("denver");
        backend.store().lock().await.upsert_location(&location).unwrap();

        for hours in [3, 1, 2] {
            let obs = Observation::new(
                location.location_ref(),
                now - Duration::hours(hours),
                DataSource::Live,
                sample_measurement(ProviderKind::Weather),
            );
            assert!(backend.append("denver", &obs).await.unwrap());
        }

        let records = backend
            .query("denver", ProviderKind::Weather, now - Duration::minutes(150))
            .await
            .unwrap();
        let times: Vec<_> = records.iter().map(|o| o.timestamp).collect();
        assert_eq!(times, vec![now - Duration::hours(1), now - Duration::hours(2)]);

        let latest = backend
            .most_recent("denver", ProviderKind::Weather)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.timestamp, now - Duration::hours(1));

        assert_eq!(
            backend
                .prune_older_than(now - Duration::minutes(150))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_append_for_removed_location_is_persistence_error() {
        let now = datetime!(2026-05-01 10:00 UTC);
        let (backend, _) = backend_at(now);
        let obs = Observation::new(
            pin("gone").location_ref(),
            now,
            DataSource::Live,
            sample_measurement(ProviderKind::Pollen),
        );

        let err = backend.append("gone", &obs).await.unwrap_err();
        assert!(matches!(err, envwatch_core::Error::Persistence(_)));
        assert!(backend.find_location("gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_directory_and_sessions() {
        let now = datetime!(2026-05-01 10:00 UTC);
        let (backend, _) = backend_at(now);
        {
            let store = backend.store().lock().await;
            store.upsert_location(&pin("a")).unwrap();
            let mut paused = pin("b");
            paused.active = false;
            store.upsert_location(&paused).unwrap();
            store
                .insert_session("t1", "owner", now - Duration::minutes(1))
                .unwrap();
        }

        let active = backend.list_active_locations().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "a");
        assert!(backend.find_location("b").await.unwrap().is_some());
        assert_eq!(backend.delete_expired_sessions(now).await.unwrap(), 1);
    }
}
