//! Main store implementation.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use time::OffsetDateTime;
use tracing::{debug, info};

use envwatch_types::{DataSource, MonitoredLocation, Observation, ProviderKind};

use crate::error::{Error, Result};
use crate::models::{StoreStats, StoredCacheEntry, StoredObservation};
use crate::queries::ObservationQuery;
use crate::schema;

/// SQLite-based store for the observation cache and history.
pub struct Store {
    conn: Connection,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.conn.path())
            .finish()
    }
}

/// Unix milliseconds, rounded down. Every stored instant uses this resolution.
pub(crate) fn to_millis(at: OffsetDateTime) -> i64 {
    at.unix_timestamp_nanos().div_euclid(1_000_000) as i64
}

fn from_millis(ms: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .map_err(|_| Error::InvalidTimestamp(ms))
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        // Cascade deletes depend on this in every connection
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Row counts per table.
    pub fn stats(&self) -> Result<StoreStats> {
        let count = |sql: &str| -> Result<u64> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as u64)
        };
        Ok(StoreStats {
            locations: count("SELECT COUNT(*) FROM monitored_locations")?,
            active_locations: count("SELECT COUNT(*) FROM monitored_locations WHERE active = 1")?,
            cache_entries: count("SELECT COUNT(*) FROM cache_entries")?,
            observations: count("SELECT COUNT(*) FROM observations")?,
            sessions: count("SELECT COUNT(*) FROM sessions")?,
        })
    }
}

// Location operations
impl Store {
    /// Insert or update a monitored location.
    pub fn upsert_location(&self, location: &MonitoredLocation) -> Result<()> {
        self.conn.execute(
            "INSERT INTO monitored_locations
                (id, owner_id, name, latitude, longitude, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                owner_id = ?2,
                name = ?3,
                latitude = ?4,
                longitude = ?5,
                active = ?6",
            rusqlite::params![
                location.id,
                location.owner_id,
                location.name,
                location.latitude,
                location.longitude,
                location.active,
                to_millis(OffsetDateTime::now_utc()),
            ],
        )?;
        Ok(())
    }

    /// Get a location by ID, active or not.
    pub fn get_location(&self, id: &str) -> Result<Option<MonitoredLocation>> {
        let location = self
            .conn
            .query_row(
                "SELECT id, owner_id, name, latitude, longitude, active
                 FROM monitored_locations WHERE id = ?",
                [id],
                location_from_row,
            )
            .optional()?;
        Ok(location)
    }

    /// All locations with `active = 1`, oldest first.
    pub fn list_active_locations(&self) -> Result<Vec<MonitoredLocation>> {
        self.list_locations_where("WHERE active = 1")
    }

    /// Every location, oldest first.
    pub fn list_locations(&self) -> Result<Vec<MonitoredLocation>> {
        self.list_locations_where("")
    }

    fn list_locations_where(&self, filter: &str) -> Result<Vec<MonitoredLocation>> {
        let sql = format!(
            "SELECT id, owner_id, name, latitude, longitude, active
             FROM monitored_locations {} ORDER BY created_at, id",
            filter
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let locations = stmt
            .query_map([], location_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(locations)
    }

    /// Pause or resume collection for a location.
    pub fn set_location_active(&self, id: &str, active: bool) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE monitored_locations SET active = ?2 WHERE id = ?1",
            rusqlite::params![id, active],
        )?;
        if changed == 0 {
            return Err(Error::LocationNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Delete a location and, through the cascade, its history.
    ///
    /// Returns `false` if the location did not exist.
    pub fn remove_location(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM monitored_locations WHERE id = ?", [id])?;
        if removed > 0 {
            info!("Removed location {} and its history", id);
        }
        Ok(removed > 0)
    }
}

fn location_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MonitoredLocation> {
    Ok(MonitoredLocation {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        active: row.get(5)?,
    })
}

// Cache operations
impl Store {
    /// Payload for `key` unless absent or expired as of `now`.
    pub fn cache_get(&self, key: &str, now: OffsetDateTime) -> Result<Option<String>> {
        let payload = self
            .conn
            .query_row(
                "SELECT payload FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
                rusqlite::params![key, to_millis(now)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    /// Replace any entry for `key`.
    pub fn cache_put(
        &self,
        key: &str,
        payload: &str,
        expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<()> {
        let kind = key.split(':').next().unwrap_or(key);
        self.conn.execute(
            "INSERT OR REPLACE INTO cache_entries (key, kind, payload, stored_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![key, kind, payload, to_millis(now), to_millis(expires_at)],
        )?;
        Ok(())
    }

    /// Full entry for `key`, expired or not.
    pub fn cache_entry(&self, key: &str) -> Result<Option<StoredCacheEntry>> {
        let row = self
            .conn
            .query_row(
                "SELECT key, kind, payload, stored_at, expires_at FROM cache_entries WHERE key = ?",
                [key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(key, kind, payload, stored_at, expires_at)| {
            Ok(StoredCacheEntry {
                key,
                kind,
                payload,
                stored_at: from_millis(stored_at)?,
                expires_at: from_millis(expires_at)?,
            })
        })
        .transpose()
    }

    /// Delete entries expired as of `now`.
    pub fn purge_expired_cache(&self, now: OffsetDateTime) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM cache_entries WHERE expires_at <= ?",
            [to_millis(now)],
        )?;
        debug!("Purged {} expired cache entries", removed);
        Ok(removed)
    }
}

// History operations
impl Store {
    /// Record an observation for a location.
    ///
    /// Returns `false` if a record with the same location, kind and second
    /// already exists. Fails with [`Error::LocationNotFound`] if the
    /// location has been removed.
    pub fn insert_observation(
        &self,
        location_id: &str,
        observation: &Observation,
        recorded_at: OffsetDateTime,
    ) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM monitored_locations WHERE id = ?",
            [location_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(Error::LocationNotFound(location_id.to_string()));
        }

        let payload = serde_json::to_string(observation)?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO observations
                (location_id, kind, observed_at, recorded_at, source, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                location_id,
                observation.kind.as_str(),
                to_millis(observation.timestamp),
                to_millis(recorded_at),
                observation.source.as_str(),
                payload,
            ],
        )?;

        if inserted == 0 {
            debug!(
                "Skipped duplicate {} observation for {} at {}",
                observation.kind, location_id, observation.timestamp
            );
        }
        Ok(inserted > 0)
    }

    /// Query stored observations with filters.
    pub fn query_observations(&self, query: &ObservationQuery) -> Result<Vec<StoredObservation>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(id, location_id, kind, observed_at, recorded_at, source, payload)| {
                    Ok(StoredObservation {
                        id,
                        location_id,
                        kind: kind.parse::<ProviderKind>().map_err(|e| Error::Corrupt {
                            table: "observations",
                            message: e.to_string(),
                        })?,
                        observed_at: from_millis(observed_at)?,
                        recorded_at: from_millis(recorded_at)?,
                        source: source.parse::<DataSource>().map_err(|e| Error::Corrupt {
                            table: "observations",
                            message: e.to_string(),
                        })?,
                        observation: serde_json::from_str(&payload)?,
                    })
                },
            )
            .collect()
    }

    /// Latest observation for a location and kind, regardless of age.
    pub fn latest_observation(
        &self,
        location_id: &str,
        kind: ProviderKind,
    ) -> Result<Option<StoredObservation>> {
        let query = ObservationQuery::new()
            .location(location_id)
            .kind(kind)
            .limit(1);
        Ok(self.query_observations(&query)?.pop())
    }

    /// Delete observations older than `cutoff`.
    pub fn prune_observations(&self, cutoff: OffsetDateTime) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM observations WHERE observed_at < ?",
            [to_millis(cutoff)],
        )?;
        info!("Pruned {} observations older than {}", removed, cutoff);
        Ok(removed)
    }

    /// Count observations, optionally for one location.
    pub fn count_observations(&self, location_id: Option<&str>) -> Result<u64> {
        let count: i64 = match location_id {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM observations WHERE location_id = ?",
                [id],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }
}

// Session operations
impl Store {
    /// Record a session. Sessions are issued elsewhere; this exists so a
    /// standalone database can be populated.
    pub fn insert_session(&self, token: &str, user_id: &str, expires_at: OffsetDateTime) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![token, user_id, to_millis(expires_at)],
        )?;
        Ok(())
    }

    /// Delete sessions expired as of `now`.
    pub fn delete_expired_sessions(&self, now: OffsetDateTime) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM sessions WHERE expires_at <= ?", [to_millis(now)])?;
        debug!("Deleted {} expired sessions", removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envwatch_types::{
        AirQuality, AqiCategory, Coordinates, LocationRef, Measurement, Pollutants,
    };
    use time::Duration;
    use time::macros::datetime;

    fn pin(id: &str) -> MonitoredLocation {
        MonitoredLocation {
            id: id.to_string(),
            owner_id: "user-1".to_string(),
            name: Some(format!("Pin {id}")),
            latitude: 40.7128,
            longitude: -74.006,
            active: true,
        }
    }

    fn observation(location: &MonitoredLocation, at: OffsetDateTime, index: u16) -> Observation {
        Observation::new(
            location.location_ref(),
            at,
            DataSource::Live,
            Measurement::AirQuality(AirQuality {
                index,
                index_code: "uaqi".to_string(),
                category: AqiCategory::Good,
                color: AqiCategory::Good.color().to_string(),
                dominant_pollutant: None,
                pollutants: Pollutants::default(),
                forecast: Vec::new(),
            }),
        )
    }

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.stats().unwrap(), StoreStats::default());
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("envwatch.db");
        let store = Store::open(&path).unwrap();
        store.upsert_location(&pin("a")).unwrap();
        drop(store);

        let reopened = Store::open(&path).unwrap();
        assert!(reopened.get_location("a").unwrap().is_some());
    }

    #[test]
    fn test_upsert_location() {
        let store = Store::open_in_memory().unwrap();
        let mut location = pin("a");
        store.upsert_location(&location).unwrap();

        location.name = Some("Renamed".to_string());
        location.active = false;
        store.upsert_location(&location).unwrap();

        let stored = store.get_location("a").unwrap().unwrap();
        assert_eq!(stored, location);
        assert!(store.list_active_locations().unwrap().is_empty());
        assert_eq!(store.list_locations().unwrap().len(), 1);
    }

    #[test]
    fn test_set_location_active_unknown() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            store.set_location_active("ghost", true),
            Err(Error::LocationNotFound(_))
        ));
    }

    #[test]
    fn test_cache_get_respects_expiry() {
        let store = Store::open_in_memory().unwrap();
        let now = datetime!(2026-03-01 12:00 UTC);
        store
            .cache_put("weather:1.0000:2.0000", "{}", now + Duration::minutes(60), now)
            .unwrap();

        assert_eq!(
            store
                .cache_get("weather:1.0000:2.0000", now + Duration::minutes(59))
                .unwrap()
                .as_deref(),
            Some("{}")
        );
        assert_eq!(
            store
                .cache_get("weather:1.0000:2.0000", now + Duration::minutes(60))
                .unwrap(),
            None
        );
        assert_eq!(store.cache_get("missing", now).unwrap(), None);
    }

    #[test]
    fn test_cache_put_is_an_upsert() {
        let store = Store::open_in_memory().unwrap();
        let now = datetime!(2026-03-01 12:00 UTC);
        store
            .cache_put("pollen:1:2", "first", now + Duration::hours(2), now)
            .unwrap();
        store
            .cache_put("pollen:1:2", "second", now + Duration::hours(1), now)
            .unwrap();

        let entry = store.cache_entry("pollen:1:2").unwrap().unwrap();
        assert_eq!(entry.payload, "second");
        assert_eq!(entry.kind, "pollen");
        assert_eq!(entry.expires_at, now + Duration::hours(1));
        assert_eq!(store.stats().unwrap().cache_entries, 1);
    }

    #[test]
    fn test_purge_expired_cache() {
        let store = Store::open_in_memory().unwrap();
        let now = datetime!(2026-03-01 12:00 UTC);
        store
            .cache_put("a", "1", now - Duration::seconds(1), now)
            .unwrap();
        store.cache_put("b", "2", now, now).unwrap();
        store
            .cache_put("c", "3", now + Duration::days(7), now)
            .unwrap();

        assert_eq!(store.purge_expired_cache(now).unwrap(), 2);
        assert!(store.cache_entry("c").unwrap().is_some());
    }

    #[test]
    fn test_observation_round_trip_and_order() {
        let store = Store::open_in_memory().unwrap();
        let location = pin("a");
        store.upsert_location(&location).unwrap();
        let t0 = datetime!(2026-03-01 00:00 UTC);

        for (hours, index) in [(2, 30), (0, 10), (1, 20)] {
            let inserted = store
                .insert_observation(&location.id, &observation(&location, t0 + Duration::hours(hours), index), t0)
                .unwrap();
            assert!(inserted);
        }

        let records = store
            .query_observations(&ObservationQuery::new().location("a"))
            .unwrap();
        let indexes: Vec<_> = records
            .iter()
            .map(|r| r.observation.air_quality().unwrap().index)
            .collect();
        assert_eq!(indexes, vec![30, 20, 10]);
        assert_eq!(records[0].kind, ProviderKind::AirQuality);
        assert_eq!(records[0].source, DataSource::Live);
        assert_eq!(
            records[0].to_observation().location.coordinates,
            Coordinates::new(40.7128, -74.006).unwrap()
        );

        let latest = store
            .latest_observation("a", ProviderKind::AirQuality)
            .unwrap()
            .unwrap();
        assert_eq!(latest.observed_at, t0 + Duration::hours(2));
        assert!(
            store
                .latest_observation("a", ProviderKind::Weather)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_duplicate_observation_is_ignored() {
        let store = Store::open_in_memory().unwrap();
        let location = pin("a");
        store.upsert_location(&location).unwrap();
        let at = datetime!(2026-03-01 08:00:00.250 UTC);

        assert!(store.insert_observation("a", &observation(&location, at, 10), at).unwrap());
        // Same instant, different payload
        let again = observation(&location, at, 99);
        assert!(!store.insert_observation("a", &again, at).unwrap());
        assert_eq!(store.count_observations(Some("a")).unwrap(), 1);
    }

    #[test]
    fn test_sub_second_observations_are_distinct() {
        let store = Store::open_in_memory().unwrap();
        let location = pin("a");
        store.upsert_location(&location).unwrap();
        let at = datetime!(2026-03-01 08:00:00.250 UTC);
        let later = at + Duration::milliseconds(500);

        assert!(store.insert_observation("a", &observation(&location, at, 10), at).unwrap());
        assert!(store.insert_observation("a", &observation(&location, later, 11), later).unwrap());

        let latest = store.latest_observation("a", ProviderKind::AirQuality).unwrap().unwrap();
        assert_eq!(latest.observed_at, later);
        assert_eq!(latest.recorded_at, later);

        let window = store
            .query_observations(&ObservationQuery::new().location("a").since(later))
            .unwrap();
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_prune_honours_sub_second_cutoff() {
        let store = Store::open_in_memory().unwrap();
        let location = pin("a");
        store.upsert_location(&location).unwrap();
        let at = datetime!(2026-03-01 00:00:00.300 UTC);
        store.insert_observation("a", &observation(&location, at, 1), at).unwrap();

        // A cutoff earlier in the same second keeps the record
        assert_eq!(store.prune_observations(datetime!(2026-03-01 00:00:00.100 UTC)).unwrap(), 0);
        assert_eq!(store.prune_observations(datetime!(2026-03-01 00:00:00.700 UTC)).unwrap(), 1);
        assert_eq!(store.count_observations(None).unwrap(), 0);
    }

    #[test]
    fn test_session_expiry_uses_milliseconds() {
        let store = Store::open_in_memory().unwrap();
        let now = datetime!(2026-03-01 00:00:00.200 UTC);
        store
            .insert_session("soon", "u1", datetime!(2026-03-01 00:00:00.500 UTC))
            .unwrap();

        assert_eq!(store.delete_expired_sessions(now).unwrap(), 0);
        assert_eq!(
            store.delete_expired_sessions(datetime!(2026-03-01 00:00:00.500 UTC)).unwrap(),
            1
        );
    }

    #[test]
    fn test_observation_for_missing_location_fails() {
        let store = Store::open_in_memory().unwrap();
        let ghost = pin("ghost");
        let err = store
            .insert_observation("ghost", &observation(&ghost, datetime!(2026-03-01 00:00 UTC), 1), datetime!(2026-03-01 00:00 UTC))
            .unwrap_err();
        assert!(matches!(err, Error::LocationNotFound(_)));
        assert!(store.get_location("ghost").unwrap().is_none());
    }

    #[test]
    fn test_remove_location_cascades() {
        let store = Store::open_in_memory().unwrap();
        let (a, b) = (pin("a"), pin("b"));
        store.upsert_location(&a).unwrap();
        store.upsert_location(&b).unwrap();
        let at = datetime!(2026-03-01 00:00 UTC);
        store.insert_observation("a", &observation(&a, at, 1), at).unwrap();
        store.insert_observation("b", &observation(&b, at, 2), at).unwrap();

        assert!(store.remove_location("a").unwrap());
        assert!(!store.remove_location("a").unwrap());
        assert_eq!(store.count_observations(Some("a")).unwrap(), 0);
        assert_eq!(store.count_observations(None).unwrap(), 1);
    }

    #[test]
    fn test_prune_observations() {
        let store = Store::open_in_memory().unwrap();
        let location = pin("a");
        store.upsert_location(&location).unwrap();
        let now = datetime!(2026-04-01 00:00 UTC);

        for days in [31, 30, 29, 1] {
            let at = now - Duration::days(days);
            store
                .insert_observation("a", &observation(&location, at, days as u16), now)
                .unwrap();
        }

        let removed = store.prune_observations(now - Duration::days(30)).unwrap();
        assert_eq!(removed, 1);

        let since = store
            .query_observations(
                &ObservationQuery::new()
                    .location("a")
                    .since(now - Duration::days(7))
                    .oldest_first(),
            )
            .unwrap();
        assert_eq!(since.len(), 1);
    }

    #[test]
    fn test_query_empty_history_is_ok() {
        let store = Store::open_in_memory().unwrap();
        let records = store
            .query_observations(&ObservationQuery::new().location("nobody").kind(ProviderKind::Radon))
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_expired_sessions_deleted() {
        let store = Store::open_in_memory().unwrap();
        let now = datetime!(2026-03-01 00:00 UTC);
        store
            .insert_session("old", "u1", now - Duration::hours(1))
            .unwrap();
        store
            .insert_session("live", "u1", now + Duration::hours(1))
            .unwrap();

        assert_eq!(store.delete_expired_sessions(now).unwrap(), 1);
        assert_eq!(store.stats().unwrap().sessions, 1);
    }

    #[test]
    fn test_observation_location_ref_survives() {
        let store = Store::open_in_memory().unwrap();
        let location = pin("a");
        store.upsert_location(&location).unwrap();
        let at = datetime!(2026-03-01 00:00 UTC);
        let obs = observation(&location, at, 5);
        store.insert_observation("a", &obs, at).unwrap();

        let stored = store.latest_observation("a", ProviderKind::AirQuality).unwrap().unwrap();
        assert_eq!(stored.into_observation(), obs);
        assert_eq!(
            LocationRef::location("a", location.coordinates()),
            obs.location
        );
    }
}
