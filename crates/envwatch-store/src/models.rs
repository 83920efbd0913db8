//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use envwatch_types::{DataSource, Observation, ProviderKind};

/// An observation stored in the history table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredObservation {
    /// Database row ID.
    pub id: i64,
    /// Monitored location the record belongs to.
    pub location_id: String,
    pub kind: ProviderKind,
    /// Observation timestamp, truncated to whole seconds.
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
    /// When the record was written.
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
    /// Source of the observation when it was recorded.
    pub source: DataSource,
    /// The full observation.
    pub observation: Observation,
}

impl StoredObservation {
    /// Convert to an Observation.
    pub fn to_observation(&self) -> Observation {
        self.observation.clone()
    }

    /// Consume into the Observation.
    pub fn into_observation(self) -> Observation {
        self.observation
    }
}

/// A cache entry stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCacheEntry {
    pub key: String,
    /// Provider kind prefix of the key.
    pub kind: String,
    pub payload: String,
    #[serde(with = "time::serde::rfc3339")]
    pub stored_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Row counts per table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub locations: u64,
    pub active_locations: u64,
    pub cache_entries: u64,
    pub observations: u64,
    pub sessions: u64,
}
