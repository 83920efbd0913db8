//! Storage and directory seams.
//!
//! The acquisition core talks to persistence only through these traits.
//! `envwatch-store` provides the SQLite implementations; [`crate::memory`]
//! provides in-process ones for tests and embedded use.

use async_trait::async_trait;
use time::OffsetDateTime;

use envwatch_types::{MonitoredLocation, Observation, ProviderKind};

use crate::error::Result;

/// Key/payload store with per-entry expiry.
///
/// Implementations must be safe for concurrent use without caller coordination.
#[async_trait]
pub trait ObservationCache: Send + Sync {
    /// Payload for `key`, or `None` if absent or expired as of `now`.
    async fn get(&self, key: &str, now: OffsetDateTime) -> Result<Option<String>>;

    /// Replace any entry for `key` with `payload`, live until `expires_at`.
    async fn put(&self, key: &str, payload: &str, expires_at: OffsetDateTime) -> Result<()>;

    /// Physically remove entries expired as of `now`. Returns the count removed.
    async fn purge_expired(&self, now: OffsetDateTime) -> Result<usize>;
}

/// Append-only time series of observations per (location, kind).
#[async_trait]
pub trait ObservationHistory: Send + Sync {
    /// Record an observation. Returns `false` when an identical record
    /// (same location, kind and timestamp) already exists.
    async fn append(&self, location_id: &str, observation: &Observation) -> Result<bool>;

    /// Records with `timestamp >= since`, most recent first.
    async fn query(
        &self,
        location_id: &str,
        kind: ProviderKind,
        since: OffsetDateTime,
    ) -> Result<Vec<Observation>>;

    /// Latest record regardless of age.
    async fn most_recent(
        &self,
        location_id: &str,
        kind: ProviderKind,
    ) -> Result<Option<Observation>>;

    /// Delete records older than `cutoff`. Returns the count removed.
    async fn prune_older_than(&self, cutoff: OffsetDateTime) -> Result<usize>;
}

/// Read-only view of the monitored locations owned by the pin collaborator.
#[async_trait]
pub trait LocationDirectory: Send + Sync {
    /// All locations with `active = true`.
    async fn list_active_locations(&self) -> Result<Vec<MonitoredLocation>>;

    /// A single location by id, active or not.
    async fn find_location(&self, id: &str) -> Result<Option<MonitoredLocation>>;
}

/// Deletes expired session artifacts owned by the authentication collaborator.
#[async_trait]
pub trait SessionJanitor: Send + Sync {
    /// Delete sessions expired as of `now`. Returns the count removed.
    async fn delete_expired_sessions(&self, now: OffsetDateTime) -> Result<usize>;
}
