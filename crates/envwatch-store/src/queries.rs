//! Query builder for observation history.
//!
//! # Example
//!
//! ```
//! use envwatch_store::{ObservationQuery, Store};
//! use envwatch_types::ProviderKind;
//! use time::{Duration, OffsetDateTime};
//!
//! let store = Store::open_in_memory()?;
//! let week_ago = OffsetDateTime::now_utc() - Duration::days(7);
//!
//! // Most recent week of air quality for one pin
//! let query = ObservationQuery::new()
//!     .location("pin-1")
//!     .kind(ProviderKind::AirQuality)
//!     .since(week_ago)
//!     .limit(200);
//!
//! let records = store.query_observations(&query)?;
//! assert!(records.is_empty());
//! # Ok::<(), envwatch_store::Error>(())
//! ```

use time::OffsetDateTime;

use envwatch_types::ProviderKind;

use crate::store::to_millis;

/// Fluent query builder for stored observations.
///
/// Use this to construct queries for
/// [`Store::query_observations`](crate::Store::query_observations). By
/// default results are ordered newest first.
#[derive(Debug, Default, Clone)]
pub struct ObservationQuery {
    /// Filter by location ID.
    pub location_id: Option<String>,
    /// Filter by provider kind.
    pub kind: Option<ProviderKind>,
    /// Filter observations at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Filter observations at or before this time.
    pub until: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by observed_at descending (newest first).
    pub newest_first: bool,
}

impl ObservationQuery {
    /// Create a new query: every location and kind, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    pub fn location(mut self, location_id: &str) -> Self {
        self.location_id = Some(location_id.to_string());
        self
    }

    pub fn kind(mut self, kind: ProviderKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Filter to observations at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to observations at or before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results. Use with `limit()` for pagination.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results chronologically.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref location_id) = self.location_id {
            conditions.push("location_id = ?");
            params.push(Box::new(location_id.clone()));
        }

        if let Some(kind) = self.kind {
            conditions.push("kind = ?");
            params.push(Box::new(kind.as_str()));
        }

        if let Some(since) = self.since {
            conditions.push("observed_at >= ?");
            params.push(Box::new(to_millis(since)));
        }

        if let Some(until) = self.until {
            conditions.push("observed_at <= ?");
            params.push(Box::new(to_millis(until)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT id, location_id, kind, observed_at, recorded_at, source, payload \
             FROM observations {} ORDER BY observed_at {}, id {}",
            where_clause, order, order
        );

        // SQLite needs a LIMIT before an OFFSET
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset))
            }
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }

        sql
    }
}
