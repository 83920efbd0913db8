//! Local persistence for envwatch observations.
//!
//! This crate provides SQLite-based storage behind the acquisition core:
//! a keyed cache of recent observations with per-entry expiry, an
//! append-only history of observations per monitored location, and the
//! location and session tables the service sweeps.
//!
//! # Features
//!
//! - Cache entries keyed by kind and rounded coordinates, with expiry
//! - History records deduplicated on (location, kind, timestamp)
//! - Cascade delete of history when a location is removed
//! - Query by location, kind, time range, with pagination
//! - Retention pruning
//!
//! # Example
//!
//! ```no_run
//! use envwatch_store::{ObservationQuery, Store};
//! use envwatch_types::ProviderKind;
//!
//! let store = Store::open_default()?;
//!
//! let query = ObservationQuery::new()
//!     .location("pin-1")
//!     .kind(ProviderKind::Weather)
//!     .limit(10);
//! let records = store.query_observations(&query)?;
//! # Ok::<(), envwatch_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{StoreStats, StoredCacheEntry, StoredObservation};
pub use queries::ObservationQuery;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/envwatch/data.db`
/// - macOS: `~/Library/Application Support/envwatch/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\envwatch\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("envwatch")
        .join("data.db")
}
