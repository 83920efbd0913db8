//! Background collector and on-demand lookups for envwatch.
//!
//! This crate wires the acquisition core to SQLite and provides:
//! - A scheduler that collects every active location on a cadence
//! - Cache purging, history retention and expired-session cleanup
//! - [`EnvMonitor`], the facade for current observations, history and
//!   manual collection
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/envwatch/service.toml`.
//! See [`config`] for every key.
//!
//! ```toml
//! [storage]
//! path = "~/.local/share/envwatch/data.db"
//!
//! [collection]
//! cadence = "@hourly"
//! retention_days = 30
//!
//! [providers.air_quality]
//! api_key = "..."
//! ```

pub mod backend;
pub mod config;
pub mod monitor;
pub mod scheduler;
pub mod state;

pub use backend::{Backends, SqliteBackend};
pub use config::{
    CollectionConfig, Config, ConfigError, ProviderConfig, ProvidersConfig, StorageConfig,
    ValidationError, WeatherConfig, WildfireConfig,
};
pub use monitor::{EnvMonitor, MonitorError, Target};
pub use scheduler::{
    CellReport, CellStatus, MaintenanceReport, Scheduler, SchedulerSettings, TickOutcome,
    TickReport,
};
pub use state::{AppState, ProviderStats, SchedulerState, build_adapters};
