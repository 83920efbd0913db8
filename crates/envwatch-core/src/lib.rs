//! Fallback-aware acquisition of environmental data.
//!
//! This crate fetches air quality, weather, pollen, wildfire and radon data
//! for geographic points from unreliable upstream services and turns every
//! outcome into a canonical [`Observation`](envwatch_types::Observation).
//!
//! # Features
//!
//! - **Providers**: one per data kind, each a fixed mapping from the upstream
//!   payload to canonical measurements
//! - **Fallback chain**: cache, then live fetch, then last known history,
//!   then an explicit "unavailable" result
//! - **Single-flight**: concurrent cache misses for the same point share one
//!   upstream call
//! - **Retry**: exponential backoff with jitter inside a bounded timeout
//! - **Storage seams**: cache, history, location and session traits with
//!   in-memory implementations
//!
//! # Providers
//!
//! | Kind | Upstream | Default TTL |
//! |------|----------|-------------|
//! | Air quality | Google Air Quality | 30 min |
//! | Weather | OpenWeather One Call | 60 min |
//! | Pollen | Google Pollen | 120 min |
//! | Wildfire | NASA FIRMS, NIFC incidents | 60 min |
//! | Radon | Static EPA zone table | 7 days |
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use envwatch_core::{Adapter, MemoryCache, MemoryHistory, SystemClock};
//! use envwatch_core::providers::RadonProvider;
//! use envwatch_types::{Coordinates, DataSource, LocationRef};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = Adapter::new(
//!         Arc::new(RadonProvider::default()),
//!         Arc::new(MemoryCache::new()),
//!         Arc::new(MemoryHistory::new()),
//!         Arc::new(SystemClock),
//!     );
//!
//!     let denver = LocationRef::point(Coordinates::new(39.7392, -104.9903)?);
//!     let observation = adapter.fetch_current(&denver).await;
//!     assert_eq!(observation.source, DataSource::Estimated);
//!
//!     // The second lookup is a cache hit
//!     let again = adapter.fetch_current(&denver).await;
//!     assert_eq!(again.source, DataSource::Cached);
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod clock;
pub mod error;
pub mod geo;
pub mod http;
pub mod memory;
pub mod mock;
pub mod providers;
pub mod retry;
pub mod singleflight;
pub mod thresholds;
pub mod traits;

pub use envwatch_types as types;

pub use adapter::{Adapter, AdapterSet, DEFAULT_FETCH_TIMEOUT, default_ttl};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use geo::{BoundingBox, cache_key, haversine_km};
pub use http::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use memory::{MemoryCache, MemoryHistory, MemorySessions, StaticDirectory};
pub use mock::{MockProvider, MockTransport};
pub use providers::air_quality::{AggregationMethod, aggregate_air_quality};
pub use providers::{Provider, ProviderSettings};
pub use retry::{Backoff, RetryConfig, with_retry};
pub use singleflight::SingleFlight;
pub use thresholds::{AqiThresholds, PollenThresholds};
pub use traits::{LocationDirectory, ObservationCache, ObservationHistory, SessionJanitor};

/// Type alias for a shared adapter reference.
pub type SharedAdapter = std::sync::Arc<Adapter>;
