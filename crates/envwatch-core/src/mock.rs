//! Test doubles for providers and transports.
//!
//! [`MockTransport`] answers HTTP requests from a route table so provider
//! transforms can be tested end to end without a network.
//! [`MockProvider`] stands in for a whole provider when exercising the
//! adapter and scheduler, with per-point failures, panics and latency.
//!
//! # Example
//!
//! ```
//! use envwatch_core::mock::MockProvider;
//! use envwatch_core::providers::Provider;
//! use envwatch_types::{Coordinates, ProviderKind};
//!
//! #[tokio::main]
//! async fn main() {
//!     let provider = MockProvider::new(ProviderKind::Weather);
//!     let at = Coordinates::new(47.6, -122.3).unwrap();
//!     assert!(provider.fetch(at).await.is_ok());
//!     assert_eq!(provider.call_count(), 1);
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use envwatch_types::{
    AirQuality, AqiCategory, Coordinates, DataSource, FireFeed, Measurement, Pollen, Pollutants,
    ProviderKind, Radon, RadonZone, Stagnation, Weather, Wildfire,
};

use crate::error::{Error, Result};
use crate::geo::round_coordinate;
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::providers::Provider;

pub use crate::clock::ManualClock;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone)]
enum Route {
    Respond(HttpResponse),
    Fail(Error),
}

/// HTTP transport answering from canned routes.
///
/// A route matches when its pattern is a substring of the request URL.
/// Later routes win over earlier ones with overlapping patterns.
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Mutex<Vec<(String, Route)>>,
    requests: Mutex<Vec<HttpRequest>>,
    latency: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn route(&self, pattern: &str, route: Route) {
        lock(&self.routes).push((pattern.to_string(), route));
    }

    /// Answer with a 200 and a JSON body.
    pub fn respond_json(&self, pattern: &str, body: serde_json::Value) {
        self.route(pattern, Route::Respond(HttpResponse::ok(body.to_string())));
    }

    /// Answer with a 200 and a text body.
    pub fn respond_text(&self, pattern: &str, body: impl Into<String>) {
        self.route(pattern, Route::Respond(HttpResponse::ok(body)));
    }

    /// Answer with an empty body and the given status.
    pub fn respond_status(&self, pattern: &str, status: u16) {
        self.route(
            pattern,
            Route::Respond(HttpResponse::new(status, "")),
        );
    }

    /// Answer with a 429 asking the caller to wait `retry_after`.
    pub fn respond_rate_limited(&self, pattern: &str, retry_after: Duration) {
        self.route(
            pattern,
            Route::Respond(HttpResponse::new(429, "").with_retry_after(retry_after)),
        );
    }

    /// Fail at the transport level.
    pub fn fail(&self, pattern: &str, error: Error) {
        self.route(pattern, Route::Fail(error));
    }

    /// Delay every response.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = Some(latency);
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Number of requests whose URL contains `pattern`.
    pub fn requests_matching(&self, pattern: &str) -> usize {
        lock(&self.requests)
            .iter()
            .filter(|r| r.url.contains(pattern))
            .count()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        lock(&self.requests).last().cloned()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let latency = *lock(&self.latency);
        let route = lock(&self.routes)
            .iter()
            .rev()
            .find(|(pattern, _)| request.url.contains(pattern.as_str()))
            .map(|(_, route)| route.clone());
        let url = request.url.clone();
        lock(&self.requests).push(request);

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match route {
            Some(Route::Respond(response)) => Ok(response),
            Some(Route::Fail(error)) => Err(error),
            None => Err(Error::network("mock", format!("no route for {url}"))),
        }
    }
}

/// Canned measurement of the given kind.
#[must_use]
pub fn sample_measurement(kind: ProviderKind) -> Measurement {
    match kind {
        ProviderKind::AirQuality => Measurement::AirQuality(AirQuality {
            index: 42,
            index_code: "uaqi".to_string(),
            category: AqiCategory::Good,
            color: AqiCategory::Good.color().to_string(),
            dominant_pollutant: Some("pm25".to_string()),
            pollutants: Pollutants {
                pm25: Some(8.0),
                ..Default::default()
            },
            forecast: Vec::new(),
        }),
        ProviderKind::Weather => Measurement::Weather(Weather {
            temperature_c: 18.0,
            feels_like_c: None,
            humidity_pct: Some(55.0),
            pressure_hpa: Some(1013.0),
            wind_speed_ms: Some(4.0),
            visibility_m: Some(10_000.0),
            uv_index: Some(2.0),
            cloud_cover_pct: None,
            condition: Some("Clear".to_string()),
            description: None,
            icon: "clear-day".to_string(),
            dew_point_c: None,
            uv_risk: None,
            stagnation: Stagnation::default(),
            heat_wave: false,
            cold_wave: false,
            alerts: Vec::new(),
            forecast: Vec::new(),
        }),
        ProviderKind::Pollen => Measurement::Pollen(Pollen {
            tree: Some(3),
            overall: Some(3),
            ..Default::default()
        }),
        ProviderKind::Wildfire => Measurement::Wildfire(Wildfire {
            radius_km: 50.0,
            fire_count: 0,
            feed: FireFeed::Satellite,
        }),
        ProviderKind::Radon => Measurement::Radon(Radon {
            zone: RadonZone::Zone2,
            region: "Testland".to_string(),
            predicted_level: RadonZone::Zone2.predicted_level().to_string(),
        }),
    }
}

type PointKey = (i64, i64);

fn point_key(at: Coordinates) -> PointKey {
    (
        (round_coordinate(at.latitude) * 10_000.0).round() as i64,
        (round_coordinate(at.longitude) * 10_000.0).round() as i64,
    )
}

/// Provider returning canned data, with controllable failures.
#[derive(Debug)]
pub struct MockProvider {
    kind: ProviderKind,
    ttl: Duration,
    live_source: DataSource,
    measurement: Mutex<Measurement>,
    latency: Mutex<Option<Duration>>,
    fail_all: Mutex<Option<Error>>,
    fail_at: Mutex<HashMap<PointKey, Error>>,
    panic_at: Mutex<HashSet<PointKey>>,
    calls: AtomicU32,
    calls_at: Mutex<HashMap<PointKey, u32>>,
}

impl MockProvider {
    /// A provider of `kind` with its usual TTL.
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            ttl: crate::adapter::default_ttl(kind),
            live_source: DataSource::Live,
            measurement: Mutex::new(sample_measurement(kind)),
            latency: Mutex::new(None),
            fail_all: Mutex::new(None),
            fail_at: Mutex::new(HashMap::new()),
            panic_at: Mutex::new(HashSet::new()),
            calls: AtomicU32::new(0),
            calls_at: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_live_source(mut self, source: DataSource) -> Self {
        self.live_source = source;
        self
    }

    /// Replace the measurement returned on success.
    pub fn set_measurement(&self, measurement: Measurement) {
        *lock(&self.measurement) = measurement;
    }

    /// Delay every fetch.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = Some(latency);
    }

    /// Fail every fetch with `error` until [`MockProvider::recover`].
    pub fn fail_with(&self, error: Error) {
        *lock(&self.fail_all) = Some(error);
    }

    /// Fail fetches for one point.
    pub fn fail_at(&self, at: Coordinates, error: Error) {
        lock(&self.fail_at).insert(point_key(at), error);
    }

    /// Panic on fetches for one point.
    pub fn panic_at(&self, at: Coordinates) {
        lock(&self.panic_at).insert(point_key(at));
    }

    /// Clear all injected failures.
    pub fn recover(&self) {
        *lock(&self.fail_all) = None;
        lock(&self.fail_at).clear();
        lock(&self.panic_at).clear();
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of fetches for one point.
    pub fn calls_at(&self, at: Coordinates) -> u32 {
        lock(&self.calls_at)
            .get(&point_key(at))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn live_source(&self) -> DataSource {
        self.live_source
    }

    async fn fetch(&self, at: Coordinates) -> Result<Measurement> {
        let key = point_key(at);
        self.calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.calls_at).entry(key).or_default() += 1;

        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if lock(&self.panic_at).contains(&key) {
            panic!("mock provider panicked at {at}");
        }
        if let Some(error) = lock(&self.fail_all).clone() {
            return Err(error);
        }
        if let Some(error) = lock(&self.fail_at).get(&key).cloned() {
            return Err(error);
        }
        Ok(lock(&self.measurement).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fetch_json;

    #[tokio::test]
    async fn test_transport_routes_by_substring() {
        let transport = MockTransport::new();
        transport.respond_json("/a", serde_json::json!({ "v": 1 }));
        transport.respond_status("/b", 404);

        let value: serde_json::Value = fetch_json(
            &transport,
            "t",
            HttpRequest::get("https://x.test/a?q=1"),
        )
        .await
        .unwrap();
        assert_eq!(value["v"], 1);

        let err = fetch_json::<serde_json::Value>(&transport, "t", HttpRequest::get("https://x.test/b"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Status { status: 404, .. }));

        let err = transport
            .send(HttpRequest::get("https://x.test/c"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn test_provider_failure_injection() {
        let provider = MockProvider::new(ProviderKind::AirQuality);
        let a = Coordinates::new(1.0, 1.0).unwrap();
        let b = Coordinates::new(2.0, 2.0).unwrap();
        provider.fail_at(b, Error::network("mock", "down"));

        assert!(provider.fetch(a).await.is_ok());
        assert!(provider.fetch(b).await.is_err());
        assert_eq!(provider.calls_at(b), 1);

        provider.recover();
        assert!(provider.fetch(b).await.is_ok());
        assert_eq!(provider.call_count(), 3);
    }

    #[test]
    fn test_sample_measurement_matches_kind() {
        for kind in ProviderKind::ALL {
            assert_eq!(sample_measurement(kind).kind(), kind);
        }
    }
}
