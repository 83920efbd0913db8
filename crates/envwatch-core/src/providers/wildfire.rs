//! Active fires near a point.
//!
//! The primary feed is NASA FIRMS satellite hotspot detections (CSV). When
//! it reports nothing inside the search box, or fails outright, the NIFC
//! current incident locations feed is queried instead.
//!
//! Both feeds are asked for a bounding box around the point. Candidates
//! inside the box are then kept only if their great-circle distance is
//! within the radius, so the result is a count for a true circle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use envwatch_types::{Coordinates, FireFeed, Measurement, ProviderKind, Wildfire};

use crate::error::{Error, Result};
use crate::geo::{BoundingBox, haversine_km};
use crate::http::{HttpRequest, HttpTransport, fetch_json};
use crate::providers::{Provider, ProviderSettings};

/// Default primary upstream.
pub const DEFAULT_BASE_URL: &str = "https://firms.modaps.eosdis.nasa.gov";
/// Default secondary upstream.
pub const DEFAULT_SECONDARY_URL: &str = "https://services3.arcgis.com/T4QMspbfLg3qTGWY/arcgis/rest/services/WFIGS_Incident_Locations_Current/FeatureServer/0/query";
/// Default cache TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
/// Default search radius.
pub const DEFAULT_RADIUS_KM: f64 = 50.0;
/// Default satellite product.
pub const DEFAULT_SENSOR: &str = "VIIRS_SNPP_NRT";
/// FIRMS accepts 1 to 10 days.
pub const MAX_DAY_RANGE: u8 = 10;

/// Parse a FIRMS area CSV into detection points.
///
/// Columns are located by header name. Rows with unparseable or
/// out-of-range coordinates are skipped.
pub(crate) fn parse_firms_csv(provider: &str, body: &str) -> Result<Vec<Coordinates>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(body.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| Error::malformed(provider, format!("unreadable CSV header: {e}")))?
        .clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::malformed(provider, format!("CSV has no {name} column")))
    };
    let lat_col = column("latitude")?;
    let lon_col = column("longitude")?;

    let mut points = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| Error::malformed(provider, format!("bad CSV row: {e}")))?;
        let field = |i: usize| record.get(i).and_then(|v| v.trim().parse::<f64>().ok());
        if let (Some(lat), Some(lon)) = (field(lat_col), field(lon_col)) {
            if let Ok(point) = Coordinates::new(lat, lon) {
                points.push(point);
            }
        }
    }
    Ok(points)
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    coordinates: serde_json::Value,
}

impl FeatureCollection {
    /// Point features as coordinates. GeoJSON orders them `[lon, lat]`.
    pub(crate) fn points(&self) -> Vec<Coordinates> {
        self.features
            .iter()
            .filter_map(|f| f.geometry.as_ref())
            .filter_map(|g| {
                let pair = g.coordinates.as_array()?;
                let lon = pair.first()?.as_f64()?;
                let lat = pair.get(1)?.as_f64()?;
                Coordinates::new(lat, lon).ok()
            })
            .collect()
    }
}

/// `west,south,east,north` as both upstreams expect it. Rounded outwards
/// so the request never trims the box.
fn envelope(bbox: &BoundingBox) -> String {
    let down = |v: f64| (v * 10_000.0).floor() / 10_000.0;
    let up = |v: f64| (v * 10_000.0).ceil() / 10_000.0;
    format!(
        "{:.4},{:.4},{:.4},{:.4}",
        down(bbox.west).max(-180.0),
        down(bbox.south).max(-90.0),
        up(bbox.east).min(180.0),
        up(bbox.north).min(90.0)
    )
}

/// Count the candidates within `radius_km` of `center`.
#[must_use]
pub fn count_within(
    center: Coordinates,
    radius_km: f64,
    bbox: &BoundingBox,
    candidates: &[Coordinates],
) -> u32 {
    let count = candidates
        .iter()
        .filter(|p| bbox.contains(**p))
        .filter(|p| haversine_km(center, **p) <= radius_km)
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Wildfire provider.
pub struct WildfireProvider {
    settings: ProviderSettings,
    transport: Arc<dyn HttpTransport>,
    radius_km: f64,
    sensor: String,
    day_range: u8,
    secondary_url: String,
}

impl WildfireProvider {
    pub fn new(settings: ProviderSettings, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            settings,
            transport,
            radius_km: DEFAULT_RADIUS_KM,
            sensor: DEFAULT_SENSOR.to_string(),
            day_range: 1,
            secondary_url: DEFAULT_SECONDARY_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_radius_km(mut self, radius_km: f64) -> Self {
        self.radius_km = radius_km;
        self
    }

    #[must_use]
    pub fn with_sensor(mut self, sensor: impl Into<String>) -> Self {
        self.sensor = sensor.into();
        self
    }

    #[must_use]
    pub fn with_day_range(mut self, days: u8) -> Self {
        self.day_range = days.clamp(1, MAX_DAY_RANGE);
        self
    }

    #[must_use]
    pub fn with_secondary_url(mut self, url: impl Into<String>) -> Self {
        self.secondary_url = url.into();
        self
    }

    async fn satellite_points(&self, bbox: &BoundingBox) -> Result<Vec<Coordinates>> {
        let key = self.settings.require_key(self.name())?;
        let mut points = Vec::new();
        for part in bbox.parts() {
            let url = self.settings.url(&format!(
                "api/area/csv/{}/{}/{}/{}",
                key,
                self.sensor,
                envelope(&part),
                self.day_range
            ));
            let request = HttpRequest::get(url).timeout(self.settings.timeout);

            let response = self
                .transport
                .send(request)
                .await?
                .error_for_status(self.name())?;
            points.extend(parse_firms_csv(self.name(), &response.body)?);
        }
        Ok(points)
    }

    async fn incident_points(&self, bbox: &BoundingBox) -> Result<Vec<Coordinates>> {
        let mut points = Vec::new();
        for part in bbox.parts() {
            let request = HttpRequest::get(&self.secondary_url)
                .query("where", "1=1")
                .query("geometry", envelope(&part))
                .query("geometryType", "esriGeometryEnvelope")
                .query("inSR", 4326)
                .query("spatialRel", "esriSpatialRelIntersects")
                .query("outFields", "IncidentName")
                .query("f", "geojson")
                .timeout(self.settings.timeout);

            let collection: FeatureCollection =
                fetch_json(self.transport.as_ref(), "nifc-incidents", request).await?;
            points.extend(collection.points());
        }
        Ok(points)
    }
}

#[async_trait]
impl Provider for WildfireProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Wildfire
    }

    fn name(&self) -> &str {
        "nasa-firms"
    }

    fn ttl(&self) -> Duration {
        self.settings.ttl
    }

    fn cache_params(&self) -> Vec<(&'static str, String)> {
        vec![("radius_km", format!("{}", self.radius_km))]
    }

    async fn fetch(&self, at: Coordinates) -> Result<Measurement> {
        let bbox = BoundingBox::around(at, self.radius_km);

        let (points, feed) = match self.satellite_points(&bbox).await {
            Ok(points) if !points.is_empty() => (points, FireFeed::Satellite),
            Ok(_) => {
                debug!("No satellite detections near {}, checking incidents", at);
                match self.incident_points(&bbox).await {
                    Ok(points) => (points, FireFeed::Incidents),
                    Err(e) => {
                        // The primary answered; its empty result stands.
                        warn!("Incident feed failed after empty satellite result: {}", e);
                        (Vec::new(), FireFeed::Satellite)
                    }
                }
            }
            Err(e) => {
                warn!("Satellite feed failed near {}: {}", at, e);
                (self.incident_points(&bbox).await?, FireFeed::Incidents)
            }
        };

        Ok(Measurement::Wildfire(Wildfire {
            radius_km: self.radius_km,
            fire_count: count_within(at, self.radius_km, &bbox, &points),
            feed,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use serde_json::json;

    const FIRMS_HEADER: &str = "latitude,longitude,bright_ti4,scan,track,acq_date,acq_time,satellite,instrument,confidence,version,bright_ti5,frp,daynight";

    fn center() -> Coordinates {
        Coordinates::new(34.05, -118.25).unwrap()
    }

    fn provider(transport: Arc<MockTransport>) -> WildfireProvider {
        WildfireProvider::new(
            ProviderSettings::new(DEFAULT_BASE_URL, DEFAULT_TTL).api_key("MAPKEY"),
            transport,
        )
        .with_radius_km(50.0)
    }

    fn firms_body(rows: &[(f64, f64)]) -> String {
        let mut body = FIRMS_HEADER.to_string();
        for (lat, lon) in rows {
            body.push_str(&format!(
                "\n{lat},{lon},330.1,0.4,0.4,2026-08-01,0912,N,VIIRS,n,2.0NRT,290.2,4.1,D"
            ));
        }
        body
    }

    #[test]
    fn test_parse_firms_csv() {
        let body = firms_body(&[(34.1, -118.2), (34.2, -118.3)]);
        let points = parse_firms_csv("firms", &body).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].latitude, 34.2);

        assert!(parse_firms_csv("firms", FIRMS_HEADER).unwrap().is_empty());
        assert!(parse_firms_csv("firms", "").unwrap().is_empty());
    }

    #[test]
    fn test_parse_firms_error_text_is_malformed() {
        let err = parse_firms_csv("firms", "Invalid MAP_KEY.").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }

    #[test]
    fn test_count_within_applies_true_radius() {
        let c = center();
        let bbox = BoundingBox::around(c, 50.0);
        // Box corner is inside the box but about 69 km away
        let corner = Coordinates::new(bbox.north - 0.01, bbox.east - 0.01).unwrap();
        let near = Coordinates::new(34.1, -118.2).unwrap();
        let far = Coordinates::new(36.0, -118.25).unwrap();

        assert_eq!(count_within(c, 50.0, &bbox, &[near, corner, far]), 1);
    }

    #[test]
    fn test_fires_just_inside_radius_are_counted() {
        let c = center();
        let bbox = BoundingBox::around(c, 50.0);
        let hop = (0.999 * 50.0 / crate::geo::EARTH_RADIUS_KM).to_degrees();
        let north = Coordinates::new(c.latitude + hop, c.longitude).unwrap();
        let south = Coordinates::new(c.latitude - hop, c.longitude).unwrap();
        let outside = Coordinates::new(c.latitude + hop * 1.01, c.longitude).unwrap();

        assert_eq!(count_within(c, 50.0, &bbox, &[north, south, outside]), 2);
    }

    #[test]
    fn test_envelope_rounds_outwards() {
        let bbox = BoundingBox {
            south: 33.600_01,
            west: -118.799_99,
            north: 34.499_91,
            east: -117.700_01,
        };
        assert_eq!(envelope(&bbox), "-118.8000,33.6000,-117.7000,34.5000");
    }

    #[tokio::test]
    async fn test_antimeridian_box_is_requested_in_two_parts() {
        let transport = Arc::new(MockTransport::new());
        // Western half starts at -180, the eastern half ends at 180
        transport.respond_text("/-180.0000,", firms_body(&[(-17.0, -179.95)]));
        transport.respond_text("api/area/csv", firms_body(&[(-17.0, 179.95), (-17.0, 170.0)]));

        let fiji = Coordinates::new(-17.0, 179.9).unwrap();
        let m = provider(transport.clone()).fetch(fiji).await.unwrap();
        let Measurement::Wildfire(w) = m else {
            panic!("expected wildfire measurement");
        };
        assert_eq!(transport.requests_matching("api/area/csv"), 2);
        assert_eq!(w.fire_count, 2);
        assert_eq!(w.feed, FireFeed::Satellite);
    }

    #[tokio::test]
    async fn test_satellite_feed_used_when_it_has_rows() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_text(
            "api/area/csv",
            firms_body(&[(34.1, -118.2), (34.0, -118.3), (35.0, -118.25)]),
        );

        let m = provider(transport.clone()).fetch(center()).await.unwrap();
        let Measurement::Wildfire(w) = m else {
            panic!("expected wildfire measurement");
        };
        assert_eq!(w.fire_count, 2);
        assert_eq!(w.feed, FireFeed::Satellite);
        assert_eq!(transport.requests_matching("FeatureServer"), 0);

        let url = transport.last_request().unwrap().url;
        assert!(url.contains("/api/area/csv/MAPKEY/VIIRS_SNPP_NRT/"));
        assert!(url.ends_with("/1"));
    }

    #[tokio::test]
    async fn test_empty_satellite_falls_back_to_incidents() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_text("api/area/csv", FIRMS_HEADER);
        transport.respond_json(
            "FeatureServer",
            json!({
                "type": "FeatureCollection",
                "features": [
                    { "type": "Feature", "geometry": { "type": "Point", "coordinates": [-118.3, 34.1] }, "properties": {} },
                    { "type": "Feature", "geometry": null, "properties": {} }
                ]
            }),
        );

        let m = provider(transport.clone()).fetch(center()).await.unwrap();
        let w = match m {
            Measurement::Wildfire(w) => w,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(w.fire_count, 1);
        assert_eq!(w.feed, FireFeed::Incidents);

        let request = transport.last_request().unwrap();
        assert_eq!(request.query_value("f"), Some("geojson"));
        assert_eq!(request.query_value("inSR"), Some("4326"));
    }

    #[tokio::test]
    async fn test_empty_satellite_and_failed_incidents_is_zero() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_text("api/area/csv", FIRMS_HEADER);
        transport.respond_status("FeatureServer", 503);

        let m = provider(transport).fetch(center()).await.unwrap();
        let Measurement::Wildfire(w) = m else {
            panic!("expected wildfire measurement");
        };
        assert_eq!(w.fire_count, 0);
        assert_eq!(w.feed, FireFeed::Satellite);
    }

    #[tokio::test]
    async fn test_both_feeds_failing_is_an_error() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_status("api/area/csv", 500);
        transport.respond_status("FeatureServer", 502);

        let err = provider(transport).fetch(center()).await.unwrap_err();
        assert!(matches!(err, Error::Status { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_missing_key_goes_straight_to_incidents() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_json("FeatureServer", json!({ "features": [] }));

        let provider = WildfireProvider::new(
            ProviderSettings::new(DEFAULT_BASE_URL, DEFAULT_TTL),
            transport.clone(),
        );
        let m = provider.fetch(center()).await.unwrap();
        assert!(matches!(
            m,
            Measurement::Wildfire(Wildfire { fire_count: 0, feed: FireFeed::Incidents, .. })
        ));
        assert_eq!(transport.requests_matching("api/area/csv"), 0);
    }

    #[test]
    fn test_radius_is_part_of_cache_params() {
        let p = WildfireProvider::new(
            ProviderSettings::new(DEFAULT_BASE_URL, DEFAULT_TTL),
            Arc::new(MockTransport::new()),
        )
        .with_radius_km(25.0);
        assert_eq!(p.cache_params(), vec![("radius_km", "25".to_string())]);
    }
}
