//! Regional radon risk from a static EPA zone table.
//!
//! There is no upstream call. Regions are coarse bounding boxes, one per
//! US state plus DC, with metro carve-outs checked first. Neighboring
//! boxes overlap, so table order decides: small regions come before the
//! large ones around them.
//!
//! A hit is an estimate for the region, not a measurement, so results are
//! labelled [`DataSource::Estimated`]. Points outside every region have no
//! data.

use std::time::Duration;

use async_trait::async_trait;

use envwatch_types::{Coordinates, DataSource, Measurement, ProviderKind, Radon, RadonZone};

use crate::error::{Error, Result};
use crate::providers::Provider;

/// Default cache TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// A rectangular region with a single zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadonRegion {
    pub code: &'static str,
    pub name: &'static str,
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
    pub zone: RadonZone,
}

impl RadonRegion {
    #[must_use]
    pub fn contains(&self, at: Coordinates) -> bool {
        (self.south..=self.north).contains(&at.latitude)
            && (self.west..=self.east).contains(&at.longitude)
    }
}

const fn region(
    code: &'static str,
    name: &'static str,
    bounds: [f64; 4],
    zone: RadonZone,
) -> RadonRegion {
    RadonRegion {
        code,
        name,
        south: bounds[0],
        north: bounds[1],
        west: bounds[2],
        east: bounds[3],
        zone,
    }
}

use RadonZone::{Zone1 as Z1, Zone2 as Z2, Zone3 as Z3};

/// Higher-resolution areas that override their state.
pub const METRO_CARVE_OUTS: [RadonRegion; 1] = [region(
    "ATL",
    "Atlanta metro",
    [33.45, 34.15, -84.75, -83.95],
    Z1,
)];

/// State-level regions as `[south, north, west, east]`.
pub const STATE_REGIONS: [RadonRegion; 51] = [
    region("DC", "District of Columbia", [38.79, 39.00, -77.12, -76.91], Z2),
    region("RI", "Rhode Island", [41.14, 42.02, -71.91, -71.12], Z2),
    region("DE", "Delaware", [38.45, 39.84, -75.79, -75.05], Z3),
    region("CT", "Connecticut", [40.98, 42.05, -73.73, -71.79], Z2),
    region("NJ", "New Jersey", [38.93, 41.36, -75.56, -73.89], Z2),
    region("MA", "Massachusetts", [41.24, 42.89, -73.51, -69.93], Z2),
    region("NH", "New Hampshire", [42.70, 45.31, -72.56, -70.61], Z1),
    region("VT", "Vermont", [42.73, 45.02, -73.44, -71.46], Z2),
    region("MD", "Maryland", [37.89, 39.72, -79.49, -75.05], Z2),
    region("WV", "West Virginia", [37.20, 40.64, -82.64, -77.72], Z2),
    region("HI", "Hawaii", [18.91, 22.24, -160.25, -154.81], Z3),
    region("ME", "Maine", [42.98, 47.46, -71.08, -66.95], Z1),
    region("NY", "New York", [40.50, 45.02, -79.76, -71.86], Z2),
    region("PA", "Pennsylvania", [39.72, 42.27, -80.52, -74.69], Z1),
    region("VA", "Virginia", [36.54, 39.47, -83.68, -75.24], Z2),
    region("SC", "South Carolina", [32.03, 35.22, -83.35, -78.54], Z3),
    region("NC", "North Carolina", [33.84, 36.59, -84.32, -75.46], Z3),
    region("TN", "Tennessee", [34.98, 36.68, -90.31, -81.65], Z2),
    region("KY", "Kentucky", [36.50, 39.15, -89.57, -81.96], Z2),
    region("OH", "Ohio", [38.40, 41.98, -84.82, -80.52], Z1),
    region("IN", "Indiana", [37.77, 41.76, -88.10, -84.78], Z1),
    region("MI", "Michigan", [41.70, 48.31, -90.42, -82.41], Z2),
    region("IL", "Illinois", [36.97, 42.51, -91.51, -87.49], Z1),
    region("WI", "Wisconsin", [42.49, 47.08, -92.89, -86.25], Z1),
    region("GA", "Georgia", [30.36, 35.00, -85.61, -80.84], Z3),
    region("FL", "Florida", [24.40, 31.00, -87.63, -80.03], Z3),
    region("AL", "Alabama", [30.14, 35.01, -88.47, -84.89], Z2),
    region("MS", "Mississippi", [30.17, 35.00, -91.66, -88.10], Z3),
    region("LA", "Louisiana", [28.93, 33.02, -94.04, -88.82], Z3),
    region("AR", "Arkansas", [33.00, 36.50, -94.62, -89.64], Z3),
    region("MO", "Missouri", [35.99, 40.61, -95.77, -89.10], Z2),
    region("IA", "Iowa", [40.38, 43.50, -96.64, -90.14], Z1),
    region("MN", "Minnesota", [43.50, 49.38, -97.24, -89.49], Z1),
    region("ND", "North Dakota", [45.94, 49.00, -104.05, -96.55], Z1),
    region("SD", "South Dakota", [42.48, 45.94, -104.06, -96.44], Z1),
    region("NE", "Nebraska", [40.00, 43.00, -104.05, -95.31], Z1),
    region("KS", "Kansas", [36.99, 40.00, -102.05, -94.59], Z1),
    region("OK", "Oklahoma", [33.62, 37.00, -103.00, -94.43], Z3),
    region("TX", "Texas", [25.84, 36.50, -106.65, -93.51], Z3),
    region("NM", "New Mexico", [31.33, 37.00, -109.05, -103.00], Z2),
    region("CO", "Colorado", [36.99, 41.00, -109.06, -102.04], Z1),
    region("WY", "Wyoming", [41.00, 45.01, -111.06, -104.05], Z1),
    region("MT", "Montana", [44.36, 49.00, -116.05, -104.04], Z1),
    region("UT", "Utah", [37.00, 42.00, -114.05, -109.04], Z2),
    region("AZ", "Arizona", [31.33, 37.00, -114.82, -109.04], Z2),
    region("ID", "Idaho", [41.99, 49.00, -117.24, -111.04], Z2),
    region("NV", "Nevada", [35.00, 42.00, -120.01, -114.04], Z2),
    region("WA", "Washington", [45.54, 49.00, -124.85, -116.92], Z3),
    region("OR", "Oregon", [41.99, 46.29, -124.57, -116.46], Z3),
    region("CA", "California", [32.53, 42.01, -124.41, -114.13], Z3),
    region("AK", "Alaska", [51.20, 71.44, -179.15, -129.98], Z3),
];

/// First region containing the point, carve-outs first.
#[must_use]
pub fn lookup(at: Coordinates) -> Option<&'static RadonRegion> {
    METRO_CARVE_OUTS
        .iter()
        .chain(STATE_REGIONS.iter())
        .find(|r| r.contains(at))
}

/// Radon provider backed by the static table.
#[derive(Debug, Clone)]
pub struct RadonProvider {
    ttl: Duration,
}

impl RadonProvider {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }
}

impl Default for RadonProvider {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[async_trait]
impl Provider for RadonProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Radon
    }

    fn name(&self) -> &str {
        "epa-radon-zones"
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn live_source(&self) -> DataSource {
        DataSource::Estimated
    }

    async fn fetch(&self, at: Coordinates) -> Result<Measurement> {
        let region = lookup(at)
            .ok_or_else(|| Error::NoDataAvailable(format!("no radon zone covers {at}")))?;
        Ok(Measurement::Radon(Radon {
            zone: region.zone,
            region: region.name.to_string(),
            predicted_level: region.zone.predicted_level().to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn at(lat: f64, lon: f64) -> Coordinates {
        Coordinates::new(lat, lon).unwrap()
    }

    #[test]
    fn test_table_covers_every_state_once() {
        let codes: HashSet<_> = STATE_REGIONS.iter().map(|r| r.code).collect();
        assert_eq!(codes.len(), 51);
        for r in STATE_REGIONS.iter().chain(METRO_CARVE_OUTS.iter()) {
            assert!(r.south < r.north, "{}", r.code);
            assert!(r.west < r.east, "{}", r.code);
        }
    }

    #[test]
    fn test_lookup_states() {
        assert_eq!(lookup(at(39.7392, -104.9903)).unwrap().code, "CO");
        assert_eq!(lookup(at(25.7617, -80.1918)).unwrap().code, "FL");
        assert_eq!(lookup(at(32.8407, -83.6324)).unwrap().code, "GA");
        assert_eq!(lookup(at(38.9072, -77.0369)).unwrap().code, "DC");
        assert_eq!(lookup(at(61.2181, -149.9003)).unwrap().code, "AK");
    }

    #[test]
    fn test_metro_carve_out_overrides_state() {
        let atlanta = lookup(at(33.749, -84.388)).unwrap();
        assert_eq!(atlanta.code, "ATL");
        assert_eq!(atlanta.zone, RadonZone::Zone1);
    }

    #[test]
    fn test_lookup_outside_table() {
        assert!(lookup(at(51.5074, -0.1278)).is_none());
        assert!(lookup(at(0.0, 0.0)).is_none());
    }

    #[tokio::test]
    async fn test_fetch_is_estimated() {
        let provider = RadonProvider::default();
        assert_eq!(provider.live_source(), DataSource::Estimated);
        assert_eq!(provider.ttl(), Duration::from_secs(604_800));

        let m = provider.fetch(at(39.7392, -104.9903)).await.unwrap();
        let Measurement::Radon(radon) = m else {
            panic!("expected radon");
        };
        assert_eq!(radon.zone, RadonZone::Zone1);
        assert_eq!(radon.region, "Colorado");
        assert_eq!(radon.predicted_level, "greater than 4 pCi/L");
    }

    #[tokio::test]
    async fn test_fetch_outside_table_is_no_data() {
        let err = RadonProvider::default()
            .fetch(at(48.8566, 2.3522))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoDataAvailable(_)));
    }
}
