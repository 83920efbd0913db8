//! Canonical observation types for envwatch.
//!
//! This crate holds the data model shared by the acquisition core, the
//! SQLite store and the service: provider kinds, locations and the
//! kind-tagged [`Observation`] with its per-kind measurements.
//!
//! # Example
//!
//! ```
//! use envwatch_types::{Coordinates, LocationRef, Observation, ProviderKind};
//! use time::OffsetDateTime;
//!
//! let at = Coordinates::new(40.0150, -105.2705)?;
//! let obs = Observation::unavailable(
//!     ProviderKind::Pollen,
//!     LocationRef::point(at),
//!     OffsetDateTime::UNIX_EPOCH,
//!     "no pollen data",
//! );
//! assert!(!obs.is_available());
//! # Ok::<(), envwatch_types::ParseError>(())
//! ```

pub mod error;
pub mod measurement;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use measurement::{
    AirQuality, AlertKind, AqiCategory, DailyForecast, FireFeed, HourlyAirQuality, PlantIndex, Pollen,
    PollenFamily, PollenRisk, Pollutants, Radon, RadonZone, Severity, Stagnation, UvRisk,
    Weather, WeatherAlert, Wildfire,
};
pub use types::{
    Coordinates, DataSource, LocationRef, Measurement, MonitoredLocation, Observation,
    ProviderKind,
};

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample_air_quality() -> Measurement {
        Measurement::AirQuality(AirQuality {
            index: 42,
            index_code: "uaqi".to_string(),
            category: AqiCategory::Good,
            color: AqiCategory::Good.color().to_string(),
            dominant_pollutant: Some("pm25".to_string()),
            pollutants: Pollutants {
                pm25: Some(8.2),
                ..Default::default()
            },
            forecast: Vec::new(),
        })
    }

    // --- ProviderKind tests ---

    #[test]
    fn test_provider_kind_round_trips_through_str() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_provider_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&ProviderKind::AirQuality).unwrap(),
            "\"air_quality\""
        );
        assert_eq!(
            serde_json::to_string(&ProviderKind::Wildfire).unwrap(),
            "\"wildfire\""
        );
    }

    #[test]
    fn test_unknown_kind_error_message() {
        let err = "ozone".parse::<ProviderKind>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown provider kind: ozone");
    }

    // --- DataSource tests ---

    #[test]
    fn test_data_source_serialization_matches_as_str() {
        for source in [
            DataSource::Live,
            DataSource::Cached,
            DataSource::HistoricalFallback,
            DataSource::Estimated,
            DataSource::Unavailable,
        ] {
            let json = serde_json::to_string(&source).unwrap();
            assert_eq!(json, format!("\"{}\"", source.as_str()));
            assert_eq!(source.as_str().parse::<DataSource>().unwrap(), source);
        }
    }

    // --- Observation tests ---

    #[test]
    fn test_observation_kind_follows_measurement() {
        let at = Coordinates::new(1.0, 2.0).unwrap();
        let obs = Observation::new(
            LocationRef::point(at),
            datetime!(2026-03-01 12:00 UTC),
            DataSource::Live,
            sample_air_quality(),
        );
        assert_eq!(obs.kind, ProviderKind::AirQuality);
        assert!(obs.air_quality().is_some());
        assert!(obs.weather().is_none());
        assert!(!obs.is_degraded());
    }

    #[test]
    fn test_unavailable_observation_has_no_measurements() {
        let at = Coordinates::new(1.0, 2.0).unwrap();
        let obs = Observation::unavailable(
            ProviderKind::Weather,
            LocationRef::location("pin-1", at),
            datetime!(2026-03-01 12:00 UTC),
            "upstream timed out",
        );

        assert!(!obs.is_available());
        assert!(obs.is_degraded());
        assert_eq!(obs.source, DataSource::Unavailable);

        let json = serde_json::to_value(&obs).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["error"], "upstream timed out");
        assert_eq!(json["location"]["location_id"], "pin-1");
    }

    #[test]
    fn test_observation_json_shape() {
        let at = Coordinates::new(47.6062, -122.3321).unwrap();
        let obs = Observation::new(
            LocationRef::point(at),
            datetime!(2026-03-01 12:00 UTC),
            DataSource::Cached,
            sample_air_quality(),
        );

        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["kind"], "air_quality");
        assert_eq!(json["source"], "cached");
        assert_eq!(json["timestamp"], "2026-03-01T12:00:00Z");
        assert_eq!(json["location"]["latitude"], 47.6062);
        assert_eq!(json["data"]["kind"], "air_quality");
        assert_eq!(json["data"]["index"], 42);
        assert_eq!(json["data"]["pollutants"]["pm25"], 8.2);
        // Unreported pollutants are omitted rather than zeroed.
        assert!(json["data"]["pollutants"].get("co").is_none());

        let back: Observation = serde_json::from_value(json).unwrap();
        assert_eq!(back, obs);
    }

    #[test]
    fn test_aqi_category_colors_are_distinct() {
        let categories = [
            AqiCategory::Good,
            AqiCategory::Moderate,
            AqiCategory::UnhealthyForSensitiveGroups,
            AqiCategory::Unhealthy,
            AqiCategory::VeryUnhealthy,
            AqiCategory::Hazardous,
        ];
        let colors: std::collections::HashSet<_> = categories.iter().map(|c| c.color()).collect();
        assert_eq!(colors.len(), categories.len());
        assert_eq!(
            AqiCategory::UnhealthyForSensitiveGroups.to_string(),
            "Unhealthy for Sensitive Groups"
        );
    }

    #[test]
    fn test_radon_zone_ordering() {
        assert!(RadonZone::Zone1 < RadonZone::Zone3);
        assert_eq!(RadonZone::Zone2.number(), 2);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn valid_coordinates_are_accepted(lat in -90.0f64..=90.0, lon in -180.0f64..=180.0) {
                prop_assert!(Coordinates::new(lat, lon).is_ok());
            }

            #[test]
            fn out_of_range_latitude_is_rejected(lat in 90.0001f64..1000.0, lon in -180.0f64..=180.0) {
                prop_assert!(Coordinates::new(lat, lon).is_err());
                prop_assert!(Coordinates::new(-lat, lon).is_err());
            }
        }
    }
}
