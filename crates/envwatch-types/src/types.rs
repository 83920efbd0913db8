//! Core types shared by every envwatch crate.

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{ParseError, ParseResult};
use crate::measurement::{AirQuality, Pollen, Radon, Weather, Wildfire};

/// Kind of environmental data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Air quality index and pollutant concentrations.
    AirQuality,
    /// Current weather and derived indicators.
    Weather,
    /// Pollen index by plant family.
    Pollen,
    /// Active fire detections near a point.
    Wildfire,
    /// Regional radon risk zone.
    Radon,
}

impl ProviderKind {
    /// Every provider kind, in collection order.
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::AirQuality,
        ProviderKind::Weather,
        ProviderKind::Pollen,
        ProviderKind::Wildfire,
        ProviderKind::Radon,
    ];

    /// Stable identifier used in cache keys and database rows.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::AirQuality => "air_quality",
            ProviderKind::Weather => "weather",
            ProviderKind::Pollen => "pollen",
            ProviderKind::Wildfire => "wildfire",
            ProviderKind::Radon => "radon",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ParseError;

    /// Parses a kind name, accepting `_` or `-` separators and a few short aliases.
    ///
    /// ```
    /// use envwatch_types::ProviderKind;
    ///
    /// assert_eq!("air-quality".parse(), Ok(ProviderKind::AirQuality));
    /// assert_eq!("AQ".parse(), Ok(ProviderKind::AirQuality));
    /// assert_eq!("fire".parse(), Ok(ProviderKind::Wildfire));
    /// assert!("ozone".parse::<ProviderKind>().is_err());
    /// ```
    fn from_str(s: &str) -> ParseResult<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "air_quality" | "airquality" | "aq" | "aqi" => Ok(ProviderKind::AirQuality),
            "weather" => Ok(ProviderKind::Weather),
            "pollen" => Ok(ProviderKind::Pollen),
            "wildfire" | "fire" => Ok(ProviderKind::Wildfire),
            "radon" => Ok(ProviderKind::Radon),
            _ => Err(ParseError::UnknownKind(s.to_string())),
        }
    }
}

/// Where the data in an [`Observation`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSource {
    /// Fetched from the upstream provider during this request.
    Live,
    /// Served from the cache store within its TTL.
    Cached,
    /// Latest stored history record, returned because the live fetch failed.
    HistoricalFallback,
    /// Static regional estimate rather than a measurement.
    Estimated,
    /// No data could be obtained; the observation carries an error annotation.
    Unavailable,
}

impl DataSource {
    /// Stable identifier used in database rows.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Live => "live",
            DataSource::Cached => "cached",
            DataSource::HistoricalFallback => "historical-fallback",
            DataSource::Estimated => "estimated",
            DataSource::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        match s {
            "live" => Ok(DataSource::Live),
            "cached" => Ok(DataSource::Cached),
            "historical-fallback" => Ok(DataSource::HistoricalFallback),
            "estimated" => Ok(DataSource::Estimated),
            "unavailable" => Ok(DataSource::Unavailable),
            _ => Err(ParseError::UnknownSource(s.to_string())),
        }
    }
}

/// A WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees, -90 to 90.
    pub latitude: f64,
    /// Longitude in degrees, -180 to 180.
    pub longitude: f64,
}

impl Coordinates {
    /// Create validated coordinates.
    ///
    /// ```
    /// use envwatch_types::Coordinates;
    ///
    /// assert!(Coordinates::new(47.6062, -122.3321).is_ok());
    /// assert!(Coordinates::new(91.0, 0.0).is_err());
    /// assert!(Coordinates::new(0.0, f64::NAN).is_err());
    /// ```
    pub fn new(latitude: f64, longitude: f64) -> ParseResult<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        if valid {
            Ok(Self {
                latitude,
                longitude,
            })
        } else {
            Err(ParseError::InvalidCoordinates {
                latitude,
                longitude,
            })
        }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4},{:.4}", self.latitude, self.longitude)
    }
}

/// A user-saved location tracked over time ("pin").
///
/// Owned by the pin-management collaborator; envwatch only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredLocation {
    /// Location identifier.
    pub id: String,
    /// Identifier of the owning user.
    pub owner_id: String,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Whether the scheduler should collect for this location.
    pub active: bool,
}

impl MonitoredLocation {
    /// The location's point.
    #[must_use]
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// Reference to this location for embedding in observations.
    #[must_use]
    pub fn location_ref(&self) -> LocationRef {
        LocationRef::location(&self.id, self.coordinates())
    }
}

/// Weak reference to the place an observation describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRef {
    /// Monitored location identifier, absent for ad-hoc coordinate lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    /// Point the observation was requested for.
    #[serde(flatten)]
    pub coordinates: Coordinates,
}

impl LocationRef {
    /// Reference to a monitored location.
    pub fn location(id: impl Into<String>, coordinates: Coordinates) -> Self {
        Self {
            location_id: Some(id.into()),
            coordinates,
        }
    }

    /// Reference to bare coordinates.
    #[must_use]
    pub fn point(coordinates: Coordinates) -> Self {
        Self {
            location_id: None,
            coordinates,
        }
    }
}

/// Kind-specific measurements carried by an [`Observation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Measurement {
    AirQuality(AirQuality),
    Weather(Weather),
    Pollen(Pollen),
    Wildfire(Wildfire),
    Radon(Radon),
}

impl Measurement {
    /// Provider kind this measurement belongs to.
    #[must_use]
    pub fn kind(&self) -> ProviderKind {
        match self {
            Measurement::AirQuality(_) => ProviderKind::AirQuality,
            Measurement::Weather(_) => ProviderKind::Weather,
            Measurement::Pollen(_) => ProviderKind::Pollen,
            Measurement::Wildfire(_) => ProviderKind::Wildfire,
            Measurement::Radon(_) => ProviderKind::Radon,
        }
    }
}

/// Canonical, kind-tagged environmental reading.
///
/// An observation either carries `data` or, when nothing could be obtained,
/// carries `error` with `source` set to [`DataSource::Unavailable`]. Missing
/// measurements are never filled in with placeholder values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Provider kind.
    pub kind: ProviderKind,
    /// Location the observation describes.
    pub location: LocationRef,
    /// When the data was obtained from its source.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Origin of the data.
    pub source: DataSource,
    /// Error annotation for degraded results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Measurements, absent when unavailable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Measurement>,
}

impl Observation {
    /// Create an observation carrying measurements.
    #[must_use]
    pub fn new(
        location: LocationRef,
        timestamp: OffsetDateTime,
        source: DataSource,
        data: Measurement,
    ) -> Self {
        Self {
            kind: data.kind(),
            location,
            timestamp,
            source,
            error: None,
            data: Some(data),
        }
    }

    /// Create an explicit "no data" observation.
    pub fn unavailable(
        kind: ProviderKind,
        location: LocationRef,
        timestamp: OffsetDateTime,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            location,
            timestamp,
            source: DataSource::Unavailable,
            error: Some(reason.into()),
            data: None,
        }
    }

    /// Whether the observation carries measurements.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.data.is_some()
    }

    /// Whether the observation is anything other than a fresh fetch or estimate.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !matches!(self.source, DataSource::Live | DataSource::Estimated)
    }

    /// Air quality measurements, if this is an air quality observation.
    #[must_use]
    pub fn air_quality(&self) -> Option<&AirQuality> {
        match &self.data {
            Some(Measurement::AirQuality(aq)) => Some(aq),
            _ => None,
        }
    }

    /// Weather measurements, if this is a weather observation.
    #[must_use]
    pub fn weather(&self) -> Option<&Weather> {
        match &self.data {
            Some(Measurement::Weather(w)) => Some(w),
            _ => None,
        }
    }

    /// Pollen measurements, if this is a pollen observation.
    #[must_use]
    pub fn pollen(&self) -> Option<&Pollen> {
        match &self.data {
            Some(Measurement::Pollen(p)) => Some(p),
            _ => None,
        }
    }

    /// Wildfire measurements, if this is a wildfire observation.
    #[must_use]
    pub fn wildfire(&self) -> Option<&Wildfire> {
        match &self.data {
            Some(Measurement::Wildfire(w)) => Some(w),
            _ => None,
        }
    }

    /// Radon measurements, if this is a radon observation.
    #[must_use]
    pub fn radon(&self) -> Option<&Radon> {
        match &self.data {
            Some(Measurement::Radon(r)) => Some(r),
            _ => None,
        }
    }
}
