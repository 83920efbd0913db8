//! Kind-specific measurement payloads and their level enums.
//!
//! Fields the upstream source may omit are `Option`s. A `None` means the
//! source did not report the value, never that the value is zero.

use core::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Six-bucket air quality category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    /// Human-readable label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }

    /// Display color as a hex string.
    #[must_use]
    pub fn color(&self) -> &'static str {
        match self {
            AqiCategory::Good => "#00E400",
            AqiCategory::Moderate => "#FFFF00",
            AqiCategory::UnhealthyForSensitiveGroups => "#FF7E00",
            AqiCategory::Unhealthy => "#FF0000",
            AqiCategory::VeryUnhealthy => "#8F3F97",
            AqiCategory::Hazardous => "#7E0023",
        }
    }
}

impl fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pollutant concentrations as reported by the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pollutants {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm25: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm10: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub o3: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub so2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co: Option<f64>,
}

/// Air quality measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQuality {
    /// Index value.
    pub index: u16,
    /// Code of the index the value came from (e.g. `uaqi`, `epa_pm25`).
    pub index_code: String,
    /// Category derived from the index.
    pub category: AqiCategory,
    /// Category color.
    pub color: String,
    /// Dominant pollutant code, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_pollutant: Option<String>,
    /// Per-pollutant concentrations.
    #[serde(default)]
    pub pollutants: Pollutants,
    /// Hourly outlook, oldest first. Empty unless requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forecast: Vec<HourlyAirQuality>,
}

/// One hour of an air quality forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyAirQuality {
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub index: u16,
    pub category: AqiCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm25: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm10: Option<f64>,
}

/// Generic severity scale for alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Extreme,
}

/// UV exposure risk bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UvRisk {
    Low,
    Moderate,
    High,
    VeryHigh,
    Extreme,
}

/// Category of a weather alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Heat,
    Cold,
    Uv,
    Humidity,
    Visibility,
    Stagnation,
}

/// A derived weather alert with static guidance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherAlert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub title: String,
    pub recommendation: String,
}

/// Atmospheric stagnation indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stagnation {
    /// Whether stagnation conditions hold.
    pub active: bool,
    /// Severity while active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

/// Daily forecast summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_c: Option<f64>,
    pub icon: String,
    /// Probability of precipitation, 0.0 to 1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precipitation_probability: Option<f64>,
}

/// Weather measurements and derived indicators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub temperature_c: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feels_like_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure_hpa: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_speed_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uv_index: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_cover_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Normalized icon identifier.
    pub icon: String,
    /// Dew point (Magnus approximation), when humidity is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dew_point_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uv_risk: Option<UvRisk>,
    #[serde(default)]
    pub stagnation: Stagnation,
    pub heat_wave: bool,
    pub cold_wave: bool,
    #[serde(default)]
    pub alerts: Vec<WeatherAlert>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forecast: Vec<DailyForecast>,
}

/// Pollen plant family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollenFamily {
    Tree,
    Grass,
    Weed,
}

/// Four-bucket pollen risk label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollenRisk {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl PollenRisk {
    /// Human-readable label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            PollenRisk::Low => "Low",
            PollenRisk::Moderate => "Moderate",
            PollenRisk::High => "High",
            PollenRisk::VeryHigh => "Very High",
        }
    }
}

/// Index reported for a single plant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantIndex {
    pub code: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<PollenFamily>,
    pub index: u8,
}

/// Pollen measurements aggregated by family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pollen {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grass: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weed: Option<u8>,
    /// Maximum across families.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<PollenRisk>,
    #[serde(default)]
    pub plants: Vec<PlantIndex>,
}

/// Which fire feed produced a wildfire count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FireFeed {
    /// Satellite hotspot detections.
    Satellite,
    /// Government incident reports.
    Incidents,
}

/// Active fires within a radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wildfire {
    pub radius_km: f64,
    pub fire_count: u32,
    pub feed: FireFeed,
}

/// EPA radon zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadonZone {
    /// Highest potential.
    Zone1,
    /// Moderate potential.
    Zone2,
    /// Low potential.
    Zone3,
}

impl RadonZone {
    /// Zone number, 1 to 3.
    #[must_use]
    pub fn number(&self) -> u8 {
        match self {
            RadonZone::Zone1 => 1,
            RadonZone::Zone2 => 2,
            RadonZone::Zone3 => 3,
        }
    }

    /// Predicted average indoor screening level.
    #[must_use]
    pub fn predicted_level(&self) -> &'static str {
        match self {
            RadonZone::Zone1 => "greater than 4 pCi/L",
            RadonZone::Zone2 => "between 2 and 4 pCi/L",
            RadonZone::Zone3 => "less than 2 pCi/L",
        }
    }
}

/// Regional radon risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Radon {
    pub zone: RadonZone,
    /// Region the zone was taken from.
    pub region: String,
    pub predicted_level: String,
}
