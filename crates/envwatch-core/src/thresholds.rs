//! Threshold tables that turn raw values into categories and alerts.
//!
//! Every boundary value belongs to the lower bucket: an AQI of exactly 50
//! is `Good`, a pollen index of exactly 2 is `Low`.
//!
//! # Example
//!
//! ```
//! use envwatch_core::thresholds::{AqiThresholds, aqi_from_pm25};
//! use envwatch_types::AqiCategory;
//!
//! let thresholds = AqiThresholds::default();
//! assert_eq!(thresholds.evaluate(50), AqiCategory::Good);
//! assert_eq!(thresholds.evaluate(51), AqiCategory::Moderate);
//!
//! // EPA PM2.5 breakpoints
//! assert_eq!(aqi_from_pm25(35.4), Some(100));
//! ```

use serde::{Deserialize, Serialize};

use envwatch_types::{
    AlertKind, AqiCategory, PollenRisk, Severity, Stagnation, UvRisk, WeatherAlert,
};

/// Upper bounds (inclusive) of the AQI buckets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AqiThresholds {
    pub good_max: u16,
    pub moderate_max: u16,
    pub sensitive_max: u16,
    pub unhealthy_max: u16,
    pub very_unhealthy_max: u16,
}

impl Default for AqiThresholds {
    fn default() -> Self {
        Self {
            good_max: 50,
            moderate_max: 100,
            sensitive_max: 150,
            unhealthy_max: 200,
            very_unhealthy_max: 300,
        }
    }
}

impl AqiThresholds {
    /// Bucket an index value.
    #[must_use]
    pub fn evaluate(&self, index: u16) -> AqiCategory {
        if index <= self.good_max {
            AqiCategory::Good
        } else if index <= self.moderate_max {
            AqiCategory::Moderate
        } else if index <= self.sensitive_max {
            AqiCategory::UnhealthyForSensitiveGroups
        } else if index <= self.unhealthy_max {
            AqiCategory::Unhealthy
        } else if index <= self.very_unhealthy_max {
            AqiCategory::VeryUnhealthy
        } else {
            AqiCategory::Hazardous
        }
    }
}

/// EPA PM2.5 breakpoints: (C_low, C_high, I_low, I_high).
const PM25_BREAKPOINTS: [(f64, f64, f64, f64); 6] = [
    (0.0, 12.0, 0.0, 50.0),
    (12.1, 35.4, 51.0, 100.0),
    (35.5, 55.4, 101.0, 150.0),
    (55.5, 150.4, 151.0, 200.0),
    (150.5, 250.4, 201.0, 300.0),
    (250.5, 500.4, 301.0, 500.0),
];

/// AQI for a PM2.5 concentration in µg/m³, by linear interpolation over
/// the EPA breakpoint table. Capped at 500. `None` for negative or
/// non-finite input.
#[must_use]
pub fn aqi_from_pm25(concentration: f64) -> Option<u16> {
    if !concentration.is_finite() || concentration < 0.0 {
        return None;
    }
    // EPA truncates to one decimal before lookup
    let c = (concentration * 10.0).floor() / 10.0;

    for (c_lo, c_hi, i_lo, i_hi) in PM25_BREAKPOINTS {
        if c <= c_hi {
            let c = c.max(c_lo);
            let index = (i_hi - i_lo) / (c_hi - c_lo) * (c - c_lo) + i_lo;
            return Some(index.round() as u16);
        }
    }
    Some(500)
}

/// Upper bounds (inclusive) of the pollen risk buckets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollenThresholds {
    pub low_max: u8,
    pub moderate_max: u8,
    pub high_max: u8,
}

impl Default for PollenThresholds {
    fn default() -> Self {
        Self {
            low_max: 2,
            moderate_max: 4,
            high_max: 6,
        }
    }
}

impl PollenThresholds {
    /// Bucket a pollen index.
    #[must_use]
    pub fn evaluate(&self, index: u8) -> PollenRisk {
        if index <= self.low_max {
            PollenRisk::Low
        } else if index <= self.moderate_max {
            PollenRisk::Moderate
        } else if index <= self.high_max {
            PollenRisk::High
        } else {
            PollenRisk::VeryHigh
        }
    }
}

/// WHO UV index bucket.
#[must_use]
pub fn uv_risk(uv_index: f64) -> UvRisk {
    if uv_index < 3.0 {
        UvRisk::Low
    } else if uv_index < 6.0 {
        UvRisk::Moderate
    } else if uv_index < 8.0 {
        UvRisk::High
    } else if uv_index < 11.0 {
        UvRisk::VeryHigh
    } else {
        UvRisk::Extreme
    }
}

/// Dew point in °C using the Magnus approximation.
///
/// `None` when humidity is outside (0, 100].
#[must_use]
pub fn dew_point_c(temperature_c: f64, humidity_pct: f64) -> Option<f64> {
    const A: f64 = 17.27;
    const B: f64 = 237.7;

    if !(humidity_pct > 0.0 && humidity_pct <= 100.0) {
        return None;
    }
    let gamma = (A * temperature_c) / (B + temperature_c) + (humidity_pct / 100.0).ln();
    Some((B * gamma) / (A - gamma))
}

/// Temperature above which a heat wave is flagged.
pub const HEAT_WAVE_C: f64 = 35.0;
/// Temperature below which a cold wave is flagged.
pub const COLD_WAVE_C: f64 = -10.0;

/// Atmospheric stagnation: light wind, poor visibility and high pressure
/// together trap pollutants near the ground.
///
/// Requires all three inputs; any missing input yields an inactive flag.
#[must_use]
pub fn stagnation(
    wind_speed_ms: Option<f64>,
    visibility_m: Option<f64>,
    pressure_hpa: Option<f64>,
) -> Stagnation {
    match (wind_speed_ms, visibility_m, pressure_hpa) {
        (Some(wind), Some(visibility), Some(pressure))
            if wind < 3.0 && visibility < 5000.0 && pressure > 1020.0 =>
        {
            Stagnation {
                active: true,
                severity: Some(if wind < 1.0 {
                    Severity::High
                } else {
                    Severity::Moderate
                }),
            }
        }
        _ => Stagnation::default(),
    }
}

/// Inputs for [`weather_alerts`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertInputs {
    pub temperature_c: f64,
    pub humidity_pct: Option<f64>,
    pub uv_index: Option<f64>,
    pub visibility_m: Option<f64>,
    pub stagnation: Stagnation,
}

fn alert(kind: AlertKind, severity: Severity, title: &str, recommendation: &str) -> WeatherAlert {
    WeatherAlert {
        kind,
        severity,
        title: title.to_string(),
        recommendation: recommendation.to_string(),
    }
}

/// Build the alert list for a weather reading.
#[must_use]
pub fn weather_alerts(inputs: &AlertInputs) -> Vec<WeatherAlert> {
    let mut alerts = Vec::new();
    let t = inputs.temperature_c;

    if t >= 40.0 {
        alerts.push(alert(
            AlertKind::Heat,
            Severity::Extreme,
            "Extreme heat",
            "Avoid outdoor activity and stay in a cooled space. Drink water regularly.",
        ));
    } else if t > HEAT_WAVE_C {
        alerts.push(alert(
            AlertKind::Heat,
            Severity::High,
            "Heat wave",
            "Limit strenuous activity to early morning or evening and stay hydrated.",
        ));
    }

    if t <= -20.0 {
        alerts.push(alert(
            AlertKind::Cold,
            Severity::Extreme,
            "Extreme cold",
            "Avoid prolonged exposure. Frostbite can develop within minutes on bare skin.",
        ));
    } else if t < COLD_WAVE_C {
        alerts.push(alert(
            AlertKind::Cold,
            Severity::High,
            "Cold wave",
            "Dress in layers and cover exposed skin outdoors.",
        ));
    }

    if let Some(uv) = inputs.uv_index {
        match uv_risk(uv) {
            UvRisk::Extreme => alerts.push(alert(
                AlertKind::Uv,
                Severity::Extreme,
                "Extreme UV",
                "Stay in shade around midday. Unprotected skin burns in minutes.",
            )),
            UvRisk::VeryHigh => alerts.push(alert(
                AlertKind::Uv,
                Severity::High,
                "Very high UV",
                "Use sunscreen, a hat and sunglasses, and seek shade at midday.",
            )),
            UvRisk::High => alerts.push(alert(
                AlertKind::Uv,
                Severity::Moderate,
                "High UV",
                "Apply sunscreen before spending time outdoors.",
            )),
            UvRisk::Low | UvRisk::Moderate => {}
        }
    }

    if let Some(humidity) = inputs.humidity_pct {
        if humidity >= 90.0 {
            alerts.push(alert(
                AlertKind::Humidity,
                Severity::High,
                "Very high humidity",
                "Sweat evaporates poorly. Take frequent breaks during exertion.",
            ));
        } else if humidity >= 80.0 {
            alerts.push(alert(
                AlertKind::Humidity,
                Severity::Moderate,
                "High humidity",
                "Expect higher perceived temperatures during exercise.",
            ));
        } else if humidity <= 20.0 {
            alerts.push(alert(
                AlertKind::Humidity,
                Severity::Moderate,
                "Very dry air",
                "Drink more water than usual. Dry air can irritate airways.",
            ));
        }
    }

    if let Some(visibility) = inputs.visibility_m {
        if visibility < 1000.0 {
            alerts.push(alert(
                AlertKind::Visibility,
                Severity::High,
                "Dense fog",
                "Visibility under 1 km. Wear reflective gear near roads.",
            ));
        } else if visibility < 5000.0 {
            alerts.push(alert(
                AlertKind::Visibility,
                Severity::Moderate,
                "Reduced visibility",
                "Take extra care near traffic.",
            ));
        }
    }

    if inputs.stagnation.active {
        alerts.push(alert(
            AlertKind::Stagnation,
            inputs.stagnation.severity.unwrap_or(Severity::Moderate),
            "Stagnant air",
            "Pollutants may build up near the ground. Consider moving outdoor exercise indoors.",
        ));
    }

    alerts
}
