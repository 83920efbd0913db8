//! Weather from the OpenWeather One Call API.
//!
//! Besides mapping the raw fields, the transform derives dew point, UV
//! risk, atmospheric stagnation and heat/cold-wave flags, and from those
//! builds the alert list.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use time::OffsetDateTime;

use envwatch_types::{Coordinates, DailyForecast, Measurement, ProviderKind, Weather};

use crate::error::{Error, Result};
use crate::http::{HttpRequest, HttpTransport, fetch_json};
use crate::providers::{Provider, ProviderSettings};
use crate::thresholds::{
    AlertInputs, COLD_WAVE_C, HEAT_WAVE_C, dew_point_c, stagnation, uv_risk, weather_alerts,
};

/// Default upstream.
pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";
/// Default cache TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
/// Upstream returns at most eight daily entries.
pub const MAX_FORECAST_DAYS: u8 = 8;

/// Upstream icon code prefix to normalized icon id.
///
/// The trailing `d`/`n` of an upstream code selects day or night; only
/// clear and partly cloudy skies distinguish the two.
pub const ICON_TABLE: [(&str, &str, &str); 9] = [
    ("01", "clear-day", "clear-night"),
    ("02", "partly-cloudy-day", "partly-cloudy-night"),
    ("03", "cloudy", "cloudy"),
    ("04", "overcast", "overcast"),
    ("09", "showers", "showers"),
    ("10", "rain", "rain"),
    ("11", "thunderstorm", "thunderstorm"),
    ("13", "snow", "snow"),
    ("50", "fog", "fog"),
];

/// Normalized icon id for an upstream icon code such as `"10d"`.
#[must_use]
pub fn normalize_icon(code: &str) -> &'static str {
    let (prefix, suffix) = code.split_at(code.len().min(2));
    ICON_TABLE
        .iter()
        .find(|(p, _, _)| *p == prefix)
        .map(|(_, day, night)| if suffix == "n" { *night } else { *day })
        .unwrap_or("unknown")
}

#[derive(Debug, Deserialize)]
pub(crate) struct OneCallResponse {
    current: Option<Current>,
    #[serde(default)]
    daily: Vec<Daily>,
}

#[derive(Debug, Deserialize)]
struct Current {
    temp: Option<f64>,
    feels_like: Option<f64>,
    pressure: Option<f64>,
    humidity: Option<f64>,
    uvi: Option<f64>,
    clouds: Option<f64>,
    visibility: Option<f64>,
    wind_speed: Option<f64>,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct Condition {
    main: Option<String>,
    description: Option<String>,
    icon: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Daily {
    dt: i64,
    temp: Option<DailyTemp>,
    pop: Option<f64>,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct DailyTemp {
    min: Option<f64>,
    max: Option<f64>,
}

fn icon_of(conditions: &[Condition]) -> String {
    conditions
        .first()
        .and_then(|c| c.icon.as_deref())
        .map_or("unknown", normalize_icon)
        .to_string()
}

/// Transform an upstream response, keeping up to `forecast_days` days.
pub(crate) fn transform(
    provider: &str,
    response: OneCallResponse,
    forecast_days: u8,
) -> Result<Weather> {
    let current = response
        .current
        .ok_or_else(|| Error::malformed(provider, "missing current conditions"))?;
    let temperature_c = current
        .temp
        .ok_or_else(|| Error::malformed(provider, "missing current temperature"))?;

    let stagnation = stagnation(current.wind_speed, current.visibility, current.pressure);
    let alerts = weather_alerts(&AlertInputs {
        temperature_c,
        humidity_pct: current.humidity,
        uv_index: current.uvi,
        visibility_m: current.visibility,
        stagnation,
    });

    let mut forecast = Vec::new();
    for day in response.daily.iter().take(usize::from(forecast_days)) {
        let date = OffsetDateTime::from_unix_timestamp(day.dt)
            .map_err(|e| Error::malformed(provider, format!("bad forecast date: {e}")))?;
        forecast.push(DailyForecast {
            date,
            min_c: day.temp.as_ref().and_then(|t| t.min),
            max_c: day.temp.as_ref().and_then(|t| t.max),
            icon: icon_of(&day.weather),
            precipitation_probability: day.pop,
        });
    }

    let condition = current.weather.first();
    Ok(Weather {
        temperature_c,
        feels_like_c: current.feels_like,
        humidity_pct: current.humidity,
        pressure_hpa: current.pressure,
        wind_speed_ms: current.wind_speed,
        visibility_m: current.visibility,
        uv_index: current.uvi,
        cloud_cover_pct: current.clouds,
        condition: condition.and_then(|c| c.main.clone()),
        description: condition.and_then(|c| c.description.clone()),
        icon: icon_of(&current.weather),
        dew_point_c: current.humidity.and_then(|rh| dew_point_c(temperature_c, rh)),
        uv_risk: current.uvi.map(uv_risk),
        stagnation,
        heat_wave: temperature_c > HEAT_WAVE_C,
        cold_wave: temperature_c < COLD_WAVE_C,
        alerts,
        forecast,
    })
}

/// Weather provider.
pub struct WeatherProvider {
    settings: ProviderSettings,
    transport: Arc<dyn HttpTransport>,
    forecast_days: u8,
}

impl WeatherProvider {
    pub fn new(settings: ProviderSettings, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            settings,
            transport,
            forecast_days: 0,
        }
    }

    /// Include a daily forecast of up to `days` days (capped at
    /// [`MAX_FORECAST_DAYS`]).
    #[must_use]
    pub fn with_forecast_days(mut self, days: u8) -> Self {
        self.forecast_days = days.min(MAX_FORECAST_DAYS);
        self
    }
}

#[async_trait]
impl Provider for WeatherProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Weather
    }

    fn name(&self) -> &str {
        "openweather"
    }

    fn ttl(&self) -> Duration {
        self.settings.ttl
    }

    fn cache_params(&self) -> Vec<(&'static str, String)> {
        vec![("days", self.forecast_days.to_string())]
    }

    async fn fetch(&self, at: Coordinates) -> Result<Measurement> {
        let key = self.settings.require_key(self.name())?;
        let exclude = if self.forecast_days == 0 {
            "minutely,hourly,daily,alerts"
        } else {
            "minutely,hourly,alerts"
        };
        let request = HttpRequest::get(self.settings.url("data/3.0/onecall"))
            .query("lat", at.latitude)
            .query("lon", at.longitude)
            .query("appid", key)
            .query("units", "metric")
            .query("exclude", exclude)
            .timeout(self.settings.timeout);

        let response: OneCallResponse =
            fetch_json(self.transport.as_ref(), self.name(), request).await?;
        transform(self.name(), response, self.forecast_days).map(Measurement::Weather)
    }
}
