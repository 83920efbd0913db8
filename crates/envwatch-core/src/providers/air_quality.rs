//! Air quality from the Google Air Quality API.
//!
//! The upstream returns several indexes (universal plus local ones). The
//! universal index (`uaqi`) is selected. When it is missing but a PM2.5
//! concentration is reported, the EPA PM2.5 index is computed instead.
//!
//! With `forecast_hours` set, an hourly outlook starting at the next whole
//! hour is requested as well. A failed outlook leaves the current
//! conditions intact with an empty forecast.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, Time};
use tracing::{debug, warn};

use envwatch_types::{
    AirQuality, Coordinates, HourlyAirQuality, Measurement, Pollutants, ProviderKind,
};

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::http::{HttpRequest, HttpTransport, fetch_json};
use crate::providers::{Provider, ProviderSettings};
use crate::thresholds::{AqiThresholds, aqi_from_pm25};

/// Default upstream.
pub const DEFAULT_BASE_URL: &str = "https://airquality.googleapis.com";
/// Default cache TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);
/// Longest hourly outlook the upstream offers.
pub const MAX_FORECAST_HOURS: u8 = 96;

const UNIVERSAL_INDEX: &str = "uaqi";
const PM25_INDEX: &str = "epa_pm25";

/// Canonical pollutant fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollutantField {
    Pm25,
    Pm10,
    O3,
    No2,
    So2,
    Co,
}

impl PollutantField {
    fn slot(self, pollutants: &mut Pollutants) -> &mut Option<f64> {
        match self {
            PollutantField::Pm25 => &mut pollutants.pm25,
            PollutantField::Pm10 => &mut pollutants.pm10,
            PollutantField::O3 => &mut pollutants.o3,
            PollutantField::No2 => &mut pollutants.no2,
            PollutantField::So2 => &mut pollutants.so2,
            PollutantField::Co => &mut pollutants.co,
        }
    }
}

/// Upstream pollutant code to canonical field.
pub const POLLUTANT_TABLE: [(&str, PollutantField); 6] = [
    ("pm25", PollutantField::Pm25),
    ("pm10", PollutantField::Pm10),
    ("o3", PollutantField::O3),
    ("no2", PollutantField::No2),
    ("so2", PollutantField::So2),
    ("co", PollutantField::Co),
];

/// Canonical field for an upstream pollutant code.
#[must_use]
pub fn pollutant_field(code: &str) -> Option<PollutantField> {
    let code = code.to_ascii_lowercase();
    POLLUTANT_TABLE
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, field)| *field)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConditionsResponse {
    #[serde(default)]
    indexes: Vec<IndexEntry>,
    #[serde(default)]
    pollutants: Vec<PollutantEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexEntry {
    code: String,
    aqi: Option<f64>,
    dominant_pollutant: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PollutantEntry {
    code: String,
    concentration: Option<Concentration>,
}

#[derive(Debug, Deserialize)]
struct Concentration {
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ForecastResponse {
    #[serde(default)]
    hourly_forecasts: Vec<HourlyEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HourlyEntry {
    #[serde(with = "time::serde::rfc3339")]
    date_time: OffsetDateTime,
    #[serde(default)]
    indexes: Vec<IndexEntry>,
    #[serde(default)]
    pollutants: Vec<PollutantEntry>,
}

fn collect_pollutants(entries: &[PollutantEntry]) -> Pollutants {
    let mut pollutants = Pollutants::default();
    for entry in entries {
        let value = entry.concentration.as_ref().and_then(|c| c.value);
        if let (Some(field), Some(value)) = (pollutant_field(&entry.code), value) {
            *field.slot(&mut pollutants) = Some(value);
        }
    }
    pollutants
}

/// Universal index if present, else the PM2.5-derived one.
fn resolve_index(
    indexes: &[IndexEntry],
    pollutants: &Pollutants,
) -> Option<(u16, &'static str, Option<String>)> {
    let universal = indexes
        .iter()
        .find(|i| i.code == UNIVERSAL_INDEX && i.aqi.is_some());
    match universal {
        Some(entry) => Some((
            entry.aqi.unwrap_or_default().round().clamp(0.0, f64::from(u16::MAX)) as u16,
            UNIVERSAL_INDEX,
            entry.dominant_pollutant.clone(),
        )),
        None => {
            let index = pollutants.pm25.and_then(aqi_from_pm25)?;
            Some((index, PM25_INDEX, Some("pm25".to_string())))
        }
    }
}

/// Transform an upstream response into canonical measurements.
pub(crate) fn transform(
    response: ConditionsResponse,
    thresholds: &AqiThresholds,
) -> Result<AirQuality> {
    let pollutants = collect_pollutants(&response.pollutants);
    let (index, index_code, dominant) = resolve_index(&response.indexes, &pollutants)
        .ok_or_else(|| {
            Error::NoDataAvailable("no universal index or PM2.5 concentration".into())
        })?;
    if index_code == PM25_INDEX {
        debug!("No universal AQI in response, derived {} from PM2.5", index);
    }

    let category = thresholds.evaluate(index);
    Ok(AirQuality {
        index,
        index_code: index_code.to_string(),
        category,
        color: category.color().to_string(),
        dominant_pollutant: dominant,
        pollutants,
        forecast: Vec::new(),
    })
}

/// Hours with an index, oldest first, at most `hours` of them. Hours with
/// neither index nor PM2.5 are dropped.
pub(crate) fn transform_forecast(
    response: ForecastResponse,
    hours: u8,
    thresholds: &AqiThresholds,
) -> Vec<HourlyAirQuality> {
    let mut forecast: Vec<HourlyAirQuality> = response
        .hourly_forecasts
        .into_iter()
        .filter_map(|hour| {
            let pollutants = collect_pollutants(&hour.pollutants);
            let (index, _, _) = resolve_index(&hour.indexes, &pollutants)?;
            Some(HourlyAirQuality {
                time: hour.date_time,
                index,
                category: thresholds.evaluate(index),
                pm25: pollutants.pm25,
                pm10: pollutants.pm10,
            })
        })
        .collect();
    forecast.sort_by_key(|h| h.time);
    forecast.truncate(usize::from(hours));
    forecast
}

/// Start of the hour after `now`.
fn next_hour(now: OffsetDateTime) -> OffsetDateTime {
    let floor = now.replace_time(Time::MIDNIGHT) + time::Duration::hours(i64::from(now.hour()));
    floor + time::Duration::HOUR
}

/// Air quality provider.
pub struct AirQualityProvider {
    settings: ProviderSettings,
    transport: Arc<dyn HttpTransport>,
    thresholds: AqiThresholds,
    forecast_hours: u8,
    clock: Arc<dyn Clock>,
}

impl AirQualityProvider {
    pub fn new(settings: ProviderSettings, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            settings,
            transport,
            thresholds: AqiThresholds::default(),
            forecast_hours: 0,
            clock: Arc::new(SystemClock),
        }
    }

    /// Override the category thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: AqiThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Include an hourly outlook of up to `hours` hours (capped at
    /// [`MAX_FORECAST_HOURS`]).
    #[must_use]
    pub fn with_forecast_hours(mut self, hours: u8) -> Self {
        self.forecast_hours = hours.min(MAX_FORECAST_HOURS);
        self
    }

    /// Clock the forecast window is computed from.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn forecast(&self, key: &str, at: Coordinates) -> Result<Vec<HourlyAirQuality>> {
        let start = next_hour(self.clock.now());
        let end = start + time::Duration::hours(i64::from(self.forecast_hours) - 1);
        let format = |t: OffsetDateTime| {
            t.format(&Rfc3339)
                .map_err(|e| Error::invalid_config(format!("unformattable forecast time: {e}")))
        };

        let request = HttpRequest::post(self.settings.url("v1/forecast:lookup"))
            .query("key", key)
            .json(json!({
                "location": { "latitude": at.latitude, "longitude": at.longitude },
                "period": { "startTime": format(start)?, "endTime": format(end)? },
                "pageSize": self.forecast_hours,
                "universalAqi": true,
                "extraComputations": ["POLLUTANT_CONCENTRATION"],
            }))
            .timeout(self.settings.timeout);

        let response: ForecastResponse =
            fetch_json(self.transport.as_ref(), self.name(), request).await?;
        Ok(transform_forecast(response, self.forecast_hours, &self.thresholds))
    }
}

#[async_trait]
impl Provider for AirQualityProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AirQuality
    }

    fn name(&self) -> &str {
        "google-air-quality"
    }

    fn ttl(&self) -> Duration {
        self.settings.ttl
    }

    fn cache_params(&self) -> Vec<(&'static str, String)> {
        if self.forecast_hours == 0 {
            Vec::new()
        } else {
            vec![("hours", self.forecast_hours.to_string())]
        }
    }

    async fn fetch(&self, at: Coordinates) -> Result<Measurement> {
        let key = self.settings.require_key(self.name())?;
        let request = HttpRequest::post(self.settings.url("v1/currentConditions:lookup"))
            .query("key", key)
            .json(json!({
                "location": { "latitude": at.latitude, "longitude": at.longitude },
                "universalAqi": true,
                "extraComputations": ["POLLUTANT_CONCENTRATION", "DOMINANT_POLLUTANT_CONCENTRATION"],
            }))
            .timeout(self.settings.timeout);

        let response: ConditionsResponse =
            fetch_json(self.transport.as_ref(), self.name(), request).await?;
        let mut current = transform(response, &self.thresholds)?;

        if self.forecast_hours > 0 {
            match self.forecast(key, at).await {
                Ok(forecast) => current.forecast = forecast,
                Err(e) => warn!("Air quality forecast failed near {}: {}", at, e),
            }
        }
        Ok(Measurement::AirQuality(current))
    }
}

/// How to combine several air quality readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    /// Confidence-weighted mean.
    WeightedAverage,
    /// Per-field median.
    Median,
    /// Per-field maximum.
    WorstCase,
}

/// Combine readings from several sources into one.
///
/// Each reading carries a confidence weight, used only by
/// [`AggregationMethod::WeightedAverage`]. Pollutant fields combine only
/// the readings that report them; a field nobody reports stays `None`.
pub fn aggregate_air_quality(
    readings: &[(AirQuality, f64)],
    method: AggregationMethod,
    thresholds: &AqiThresholds,
) -> Result<AirQuality> {
    match readings {
        [] => return Err(Error::NoDataAvailable("no readings to aggregate".into())),
        [(single, _)] => return Ok(single.clone()),
        _ => {}
    }
    if method == AggregationMethod::WeightedAverage
        && readings.iter().any(|(_, w)| !w.is_finite() || *w < 0.0)
    {
        return Err(Error::invalid_config("aggregation weights must be non-negative"));
    }

    let combine = |values: Vec<(f64, f64)>| -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match method {
            AggregationMethod::WeightedAverage => {
                let total: f64 = values.iter().map(|(_, w)| w).sum();
                if total > 0.0 {
                    Some(values.iter().map(|(v, w)| v * w).sum::<f64>() / total)
                } else {
                    Some(values.iter().map(|(v, _)| v).sum::<f64>() / values.len() as f64)
                }
            }
            AggregationMethod::Median => {
                let mut sorted: Vec<f64> = values.into_iter().map(|(v, _)| v).collect();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                Some(if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                })
            }
            AggregationMethod::WorstCase => values.into_iter().map(|(v, _)| v).reduce(f64::max),
        }
    };

    let field = |f: PollutantField| {
        combine(
            readings
                .iter()
                .filter_map(|(aq, w)| {
                    let mut p = aq.pollutants.clone();
                    f.slot(&mut p).map(|v| (v, *w))
                })
                .collect(),
        )
    };

    let index = combine(
        readings
            .iter()
            .map(|(aq, w)| (f64::from(aq.index), *w))
            .collect(),
    )
    .unwrap_or_default()
    .round() as u16;

    let mut pollutants = Pollutants::default();
    for (_, f) in POLLUTANT_TABLE {
        *f.slot(&mut pollutants) = field(f);
    }

    let dominant = readings
        .iter()
        .max_by_key(|(aq, _)| aq.index)
        .and_then(|(aq, _)| aq.dominant_pollutant.clone());
    let category = thresholds.evaluate(index);

    Ok(AirQuality {
        index,
        index_code: "aggregate".to_string(),
        category,
        color: category.color().to_string(),
        dominant_pollutant: dominant,
        pollutants,
        forecast: Vec::new(),
    })
}
