//! Service configuration.
//!
//! Every section is optional; an empty file yields the defaults below.
//!
//! ```toml
//! [storage]
//! path = "~/.local/share/envwatch/data.db"
//!
//! [collection]
//! cadence = "@hourly"
//! cache_prune_cadence = "@every 6h"
//! history_prune_cadence = "@daily"
//! retention_days = 30
//! pollen_dedupe_hours = 2
//! max_concurrency = 8
//!
//! [providers.air_quality]
//! forecast_hours = 24
//! fetch_timeout_secs = 45  # whole lookup, retries included
//!
//! [providers.weather]
//! api_key = "..."          # or ENVWATCH_WEATHER_API_KEY
//! forecast_days = 3
//!
//! [providers.wildfire]
//! radius_km = 80.0
//! sensor = "MODIS_NRT"
//!
//! [providers.radon]
//! enabled = false
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use envwatch_core::{Clock, DEFAULT_FETCH_TIMEOUT, HttpTransport};
use envwatch_core::providers::{
    AirQualityProvider, PollenProvider, Provider, ProviderSettings, RadonProvider,
    WeatherProvider, WildfireProvider, air_quality, pollen, weather, wildfire,
};
use envwatch_core::default_ttl;
use envwatch_types::ProviderKind;

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage settings.
    pub storage: StorageConfig,
    /// Collection scheduling and retention.
    pub collection: CollectionConfig,
    /// Per-provider settings.
    pub providers: ProvidersConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every error found.
    ///
    /// # Example
    ///
    /// ```
    /// use envwatch_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.storage.validate());
        errors.extend(self.collection.validate());
        errors.extend(self.providers.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: envwatch_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }
        errors
    }
}

/// Collection cadence and retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// How often every active location is collected.
    pub cadence: String,
    /// How often expired cache entries are purged.
    pub cache_prune_cadence: String,
    /// How often old history and expired sessions are deleted.
    pub history_prune_cadence: String,
    /// History older than this many days is pruned.
    pub retention_days: u32,
    /// Skip pollen for a location with a record newer than this.
    pub pollen_dedupe_hours: u32,
    /// Maximum (location, provider) cells fetched at once.
    pub max_concurrency: usize,
}

/// Default history retention in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;
/// Upper bound on `max_concurrency`.
pub const MAX_CONCURRENCY: usize = 64;

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            cadence: "@hourly".to_string(),
            cache_prune_cadence: "@every 6h".to_string(),
            history_prune_cadence: "@daily".to_string(),
            retention_days: DEFAULT_RETENTION_DAYS,
            pollen_dedupe_hours: 2,
            max_concurrency: 8,
        }
    }
}

impl CollectionConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (field, expr) in [
            ("collection.cadence", &self.cadence),
            ("collection.cache_prune_cadence", &self.cache_prune_cadence),
            ("collection.history_prune_cadence", &self.history_prune_cadence),
        ] {
            if let Err(message) = parse_cadence(expr) {
                errors.push(ValidationError::new(field, message));
            }
        }

        if self.retention_days == 0 {
            errors.push(ValidationError::new(
                "collection.retention_days",
                "retention must be at least 1 day",
            ));
        }

        if self.max_concurrency == 0 || self.max_concurrency > MAX_CONCURRENCY {
            errors.push(ValidationError::new(
                "collection.max_concurrency",
                format!(
                    "max_concurrency {} must be between 1 and {}",
                    self.max_concurrency, MAX_CONCURRENCY
                ),
            ));
        }

        errors
    }
}

/// Parse a cadence expression.
///
/// Accepts `@hourly`, `@daily` and `@every <n><unit>` with unit `s`, `m`,
/// `h` or `d`.
///
/// ```
/// use std::time::Duration;
/// use envwatch_service::config::parse_cadence;
///
/// assert_eq!(parse_cadence("@every 6h"), Ok(Duration::from_secs(6 * 3600)));
/// assert!(parse_cadence("hourly").is_err());
/// ```
pub fn parse_cadence(expr: &str) -> Result<Duration, String> {
    let expr = expr.trim();
    match expr {
        "@hourly" => return Ok(Duration::from_secs(3600)),
        "@daily" => return Ok(Duration::from_secs(86_400)),
        _ => {}
    }

    let Some(interval) = expr.strip_prefix("@every") else {
        return Err(format!(
            "invalid cadence '{}': expected @hourly, @daily or @every <n>{{s|m|h|d}}",
            expr
        ));
    };
    let interval = interval.trim();
    let Some((split, _)) = interval.char_indices().last().filter(|(i, _)| *i > 0) else {
        return Err(format!("invalid cadence '{}': missing interval", expr));
    };

    let (count, unit) = interval.split_at(split);
    let count: u64 = count
        .trim()
        .parse()
        .map_err(|_| format!("invalid cadence '{}': '{}' is not a number", expr, count))?;
    let unit_secs = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86_400,
        other => {
            return Err(format!(
                "invalid cadence '{}': unknown unit '{}' (use s, m, h or d)",
                expr, other
            ));
        }
    };
    if count == 0 {
        return Err(format!("invalid cadence '{}': interval must be positive", expr));
    }

    count
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("invalid cadence '{}': interval too large", expr))
}

/// Settings shared by every provider section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Whether the provider takes part in lookups and collection.
    pub enabled: bool,
    /// Override the upstream base URL.
    pub base_url: Option<String>,
    /// API key. Falls back to `ENVWATCH_<KIND>_API_KEY`.
    pub api_key: Option<String>,
    /// Override the cache TTL in seconds.
    pub ttl_secs: Option<u64>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Budget in seconds for a whole live lookup, retries included.
    pub fetch_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            api_key: None,
            ttl_secs: None,
            timeout_secs: 10,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
        }
    }
}

/// Environment variable holding the API key for a provider kind.
pub fn api_key_env_var(kind: ProviderKind) -> String {
    format!("ENVWATCH_{}_API_KEY", kind.as_str().to_uppercase())
}

impl ProviderConfig {
    pub fn validate(&self, prefix: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Some(url) = &self.base_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            errors.push(ValidationError::new(
                format!("{}.base_url", prefix),
                format!("invalid URL '{}': must start with http:// or https://", url),
            ));
        }

        if self.ttl_secs == Some(0) {
            errors.push(ValidationError::new(
                format!("{}.ttl_secs", prefix),
                "ttl must be positive",
            ));
        }

        if self.timeout_secs == 0 {
            errors.push(ValidationError::new(
                format!("{}.timeout_secs", prefix),
                "timeout must be positive",
            ));
        }

        if self.fetch_timeout_secs < self.timeout_secs.max(1) {
            errors.push(ValidationError::new(
                format!("{}.fetch_timeout_secs", prefix),
                format!(
                    "fetch timeout {}s must be positive and at least timeout_secs ({}s)",
                    self.fetch_timeout_secs, self.timeout_secs
                ),
            ));
        }

        errors
    }

    /// The configured key, or the one from the environment.
    pub fn resolve_api_key(&self, kind: ProviderKind) -> Option<String> {
        self.resolve_api_key_with(kind, |var| std::env::var(var).ok())
    }

    /// Like [`resolve_api_key`](Self::resolve_api_key) with an explicit
    /// environment lookup.
    pub fn resolve_api_key_with(
        &self,
        kind: ProviderKind,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| lookup(&api_key_env_var(kind)).filter(|k| !k.is_empty()))
    }

    fn ttl(&self, kind: ProviderKind) -> Duration {
        self.ttl_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| default_ttl(kind))
    }

    fn settings(&self, kind: ProviderKind, default_base_url: &str) -> ProviderSettings {
        let mut settings = ProviderSettings::new(
            self.base_url.as_deref().unwrap_or(default_base_url),
            self.ttl(kind),
        )
        .timeout(Duration::from_secs(self.timeout_secs));
        if let Some(key) = self.resolve_api_key(kind) {
            settings = settings.api_key(key);
        }
        settings
    }
}

/// Air quality provider settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirQualityConfig {
    #[serde(flatten)]
    pub common: ProviderConfig,
    /// Hours of hourly outlook to include (0 disables the forecast).
    pub forecast_hours: u8,
}

/// Weather provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    #[serde(flatten)]
    pub common: ProviderConfig,
    /// Days of daily forecast to include (0 disables the forecast).
    pub forecast_days: u8,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            common: ProviderConfig::default(),
            forecast_days: 0,
        }
    }
}

/// Wildfire provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WildfireConfig {
    #[serde(flatten)]
    pub common: ProviderConfig,
    /// Search radius around the point.
    pub radius_km: f64,
    /// Incident feed used when the satellite feed has no rows.
    pub secondary_url: Option<String>,
    /// Satellite sensor product.
    pub sensor: String,
    /// Days of satellite detections to search.
    pub day_range: u8,
}

impl Default for WildfireConfig {
    fn default() -> Self {
        Self {
            common: ProviderConfig::default(),
            radius_km: wildfire::DEFAULT_RADIUS_KM,
            secondary_url: None,
            sensor: wildfire::DEFAULT_SENSOR.to_string(),
            day_range: 1,
        }
    }
}

/// Per-provider sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub air_quality: AirQualityConfig,
    pub weather: WeatherConfig,
    pub pollen: ProviderConfig,
    pub wildfire: WildfireConfig,
    pub radon: ProviderConfig,
}

/// Maximum wildfire search radius in kilometers.
pub const MAX_RADIUS_KM: f64 = 500.0;

impl ProvidersConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        errors.extend(self.air_quality.common.validate("providers.air_quality"));
        errors.extend(self.weather.common.validate("providers.weather"));
        errors.extend(self.pollen.validate("providers.pollen"));
        errors.extend(self.wildfire.common.validate("providers.wildfire"));
        errors.extend(self.radon.validate("providers.radon"));

        if self.air_quality.forecast_hours > air_quality::MAX_FORECAST_HOURS {
            errors.push(ValidationError::new(
                "providers.air_quality.forecast_hours",
                format!(
                    "forecast_hours {} exceeds maximum of {}",
                    self.air_quality.forecast_hours,
                    air_quality::MAX_FORECAST_HOURS
                ),
            ));
        }

        if self.weather.forecast_days > weather::MAX_FORECAST_DAYS {
            errors.push(ValidationError::new(
                "providers.weather.forecast_days",
                format!(
                    "forecast_days {} exceeds maximum of {}",
                    self.weather.forecast_days,
                    weather::MAX_FORECAST_DAYS
                ),
            ));
        }

        let radius = self.wildfire.radius_km;
        if !radius.is_finite() || radius <= 0.0 || radius > MAX_RADIUS_KM {
            errors.push(ValidationError::new(
                "providers.wildfire.radius_km",
                format!("radius {} must be in (0, {}]", radius, MAX_RADIUS_KM),
            ));
        }

        if self.wildfire.sensor.is_empty() {
            errors.push(ValidationError::new(
                "providers.wildfire.sensor",
                "sensor cannot be empty",
            ));
        }

        if !(1..=wildfire::MAX_DAY_RANGE).contains(&self.wildfire.day_range) {
            errors.push(ValidationError::new(
                "providers.wildfire.day_range",
                format!(
                    "day_range {} must be between 1 and {}",
                    self.wildfire.day_range,
                    wildfire::MAX_DAY_RANGE
                ),
            ));
        }

        if let Some(url) = &self.wildfire.secondary_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            errors.push(ValidationError::new(
                "providers.wildfire.secondary_url",
                format!("invalid URL '{}': must start with http:// or https://", url),
            ));
        }

        errors
    }

    /// Settings shared by every provider, for `kind`.
    pub fn common(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::AirQuality => &self.air_quality.common,
            ProviderKind::Weather => &self.weather.common,
            ProviderKind::Pollen => &self.pollen,
            ProviderKind::Wildfire => &self.wildfire.common,
            ProviderKind::Radon => &self.radon,
        }
    }

    /// Whether `kind` is enabled.
    pub fn is_enabled(&self, kind: ProviderKind) -> bool {
        self.common(kind).enabled
    }

    /// Overall budget for one live lookup of `kind`.
    pub fn fetch_timeout(&self, kind: ProviderKind) -> Duration {
        Duration::from_secs(self.common(kind).fetch_timeout_secs)
    }

    /// Construct every enabled provider.
    pub fn build_providers(
        &self,
        transport: Arc<dyn HttpTransport>,
        clock: &Arc<dyn Clock>,
    ) -> Vec<Arc<dyn Provider>> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .map(|kind| self.build_provider(kind, Arc::clone(&transport), clock))
            .collect()
    }

    fn build_provider(
        &self,
        kind: ProviderKind,
        transport: Arc<dyn HttpTransport>,
        clock: &Arc<dyn Clock>,
    ) -> Arc<dyn Provider> {
        match kind {
            ProviderKind::AirQuality => Arc::new(
                AirQualityProvider::new(
                    self.air_quality.common.settings(kind, air_quality::DEFAULT_BASE_URL),
                    transport,
                )
                .with_forecast_hours(self.air_quality.forecast_hours)
                .with_clock(Arc::clone(clock)),
            ),
            ProviderKind::Weather => Arc::new(
                WeatherProvider::new(
                    self.weather.common.settings(kind, weather::DEFAULT_BASE_URL),
                    transport,
                )
                .with_forecast_days(self.weather.forecast_days),
            ),
            ProviderKind::Pollen => Arc::new(PollenProvider::new(
                self.pollen.settings(kind, pollen::DEFAULT_BASE_URL),
                transport,
            )),
            ProviderKind::Wildfire => {
                let mut provider = WildfireProvider::new(
                    self.wildfire.common.settings(kind, wildfire::DEFAULT_BASE_URL),
                    transport,
                )
                .with_radius_km(self.wildfire.radius_km)
                .with_sensor(&self.wildfire.sensor)
                .with_day_range(self.wildfire.day_range);
                if let Some(url) = &self.wildfire.secondary_url {
                    provider = provider.with_secondary_url(url);
                }
                Arc::new(provider)
            }
            ProviderKind::Radon => Arc::new(RadonProvider::new(self.radon.ttl(kind))),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `collection.cadence` or `providers.weather.base_url`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("envwatch")
        .join("service.toml")
}
