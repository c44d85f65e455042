//! Daily weather for a plant's location.
//!
//! Weather is advisory input to the rules and never blocks a cycle: every
//! provider is infallible and degrades to [`Weather::safe_defaults`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::WeatherConfig;
use crate::error::{Result, TaniclawError};
use crate::memory::Memory;

pub const HEAVY_RAIN_MM: f64 = 50.0;
pub const MODERATE_RAIN_MM: f64 = 10.0;
pub const HEATWAVE_C: f64 = 38.0;
pub const HOT_C: f64 = 35.0;

const DAILY_FIELDS: &str =
    "temperature_2m_max,temperature_2m_min,precipitation_sum,relative_humidity_2m_max";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub temp_max: f64,
    pub temp_min: f64,
    pub humidity: f64,
    pub rainfall_mm: f64,
    pub summary: String,
}

impl Weather {
    pub fn safe_defaults() -> Self {
        Self {
            temp_max: 28.0,
            temp_min: 22.0,
            humidity: 70.0,
            rainfall_mm: 0.0,
            summary: "weather data unavailable".to_string(),
        }
    }

    /// Build a reading and derive its one-line summary. Heavy rain wins over
    /// heat.
    pub fn from_readings(temp_max: f64, temp_min: f64, humidity: f64, rainfall_mm: f64) -> Self {
        let summary = if rainfall_mm >= HEAVY_RAIN_MM {
            format!("heavy rain expected ({rainfall_mm:.0} mm), check drainage")
        } else if rainfall_mm >= MODERATE_RAIN_MM {
            format!("moderate rain expected ({rainfall_mm:.0} mm), skip watering")
        } else if temp_max >= HEATWAVE_C {
            format!("heatwave, max {temp_max:.0}°C; shade plants and water extra")
        } else if temp_max >= HOT_C {
            format!("hot day ({temp_max:.0}°C); consider extra evening watering")
        } else {
            format!("normal weather, {temp_min:.0}-{temp_max:.0}°C, humidity {humidity:.0}%")
        };
        Self {
            temp_max,
            temp_min,
            humidity,
            rainfall_mm,
            summary,
        }
    }
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn get_weather(&self, latitude: f64, longitude: f64, date: NaiveDate) -> Weather;
}

// ---------------------------------------------------------------------------
// StaticWeather
// ---------------------------------------------------------------------------

/// Offline provider. Returns the configured reading for every location.
#[derive(Debug, Clone)]
pub struct StaticWeather {
    weather: Weather,
}

impl StaticWeather {
    pub fn new(weather: Weather) -> Self {
        Self { weather }
    }
}

impl Default for StaticWeather {
    fn default() -> Self {
        Self::new(Weather::safe_defaults())
    }
}

#[async_trait]
impl WeatherProvider for StaticWeather {
    async fn get_weather(&self, _latitude: f64, _longitude: f64, _date: NaiveDate) -> Weather {
        self.weather.clone()
    }
}

// ---------------------------------------------------------------------------
// OpenMeteoClient
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    daily: DailySeries,
}

#[derive(Debug, Default, Deserialize)]
struct DailySeries {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
    #[serde(default)]
    relative_humidity_2m_max: Vec<Option<f64>>,
}

impl DailySeries {
    /// The reading for `date`, or the first entry when the date is absent.
    /// Missing or null values fall back to the safe defaults.
    fn reading_for(&self, date: NaiveDate) -> Weather {
        let wanted = date.to_string();
        let idx = self.time.iter().position(|d| *d == wanted).unwrap_or(0);
        let pick = |series: &[Option<f64>], fallback: f64| {
            series.get(idx).copied().flatten().unwrap_or(fallback)
        };
        let defaults = Weather::safe_defaults();
        Weather::from_readings(
            pick(&self.temperature_2m_max, defaults.temp_max),
            pick(&self.temperature_2m_min, defaults.temp_min),
            pick(&self.relative_humidity_2m_max, defaults.humidity),
            pick(&self.precipitation_sum, defaults.rainfall_mm),
        )
    }
}

/// Open-Meteo forecast client with a per-location, per-day cache in the
/// store.
pub struct OpenMeteoClient {
    http: reqwest::Client,
    api_base: String,
    memory: Arc<dyn Memory>,
}

impl OpenMeteoClient {
    pub fn new(config: &WeatherConfig, memory: Arc<dyn Memory>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            memory,
        })
    }

    async fn fetch(&self, latitude: f64, longitude: f64, date: NaiveDate) -> Result<Weather> {
        let url = format!("{}/forecast", self.api_base);
        let resp: ForecastResponse = self
            .http
            .get(&url)
            .query(&[
                ("latitude", format!("{latitude:.2}")),
                ("longitude", format!("{longitude:.2}")),
                ("daily", DAILY_FIELDS.to_string()),
                ("timezone", "auto".to_string()),
                ("forecast_days", "3".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.daily.reading_for(date))
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoClient {
    async fn get_weather(&self, latitude: f64, longitude: f64, date: NaiveDate) -> Weather {
        let memory = self.memory.clone();
        let cached =
            tokio::task::spawn_blocking(move || memory.cached_weather(latitude, longitude, date))
                .await
                .map_err(TaniclawError::from)
                .and_then(|read| read);
        match cached {
            Ok(Some(cached)) => {
                tracing::debug!(latitude, longitude, %date, "weather cache hit");
                return cached;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "weather cache read failed"),
        }

        match self.fetch(latitude, longitude, date).await {
            Ok(weather) => {
                let memory = self.memory.clone();
                let fresh = weather.clone();
                let written = tokio::task::spawn_blocking(move || {
                    memory.cache_weather(latitude, longitude, date, &fresh)
                })
                .await
                .map_err(TaniclawError::from)
                .and_then(|write| write);
                if let Err(e) = written {
                    tracing::warn!(error = %e, "weather cache write failed");
                }
                weather
            }
            Err(e) => {
                tracing::warn!(latitude, longitude, error = %e, "weather fetch failed, using safe defaults");
                Weather::safe_defaults()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
