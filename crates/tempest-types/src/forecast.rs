//! Forecast snapshot types.
//!
//! A forecast is an immutable snapshot replaced wholesale on each
//! successful fetch; nothing merges into it.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Maximum number of hourly entries a snapshot retains.
pub const MAX_HOURLY_FORECASTS: usize = 72;

/// Maximum number of daily entries a snapshot retains.
pub const MAX_DAILY_FORECASTS: usize = 10;

/// One hour of forecast.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HourlyForecast {
    /// Hour this entry covers.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub time: OffsetDateTime,
    /// Conditions summary (e.g. "Partly Cloudy").
    pub conditions: String,
    /// Icon slug supplied by the API.
    pub icon: String,
    /// Forecast air temperature in Kelvin.
    pub air_temperature: Option<f64>,
    /// Forecast relative humidity as a ratio in `[0, 1]`.
    pub relative_humidity: Option<f64>,
    /// Precipitation probability as a ratio in `[0, 1]`.
    pub precip_probability: Option<f64>,
    /// Forecast wind speed in m/s.
    pub wind_avg: Option<f64>,
    /// Forecast wind direction in degrees.
    pub wind_direction: Option<f64>,
}

/// One day of forecast.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DailyForecast {
    /// Local midnight starting this entry's day.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub day_start: OffsetDateTime,
    /// Conditions summary.
    pub conditions: String,
    /// Icon slug supplied by the API.
    pub icon: String,
    /// Daily high in Kelvin.
    pub air_temp_high: Option<f64>,
    /// Daily low in Kelvin.
    pub air_temp_low: Option<f64>,
    /// Precipitation probability as a ratio in `[0, 1]`.
    pub precip_probability: Option<f64>,
}

/// A station forecast snapshot.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ForecastResponse {
    /// Hourly entries, at most [`MAX_HOURLY_FORECASTS`].
    pub hourly: Vec<HourlyForecast>,
    /// Daily entries, at most [`MAX_DAILY_FORECASTS`].
    pub daily: Vec<DailyForecast>,
    /// When this snapshot was fetched.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub fetched_at: OffsetDateTime,
}

impl ForecastResponse {
    /// Build a snapshot, truncating over-long entry lists to their caps.
    #[must_use]
    pub fn new(
        mut hourly: Vec<HourlyForecast>,
        mut daily: Vec<DailyForecast>,
        fetched_at: OffsetDateTime,
    ) -> Self {
        hourly.truncate(MAX_HOURLY_FORECASTS);
        daily.truncate(MAX_DAILY_FORECASTS);
        Self {
            hourly,
            daily,
            fetched_at,
        }
    }
}
