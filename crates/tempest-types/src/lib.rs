//! Platform-agnostic types for Tempest weather-station telemetry.
//!
//! This crate provides the shared value types every transport decodes into,
//! with units normalized to SI at decode time.
//!
//! # Features
//!
//! - The common [`Observation`] model with nullable per-measurement fields
//! - Positional-array decoders for the broadcast/push wire schemas
//! - Station, device and forecast snapshot types
//! - [`FieldSource`] variants for per-category merge selection
//! - Error types for wire decoding
//!
//! # Example
//!
//! ```
//! use tempest_types::{Observation, ObservationSource};
//!
//! let values: Vec<serde_json::Value> =
//!     serde_json::from_str("[1700000000,1013.2,22.5,55,0,0,2.6,1]").unwrap();
//! let obs = Observation::from_obs_air(1234, ObservationSource::Udp, &values).unwrap();
//! assert_eq!(obs.station_pressure, Some(101_320.0));
//! ```

pub mod error;
pub mod forecast;
pub mod observation;
pub mod station;

pub use error::{ParseError, ParseResult};
pub use forecast::{
    DailyForecast, ForecastResponse, HourlyForecast, MAX_DAILY_FORECASTS, MAX_HOURLY_FORECASTS,
};
pub use observation::{
    LightningStrike, Observation, ObservationSource, PrecipitationType, RainStartEvent, RapidWind,
};
pub use station::{Device, DeviceType, FieldSource, FieldSources, Station};
