//! REST client for the weather cloud API.
//!
//! The REST transport is stateless request/response: failures are per-call
//! and never change a standing lifecycle state. Everything the rest of the
//! engine needs from the cloud goes through the [`WeatherApi`] trait, so
//! the orchestrator can be driven by a mock in tests.
//!
//! # Example
//!
//! ```no_run
//! use tempest_core::rest::{RestClient, WeatherApi};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RestClient::new("https://swd.weatherflow.com/swd/rest", "token")?;
//! let stations = client.get_stations().await?;
//! println!("{} station(s)", stations.len());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::warn;

use tempest_types::{
    DailyForecast, Device, DeviceType, ForecastResponse, HourlyForecast, Observation,
    ObservationSource, Station,
};

use crate::error::{Error, Result};

/// Bound on every REST call. A slow cloud must fail the call, not hang the
/// refresh pipeline.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A half-open time range for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Inclusive start.
    pub start: OffsetDateTime,
    /// Exclusive end.
    pub end: OffsetDateTime,
}

/// The cloud REST surface the engine consumes.
#[async_trait]
pub trait WeatherApi: Send + Sync {
    /// Fetch the account's stations.
    async fn get_stations(&self) -> Result<Vec<Station>>;

    /// Fetch the latest station-level observation.
    async fn get_station_observation(&self, station_id: i64) -> Result<Observation>;

    /// Fetch the station forecast.
    async fn get_forecast(&self, station_id: i64) -> Result<ForecastResponse>;

    /// Fetch historical observations for one device.
    async fn get_device_observations(
        &self,
        device_id: i64,
        range: TimeRange,
    ) -> Result<Vec<Observation>>;

    /// Check whether a token is accepted by the cloud.
    async fn validate_token(&self, token: &str) -> Result<bool>;
}

/// reqwest-backed [`WeatherApi`] implementation.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    token: String,
}

impl RestClient {
    /// Create a client against the given base URL.
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::InvalidConfig(format!(
                "URL must start with http:// or https://, got: {base_url}"
            )));
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url,
            token: token.to_string(),
        })
    }

    /// The base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str, token: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(&[("token", token)])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|v| {
                v.get("status")
                    .and_then(|s| s.get("status_message"))
                    .and_then(|m| m.as_str())
                    .map(String::from)
            })
            .unwrap_or_else(|| status.to_string());

        match status.as_u16() {
            401 | 403 => Err(Error::Auth(message)),
            code => Err(Error::fetch_status(code, message)),
        }
    }
}

#[async_trait]
impl WeatherApi for RestClient {
    async fn get_stations(&self) -> Result<Vec<Station>> {
        let response: StationsDto = self.get_json("/stations", &self.token).await?;
        Ok(response
            .stations
            .into_iter()
            .map(StationDto::into_station)
            .collect())
    }

    async fn get_station_observation(&self, station_id: i64) -> Result<Observation> {
        let response: StationObservationDto = self
            .get_json(&format!("/observations/station/{station_id}"), &self.token)
            .await?;

        let dto = response
            .obs
            .into_iter()
            .next()
            .ok_or_else(|| Error::fetch("station observation response had no readings"))?;

        dto.into_observation()
    }

    async fn get_forecast(&self, station_id: i64) -> Result<ForecastResponse> {
        let response: ForecastDto = self
            .get_json(
                &format!("/better_forecast?station_id={station_id}"),
                &self.token,
            )
            .await?;
        Ok(response.into_forecast(OffsetDateTime::now_utc()))
    }

    async fn get_device_observations(
        &self,
        device_id: i64,
        range: TimeRange,
    ) -> Result<Vec<Observation>> {
        let path = format!(
            "/observations/device/{device_id}?time_start={}&time_end={}",
            range.start.unix_timestamp(),
            range.end.unix_timestamp()
        );
        let response: DeviceObservationsDto = self.get_json(&path, &self.token).await?;

        // History rows reuse the positional schemas. Malformed rows are
        // dropped individually, same as the live decode path.
        let decode = match response.kind.as_deref() {
            Some("obs_air") => Observation::from_obs_air,
            Some("obs_sky") => Observation::from_obs_sky,
            _ => Observation::from_obs_st,
        };

        Ok(response
            .obs
            .iter()
            .filter_map(|values| {
                decode(device_id, ObservationSource::Rest, values)
                    .map_err(|e| warn!(device_id, error = %e, "dropping malformed history row"))
                    .ok()
            })
            .collect())
    }

    async fn validate_token(&self, token: &str) -> Result<bool> {
        match self.get_json::<Value>("/stations", token).await {
            Ok(_) => Ok(true),
            Err(Error::Auth(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

// ==========================================================================
// Wire DTOs
//
// The cloud's JSON uses named fields and display-friendly units; everything
// is converted to the SI observation model here, at the decode boundary.
// ==========================================================================

#[derive(Debug, Deserialize)]
struct StationsDto {
    #[serde(default)]
    stations: Vec<StationDto>,
}

#[derive(Debug, Deserialize)]
struct StationDto {
    station_id: i64,
    #[serde(default)]
    name: String,
    latitude: f64,
    longitude: f64,
    timezone: String,
    #[serde(default)]
    devices: Vec<DeviceDto>,
}

impl StationDto {
    fn into_station(self) -> Station {
        Station {
            station_id: self.station_id,
            name: self.name,
            latitude: self.latitude,
            longitude: self.longitude,
            timezone: self.timezone,
            devices: self
                .devices
                .into_iter()
                .filter_map(DeviceDto::into_device)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeviceDto {
    device_id: i64,
    serial_number: String,
    device_type: String,
}

impl DeviceDto {
    /// Unknown device-type codes are skipped rather than failing the whole
    /// station decode.
    fn into_device(self) -> Option<Device> {
        let device_type = DeviceType::from_api_code(&self.device_type)?;
        Some(Device {
            device_id: self.device_id,
            serial_number: self.serial_number,
            device_type,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StationObservationDto {
    #[serde(default)]
    obs: Vec<StationObsRowDto>,
}

/// One station-level observation row. Cloud units: °C, %, millibar, m/s,
/// mm, km, minutes.
#[derive(Debug, Deserialize)]
struct StationObsRowDto {
    timestamp: i64,
    #[serde(default)]
    device_id: Option<i64>,
    air_temperature: Option<f64>,
    relative_humidity: Option<f64>,
    station_pressure: Option<f64>,
    sea_level_pressure: Option<f64>,
    wind_avg: Option<f64>,
    wind_gust: Option<f64>,
    wind_lull: Option<f64>,
    wind_direction: Option<f64>,
    brightness: Option<f64>,
    uv: Option<f64>,
    solar_radiation: Option<f64>,
    precip: Option<f64>,
    precip_accum_last_1hr: Option<f64>,
    lightning_strike_count: Option<u32>,
    lightning_strike_last_distance: Option<f64>,
    battery: Option<f64>,
    report_interval: Option<f64>,
    feels_like: Option<f64>,
    dew_point: Option<f64>,
    heat_index: Option<f64>,
    wind_chill: Option<f64>,
}

impl StationObsRowDto {
    fn into_observation(self) -> Result<Observation> {
        let timestamp = OffsetDateTime::from_unix_timestamp(self.timestamp)
            .map_err(|_| Error::fetch(format!("bad observation timestamp {}", self.timestamp)))?;

        let mut obs = Observation::empty(
            self.device_id.unwrap_or_default(),
            ObservationSource::Rest,
            timestamp,
        );
        obs.air_temperature = self.air_temperature.map(c_to_k);
        obs.relative_humidity = self.relative_humidity.map(|p| p / 100.0);
        obs.station_pressure = self.station_pressure.map(|mb| mb * 100.0);
        obs.sea_level_pressure = self.sea_level_pressure.map(|mb| mb * 100.0);
        obs.wind_avg = self.wind_avg;
        obs.wind_gust = self.wind_gust;
        obs.wind_lull = self.wind_lull;
        obs.wind_direction = self.wind_direction;
        obs.illuminance = self.brightness;
        obs.uv = self.uv;
        obs.solar_radiation = self.solar_radiation;
        // `precip` is millimetres over the last minute.
        obs.rain_rate = self.precip.map(|mm| mm / 1000.0 / 60.0);
        obs.rain_accumulated = self.precip_accum_last_1hr.map(|mm| mm / 1000.0);
        obs.lightning_count = self.lightning_strike_count;
        obs.lightning_avg_distance = self.lightning_strike_last_distance.map(|km| km * 1000.0);
        obs.battery_voltage = self.battery;
        obs.report_interval = self.report_interval.map(|m| (m * 60.0).round() as u32);
        obs.feels_like = self.feels_like.map(c_to_k);
        obs.dew_point = self.dew_point.map(c_to_k);
        obs.heat_index = self.heat_index.map(c_to_k);
        obs.wind_chill = self.wind_chill.map(c_to_k);
        Ok(obs)
    }
}

#[derive(Debug, Deserialize)]
struct DeviceObservationsDto {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    obs: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct ForecastDto {
    forecast: ForecastBodyDto,
}

#[derive(Debug, Deserialize)]
struct ForecastBodyDto {
    #[serde(default)]
    hourly: Vec<HourlyDto>,
    #[serde(default)]
    daily: Vec<DailyDto>,
}

#[derive(Debug, Deserialize)]
struct HourlyDto {
    time: i64,
    #[serde(default)]
    conditions: String,
    #[serde(default)]
    icon: String,
    air_temperature: Option<f64>,
    relative_humidity: Option<f64>,
    precip_probability: Option<f64>,
    wind_avg: Option<f64>,
    wind_direction: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DailyDto {
    day_start_local: i64,
    #[serde(default)]
    conditions: String,
    #[serde(default)]
    icon: String,
    air_temp_high: Option<f64>,
    air_temp_low: Option<f64>,
    precip_probability: Option<f64>,
}

impl ForecastDto {
    fn into_forecast(self, fetched_at: OffsetDateTime) -> ForecastResponse {
        let hourly = self
            .forecast
            .hourly
            .into_iter()
            .filter_map(|h| {
                Some(HourlyForecast {
                    time: OffsetDateTime::from_unix_timestamp(h.time).ok()?,
                    conditions: h.conditions,
                    icon: h.icon,
                    air_temperature: h.air_temperature.map(c_to_k),
                    relative_humidity: h.relative_humidity.map(|p| p / 100.0),
                    precip_probability: h.precip_probability.map(|p| p / 100.0),
                    wind_avg: h.wind_avg,
                    wind_direction: h.wind_direction,
                })
            })
            .collect();

        let daily = self
            .forecast
            .daily
            .into_iter()
            .filter_map(|d| {
                Some(DailyForecast {
                    day_start: OffsetDateTime::from_unix_timestamp(d.day_start_local).ok()?,
                    conditions: d.conditions,
                    icon: d.icon,
                    air_temp_high: d.air_temp_high.map(c_to_k),
                    air_temp_low: d.air_temp_low.map(c_to_k),
                    precip_probability: d.precip_probability.map(|p| p / 100.0),
                })
            })
            .collect();

        ForecastResponse::new(hourly, daily, fetched_at)
    }
}

fn c_to_k(c: f64) -> f64 {
    c + 273.15
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_rejects_bad_url() {
        assert!(RestClient::new("swd.weatherflow.com", "t").is_err());
        assert!(RestClient::new("https://example.com/", "t").is_ok());
    }

    #[test]
    fn test_client_normalizes_url() {
        let client = RestClient::new("https://example.com/rest/", "t").unwrap();
        assert_eq!(client.base_url(), "https://example.com/rest");
    }

    #[test]
    fn test_station_dto_skips_unknown_device_types() {
        let json = r#"{
            "station_id": 100, "name": "Backyard",
            "latitude": 39.7, "longitude": -104.9, "timezone": "America/Denver",
            "devices": [
                {"device_id": 1, "serial_number": "HB-00000001", "device_type": "HB"},
                {"device_id": 2, "serial_number": "ST-00000512", "device_type": "ST"},
                {"device_id": 3, "serial_number": "ZZ-00000000", "device_type": "ZZ"}
            ]
        }"#;
        let dto: StationDto = serde_json::from_str(json).unwrap();
        let station = dto.into_station();
        assert_eq!(station.devices.len(), 2);
        assert_eq!(station.tempest_device().unwrap().device_id, 2);
    }

    #[test]
    fn test_station_obs_row_converts_to_si() {
        let json = r#"{
            "timestamp": 1700000000, "device_id": 512,
            "air_temperature": 22.5, "relative_humidity": 55,
            "station_pressure": 1013.2, "sea_level_pressure": 1020.0,
            "wind_avg": 3.1, "wind_direction": 200,
            "brightness": 11000, "uv": 4.1, "solar_radiation": 390,
            "precip": 0.6, "precip_accum_last_1hr": 2.4,
            "lightning_strike_count": 1, "lightning_strike_last_distance": 12,
            "battery": 2.7, "report_interval": 1,
            "feels_like": 22.0, "dew_point": 13.0
        }"#;
        let row: StationObsRowDto = serde_json::from_str(json).unwrap();
        let obs = row.into_observation().unwrap();

        assert_eq!(obs.source, ObservationSource::Rest);
        assert!((obs.air_temperature.unwrap() - 295.65).abs() < 1e-9);
        assert!((obs.relative_humidity.unwrap() - 0.55).abs() < 1e-9);
        assert!((obs.station_pressure.unwrap() - 101_320.0).abs() < 1e-6);
        assert!((obs.rain_rate.unwrap() - 0.6 / 1000.0 / 60.0).abs() < 1e-12);
        assert!((obs.rain_accumulated.unwrap() - 0.0024).abs() < 1e-12);
        assert_eq!(obs.lightning_avg_distance, Some(12_000.0));
        assert_eq!(obs.report_interval, Some(60));
        assert!((obs.feels_like.unwrap() - 295.15).abs() < 1e-9);
        assert!(obs.heat_index.is_none());
    }

    #[test]
    fn test_forecast_dto_truncates_and_converts() {
        let hourly: Vec<String> = (0..80)
            .map(|i| {
                format!(
                    r#"{{"time": {}, "conditions": "Clear", "icon": "clear-day", "air_temperature": 20.0, "precip_probability": 10}}"#,
                    1_700_000_000 + i * 3600
                )
            })
            .collect();
        let json = format!(
            r#"{{"forecast": {{"hourly": [{}], "daily": []}}}}"#,
            hourly.join(",")
        );
        let dto: ForecastDto = serde_json::from_str(&json).unwrap();
        let forecast = dto.into_forecast(OffsetDateTime::UNIX_EPOCH);

        assert_eq!(forecast.hourly.len(), tempest_types::MAX_HOURLY_FORECASTS);
        assert!((forecast.hourly[0].air_temperature.unwrap() - 293.15).abs() < 1e-9);
        assert!((forecast.hourly[0].precip_probability.unwrap() - 0.1).abs() < 1e-9);
    }
}
