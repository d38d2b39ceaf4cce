//! The common observation model and its positional decoders.
//!
//! Every transport decodes into [`Observation`] with SI-normalized units:
//! Kelvin for temperatures, Pascals for pressures, metres and metres per
//! second for lengths and speeds, ratio 0–1 for humidity, seconds for
//! intervals. Normalizing at decode time means nothing downstream ever has
//! to convert units again.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::ParseError;

/// Number of elements a full Tempest observation (`obs_st`) carries.
pub const OBS_ST_LEN: usize = 18;

/// Number of elements an Air observation (`obs_air`) carries.
pub const OBS_AIR_LEN: usize = 8;

/// Number of elements a Sky observation (`obs_sky`) carries.
pub const OBS_SKY_LEN: usize = 14;

/// Number of elements a `rapid_wind` ob carries.
pub const RAPID_WIND_LEN: usize = 3;

/// Number of elements an `evt_strike` evt carries.
pub const EVT_STRIKE_LEN: usize = 3;

/// Number of elements an `evt_precip` evt carries.
pub const EVT_PRECIP_LEN: usize = 1;

/// Transport a value arrived through.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new transports
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum ObservationSource {
    /// Local-network UDP broadcast.
    Udp,
    /// Cloud WebSocket push channel.
    WebSocket,
    /// Cloud REST API.
    Rest,
}

impl fmt::Display for ObservationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationSource::Udp => write!(f, "udp"),
            ObservationSource::WebSocket => write!(f, "websocket"),
            ObservationSource::Rest => write!(f, "rest"),
        }
    }
}

/// Kind of precipitation a sensor reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PrecipitationType {
    /// No precipitation.
    None,
    /// Rain.
    Rain,
    /// Hail.
    Hail,
    /// Mixed rain and hail.
    RainPlusHail,
}

impl PrecipitationType {
    /// Decode the wire code used by both the broadcast and push schemas.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidValue`] for codes outside 0–3.
    pub fn from_code(code: i64) -> Result<Self, ParseError> {
        match code {
            0 => Ok(PrecipitationType::None),
            1 => Ok(PrecipitationType::Rain),
            2 => Ok(PrecipitationType::Hail),
            3 => Ok(PrecipitationType::RainPlusHail),
            other => Err(ParseError::InvalidValue(format!(
                "unknown precipitation code {other}"
            ))),
        }
    }
}

/// One point-in-time, multi-field sensor reading.
///
/// Every measurement field is nullable: an Air unit never reports wind, a
/// Sky unit never reports pressure, and the cloud API omits anything the
/// station has not sampled yet. Only `timestamp`, `device_id` and `source`
/// are always present.
///
/// All units are SI regardless of which transport produced the value;
/// see the module docs. The `feels_like`/`dew_point`/`heat_index`/
/// `wind_chill` fields are carried when a transport supplies them (the REST
/// API does) and are never computed locally.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Observation {
    /// When the reading was taken.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Numeric device the reading came from.
    pub device_id: i64,
    /// Transport the reading arrived through.
    pub source: ObservationSource,

    /// Air temperature in Kelvin.
    pub air_temperature: Option<f64>,
    /// Relative humidity as a ratio in `[0, 1]`.
    pub relative_humidity: Option<f64>,
    /// Station pressure in Pascals.
    pub station_pressure: Option<f64>,
    /// Sea-level-reduced pressure in Pascals.
    pub sea_level_pressure: Option<f64>,
    /// Average wind speed in m/s.
    pub wind_avg: Option<f64>,
    /// Wind gust in m/s.
    pub wind_gust: Option<f64>,
    /// Wind lull in m/s.
    pub wind_lull: Option<f64>,
    /// Wind direction in degrees from north.
    pub wind_direction: Option<f64>,
    /// Illuminance in lux.
    pub illuminance: Option<f64>,
    /// UV index.
    pub uv: Option<f64>,
    /// Solar radiation in W/m².
    pub solar_radiation: Option<f64>,
    /// Rain accumulated over the report interval, in metres.
    pub rain_accumulated: Option<f64>,
    /// Precipitation rate in m/s.
    pub rain_rate: Option<f64>,
    /// Kind of precipitation observed.
    pub precipitation_type: Option<PrecipitationType>,
    /// Average lightning strike distance in metres.
    pub lightning_avg_distance: Option<f64>,
    /// Lightning strike count over the report interval.
    pub lightning_count: Option<u32>,
    /// Sensor battery voltage in volts.
    pub battery_voltage: Option<f64>,
    /// Report interval in seconds.
    pub report_interval: Option<u32>,

    /// Apparent temperature in Kelvin (transport-supplied).
    pub feels_like: Option<f64>,
    /// Dew point in Kelvin (transport-supplied).
    pub dew_point: Option<f64>,
    /// Heat index in Kelvin (transport-supplied).
    pub heat_index: Option<f64>,
    /// Wind chill in Kelvin (transport-supplied).
    pub wind_chill: Option<f64>,
}

impl Observation {
    /// Create an observation with every measurement field unset.
    #[must_use]
    pub fn empty(device_id: i64, source: ObservationSource, timestamp: OffsetDateTime) -> Self {
        Self {
            timestamp,
            device_id,
            source,
            air_temperature: None,
            relative_humidity: None,
            station_pressure: None,
            sea_level_pressure: None,
            wind_avg: None,
            wind_gust: None,
            wind_lull: None,
            wind_direction: None,
            illuminance: None,
            uv: None,
            solar_radiation: None,
            rain_accumulated: None,
            rain_rate: None,
            precipitation_type: None,
            lightning_avg_distance: None,
            lightning_count: None,
            battery_voltage: None,
            report_interval: None,
            feels_like: None,
            dew_point: None,
            heat_index: None,
            wind_chill: None,
        }
    }

    /// Decode a full Tempest observation (`obs_st` positional array).
    ///
    /// The schema is:
    /// - `[0]` epoch seconds
    /// - `[1]`–`[3]` wind lull / avg / gust in m/s
    /// - `[4]` wind direction in degrees
    /// - `[5]` wind sample interval (not stored)
    /// - `[6]` station pressure in millibar
    /// - `[7]` air temperature in °C
    /// - `[8]` relative humidity in percent
    /// - `[9]`–`[11]` illuminance, UV index, solar radiation
    /// - `[12]` rain accumulation in millimetres
    /// - `[13]` precipitation type code
    /// - `[14]` lightning average distance in kilometres
    /// - `[15]` lightning strike count
    /// - `[16]` battery voltage
    /// - `[17]` report interval in minutes
    ///
    /// Extra trailing elements are tolerated (newer firmware appends
    /// fields); short arrays are a decode error.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::WrongLength`] for short arrays and
    /// [`ParseError::NotANumber`] for non-numeric, non-null elements.
    pub fn from_obs_st(
        device_id: i64,
        source: ObservationSource,
        values: &[Value],
    ) -> Result<Self, ParseError> {
        const MSG: &str = "obs_st";
        check_len(MSG, OBS_ST_LEN, values)?;

        let mut obs = Self::empty(device_id, source, epoch(MSG, values, 0)?);
        obs.wind_lull = num(MSG, values, 1)?;
        obs.wind_avg = num(MSG, values, 2)?;
        obs.wind_gust = num(MSG, values, 3)?;
        obs.wind_direction = num(MSG, values, 4)?;
        obs.station_pressure = num(MSG, values, 6)?.map(millibar_to_pascal);
        obs.air_temperature = num(MSG, values, 7)?.map(celsius_to_kelvin);
        obs.relative_humidity = num(MSG, values, 8)?.map(percent_to_ratio);
        obs.illuminance = num(MSG, values, 9)?;
        obs.uv = num(MSG, values, 10)?;
        obs.solar_radiation = num(MSG, values, 11)?;
        obs.rain_accumulated = num(MSG, values, 12)?.map(millimetres_to_metres);
        obs.precipitation_type = code(MSG, values, 13)?
            .map(PrecipitationType::from_code)
            .transpose()?;
        obs.lightning_avg_distance = num(MSG, values, 14)?.map(kilometres_to_metres);
        obs.lightning_count = count(MSG, values, 15)?;
        obs.battery_voltage = num(MSG, values, 16)?;
        obs.report_interval = num(MSG, values, 17)?.map(minutes_to_seconds);
        Ok(obs)
    }

    /// Decode an Air observation (`obs_air` positional array).
    ///
    /// Air units report pressure, temperature, humidity and lightning; every
    /// other field stays unset.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`from_obs_st`](Self::from_obs_st).
    pub fn from_obs_air(
        device_id: i64,
        source: ObservationSource,
        values: &[Value],
    ) -> Result<Self, ParseError> {
        const MSG: &str = "obs_air";
        check_len(MSG, OBS_AIR_LEN, values)?;

        let mut obs = Self::empty(device_id, source, epoch(MSG, values, 0)?);
        obs.station_pressure = num(MSG, values, 1)?.map(millibar_to_pascal);
        obs.air_temperature = num(MSG, values, 2)?.map(celsius_to_kelvin);
        obs.relative_humidity = num(MSG, values, 3)?.map(percent_to_ratio);
        obs.lightning_count = count(MSG, values, 4)?;
        obs.lightning_avg_distance = num(MSG, values, 5)?.map(kilometres_to_metres);
        obs.battery_voltage = num(MSG, values, 6)?;
        obs.report_interval = num(MSG, values, 7)?.map(minutes_to_seconds);
        Ok(obs)
    }

    /// Decode a Sky observation (`obs_sky` positional array).
    ///
    /// Sky units report wind, light and rain; pressure, temperature and
    /// humidity stay unset.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`from_obs_st`](Self::from_obs_st).
    pub fn from_obs_sky(
        device_id: i64,
        source: ObservationSource,
        values: &[Value],
    ) -> Result<Self, ParseError> {
        const MSG: &str = "obs_sky";
        check_len(MSG, OBS_SKY_LEN, values)?;

        let mut obs = Self::empty(device_id, source, epoch(MSG, values, 0)?);
        obs.illuminance = num(MSG, values, 1)?;
        obs.uv = num(MSG, values, 2)?;
        obs.rain_accumulated = num(MSG, values, 3)?.map(millimetres_to_metres);
        obs.wind_lull = num(MSG, values, 4)?;
        obs.wind_avg = num(MSG, values, 5)?;
        obs.wind_gust = num(MSG, values, 6)?;
        obs.wind_direction = num(MSG, values, 7)?;
        obs.battery_voltage = num(MSG, values, 8)?;
        obs.report_interval = num(MSG, values, 9)?.map(minutes_to_seconds);
        obs.solar_radiation = num(MSG, values, 10)?;
        obs.precipitation_type = code(MSG, values, 12)?
            .map(PrecipitationType::from_code)
            .transpose()?;
        Ok(obs)
    }

    /// Overlay a rapid-wind sample onto this observation.
    ///
    /// Rapid wind is a ~3 second cadence carrying nothing but an
    /// instantaneous speed and direction. Only `wind_avg` and
    /// `wind_direction` change; every other field, timestamp and source
    /// included, is preserved from the full observation, which may be up
    /// to a minute older.
    pub fn apply_rapid_wind(&mut self, speed: f64, direction: f64) {
        self.wind_avg = Some(speed);
        self.wind_direction = Some(direction);
    }
}

/// A rapid-wind sample: instantaneous wind speed and direction.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RapidWind {
    /// When the sample was taken.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Device the sample came from.
    pub device_id: i64,
    /// Wind speed in m/s.
    pub speed: f64,
    /// Wind direction in degrees from north.
    pub direction: f64,
}

impl RapidWind {
    /// Decode a `rapid_wind` ob array: `[epoch, speed m/s, direction deg]`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::WrongLength`] or [`ParseError::NotANumber`].
    pub fn from_ob(device_id: i64, values: &[Value]) -> Result<Self, ParseError> {
        const MSG: &str = "rapid_wind";
        check_len(MSG, RAPID_WIND_LEN, values)?;
        Ok(Self {
            timestamp: epoch(MSG, values, 0)?,
            device_id,
            speed: req_num(MSG, values, 1)?,
            direction: req_num(MSG, values, 2)?,
        })
    }
}

/// A single lightning strike.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LightningStrike {
    /// When the strike was detected.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Device that detected the strike.
    pub device_id: i64,
    /// Estimated distance in metres.
    pub distance: f64,
    /// Relative strike energy (unitless).
    pub energy: f64,
}

impl LightningStrike {
    /// Decode an `evt_strike` evt array: `[epoch, distance km, energy]`.
    ///
    /// The distance is converted kilometres→metres here so the rest of the
    /// system never sees wire units.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::WrongLength`] or [`ParseError::NotANumber`].
    pub fn from_evt(device_id: i64, values: &[Value]) -> Result<Self, ParseError> {
        const MSG: &str = "evt_strike";
        check_len(MSG, EVT_STRIKE_LEN, values)?;
        Ok(Self {
            timestamp: epoch(MSG, values, 0)?,
            device_id,
            distance: kilometres_to_metres(req_num(MSG, values, 1)?),
            energy: req_num(MSG, values, 2)?,
        })
    }
}

/// A rain-start event. Only the most recent instance is meaningful.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RainStartEvent {
    /// When rain began.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Device that detected rain.
    pub device_id: i64,
}

impl RainStartEvent {
    /// Decode an `evt_precip` evt array: `[epoch]`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::WrongLength`] or [`ParseError::NotANumber`].
    pub fn from_evt(device_id: i64, values: &[Value]) -> Result<Self, ParseError> {
        const MSG: &str = "evt_precip";
        check_len(MSG, EVT_PRECIP_LEN, values)?;
        Ok(Self {
            timestamp: epoch(MSG, values, 0)?,
            device_id,
        })
    }
}

// === Unit conversions (applied once, at decode time) ===

fn celsius_to_kelvin(c: f64) -> f64 {
    c + 273.15
}

fn millibar_to_pascal(mb: f64) -> f64 {
    mb * 100.0
}

fn percent_to_ratio(pct: f64) -> f64 {
    pct / 100.0
}

fn kilometres_to_metres(km: f64) -> f64 {
    km * 1000.0
}

fn millimetres_to_metres(mm: f64) -> f64 {
    mm / 1000.0
}

fn minutes_to_seconds(minutes: f64) -> u32 {
    (minutes * 60.0).round().max(0.0) as u32
}

// === Positional element access ===

fn check_len(message: &'static str, expected: usize, values: &[Value]) -> Result<(), ParseError> {
    if values.len() < expected {
        return Err(ParseError::WrongLength {
            message,
            expected,
            actual: values.len(),
        });
    }
    Ok(())
}

/// Read an optional numeric element. Null decodes to `None`.
fn num(message: &'static str, values: &[Value], index: usize) -> Result<Option<f64>, ParseError> {
    match &values[index] {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        _ => Err(ParseError::NotANumber { message, index }),
    }
}

/// Read a required numeric element.
fn req_num(message: &'static str, values: &[Value], index: usize) -> Result<f64, ParseError> {
    num(message, values, index)?.ok_or(ParseError::NotANumber { message, index })
}

/// Read an optional integer code element.
fn code(message: &'static str, values: &[Value], index: usize) -> Result<Option<i64>, ParseError> {
    match &values[index] {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or(ParseError::NotANumber { message, index }),
        _ => Err(ParseError::NotANumber { message, index }),
    }
}

/// Read an optional unsigned count element.
fn count(message: &'static str, values: &[Value], index: usize) -> Result<Option<u32>, ParseError> {
    Ok(code(message, values, index)?.map(|v| v.max(0) as u32))
}

/// Read a required epoch-seconds element as a timestamp.
fn epoch(
    message: &'static str,
    values: &[Value],
    index: usize,
) -> Result<OffsetDateTime, ParseError> {
    let secs = code(message, values, index)?.ok_or(ParseError::NotANumber { message, index })?;
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|_| ParseError::InvalidValue(format!("{message}: bad epoch timestamp {secs}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vals(json: &str) -> Vec<Value> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_obs_st_decodes_to_si_units() {
        let values = vals(
            "[1700000000,0.2,1.5,3.1,250,3,1017.3,21.0,48,12000,2.1,420,0.5,1,8.0,2,2.68,1]",
        );
        let obs = Observation::from_obs_st(42, ObservationSource::Udp, &values).unwrap();

        assert_eq!(obs.device_id, 42);
        assert_eq!(obs.timestamp.unix_timestamp(), 1_700_000_000);
        assert!((obs.air_temperature.unwrap() - 294.15).abs() < 1e-9);
        assert!((obs.relative_humidity.unwrap() - 0.48).abs() < 1e-9);
        assert!((obs.station_pressure.unwrap() - 101_730.0).abs() < 1e-6);
        assert!((obs.wind_lull.unwrap() - 0.2).abs() < 1e-9);
        assert!((obs.wind_avg.unwrap() - 1.5).abs() < 1e-9);
        assert!((obs.wind_gust.unwrap() - 3.1).abs() < 1e-9);
        assert_eq!(obs.wind_direction, Some(250.0));
        assert_eq!(obs.illuminance, Some(12_000.0));
        assert!((obs.rain_accumulated.unwrap() - 0.0005).abs() < 1e-12);
        assert_eq!(obs.precipitation_type, Some(PrecipitationType::Rain));
        assert!((obs.lightning_avg_distance.unwrap() - 8000.0).abs() < 1e-9);
        assert_eq!(obs.lightning_count, Some(2));
        assert!((obs.battery_voltage.unwrap() - 2.68).abs() < 1e-9);
        assert_eq!(obs.report_interval, Some(60));
        assert!(obs.feels_like.is_none());
    }

    #[test]
    fn test_obs_air_scenario() {
        // The canonical decode: 1013.2 mb -> 101320 Pa, 22.5 C -> 295.65 K,
        // 55% -> 0.55.
        let values = vals("[1700000000,1013.2,22.5,55,0,0,2.6,1]");
        let obs = Observation::from_obs_air(1234, ObservationSource::Udp, &values).unwrap();

        assert!((obs.station_pressure.unwrap() - 101_320.0).abs() < 1e-6);
        assert!((obs.air_temperature.unwrap() - 295.65).abs() < 1e-9);
        assert!((obs.relative_humidity.unwrap() - 0.55).abs() < 1e-9);
        assert_eq!(obs.lightning_count, Some(0));
        assert_eq!(obs.report_interval, Some(60));
        assert!(obs.wind_avg.is_none());
        assert!(obs.illuminance.is_none());
    }

    #[test]
    fn test_obs_sky_leaves_air_fields_unset() {
        let values = vals("[1700000000,9000,1.2,0.0,0.1,1.0,2.2,180,3.2,1,300,0.0,0,3]");
        let obs = Observation::from_obs_sky(7, ObservationSource::Udp, &values).unwrap();

        assert!(obs.air_temperature.is_none());
        assert!(obs.station_pressure.is_none());
        assert!(obs.relative_humidity.is_none());
        assert_eq!(obs.illuminance, Some(9000.0));
        assert_eq!(obs.wind_direction, Some(180.0));
        assert_eq!(obs.solar_radiation, Some(300.0));
        assert_eq!(obs.precipitation_type, Some(PrecipitationType::None));
    }

    #[test]
    fn test_short_array_is_an_error() {
        let values = vals("[1700000000,1013.2,22.5]");
        let err = Observation::from_obs_air(1, ObservationSource::Udp, &values).unwrap_err();
        assert!(matches!(
            err,
            ParseError::WrongLength {
                expected: OBS_AIR_LEN,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_extra_trailing_elements_tolerated() {
        let values = vals("[1700000000,1013.2,22.5,55,0,0,2.6,1,99,100]");
        assert!(Observation::from_obs_air(1, ObservationSource::Udp, &values).is_ok());
    }

    #[test]
    fn test_null_elements_decode_to_none() {
        let values = vals("[1700000000,null,22.5,null,0,0,2.6,1]");
        let obs = Observation::from_obs_air(1, ObservationSource::Udp, &values).unwrap();
        assert!(obs.station_pressure.is_none());
        assert!(obs.relative_humidity.is_none());
        assert!(obs.air_temperature.is_some());
    }

    #[test]
    fn test_non_numeric_element_is_an_error() {
        let values = vals(r#"[1700000000,"oops",22.5,55,0,0,2.6,1]"#);
        let err = Observation::from_obs_air(1, ObservationSource::Udp, &values).unwrap_err();
        assert!(matches!(err, ParseError::NotANumber { index: 1, .. }));
    }

    #[test]
    fn test_rapid_wind_overlay_changes_only_wind_fields() {
        let values = vals("[1700000000,1013.2,22.5,55,0,0,2.6,1]");
        let mut obs = Observation::from_obs_air(1, ObservationSource::Udp, &values).unwrap();
        obs.wind_avg = Some(1.0);
        obs.wind_direction = Some(90.0);

        let mut expected = obs.clone();
        obs.apply_rapid_wind(4.2, 270.0);

        expected.wind_avg = Some(4.2);
        expected.wind_direction = Some(270.0);
        assert_eq!(obs, expected);
    }

    #[test]
    fn test_strike_distance_converted_to_metres() {
        let values = vals("[1700000123,12.5,850]");
        let strike = LightningStrike::from_evt(5, &values).unwrap();
        assert!((strike.distance - 12_500.0).abs() < 1e-9);
        assert_eq!(strike.timestamp.unix_timestamp(), 1_700_000_123);
    }

    #[test]
    fn test_rain_start_event() {
        let values = vals("[1700000456]");
        let evt = RainStartEvent::from_evt(5, &values).unwrap();
        assert_eq!(evt.timestamp.unix_timestamp(), 1_700_000_456);
        assert_eq!(evt.device_id, 5);
    }

    #[test]
    fn test_precipitation_type_codes() {
        assert_eq!(
            PrecipitationType::from_code(0).unwrap(),
            PrecipitationType::None
        );
        assert_eq!(
            PrecipitationType::from_code(3).unwrap(),
            PrecipitationType::RainPlusHail
        );
        assert!(PrecipitationType::from_code(9).is_err());
    }

    #[test]
    fn test_observation_serde_roundtrip() {
        let values = vals("[1700000000,1013.2,22.5,55,0,0,2.6,1]");
        let obs = Observation::from_obs_air(1, ObservationSource::Udp, &values).unwrap();
        let json = serde_json::to_string(&obs).unwrap();
        let back: Observation = serde_json::from_str(&json).unwrap();
        assert_eq!(obs, back);
    }
}
