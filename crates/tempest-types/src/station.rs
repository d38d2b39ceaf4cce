//! Station and device identity types.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Type of station hardware unit.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new device types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum DeviceType {
    /// Combined all-in-one sensor unit.
    Tempest,
    /// Legacy pressure/temperature/humidity unit.
    Air,
    /// Legacy wind/light/rain unit.
    Sky,
    /// Base-station hub. Relays sensor data but carries no sensors itself.
    Hub,
}

impl DeviceType {
    /// Detect the device type from the cloud API's short code.
    ///
    /// # Examples
    ///
    /// ```
    /// use tempest_types::DeviceType;
    ///
    /// assert_eq!(DeviceType::from_api_code("ST"), Some(DeviceType::Tempest));
    /// assert_eq!(DeviceType::from_api_code("AR"), Some(DeviceType::Air));
    /// assert_eq!(DeviceType::from_api_code("XX"), None);
    /// ```
    #[must_use]
    pub fn from_api_code(code: &str) -> Option<Self> {
        match code {
            "ST" => Some(DeviceType::Tempest),
            "AR" => Some(DeviceType::Air),
            "SK" => Some(DeviceType::Sky),
            "HB" => Some(DeviceType::Hub),
            _ => None,
        }
    }

    /// Detect the device type from a serial number prefix (`ST-`, `AR-`,
    /// `SK-`, `HB-`).
    #[must_use]
    pub fn from_serial(serial: &str) -> Option<Self> {
        let code = serial.split('-').next()?;
        Self::from_api_code(code)
    }

    /// Whether this unit produces sensor observations.
    ///
    /// The hub is excluded from sensor fan-out: it relays frames and reports
    /// status but never measures anything.
    #[must_use]
    pub fn is_sensor(&self) -> bool {
        !matches!(self, DeviceType::Hub)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Tempest => write!(f, "Tempest"),
            DeviceType::Air => write!(f, "Air"),
            DeviceType::Sky => write!(f, "Sky"),
            DeviceType::Hub => write!(f, "Hub"),
        }
    }
}

/// A single physical unit attached to a station.
///
/// The serial number is the durable identity; `device_id` is a numeric alias
/// assigned by the cloud and is only meaningful within the station it was
/// resolved from.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Device {
    /// Cloud-assigned numeric id.
    pub device_id: i64,
    /// Durable hardware serial number (e.g. `ST-00012345`).
    pub serial_number: String,
    /// Hardware type.
    pub device_type: DeviceType,
}

/// An immutable snapshot of a weather-station installation.
///
/// Stations are refreshed wholesale from the REST API and cached by
/// `station_id`; they are never mutated in place.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Station {
    /// Cloud-assigned station id.
    pub station_id: i64,
    /// Human-readable station name.
    pub name: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// IANA timezone name (e.g. `America/Denver`).
    pub timezone: String,
    /// Units attached to this station, hub included.
    pub devices: Vec<Device>,
}

impl Station {
    /// The station's sensor units: one Tempest, or an Air+Sky pairing.
    /// The hub never appears here.
    pub fn sensor_devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| d.device_type.is_sensor())
    }

    /// The Tempest unit to subscribe the push channel to, if the station
    /// has one.
    #[must_use]
    pub fn tempest_device(&self) -> Option<&Device> {
        self.devices
            .iter()
            .find(|d| d.device_type == DeviceType::Tempest)
    }

    /// Look up a device by serial number.
    #[must_use]
    pub fn device_for_serial(&self, serial: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.serial_number == serial)
    }
}

/// Which device supplies one measurement category.
///
/// A tagged variant rather than a sentinel string, so resolver branches are
/// exhaustive and type-checked.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FieldSource {
    /// Pick the first device with a non-null value, in store order.
    #[default]
    Auto,
    /// Always read this serial number, falling back to auto when it has no
    /// value for the field.
    Pinned(String),
}

/// Per-category device selection for the merge resolver.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FieldSources {
    /// Source for air temperature and the derived temperature fields.
    pub temperature: FieldSource,
    /// Source for relative humidity.
    pub humidity: FieldSource,
    /// Source for station and sea-level pressure.
    pub pressure: FieldSource,
    /// Source for wind speed and direction fields.
    pub wind: FieldSource,
    /// Source for illuminance, UV and solar radiation.
    pub light: FieldSource,
    /// Source for rain accumulation and rate.
    pub rain: FieldSource,
    /// Source for lightning distance and count.
    pub lightning: FieldSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station() -> Station {
        Station {
            station_id: 100,
            name: "Backyard".to_string(),
            latitude: 39.7,
            longitude: -104.9,
            timezone: "America/Denver".to_string(),
            devices: vec![
                Device {
                    device_id: 1,
                    serial_number: "HB-00001111".to_string(),
                    device_type: DeviceType::Hub,
                },
                Device {
                    device_id: 2,
                    serial_number: "ST-00002222".to_string(),
                    device_type: DeviceType::Tempest,
                },
            ],
        }
    }

    #[test]
    fn test_sensor_devices_exclude_hub() {
        let station = station();
        let sensors: Vec<_> = station.sensor_devices().collect();
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].device_type, DeviceType::Tempest);
    }

    #[test]
    fn test_tempest_device_lookup() {
        let station = station();
        assert_eq!(station.tempest_device().unwrap().device_id, 2);
        assert!(station.device_for_serial("ST-00002222").is_some());
        assert!(station.device_for_serial("SK-00009999").is_none());
    }

    #[test]
    fn test_device_type_from_serial() {
        assert_eq!(
            DeviceType::from_serial("ST-00012345"),
            Some(DeviceType::Tempest)
        );
        assert_eq!(DeviceType::from_serial("AR-1234"), Some(DeviceType::Air));
        assert_eq!(DeviceType::from_serial("bogus"), None);
    }

    #[test]
    fn test_field_source_default_is_auto() {
        let sources = FieldSources::default();
        assert_eq!(sources.temperature, FieldSource::Auto);
        assert_eq!(sources.lightning, FieldSource::Auto);
    }
}
