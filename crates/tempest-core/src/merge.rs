//! The merge resolver: one logical observation from many devices.
//!
//! A station with an Air+Sky pairing has temperature on one physical unit
//! and wind on another; a consumer wants a single coherent "current
//! conditions" view. The resolver selects, per measurement field, either an
//! explicitly pinned device or the first device with a value.
//!
//! `resolve` is a pure function of the store snapshot and the field-source
//! map: no side effects, no store mutation, same output for the same
//! inputs. That makes it deterministic to test and safe to call from any
//! consumer context.

use tempest_types::{FieldSource, FieldSources, Observation};

use crate::store::DeviceObservationStore;

/// Compute the station-level observation for the given field sources.
///
/// Selection rules, per field:
/// - a pinned device whose observation has the field non-null wins;
/// - otherwise the first non-null value in store-insertion order;
/// - otherwise the single-slot current observation.
///
/// Metadata (timestamp, device id, source, precipitation type, battery
/// voltage, report interval) is not merged field-by-field: it is taken
/// wholesale from the metadata-best observation: the first device in the
/// store, else the single-slot current.
///
/// Returns `None` when no device has reported and no current observation
/// exists.
pub fn resolve(store: &DeviceObservationStore, sources: &FieldSources) -> Option<Observation> {
    let meta = store
        .observations()
        .next()
        .map(|(_, obs)| obs)
        .or_else(|| store.current())?;

    let mut resolved = Observation::empty(meta.device_id, meta.source, meta.timestamp);
    resolved.precipitation_type = meta.precipitation_type;
    resolved.battery_voltage = meta.battery_voltage;
    resolved.report_interval = meta.report_interval;

    // Temperature category covers the derived temperature fields too: they
    // only make sense alongside the reading they were derived from.
    resolved.air_temperature = select(store, &sources.temperature, |o| o.air_temperature);
    resolved.feels_like = select(store, &sources.temperature, |o| o.feels_like);
    resolved.dew_point = select(store, &sources.temperature, |o| o.dew_point);
    resolved.heat_index = select(store, &sources.temperature, |o| o.heat_index);
    resolved.wind_chill = select(store, &sources.temperature, |o| o.wind_chill);

    resolved.relative_humidity = select(store, &sources.humidity, |o| o.relative_humidity);

    resolved.station_pressure = select(store, &sources.pressure, |o| o.station_pressure);
    resolved.sea_level_pressure = select(store, &sources.pressure, |o| o.sea_level_pressure);

    resolved.wind_avg = select(store, &sources.wind, |o| o.wind_avg);
    resolved.wind_gust = select(store, &sources.wind, |o| o.wind_gust);
    resolved.wind_lull = select(store, &sources.wind, |o| o.wind_lull);
    resolved.wind_direction = select(store, &sources.wind, |o| o.wind_direction);

    resolved.illuminance = select(store, &sources.light, |o| o.illuminance);
    resolved.uv = select(store, &sources.light, |o| o.uv);
    resolved.solar_radiation = select(store, &sources.light, |o| o.solar_radiation);

    resolved.rain_accumulated = select(store, &sources.rain, |o| o.rain_accumulated);
    resolved.rain_rate = select(store, &sources.rain, |o| o.rain_rate);

    resolved.lightning_avg_distance =
        select(store, &sources.lightning, |o| o.lightning_avg_distance);
    resolved.lightning_count = select(store, &sources.lightning, |o| o.lightning_count);

    Some(resolved)
}

/// Select one field's value according to its source.
fn select<T, F>(store: &DeviceObservationStore, source: &FieldSource, field: F) -> Option<T>
where
    F: Fn(&Observation) -> Option<T>,
{
    if let FieldSource::Pinned(serial) = source {
        if let Some(value) = store.get(serial).and_then(&field) {
            return Some(value);
        }
        // Pinned but missing or null: fall through to auto.
    }

    store
        .observations()
        .find_map(|(_, obs)| field(obs))
        .or_else(|| store.current().and_then(&field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempest_types::ObservationSource;
    use time::OffsetDateTime;

    fn obs(device_id: i64) -> Observation {
        Observation::empty(
            device_id,
            ObservationSource::Udp,
            OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        )
    }

    /// Air unit reports temperature/humidity/pressure, Sky reports wind.
    fn air_sky_store() -> DeviceObservationStore {
        let mut store = DeviceObservationStore::new();

        let mut air = obs(1);
        air.air_temperature = Some(293.15);
        air.relative_humidity = Some(0.5);
        air.station_pressure = Some(101_000.0);
        air.battery_voltage = Some(3.4);
        store.insert("AR-1", air);

        let mut sky = obs(2);
        sky.wind_avg = Some(4.0);
        sky.wind_direction = Some(90.0);
        sky.illuminance = Some(20_000.0);
        store.insert("SK-2", sky);

        store
    }

    #[test]
    fn test_auto_takes_first_non_null_in_insertion_order() {
        let store = air_sky_store();
        let resolved = resolve(&store, &FieldSources::default()).unwrap();

        // Temperature comes from the Air unit, wind from the Sky unit.
        assert_eq!(resolved.air_temperature, Some(293.15));
        assert_eq!(resolved.wind_avg, Some(4.0));
        assert_eq!(resolved.illuminance, Some(20_000.0));
    }

    #[test]
    fn test_metadata_comes_from_first_device() {
        let store = air_sky_store();
        let resolved = resolve(&store, &FieldSources::default()).unwrap();
        assert_eq!(resolved.device_id, 1);
        assert_eq!(resolved.battery_voltage, Some(3.4));
    }

    #[test]
    fn test_pinned_device_wins_when_it_has_the_field() {
        let mut store = air_sky_store();
        let mut second_air = obs(3);
        second_air.air_temperature = Some(280.0);
        store.insert("AR-3", second_air);

        let sources = FieldSources {
            temperature: FieldSource::Pinned("AR-3".to_string()),
            ..Default::default()
        };
        let resolved = resolve(&store, &sources).unwrap();
        assert_eq!(resolved.air_temperature, Some(280.0));
        // Other categories still resolve automatically.
        assert_eq!(resolved.wind_avg, Some(4.0));
    }

    #[test]
    fn test_pinned_missing_field_falls_back_to_auto() {
        let store = air_sky_store();
        // Sky has no temperature: pin it anyway and expect the Air value.
        let sources = FieldSources {
            temperature: FieldSource::Pinned("SK-2".to_string()),
            ..Default::default()
        };
        let resolved = resolve(&store, &sources).unwrap();
        assert_eq!(resolved.air_temperature, Some(293.15));
    }

    #[test]
    fn test_pinned_unknown_serial_falls_back_to_auto() {
        let store = air_sky_store();
        let sources = FieldSources {
            wind: FieldSource::Pinned("ST-404".to_string()),
            ..Default::default()
        };
        let resolved = resolve(&store, &sources).unwrap();
        assert_eq!(resolved.wind_avg, Some(4.0));
    }

    #[test]
    fn test_empty_store_resolves_to_none() {
        let store = DeviceObservationStore::new();
        assert!(resolve(&store, &FieldSources::default()).is_none());
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let store = air_sky_store();
        let sources = FieldSources::default();
        let first = resolve(&store, &sources).unwrap();
        for _ in 0..10 {
            assert_eq!(resolve(&store, &sources).unwrap(), first);
        }
    }
}
