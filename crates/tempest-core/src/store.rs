//! Station-scoped observation state.
//!
//! The store holds at most one observation per serial number: the most
//! recently received, whichever transport carried it. It is never itself a
//! merge of multiple readings; merging across devices is the resolver's
//! job, merging rapid-wind into a full observation is the one exception and
//! is explicit here.

use std::collections::VecDeque;

use tempest_types::{LightningStrike, Observation, RainStartEvent, RapidWind};

/// Capacity of the lightning strike ring buffer.
pub const LIGHTNING_HISTORY_CAPACITY: usize = 50;

/// Latest observation per device, plus the station-scoped event history.
///
/// Device entries keep their original insertion position across updates, so
/// iteration order is stable; the merge resolver depends on that.
#[derive(Debug, Default)]
pub struct DeviceObservationStore {
    observations: Vec<(String, Observation)>,
    current: Option<Observation>,
    strikes: VecDeque<LightningStrike>,
    last_rain_start: Option<RainStartEvent>,
}

impl DeviceObservationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation for a serial, replacing any previous entry.
    /// Also becomes the single-slot "current" observation.
    pub fn insert(&mut self, serial: &str, observation: Observation) {
        match self.observations.iter_mut().find(|(s, _)| s == serial) {
            Some((_, slot)) => *slot = observation.clone(),
            None => self
                .observations
                .push((serial.to_string(), observation.clone())),
        }
        self.current = Some(observation);
    }

    /// Overlay a rapid-wind sample onto the observation held for a serial.
    ///
    /// Only wind fields change on the stored observation; see
    /// [`Observation::apply_rapid_wind`]. When no full observation exists
    /// yet, a wind-only observation is created so a station coming up on
    /// rapid-wind alone still shows wind. Returns the observation now held
    /// for the serial (the caller persists it to cache).
    pub fn apply_rapid_wind(&mut self, serial: &str, rapid: &RapidWind) -> Observation {
        let updated = match self.observations.iter_mut().find(|(s, _)| s == serial) {
            Some((_, slot)) => {
                slot.apply_rapid_wind(rapid.speed, rapid.direction);
                slot.clone()
            }
            None => {
                let mut obs = Observation::empty(
                    rapid.device_id,
                    tempest_types::ObservationSource::Udp,
                    rapid.timestamp,
                );
                obs.apply_rapid_wind(rapid.speed, rapid.direction);
                self.observations.push((serial.to_string(), obs.clone()));
                obs
            }
        };

        // Keep the single slot coherent when it mirrors this device.
        if let Some(current) = &mut self.current {
            if current.device_id == updated.device_id {
                current.apply_rapid_wind(rapid.speed, rapid.direction);
            }
        }

        updated
    }

    /// Record a lightning strike, evicting the oldest beyond capacity.
    pub fn record_strike(&mut self, strike: LightningStrike) {
        self.strikes.push_front(strike);
        self.strikes.truncate(LIGHTNING_HISTORY_CAPACITY);
    }

    /// Record a rain-start event. Only the latest is retained.
    pub fn record_rain_start(&mut self, event: RainStartEvent) {
        self.last_rain_start = Some(event);
    }

    /// The observation held for a serial, if any.
    pub fn get(&self, serial: &str) -> Option<&Observation> {
        self.observations
            .iter()
            .find(|(s, _)| s == serial)
            .map(|(_, obs)| obs)
    }

    /// All held observations in insertion order.
    pub fn observations(&self) -> impl Iterator<Item = (&str, &Observation)> {
        self.observations.iter().map(|(s, o)| (s.as_str(), o))
    }

    /// Number of devices with a held observation.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Whether no device has reported yet.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// The most recently received observation overall, device-agnostic.
    pub fn current(&self) -> Option<&Observation> {
        self.current.as_ref()
    }

    /// Recorded strikes, most recent first.
    pub fn strikes(&self) -> impl Iterator<Item = &LightningStrike> {
        self.strikes.iter()
    }

    /// The most recent rain-start event, if any.
    pub fn last_rain_start(&self) -> Option<&RainStartEvent> {
        self.last_rain_start.as_ref()
    }

    /// Drop everything. Used on station switch; all of this state is
    /// station-scoped and must not leak across stations.
    pub fn clear(&mut self) {
        self.observations.clear();
        self.current = None;
        self.strikes.clear();
        self.last_rain_start = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempest_types::ObservationSource;
    use time::OffsetDateTime;

    fn obs(device_id: i64, temp: f64) -> Observation {
        let mut obs = Observation::empty(
            device_id,
            ObservationSource::Udp,
            OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        );
        obs.air_temperature = Some(temp);
        obs
    }

    fn strike(ts: i64) -> LightningStrike {
        LightningStrike {
            timestamp: OffsetDateTime::from_unix_timestamp(ts).unwrap(),
            device_id: 1,
            distance: 5000.0,
            energy: 100.0,
        }
    }

    #[test]
    fn test_last_write_wins_per_serial() {
        let mut store = DeviceObservationStore::new();
        for temp in [290.0, 291.0, 292.0] {
            store.insert("ST-1", obs(1, temp));
        }
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("ST-1").unwrap().air_temperature, Some(292.0));
    }

    #[test]
    fn test_insertion_order_is_stable_across_updates() {
        let mut store = DeviceObservationStore::new();
        store.insert("AR-1", obs(1, 290.0));
        store.insert("SK-2", obs(2, 0.0));
        store.insert("AR-1", obs(1, 295.0));

        let serials: Vec<_> = store.observations().map(|(s, _)| s).collect();
        assert_eq!(serials, vec!["AR-1", "SK-2"]);
    }

    #[test]
    fn test_current_tracks_most_recent_overall() {
        let mut store = DeviceObservationStore::new();
        store.insert("AR-1", obs(1, 290.0));
        store.insert("SK-2", obs(2, 0.0));
        assert_eq!(store.current().unwrap().device_id, 2);
    }

    #[test]
    fn test_rapid_wind_merges_into_existing() {
        let mut store = DeviceObservationStore::new();
        store.insert("ST-1", obs(1, 290.0));

        let rapid = RapidWind {
            timestamp: OffsetDateTime::from_unix_timestamp(1_700_000_003).unwrap(),
            device_id: 1,
            speed: 7.5,
            direction: 45.0,
        };
        let merged = store.apply_rapid_wind("ST-1", &rapid);

        assert_eq!(merged.wind_avg, Some(7.5));
        // Non-wind fields survive the overlay.
        assert_eq!(merged.air_temperature, Some(290.0));
        assert_eq!(merged.timestamp.unix_timestamp(), 1_700_000_000);
        assert_eq!(store.current().unwrap().wind_avg, Some(7.5));
    }

    #[test]
    fn test_rapid_wind_without_base_creates_wind_only() {
        let mut store = DeviceObservationStore::new();
        let rapid = RapidWind {
            timestamp: OffsetDateTime::from_unix_timestamp(1_700_000_003).unwrap(),
            device_id: 9,
            speed: 3.0,
            direction: 200.0,
        };
        let created = store.apply_rapid_wind("ST-9", &rapid);
        assert_eq!(created.wind_avg, Some(3.0));
        assert!(created.air_temperature.is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_lightning_ring_keeps_newest_fifty() {
        let mut store = DeviceObservationStore::new();
        for i in 0..60 {
            store.record_strike(strike(1_700_000_000 + i));
        }
        let strikes: Vec<_> = store.strikes().collect();
        assert_eq!(strikes.len(), LIGHTNING_HISTORY_CAPACITY);
        // Newest first.
        assert_eq!(strikes[0].timestamp.unix_timestamp(), 1_700_000_059);
        assert_eq!(strikes[49].timestamp.unix_timestamp(), 1_700_000_010);
    }

    #[test]
    fn test_clear_drops_all_station_scoped_state() {
        let mut store = DeviceObservationStore::new();
        store.insert("ST-1", obs(1, 290.0));
        store.record_strike(strike(1_700_000_000));
        store.record_rain_start(RainStartEvent {
            timestamp: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
            device_id: 1,
        });

        store.clear();

        assert!(store.is_empty());
        assert!(store.current().is_none());
        assert_eq!(store.strikes().count(), 0);
        assert!(store.last_rain_start().is_none());
    }
}
