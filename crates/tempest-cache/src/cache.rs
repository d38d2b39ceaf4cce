//! TTL-governed cache over the key-value boxes.
//!
//! Expiry here is advisory: a read always returns whatever is cached, along
//! with enough metadata for the caller to decide whether it is stale. The
//! orchestrator prefers stale data over no data when a live fetch fails.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

use tempest_types::{ForecastResponse, Observation, Station};

use crate::error::Result;
use crate::kv::{BOX_FORECASTS, BOX_OBSERVATIONS, BOX_STATIONS, KvStore};

/// Advisory TTL for cached station lists.
pub const STATIONS_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Advisory TTL for cached device observations.
pub const OBSERVATIONS_MAX_AGE: Duration = Duration::from_secs(5 * 60);

/// Advisory TTL for cached forecasts.
pub const FORECASTS_MAX_AGE: Duration = Duration::from_secs(30 * 60);

/// Cache category, each with its own box and TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Station snapshots (24 h TTL).
    Stations,
    /// Latest observation per device (5 min TTL).
    Observations,
    /// Forecast snapshots per station (30 min TTL).
    Forecasts,
}

impl Category {
    fn box_name(self) -> &'static str {
        match self {
            Category::Stations => BOX_STATIONS,
            Category::Observations => BOX_OBSERVATIONS,
            Category::Forecasts => BOX_FORECASTS,
        }
    }

    fn max_age(self) -> Duration {
        match self {
            Category::Stations => STATIONS_MAX_AGE,
            Category::Observations => OBSERVATIONS_MAX_AGE,
            Category::Forecasts => FORECASTS_MAX_AGE,
        }
    }
}

/// On-disk envelope wrapping every cached payload.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    source: String,
    cached_at: i64,
    max_age_secs: u64,
    payload: T,
}

/// A cached value plus its staleness metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    /// The cached payload.
    pub value: T,
    /// Which transport produced the payload.
    pub source: String,
    /// When the payload was written.
    pub cached_at: OffsetDateTime,
    /// Advisory maximum age.
    pub max_age: Duration,
}

impl<T> CacheEntry<T> {
    /// Whether the entry has outlived its advisory TTL.
    ///
    /// Expired entries are still returned by reads; staleness is the
    /// caller's call to make.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now - self.cached_at > self.max_age
    }
}

/// The cache layer: typed reads and writes over a [`KvStore`].
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn KvStore>,
}

impl Cache {
    /// Create a cache over the given backend.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    // === Stations ===

    /// Persist the station list (single well-known key).
    pub fn put_stations(&self, stations: &[Station], source: &str) -> Result<()> {
        self.write(Category::Stations, "list", stations, source)
    }

    /// Read the cached station list, if any.
    pub fn get_stations(&self) -> Option<CacheEntry<Vec<Station>>> {
        self.read(Category::Stations, "list")
    }

    // === Observations ===

    /// Persist the latest observation for a device, keyed by device id.
    pub fn put_observation(&self, observation: &Observation) -> Result<()> {
        self.write(
            Category::Observations,
            &observation.device_id.to_string(),
            observation,
            &observation.source.to_string(),
        )
    }

    /// Read the cached observation for a device, if any.
    pub fn get_observation(&self, device_id: i64) -> Option<CacheEntry<Observation>> {
        self.read(Category::Observations, &device_id.to_string())
    }

    // === Forecasts ===

    /// Persist a forecast snapshot, keyed by station id.
    pub fn put_forecast(&self, station_id: i64, forecast: &ForecastResponse) -> Result<()> {
        self.write(
            Category::Forecasts,
            &station_id.to_string(),
            forecast,
            "rest",
        )
    }

    /// Read the cached forecast for a station, if any.
    pub fn get_forecast(&self, station_id: i64) -> Option<CacheEntry<ForecastResponse>> {
        self.read(Category::Forecasts, &station_id.to_string())
    }

    // === Settings ===

    /// Persist a setting string. Settings carry no TTL envelope.
    pub fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        self.store
            .put(crate::kv::BOX_SETTINGS, key, value.as_bytes())
    }

    /// Read a setting string, if present.
    pub fn get_setting(&self, key: &str) -> Option<String> {
        match self.store.get(crate::kv::BOX_SETTINGS, key) {
            Ok(Some(bytes)) => String::from_utf8(bytes).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "settings read failed");
                None
            }
        }
    }

    /// Remove a setting.
    pub fn delete_setting(&self, key: &str) -> Result<()> {
        self.store.delete(crate::kv::BOX_SETTINGS, key)
    }

    // === Clearing ===

    /// Drop every entry in one category.
    pub fn clear_category(&self, category: Category) -> Result<()> {
        self.store.clear(category.box_name())
    }

    /// Drop the station-scoped categories (observations and forecasts),
    /// preserving the station list. Used on station switch.
    pub fn clear_station_scope(&self) -> Result<()> {
        self.store.clear(BOX_OBSERVATIONS)?;
        self.store.clear(BOX_FORECASTS)
    }

    /// Drop everything, the settings box included. Used on logout.
    pub fn clear_all(&self) -> Result<()> {
        self.store.clear(BOX_STATIONS)?;
        self.store.clear(BOX_OBSERVATIONS)?;
        self.store.clear(BOX_FORECASTS)?;
        self.store.clear(crate::kv::BOX_SETTINGS)
    }

    // === Internals ===

    fn write<T: Serialize + ?Sized>(
        &self,
        category: Category,
        key: &str,
        payload: &T,
        source: &str,
    ) -> Result<()> {
        let envelope = Envelope {
            source: source.to_string(),
            cached_at: OffsetDateTime::now_utc().unix_timestamp(),
            max_age_secs: category.max_age().as_secs(),
            payload,
        };
        let bytes = serde_json::to_vec(&envelope)?;
        self.store.put(category.box_name(), key, &bytes)?;
        debug!(box_name = category.box_name(), key, "cache write");
        Ok(())
    }

    /// A corrupt or unreadable entry is treated as a miss, not an error:
    /// the cache is a convenience layer and must never block live data.
    fn read<T: DeserializeOwned>(&self, category: Category, key: &str) -> Option<CacheEntry<T>> {
        let bytes = match self.store.get(category.box_name(), key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(box_name = category.box_name(), key, error = %e, "cache read failed");
                return None;
            }
        };

        let envelope: Envelope<T> = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(box_name = category.box_name(), key, error = %e, "corrupt cache entry");
                return None;
            }
        };

        Some(CacheEntry {
            value: envelope.payload,
            source: envelope.source,
            cached_at: OffsetDateTime::from_unix_timestamp(envelope.cached_at)
                .unwrap_or(OffsetDateTime::UNIX_EPOCH),
            max_age: Duration::from_secs(envelope.max_age_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use tempest_types::{Observation, ObservationSource};

    fn cache() -> Cache {
        Cache::new(Arc::new(MemoryStore::new()))
    }

    fn obs(device_id: i64) -> Observation {
        Observation::empty(
            device_id,
            ObservationSource::Udp,
            OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        )
    }

    #[test]
    fn test_observation_roundtrip_keyed_by_device() {
        let cache = cache();
        cache.put_observation(&obs(7)).unwrap();
        cache.put_observation(&obs(9)).unwrap();

        let entry = cache.get_observation(7).unwrap();
        assert_eq!(entry.value.device_id, 7);
        assert_eq!(entry.source, "udp");
        assert_eq!(entry.max_age, OBSERVATIONS_MAX_AGE);
        assert!(cache.get_observation(8).is_none());
    }

    #[test]
    fn test_expiry_is_advisory() {
        let cache = cache();
        cache.put_observation(&obs(7)).unwrap();

        let entry = cache.get_observation(7).unwrap();
        let later = entry.cached_at + Duration::from_secs(600);
        assert!(entry.is_expired(later));
        // Still readable after expiry.
        assert!(cache.get_observation(7).is_some());
    }

    #[test]
    fn test_station_scope_clear_preserves_stations() {
        let cache = cache();
        cache.put_stations(&[], "rest").unwrap();
        cache.put_observation(&obs(7)).unwrap();
        cache
            .put_forecast(
                100,
                &ForecastResponse::new(Vec::new(), Vec::new(), OffsetDateTime::UNIX_EPOCH),
            )
            .unwrap();

        cache.clear_station_scope().unwrap();

        assert!(cache.get_stations().is_some());
        assert!(cache.get_observation(7).is_none());
        assert!(cache.get_forecast(100).is_none());
    }

    #[test]
    fn test_clear_all() {
        let cache = cache();
        cache.put_stations(&[], "rest").unwrap();
        cache.clear_all().unwrap();
        assert!(cache.get_stations().is_none());
    }

    #[test]
    fn test_settings_roundtrip() {
        let cache = cache();
        assert!(cache.get_setting("selected_station").is_none());
        cache.put_setting("selected_station", "100").unwrap();
        assert_eq!(cache.get_setting("selected_station").unwrap(), "100");
        cache.delete_setting("selected_station").unwrap();
        assert!(cache.get_setting("selected_station").is_none());
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let store = Arc::new(MemoryStore::new());
        store.put(BOX_OBSERVATIONS, "7", b"not json").unwrap();
        let cache = Cache::new(store);
        assert!(cache.get_observation(7).is_none());
    }
}
