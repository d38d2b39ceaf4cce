//! Bounded-staleness persistence for Tempest telemetry.
//!
//! This crate implements the cache layer: a named-box key-value store with
//! SQLite and in-memory backends, and a typed TTL layer over it for
//! stations, observations and forecasts.
//!
//! Expiry is advisory: reads return expired entries, and the caller
//! decides whether stale data beats no data (on a failed live fetch, it
//! does).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tempest_cache::{Cache, MemoryStore};
//!
//! let cache = Cache::new(Arc::new(MemoryStore::new()));
//! assert!(cache.get_stations().is_none());
//! ```

mod cache;
mod error;
mod kv;

pub use cache::{
    Cache, CacheEntry, Category, FORECASTS_MAX_AGE, OBSERVATIONS_MAX_AGE, STATIONS_MAX_AGE,
};
pub use error::{Error, Result};
pub use kv::{
    BOX_FORECASTS, BOX_OBSERVATIONS, BOX_SETTINGS, BOX_STATIONS, KvStore, MemoryStore, SqliteStore,
};

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/tempest/cache.db`
/// - macOS: `~/Library/Application Support/tempest/cache.db`
/// - Windows: `C:\Users\<user>\AppData\Local\tempest\cache.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("tempest")
        .join("cache.db")
}
