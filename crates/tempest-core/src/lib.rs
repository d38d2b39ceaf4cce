//! Transport orchestration and observation fusion for Tempest weather
//! stations.
//!
//! Live telemetry arrives over three independent transports (a cloud REST
//! API, a cloud WebSocket push channel, and a local-network UDP broadcast),
//! each with its own wire representation and failure modes. This crate
//! decodes all of them into one SI-normalized observation model, merges
//! readings across a station's physical sensors, and exposes a single
//! coherent "current conditions" view that degrades gracefully when
//! transports drop.
//!
//! # Architecture
//!
//! - **Wire decoding** ([`wire`]): positional-array frames → typed messages
//! - **Transports** ([`rest`], [`websocket`], [`udp`]): three peer adapters
//!   with a common start/stop lifecycle, feeding one event channel
//! - **Fusion** ([`store`], [`merge`]): last-write-wins per device, plus a
//!   pure per-field resolver across devices
//! - **Orchestration** ([`orchestrator`], [`scheduler`]): lifecycle
//!   ownership, websocket > udp > rest > none connection priority, REST
//!   fallback, periodic refresh
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tempest_cache::{Cache, MemoryStore};
//! use tempest_core::rest::RestClient;
//! use tempest_core::{HubConfig, WeatherHub};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let api = Arc::new(RestClient::new(
//!     "https://swd.weatherflow.com/swd/rest",
//!     "your-token",
//! )?);
//! let cache = Cache::new(Arc::new(MemoryStore::new()));
//!
//! let hub = Arc::new(WeatherHub::new(api, cache, HubConfig::new("your-token")));
//! hub.start().await;
//!
//! let stations = hub.refresh_stations().await?;
//! if let Some(station) = stations.first() {
//!     hub.select_station(station.station_id).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod device_id;
pub mod error;
pub mod events;
pub mod merge;
pub mod orchestrator;
pub mod rest;
pub mod scheduler;
pub mod store;
pub mod udp;
pub mod websocket;
pub mod wire;

// Core exports
pub use device_id::DeviceIdResolver;
pub use error::{Error, Result};
pub use events::{
    ConnectionType, EventDispatcher, EventReceiver, EventSender, HubEvent, LinkState,
    TransportEvent,
};
pub use merge::resolve;
pub use orchestrator::{HubConfig, WeatherHub};
pub use rest::{RestClient, TimeRange, WeatherApi};
pub use scheduler::DEFAULT_REFRESH_INTERVAL;
pub use store::{DeviceObservationStore, LIGHTNING_HISTORY_CAPACITY};
pub use udp::{DEFAULT_UDP_PORT, UdpAdapter, UdpConfig};
pub use websocket::{DEFAULT_WEBSOCKET_URL, WebSocketAdapter, WebSocketConfig, WebSocketTarget};
pub use wire::{DecodedFrame, DeviceStatus, HubStatus, WireDecoder, WireMessage};

// Re-export the model types
pub use tempest_types::{
    Device, DeviceType, FieldSource, FieldSources, ForecastResponse, LightningStrike, Observation,
    ObservationSource, PrecipitationType, RainStartEvent, RapidWind, Station,
};
