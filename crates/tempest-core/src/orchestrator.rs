//! The connection orchestrator.
//!
//! One component owns the three transports' lifecycles, the station-scoped
//! state they feed, and the consumer-facing surface over both. All state
//! mutation is serialized behind a single lock: transport callbacks funnel
//! into one event task, and every mutating method commits under the same
//! write lock before notifying observers. Nothing writes concurrently from
//! transport callbacks.
//!
//! The effective [`ConnectionType`] is not a literal state machine; it is
//! recomputed opportunistically on transport transitions, with strict
//! priority websocket > udp > rest > none.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tempest_cache::Cache;
use tempest_types::{
    FieldSources, ForecastResponse, LightningStrike, Observation, RainStartEvent, Station,
};

use crate::device_id::DeviceIdResolver;
use crate::error::{Error, Result};
use crate::events::{
    ConnectionType, EventDispatcher, EventReceiver, HubEvent, LinkState, TransportEvent,
    TransportReceiver, TransportSender, transport_channel,
};
use crate::merge;
use crate::rest::WeatherApi;
use crate::scheduler;
use crate::store::DeviceObservationStore;
use crate::udp::{DEFAULT_UDP_PORT, UdpAdapter, UdpConfig};
use crate::websocket::{
    DEFAULT_WEBSOCKET_URL, WebSocketAdapter, WebSocketConfig, WebSocketTarget,
};
use crate::wire::{HubStatus, WireDecoder};

/// Settings-box key holding the last selected station id.
const SELECTED_STATION_KEY: &str = "selected_station";

/// Configuration for the hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Access token for the cloud channels.
    pub token: String,
    /// Whether the broadcast listener starts with the station.
    pub udp_enabled: bool,
    /// Broadcast port.
    pub udp_port: u16,
    /// Push endpoint URL.
    pub websocket_url: String,
    /// Periodic REST refresh interval.
    pub refresh_interval: Duration,
    /// Consumer event channel capacity.
    pub event_capacity: usize,
}

impl HubConfig {
    /// Defaults for the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            udp_enabled: true,
            udp_port: DEFAULT_UDP_PORT,
            websocket_url: DEFAULT_WEBSOCKET_URL.to_string(),
            refresh_interval: scheduler::DEFAULT_REFRESH_INTERVAL,
            event_capacity: 100,
        }
    }
}

/// Station-scoped state. Everything here except `stations` and
/// `udp_enabled` is cleared on station switch.
#[derive(Default)]
struct HubState {
    stations: Vec<Station>,
    selected: Option<Station>,
    store: DeviceObservationStore,
    forecast: Option<ForecastResponse>,
    connection: ConnectionType,
    last_error: Option<String>,
    hub_status: Option<HubStatus>,
    udp_enabled: bool,
    /// A successful REST fetch happened for the selected station; lets a
    /// dead push channel degrade to `Rest` instead of `None`.
    rest_seen: bool,
    /// Token rejected; fetches halt until re-authentication.
    auth_halted: bool,
}

/// The weather hub: transports, fusion state and the consumer surface.
///
/// Construct with explicit collaborators (REST client, cache) and drive
/// with [`start`](Self::start)/[`stop`](Self::stop); there are no ambient
/// singletons.
pub struct WeatherHub {
    api: Arc<dyn WeatherApi>,
    cache: Cache,
    config: HubConfig,
    state: RwLock<HubState>,
    events: EventDispatcher,
    udp: UdpAdapter,
    websocket: WebSocketAdapter,
    transport_rx: std::sync::Mutex<Option<TransportReceiver>>,
    cancel: CancellationToken,
    refresh_tx: scheduler::ResetSender,
    refresh_rx: std::sync::Mutex<Option<scheduler::ResetReceiver>>,
}

impl WeatherHub {
    /// Create a hub over the given collaborators.
    pub fn new(api: Arc<dyn WeatherApi>, cache: Cache, config: HubConfig) -> Self {
        let (transport_tx, transport_rx): (TransportSender, TransportReceiver) =
            transport_channel();
        let (refresh_tx, refresh_rx) = scheduler::reset_channel();

        let udp = UdpAdapter::new(
            UdpConfig {
                port: config.udp_port,
            },
            transport_tx.clone(),
        );
        let websocket = WebSocketAdapter::new(
            WebSocketConfig {
                url: config.websocket_url.clone(),
                token: config.token.clone(),
            },
            transport_tx,
        );

        let state = HubState {
            udp_enabled: config.udp_enabled,
            ..Default::default()
        };

        Self {
            api,
            cache,
            events: EventDispatcher::new(config.event_capacity),
            config,
            state: RwLock::new(state),
            udp,
            websocket,
            transport_rx: std::sync::Mutex::new(Some(transport_rx)),
            cancel: CancellationToken::new(),
            refresh_tx,
            refresh_rx: std::sync::Mutex::new(Some(refresh_rx)),
        }
    }

    /// Subscribe to hub events. Events fire after the corresponding state
    /// mutation is committed.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Start the hub: populate state from cache, then run the transport
    /// event task and the refresh scheduler.
    ///
    /// The cache read happens before any network call completes, so a
    /// consumer rendering immediately after `start` sees last session's
    /// data rather than an empty screen.
    pub async fn start(self: &Arc<Self>) {
        if let Some(entry) = self.cache.get_stations() {
            let mut state = self.state.write().await;
            state.stations = entry.value;
            drop(state);
            self.events.send(HubEvent::StationsUpdated);
            debug!("stations restored from cache");
        }

        self.restore_selection_from_cache().await;

        let rx = self
            .transport_rx
            .lock()
            .expect("transport receiver poisoned")
            .take();
        if let Some(rx) = rx {
            tokio::spawn(run_event_task(Arc::clone(self), rx, self.cancel.clone()));
        }

        let reset_rx = self
            .refresh_rx
            .lock()
            .expect("refresh receiver poisoned")
            .take();
        if let Some(reset_rx) = reset_rx {
            scheduler::spawn(
                Arc::clone(self),
                self.config.refresh_interval,
                reset_rx,
                self.cancel.clone(),
            );
        }

        info!("weather hub started");
    }

    /// Stop the hub and both connection-oriented transports. Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.websocket.stop().await;
        self.udp.stop().await;
    }

    // ======================================================================
    // Consumer surface: reads
    // ======================================================================

    /// The best currently-active transport.
    pub async fn connection_type(&self) -> ConnectionType {
        self.state.read().await.connection
    }

    /// The most recently received observation, device-agnostic.
    pub async fn current_observation(&self) -> Option<Observation> {
        self.state.read().await.store.current().cloned()
    }

    /// Latest observation per device serial, in first-seen order.
    pub async fn device_observations(&self) -> Vec<(String, Observation)> {
        self.state
            .read()
            .await
            .store
            .observations()
            .map(|(s, o)| (s.to_string(), o.clone()))
            .collect()
    }

    /// Compute the station-level merged observation for the given field
    /// sources. Pure with respect to hub state.
    pub async fn resolve(&self, sources: &FieldSources) -> Option<Observation> {
        merge::resolve(&self.state.read().await.store, sources)
    }

    /// Recorded lightning strikes, most recent first (at most 50).
    pub async fn lightning_strikes(&self) -> Vec<LightningStrike> {
        self.state.read().await.store.strikes().copied().collect()
    }

    /// The most recent rain-start event for the selected station.
    pub async fn last_rain_start(&self) -> Option<RainStartEvent> {
        self.state.read().await.store.last_rain_start().copied()
    }

    /// Known stations.
    pub async fn stations(&self) -> Vec<Station> {
        self.state.read().await.stations.clone()
    }

    /// The selected station, if any.
    pub async fn selected_station(&self) -> Option<Station> {
        self.state.read().await.selected.clone()
    }

    /// The current forecast snapshot, if any.
    pub async fn current_forecast(&self) -> Option<ForecastResponse> {
        self.state.read().await.forecast.clone()
    }

    /// The consumer-visible error string, if any.
    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    /// Latest hub status metadata seen on the broadcast.
    pub async fn hub_status(&self) -> Option<HubStatus> {
        self.state.read().await.hub_status.clone()
    }

    /// Whether the broadcast listener is enabled.
    pub async fn udp_enabled(&self) -> bool {
        self.state.read().await.udp_enabled
    }

    /// Broadcast listener lifecycle state. A bind failure shows up here as
    /// [`LinkState::Error`], distinct from "not enabled".
    pub fn udp_state(&self) -> LinkState {
        self.udp.state()
    }

    // ======================================================================
    // Consumer surface: mutations
    // ======================================================================

    /// Refresh the station list from the REST API, falling back to cache.
    pub async fn refresh_stations(&self) -> Result<Vec<Station>> {
        match self.api.get_stations().await {
            Ok(stations) => {
                if let Err(e) = self.cache.put_stations(&stations, "rest") {
                    warn!(error = %e, "failed to cache stations");
                }
                let mut state = self.state.write().await;
                state.stations = stations.clone();
                drop(state);
                self.events.send(HubEvent::StationsUpdated);
                Ok(stations)
            }
            Err(e) => {
                self.record_error(&e).await;
                match self.cache.get_stations() {
                    Some(entry) => Ok(entry.value),
                    None => Err(e),
                }
            }
        }
    }

    /// Select a station and bring every transport over to it.
    ///
    /// The switch protocol, in order: disconnect the push channel → clear
    /// station-scoped state → reconnect the push channel for the new
    /// station's Tempest unit → restart the broadcast listener with the new
    /// allow-list → one REST fetch of observation and forecast → restart
    /// the refresh timer.
    pub async fn select_station(self: &Arc<Self>, station_id: i64) -> Result<()> {
        let station = self.find_station(station_id).await?;

        self.websocket.stop().await;

        {
            let mut state = self.state.write().await;
            state.store.clear();
            state.forecast = None;
            state.last_error = None;
            state.hub_status = None;
            state.rest_seen = false;
            state.selected = Some(station.clone());
        }
        if let Err(e) = self.cache.clear_station_scope() {
            warn!(error = %e, "failed to clear station-scoped cache");
        }
        if let Err(e) = self
            .cache
            .put_setting(SELECTED_STATION_KEY, &station_id.to_string())
        {
            warn!(error = %e, "failed to persist selection");
        }
        self.events.send(HubEvent::StationSelected { station_id });
        self.events.send(HubEvent::ErrorChanged { error: None });

        if let Some(tempest) = station.tempest_device() {
            let target = WebSocketTarget {
                device_id: tempest.device_id,
                serial_number: tempest.serial_number.clone(),
            };
            if let Err(e) = self.websocket.start(target).await {
                warn!(error = %e, "websocket start failed");
            }
        } else {
            debug!(station_id, "station has no Tempest unit; push channel idle");
        }

        if self.state.read().await.udp_enabled {
            if let Err(e) = self.udp.restart(self.decoder_for(&station)).await {
                self.record_error(&e).await;
            }
        }

        self.do_refresh().await;
        scheduler::reset(&self.refresh_tx);

        Ok(())
    }

    /// Force a REST refresh of observation and forecast, bypassing every
    /// TTL, and restart the periodic timer.
    pub async fn refresh(&self) -> Result<()> {
        if self.state.read().await.selected.is_none() {
            return Err(Error::NoStationSelected);
        }
        self.do_refresh().await;
        scheduler::reset(&self.refresh_tx);
        Ok(())
    }

    /// Enable or disable the broadcast listener.
    ///
    /// Either direction triggers an immediate REST fetch: after a disable
    /// the "current observation" would otherwise stay frozen at the last
    /// broadcast frame, and after an enable the REST baseline bridges the
    /// gap until the first frame arrives.
    pub async fn set_udp_enabled(&self, enabled: bool) -> Result<()> {
        let (selected, was_enabled) = {
            let mut state = self.state.write().await;
            let was = state.udp_enabled;
            state.udp_enabled = enabled;
            (state.selected.clone(), was)
        };

        if enabled {
            let decoder = selected
                .as_ref()
                .map(|s| self.decoder_for(s))
                .unwrap_or_default();
            if let Err(e) = self.udp.restart(decoder).await {
                self.record_error(&e).await;
                return Err(e);
            }
        } else if was_enabled {
            self.udp.stop().await;
        }

        if selected.is_some() {
            self.do_refresh().await;
        }
        Ok(())
    }

    /// Start the broadcast listener.
    pub async fn start_udp(&self) -> Result<()> {
        self.set_udp_enabled(true).await
    }

    /// Stop the broadcast listener.
    pub async fn stop_udp(&self) -> Result<()> {
        self.set_udp_enabled(false).await
    }

    /// Clear the authentication halt after the consumer obtained a fresh
    /// token. Validates the token before resuming fetches.
    pub async fn mark_authenticated(&self, token: &str) -> Result<bool> {
        let valid = self.api.validate_token(token).await?;
        if valid {
            let mut state = self.state.write().await;
            state.auth_halted = false;
            state.last_error = None;
            drop(state);
            self.events.send(HubEvent::ErrorChanged { error: None });
        }
        Ok(valid)
    }

    /// Log out: stop transports and drop all cached and in-memory state,
    /// settings included.
    pub async fn logout(&self) -> Result<()> {
        self.websocket.stop().await;
        self.udp.stop().await;

        {
            let mut state = self.state.write().await;
            state.store.clear();
            state.stations.clear();
            state.selected = None;
            state.forecast = None;
            state.last_error = None;
            state.hub_status = None;
            state.rest_seen = false;
            state.auth_halted = false;
        }
        self.cache.clear_all()?;
        self.events.send(HubEvent::StationsUpdated);
        Ok(())
    }

    // ======================================================================
    // Internals
    // ======================================================================

    /// Restore last session's selection and its cached observation and
    /// forecast, so an offline start shows data instead of nothing. The
    /// transports stay down until the consumer selects a station.
    async fn restore_selection_from_cache(&self) {
        let Some(station_id) = self
            .cache
            .get_setting(SELECTED_STATION_KEY)
            .and_then(|s| s.parse::<i64>().ok())
        else {
            return;
        };

        let restored = {
            let mut state = self.state.write().await;
            let Some(station) = state
                .stations
                .iter()
                .find(|s| s.station_id == station_id)
                .cloned()
            else {
                return;
            };

            let primary = station
                .tempest_device()
                .or_else(|| station.sensor_devices().next());
            if let Some(device) = primary {
                if let Some(entry) = self.cache.get_observation(device.device_id) {
                    state.store.insert(&device.serial_number, entry.value);
                }
            }
            if let Some(entry) = self.cache.get_forecast(station_id) {
                state.forecast = Some(entry.value);
            }
            state.selected = Some(station);
            true
        };

        if restored {
            debug!(station_id, "selection restored from cache");
            self.events.send(HubEvent::StationSelected { station_id });
        }
    }

    async fn find_station(&self, station_id: i64) -> Result<Station> {
        if let Some(station) = self
            .state
            .read()
            .await
            .stations
            .iter()
            .find(|s| s.station_id == station_id)
        {
            return Ok(station.clone());
        }

        // Not known locally: refresh the list once before giving up.
        let stations = self.refresh_stations().await?;
        stations
            .into_iter()
            .find(|s| s.station_id == station_id)
            .ok_or(Error::UnknownStation(station_id))
    }

    fn decoder_for(&self, station: &Station) -> WireDecoder {
        let resolver = DeviceIdResolver::from_pairs(
            station
                .devices
                .iter()
                .map(|d| (d.serial_number.clone(), d.device_id)),
        );
        WireDecoder::with_allow_list(
            resolver,
            station.sensor_devices().map(|d| d.serial_number.clone()),
        )
    }

    /// The REST refresh used by the scheduler, manual refresh, fallbacks
    /// and toggles. Failures are recorded, never propagated; cached data
    /// stands in where it exists.
    pub(crate) async fn do_refresh(&self) {
        let (station, halted) = {
            let state = self.state.read().await;
            (state.selected.clone(), state.auth_halted)
        };
        let Some(station) = station else { return };
        if halted {
            debug!("refresh skipped: authentication required");
            return;
        }

        self.refresh_observation(&station).await;
        // The observation fetch may have tripped the auth halt.
        if self.state.read().await.auth_halted {
            return;
        }
        self.refresh_forecast(&station).await;
    }

    async fn refresh_observation(&self, station: &Station) {
        // The station-level observation is keyed under the primary sensor
        // unit so broadcast frames for the same hardware overwrite it.
        let primary = station
            .tempest_device()
            .or_else(|| station.sensor_devices().next());

        match self.api.get_station_observation(station.station_id).await {
            Ok(mut observation) => {
                let serial = match primary {
                    Some(device) => {
                        if observation.device_id == 0 {
                            observation.device_id = device.device_id;
                        }
                        device.serial_number.clone()
                    }
                    None => format!("station-{}", station.station_id),
                };

                {
                    let mut state = self.state.write().await;
                    state.store.insert(&serial, observation.clone());
                    state.rest_seen = true;
                    if state.connection == ConnectionType::None {
                        state.connection = ConnectionType::Rest;
                    }
                }
                self.cache_observation(&observation);
                self.events.send(HubEvent::ObservationUpdated {
                    serial,
                    observation,
                });
            }
            Err(e) => {
                self.record_error(&e).await;

                // Serve the cached observation if the store has nothing
                // better; expiry is advisory.
                if let Some(device) = primary {
                    let cached = self.cache.get_observation(device.device_id);
                    if let Some(entry) = cached {
                        let serial = device.serial_number.clone();
                        let mut state = self.state.write().await;
                        if state.store.get(&serial).is_none() {
                            state.store.insert(&serial, entry.value.clone());
                            drop(state);
                            self.events.send(HubEvent::ObservationUpdated {
                                serial,
                                observation: entry.value,
                            });
                        }
                    }
                }
            }
        }
    }

    async fn refresh_forecast(&self, station: &Station) {
        match self.api.get_forecast(station.station_id).await {
            Ok(forecast) => {
                if let Err(e) = self.cache.put_forecast(station.station_id, &forecast) {
                    warn!(error = %e, "failed to cache forecast");
                }
                self.state.write().await.forecast = Some(forecast);
                self.events.send(HubEvent::ForecastUpdated);
            }
            Err(e) => {
                self.record_error(&e).await;

                let cached = self.cache.get_forecast(station.station_id);
                if let Some(entry) = cached {
                    let mut state = self.state.write().await;
                    if state.forecast.is_none() {
                        state.forecast = Some(entry.value);
                        drop(state);
                        self.events.send(HubEvent::ForecastUpdated);
                    }
                }
            }
        }
    }

    /// Record a failure for the consumer. Auth failures additionally halt
    /// fetches until [`mark_authenticated`](Self::mark_authenticated).
    async fn record_error(&self, error: &Error) {
        let message = error.to_string();
        warn!(%message, "recording hub error");
        {
            let mut state = self.state.write().await;
            if error.is_auth() {
                state.auth_halted = true;
            }
            state.last_error = Some(message.clone());
        }
        self.events.send(HubEvent::ErrorChanged {
            error: Some(message),
        });
    }

    /// Persist an observation. Runs on the event task or a control path,
    /// never on a transport receive loop, so the receive loops stay free of
    /// blocking I/O.
    fn cache_observation(&self, observation: &Observation) {
        if let Err(e) = self.cache.put_observation(observation) {
            warn!(error = %e, "failed to cache observation");
        }
    }

    async fn set_connection(&self, connection: ConnectionType) {
        {
            let mut state = self.state.write().await;
            if state.connection == connection {
                return;
            }
            state.connection = connection;
        }
        info!(%connection, "connection type changed");
        self.events.send(HubEvent::ConnectionChanged { connection });
    }

    /// Handle one transport event. Runs on the single event task, so all
    /// store writes are serialized.
    async fn handle_transport_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::Observation {
                serial,
                observation,
            } => {
                self.state
                    .write()
                    .await
                    .store
                    .insert(&serial, observation.clone());
                self.cache_observation(&observation);
                self.events.send(HubEvent::ObservationUpdated {
                    serial,
                    observation,
                });
            }
            TransportEvent::RapidWind { serial, rapid } => {
                let merged = self
                    .state
                    .write()
                    .await
                    .store
                    .apply_rapid_wind(&serial, &rapid);
                self.cache_observation(&merged);
                self.events.send(HubEvent::ObservationUpdated {
                    serial,
                    observation: merged,
                });
            }
            TransportEvent::Strike { serial, strike } => {
                debug!(%serial, distance = strike.distance, "lightning strike");
                self.state.write().await.store.record_strike(strike);
                self.events.send(HubEvent::StrikeRecorded { strike });
            }
            TransportEvent::RainStart { serial, event } => {
                debug!(%serial, "rain started");
                self.state.write().await.store.record_rain_start(event);
                self.events.send(HubEvent::RainStarted { event });
            }
            TransportEvent::HubStatus { status } => {
                self.state.write().await.hub_status = Some(status);
            }
            TransportEvent::DeviceStatus { status } => {
                debug!(serial = %status.serial_number, voltage = ?status.voltage, "device status");
            }
            TransportEvent::WebSocketUp => {
                self.set_connection(ConnectionType::WebSocket).await;
            }
            TransportEvent::WebSocketDown { failed } => {
                let downgraded = {
                    let state = self.state.read().await;
                    if state.connection != ConnectionType::WebSocket {
                        None
                    } else if self.udp.state() == LinkState::Connected {
                        Some(ConnectionType::Udp)
                    } else if state.rest_seen {
                        Some(ConnectionType::Rest)
                    } else {
                        Some(ConnectionType::None)
                    }
                };
                if let Some(connection) = downgraded {
                    self.set_connection(connection).await;
                }

                if failed {
                    // Correctness fallback, independent of the bookkeeping
                    // above: the consumer-visible observation must not stay
                    // frozen just because the push channel dropped.
                    info!("websocket failed; falling back to a REST fetch");
                    let hub = Arc::clone(self);
                    tokio::spawn(async move { hub.do_refresh().await });
                }
            }
            TransportEvent::UdpListening => {
                if self.state.read().await.connection != ConnectionType::WebSocket {
                    self.set_connection(ConnectionType::Udp).await;
                }
            }
            TransportEvent::UdpStopped => {
                if self.state.read().await.connection == ConnectionType::Udp {
                    self.set_connection(ConnectionType::None).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use tempest_cache::MemoryStore;
    use tempest_types::{
        Device, DeviceType, ObservationSource, RapidWind,
    };

    use crate::rest::TimeRange;

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
                    serial_number: "HB-00000001".to_string(),
                    device_type: DeviceType::Hub,
                },
                Device {
                    device_id: 512,
                    serial_number: "ST-00000512".to_string(),
                    device_type: DeviceType::Tempest,
                },
            ],
        }
    }

    fn rest_observation() -> Observation {
        let mut obs = Observation::empty(
            512,
            ObservationSource::Rest,
            OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        );
        obs.air_temperature = Some(294.15);
        obs.wind_avg = Some(2.0);
        obs
    }

    fn forecast() -> ForecastResponse {
        ForecastResponse::new(
            Vec::new(),
            Vec::new(),
            OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        )
    }

    #[derive(Default)]
    struct MockApi {
        obs_ok: AtomicBool,
        forecast_ok: AtomicBool,
        auth_fail: AtomicBool,
        obs_calls: AtomicUsize,
    }

    impl MockApi {
        fn healthy() -> Self {
            Self {
                obs_ok: AtomicBool::new(true),
                forecast_ok: AtomicBool::new(true),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl WeatherApi for MockApi {
        async fn get_stations(&self) -> Result<Vec<Station>> {
            Ok(vec![station()])
        }

        async fn get_station_observation(&self, _station_id: i64) -> Result<Observation> {
            self.obs_calls.fetch_add(1, Ordering::SeqCst);
            if self.auth_fail.load(Ordering::SeqCst) {
                return Err(Error::Auth("token expired".to_string()));
            }
            if self.obs_ok.load(Ordering::SeqCst) {
                Ok(rest_observation())
            } else {
                Err(Error::timeout("get_station_observation", Duration::from_secs(10)))
            }
        }

        async fn get_forecast(&self, _station_id: i64) -> Result<ForecastResponse> {
            if self.forecast_ok.load(Ordering::SeqCst) {
                Ok(forecast())
            } else {
                Err(Error::timeout("get_forecast", Duration::from_secs(10)))
            }
        }

        async fn get_device_observations(
            &self,
            _device_id: i64,
            _range: TimeRange,
        ) -> Result<Vec<Observation>> {
            Ok(Vec::new())
        }

        async fn validate_token(&self, _token: &str) -> Result<bool> {
            Ok(!self.auth_fail.load(Ordering::SeqCst))
        }
    }

    fn hub_with(api: Arc<MockApi>) -> Arc<WeatherHub> {
        let cache = Cache::new(Arc::new(MemoryStore::new()));
        hub_with_cache(api, cache)
    }

    fn hub_with_cache(api: Arc<MockApi>, cache: Cache) -> Arc<WeatherHub> {
        let config = HubConfig {
            udp_enabled: false,
            udp_port: 0,
            // Refused locally, so no test ever waits on a real endpoint.
            websocket_url: "ws://127.0.0.1:9".to_string(),
            ..HubConfig::new("test-token")
        };
        Arc::new(WeatherHub::new(api, cache, config))
    }

    #[tokio::test]
    async fn test_select_station_populates_state() {
        let api = Arc::new(MockApi::healthy());
        let hub = hub_with(Arc::clone(&api));

        hub.select_station(100).await.unwrap();

        assert_eq!(hub.selected_station().await.unwrap().station_id, 100);
        let current = hub.current_observation().await.unwrap();
        assert_eq!(current.source, ObservationSource::Rest);
        assert_eq!(current.device_id, 512);
        assert!(hub.current_forecast().await.is_some());
        assert_eq!(hub.connection_type().await, ConnectionType::Rest);
        assert!(hub.last_error().await.is_none());

        let devices = hub.device_observations().await;
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].0, "ST-00000512");
    }

    #[tokio::test]
    async fn test_select_unknown_station_fails() {
        let hub = hub_with(Arc::new(MockApi::healthy()));
        assert!(matches!(
            hub.select_station(999).await,
            Err(Error::UnknownStation(999))
        ));
    }

    #[tokio::test]
    async fn test_connection_priority_websocket_over_udp() {
        let hub = hub_with(Arc::new(MockApi::healthy()));

        // Bring the broadcast listener up for real (ephemeral port).
        hub.udp.start(WireDecoder::default()).await.unwrap();

        hub.handle_transport_event(TransportEvent::UdpListening).await;
        assert_eq!(hub.connection_type().await, ConnectionType::Udp);

        hub.handle_transport_event(TransportEvent::WebSocketUp).await;
        assert_eq!(hub.connection_type().await, ConnectionType::WebSocket);

        // Another UdpListening while the push channel is up must not win.
        hub.handle_transport_event(TransportEvent::UdpListening).await;
        assert_eq!(hub.connection_type().await, ConnectionType::WebSocket);

        // Clean websocket stop with UDP still listening degrades to udp,
        // never to none.
        hub.handle_transport_event(TransportEvent::WebSocketDown { failed: false })
            .await;
        assert_eq!(hub.connection_type().await, ConnectionType::Udp);

        hub.udp.stop().await;
        hub.handle_transport_event(TransportEvent::UdpStopped).await;
        assert_eq!(hub.connection_type().await, ConnectionType::None);
    }

    #[tokio::test]
    async fn test_websocket_loss_without_udp_degrades_to_rest_after_fetch() {
        let hub = hub_with(Arc::new(MockApi::healthy()));
        hub.select_station(100).await.unwrap();

        hub.handle_transport_event(TransportEvent::WebSocketUp).await;
        assert_eq!(hub.connection_type().await, ConnectionType::WebSocket);

        hub.handle_transport_event(TransportEvent::WebSocketDown { failed: false })
            .await;
        assert_eq!(hub.connection_type().await, ConnectionType::Rest);
    }

    #[tokio::test]
    async fn test_station_switch_clears_station_scoped_state() {
        let api = Arc::new(MockApi::healthy());
        let hub = hub_with(Arc::clone(&api));
        hub.select_station(100).await.unwrap();

        // Accumulate station-scoped state through the transport path.
        hub.handle_transport_event(TransportEvent::Strike {
            serial: "ST-00000512".to_string(),
            strike: LightningStrike {
                timestamp: OffsetDateTime::from_unix_timestamp(1_700_000_050).unwrap(),
                device_id: 512,
                distance: 9000.0,
                energy: 120.0,
            },
        })
        .await;
        hub.handle_transport_event(TransportEvent::RainStart {
            serial: "ST-00000512".to_string(),
            event: RainStartEvent {
                timestamp: OffsetDateTime::from_unix_timestamp(1_700_000_060).unwrap(),
                device_id: 512,
            },
        })
        .await;
        assert_eq!(hub.lightning_strikes().await.len(), 1);

        // Switch with a dead API: everything station-scoped must be gone
        // and must not be refilled.
        api.obs_ok.store(false, Ordering::SeqCst);
        api.forecast_ok.store(false, Ordering::SeqCst);
        hub.select_station(100).await.unwrap();

        assert!(hub.device_observations().await.is_empty());
        assert!(hub.current_observation().await.is_none());
        assert!(hub.current_forecast().await.is_none());
        assert!(hub.lightning_strikes().await.is_empty());
        assert!(hub.last_rain_start().await.is_none());
        // The station list survives the switch.
        assert_eq!(hub.stations().await.len(), 1);
    }

    #[tokio::test]
    async fn test_forecast_survives_a_failed_refresh() {
        let api = Arc::new(MockApi::healthy());
        let hub = hub_with(Arc::clone(&api));
        hub.select_station(100).await.unwrap();

        api.forecast_ok.store(false, Ordering::SeqCst);
        api.obs_ok.store(false, Ordering::SeqCst);
        hub.refresh().await.unwrap();

        // The fetch timed out; the consumer still sees the earlier
        // snapshot, the error is surfaced, and the connection type is
        // untouched.
        assert!(hub.current_forecast().await.is_some());
        assert!(hub.last_error().await.is_some());
        assert_eq!(hub.connection_type().await, ConnectionType::Rest);
    }

    #[tokio::test]
    async fn test_startup_restores_cached_state_offline() {
        let cache = Cache::new(Arc::new(MemoryStore::new()));

        // First session: live fetches populate the cache.
        {
            let api = Arc::new(MockApi::healthy());
            let hub = hub_with_cache(Arc::clone(&api), cache.clone());
            hub.refresh_stations().await.unwrap();
            hub.select_station(100).await.unwrap();
        }

        // Second session: the cloud is unreachable, the cache carries us.
        let api = Arc::new(MockApi::default());
        let hub = hub_with_cache(Arc::clone(&api), cache);
        hub.start().await;

        assert_eq!(hub.selected_station().await.unwrap().station_id, 100);
        assert!(hub.current_observation().await.is_some());
        assert!(hub.current_forecast().await.is_some());
        // Restored without a single network call.
        assert_eq!(api.obs_calls.load(Ordering::SeqCst), 0);
        hub.stop().await;
    }

    #[tokio::test]
    async fn test_rapid_wind_event_merges_not_replaces() {
        let hub = hub_with(Arc::new(MockApi::healthy()));

        let mut full = rest_observation();
        full.source = ObservationSource::Udp;
        hub.handle_transport_event(TransportEvent::Observation {
            serial: "ST-00000512".to_string(),
            observation: full,
        })
        .await;

        hub.handle_transport_event(TransportEvent::RapidWind {
            serial: "ST-00000512".to_string(),
            rapid: RapidWind {
                timestamp: OffsetDateTime::from_unix_timestamp(1_700_000_003).unwrap(),
                device_id: 512,
                speed: 9.9,
                direction: 310.0,
            },
        })
        .await;

        let current = hub.current_observation().await.unwrap();
        assert_eq!(current.wind_avg, Some(9.9));
        assert_eq!(current.wind_direction, Some(310.0));
        // Temperature survived the rapid-wind overlay.
        assert_eq!(current.air_temperature, Some(294.15));
    }

    #[tokio::test]
    async fn test_auth_failure_halts_fetches_until_reauthenticated() {
        let api = Arc::new(MockApi::healthy());
        let hub = hub_with(Arc::clone(&api));
        hub.select_station(100).await.unwrap();

        api.auth_fail.store(true, Ordering::SeqCst);
        hub.refresh().await.unwrap();
        let calls_after_auth_failure = api.obs_calls.load(Ordering::SeqCst);
        assert!(hub.last_error().await.unwrap().contains("Authentication"));

        // Halted: further refreshes don't hit the API.
        hub.do_refresh().await;
        assert_eq!(api.obs_calls.load(Ordering::SeqCst), calls_after_auth_failure);

        // Re-authenticate and resume.
        api.auth_fail.store(false, Ordering::SeqCst);
        assert!(hub.mark_authenticated("fresh-token").await.unwrap());
        hub.do_refresh().await;
        assert!(api.obs_calls.load(Ordering::SeqCst) > calls_after_auth_failure);
    }

    #[tokio::test]
    async fn test_resolve_over_transport_fed_store() {
        let hub = hub_with(Arc::new(MockApi::healthy()));

        let mut air = Observation::empty(
            1234,
            ObservationSource::Udp,
            OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        );
        air.air_temperature = Some(295.65);
        hub.handle_transport_event(TransportEvent::Observation {
            serial: "AR-00001234".to_string(),
            observation: air,
        })
        .await;

        let mut sky = Observation::empty(
            5678,
            ObservationSource::Udp,
            OffsetDateTime::from_unix_timestamp(1_700_000_001).unwrap(),
        );
        sky.wind_avg = Some(4.4);
        hub.handle_transport_event(TransportEvent::Observation {
            serial: "SK-00005678".to_string(),
            observation: sky,
        })
        .await;

        let resolved = hub.resolve(&FieldSources::default()).await.unwrap();
        assert_eq!(resolved.air_temperature, Some(295.65));
        assert_eq!(resolved.wind_avg, Some(4.4));
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let hub = hub_with(Arc::new(MockApi::healthy()));
        hub.select_station(100).await.unwrap();

        hub.logout().await.unwrap();

        assert!(hub.stations().await.is_empty());
        assert!(hub.selected_station().await.is_none());
        assert!(hub.current_observation().await.is_none());
    }
}

/// The single consumer of transport events.
async fn run_event_task(
    hub: Arc<WeatherHub>,
    mut rx: TransportReceiver,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => hub.handle_transport_event(event).await,
                None => break,
            },
        }
    }
    debug!("transport event task stopped");
}
