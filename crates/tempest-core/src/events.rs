//! Event channels wiring transports, orchestrator and consumers together.
//!
//! Two channels exist. Adapters push decoded values and link transitions to
//! the orchestrator over an mpsc [`TransportEvent`] channel (installed
//! before the adapter starts). The orchestrator notifies consumers over a
//! broadcast [`HubEvent`] channel, always *after* the corresponding state
//! mutation has been committed, so a consumer reading hub state from inside
//! an event handler sees the new value.

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use tempest_types::{LightningStrike, Observation, RainStartEvent, RapidWind};

use crate::wire::{DeviceStatus, HubStatus};

/// Lifecycle state of a connection-oriented transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Not running.
    Disconnected,
    /// Connection attempt in flight.
    Connecting,
    /// Connected (WebSocket) or bound and listening (UDP).
    Connected,
    /// Failed; the reason is recorded. Retryable via restart.
    Error(String),
}

/// The best currently-active transport supplying live data.
///
/// Priority is strict: websocket > udp > rest > none. The value is
/// recomputed opportunistically on transport transitions rather than driven
/// through a literal transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    /// No transport has supplied data.
    #[default]
    None,
    /// Only on-demand REST polling is available.
    Rest,
    /// The local-network broadcast is live.
    Udp,
    /// The cloud push channel is live.
    WebSocket,
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionType::None => write!(f, "none"),
            ConnectionType::Rest => write!(f, "rest"),
            ConnectionType::Udp => write!(f, "udp"),
            ConnectionType::WebSocket => write!(f, "websocket"),
        }
    }
}

/// Events emitted by transport adapters toward the orchestrator.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A full observation was decoded.
    Observation {
        /// Serial number of the reporting device.
        serial: String,
        /// The decoded observation.
        observation: Observation,
    },
    /// A rapid-wind sample was decoded.
    RapidWind {
        /// Serial number of the reporting device.
        serial: String,
        /// The decoded sample.
        rapid: RapidWind,
    },
    /// A lightning strike was decoded.
    Strike {
        /// Serial number of the reporting device.
        serial: String,
        /// The decoded strike.
        strike: LightningStrike,
    },
    /// A rain-start event was decoded.
    RainStart {
        /// Serial number of the reporting device.
        serial: String,
        /// The decoded event.
        event: RainStartEvent,
    },
    /// Hub status metadata arrived.
    HubStatus {
        /// The decoded status.
        status: HubStatus,
    },
    /// Sensor-unit status metadata arrived.
    DeviceStatus {
        /// The decoded status.
        status: DeviceStatus,
    },
    /// The WebSocket connected and subscribed successfully.
    WebSocketUp,
    /// The WebSocket went down.
    WebSocketDown {
        /// `true` when the channel failed (connect error, dropped
        /// connection), `false` for a requested disconnect. Failure
        /// triggers the one-shot REST fallback; a clean stop does not.
        failed: bool,
    },
    /// The UDP socket bound and is listening.
    UdpListening,
    /// The UDP listener stopped.
    UdpStopped,
}

/// Sender half of the transport event channel.
pub type TransportSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiver half of the transport event channel.
pub type TransportReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Create the transport event channel.
pub fn transport_channel() -> (TransportSender, TransportReceiver) {
    mpsc::unbounded_channel()
}

/// Events the orchestrator broadcasts to consumers.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum HubEvent {
    /// A device observation was stored or merged.
    ObservationUpdated {
        /// Serial number of the device.
        serial: String,
        /// The observation now held for that device.
        observation: Observation,
    },
    /// The effective connection type changed.
    ConnectionChanged {
        /// The new connection type.
        connection: ConnectionType,
    },
    /// The forecast snapshot was replaced.
    ForecastUpdated,
    /// The station list was refreshed.
    StationsUpdated,
    /// A station was selected.
    StationSelected {
        /// The selected station id.
        station_id: i64,
    },
    /// A lightning strike was recorded.
    StrikeRecorded {
        /// The strike.
        strike: LightningStrike,
    },
    /// Rain started.
    RainStarted {
        /// The event.
        event: RainStartEvent,
    },
    /// The consumer-visible error string changed.
    ErrorChanged {
        /// The new error, `None` when cleared.
        error: Option<String>,
    },
}

/// Sender for hub events.
pub type EventSender = broadcast::Sender<HubEvent>;

/// Receiver for hub events.
pub type EventReceiver = broadcast::Receiver<HubEvent>;

/// Event dispatcher fanning hub events out to subscribers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: HubEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatcher_delivers_to_subscribers() {
        let dispatcher = EventDispatcher::new(8);
        let mut rx = dispatcher.subscribe();

        dispatcher.send(HubEvent::ConnectionChanged {
            connection: ConnectionType::Udp,
        });

        match rx.recv().await.unwrap() {
            HubEvent::ConnectionChanged { connection } => {
                assert_eq!(connection, ConnectionType::Udp);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_send_without_subscribers_is_fine() {
        let dispatcher = EventDispatcher::new(8);
        dispatcher.send(HubEvent::ForecastUpdated);
        assert_eq!(dispatcher.receiver_count(), 0);
    }

    #[test]
    fn test_connection_type_display() {
        assert_eq!(ConnectionType::WebSocket.to_string(), "websocket");
        assert_eq!(ConnectionType::None.to_string(), "none");
    }
}
