//! The cloud push channel.
//!
//! After connecting and authenticating, the adapter issues subscribe
//! commands for one device's observations and rapid-wind stream, then sits
//! in a read loop decoding push messages. The push schemas carry the same
//! positional arrays as the LAN broadcast, tagged with a numeric device id
//! instead of a serial; the serial comes from the subscribe target.
//!
//! Going down is signalled in two distinct ways, because the orchestrator
//! reacts differently: a connection *failure* (never connected, or lost)
//! triggers an immediate one-shot REST fetch, while a clean stop does not.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use tempest_types::{
    LightningStrike, Observation, ObservationSource, RainStartEvent, RapidWind,
};

use crate::error::{Error, Result};
use crate::events::{LinkState, TransportEvent, TransportSender};

/// Default push endpoint.
pub const DEFAULT_WEBSOCKET_URL: &str = "wss://ws.weatherflow.com/swd/data";

/// Bound on the connect handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the push channel.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Endpoint URL.
    pub url: String,
    /// Access token, sent as a query parameter.
    pub token: String,
}

impl WebSocketConfig {
    /// Configuration against the default endpoint.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            url: DEFAULT_WEBSOCKET_URL.to_string(),
            token: token.into(),
        }
    }
}

/// The device one subscription targets.
#[derive(Debug, Clone)]
pub struct WebSocketTarget {
    /// Cloud device id to subscribe.
    pub device_id: i64,
    /// Serial number the orchestrator keys this device's state by.
    pub serial_number: String,
}

/// Subscribe/push adapter for the cloud channel.
pub struct WebSocketAdapter {
    config: WebSocketConfig,
    events: TransportSender,
    state: Arc<RwLock<LinkState>>,
    running: tokio::sync::Mutex<Option<(CancellationToken, tokio::task::JoinHandle<()>)>>,
}

impl WebSocketAdapter {
    /// Create an adapter. Nothing connects until [`start`](Self::start).
    pub fn new(config: WebSocketConfig, events: TransportSender) -> Self {
        Self {
            config,
            events,
            state: Arc::new(RwLock::new(LinkState::Disconnected)),
            running: tokio::sync::Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LinkState {
        self.state.read().expect("websocket state poisoned").clone()
    }

    /// Connect, subscribe, and start the read loop in the background.
    ///
    /// Returns once the attempt is launched; success is signalled through
    /// [`TransportEvent::WebSocketUp`], failure through
    /// [`TransportEvent::WebSocketDown`] with `failed: true`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when the endpoint URL does not
    /// parse; connection errors are reported via events, not here.
    pub async fn start(&self, target: WebSocketTarget) -> Result<()> {
        self.stop().await;

        let mut url = Url::parse(&self.config.url)
            .map_err(|e| Error::InvalidConfig(format!("bad websocket url: {e}")))?;
        url.query_pairs_mut().append_pair("token", &self.config.token);

        self.set_state(LinkState::Connecting);

        let cancel = CancellationToken::new();
        let events = self.events.clone();
        let state = Arc::clone(&self.state);
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let failed = run_connection(url, target, &events, &state, &task_cancel).await;
            *state.write().expect("websocket state poisoned") = if failed {
                LinkState::Error("connection lost".to_string())
            } else {
                LinkState::Disconnected
            };
            let _ = events.send(TransportEvent::WebSocketDown { failed });
        });
        *self.running.lock().await = Some((cancel, handle));

        Ok(())
    }

    /// Disconnect. Idempotent and safe to call when never started. Produces
    /// a clean `WebSocketDown { failed: false }` rather than a failure, and
    /// waits for the session task to exit so its events are ordered before
    /// any subsequent start's.
    pub async fn stop(&self) {
        if let Some((cancel, handle)) = self.running.lock().await.take() {
            cancel.cancel();
            let _ = handle.await;
        }
    }

    fn set_state(&self, state: LinkState) {
        *self.state.write().expect("websocket state poisoned") = state;
    }
}

/// Connect, subscribe and pump messages until cancellation or loss.
/// Returns whether the session ended in failure.
async fn run_connection(
    url: Url,
    target: WebSocketTarget,
    events: &TransportSender,
    state: &Arc<RwLock<LinkState>>,
    cancel: &CancellationToken,
) -> bool {
    let connect = timeout(CONNECT_TIMEOUT, connect_async(url.as_str()));
    let ws = tokio::select! {
        _ = cancel.cancelled() => return false,
        result = connect => match result {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                warn!(error = %e, "websocket connect failed");
                return true;
            }
            Err(_) => {
                warn!("websocket connect timed out");
                return true;
            }
        },
    };

    let (mut sink, mut stream) = ws.split();

    // Subscribe to full observations and the rapid-wind stream for the
    // target device.
    for (id, kind) in [("obs", "listen_start"), ("rapid", "listen_rapid_start")] {
        let command = json!({
            "type": kind,
            "device_id": target.device_id,
            "id": id,
        });
        if let Err(e) = sink.send(Message::Text(command.to_string().into())).await {
            warn!(error = %e, "websocket subscribe failed");
            return true;
        }
    }

    info!(device_id = target.device_id, "websocket connected and subscribed");
    *state.write().expect("websocket state poisoned") = LinkState::Connected;
    let _ = events.send(TransportEvent::WebSocketUp);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return false;
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    for event in decode_push(&target, &text) {
                        if events.send(event).is_err() {
                            return false;
                        }
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    warn!(?frame, "websocket closed by server");
                    return true;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "websocket read failed");
                    return true;
                }
                None => {
                    warn!("websocket stream ended");
                    return true;
                }
            }
        }
    }
}

/// Push message envelope. Same positional payloads as the broadcast, keyed
/// by device id.
#[derive(Debug, Deserialize)]
struct PushMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    obs: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    ob: Option<Vec<Value>>,
    #[serde(default)]
    evt: Option<Vec<Value>>,
}

fn decode_push(target: &WebSocketTarget, text: &str) -> Vec<TransportEvent> {
    let message: PushMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "dropping undecodable push message");
            return Vec::new();
        }
    };

    let serial = target.serial_number.clone();
    let device_id = target.device_id;

    match message.kind.as_str() {
        "obs_st" | "obs_air" | "obs_sky" => {
            let Some(batch) = message.obs else {
                return Vec::new();
            };
            batch
                .iter()
                .filter_map(|values| {
                    let decoded = match message.kind.as_str() {
                        "obs_st" => {
                            Observation::from_obs_st(device_id, ObservationSource::WebSocket, values)
                        }
                        "obs_air" => Observation::from_obs_air(
                            device_id,
                            ObservationSource::WebSocket,
                            values,
                        ),
                        _ => Observation::from_obs_sky(
                            device_id,
                            ObservationSource::WebSocket,
                            values,
                        ),
                    };
                    match decoded {
                        Ok(observation) => Some(TransportEvent::Observation {
                            serial: serial.clone(),
                            observation,
                        }),
                        Err(e) => {
                            warn!(kind = %message.kind, error = %e, "dropping malformed push observation");
                            None
                        }
                    }
                })
                .collect()
        }
        "rapid_wind" => message
            .ob
            .as_deref()
            .and_then(|ob| {
                RapidWind::from_ob(device_id, ob)
                    .map_err(|e| warn!(error = %e, "dropping malformed rapid wind"))
                    .ok()
            })
            .map(|rapid| vec![TransportEvent::RapidWind { serial, rapid }])
            .unwrap_or_default(),
        "evt_strike" => message
            .evt
            .as_deref()
            .and_then(|evt| {
                LightningStrike::from_evt(device_id, evt)
                    .map_err(|e| warn!(error = %e, "dropping malformed strike"))
                    .ok()
            })
            .map(|strike| vec![TransportEvent::Strike { serial, strike }])
            .unwrap_or_default(),
        "evt_precip" => message
            .evt
            .as_deref()
            .and_then(|evt| {
                RainStartEvent::from_evt(device_id, evt)
                    .map_err(|e| warn!(error = %e, "dropping malformed rain start"))
                    .ok()
            })
            .map(|event| vec![TransportEvent::RainStart { serial, event }])
            .unwrap_or_default(),
        // Protocol chatter, no payload to surface.
        "ack" | "connection_opened" => Vec::new(),
        other => {
            debug!(kind = %other, "ignoring unknown push message type");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> WebSocketTarget {
        WebSocketTarget {
            device_id: 512,
            serial_number: "ST-00000512".to_string(),
        }
    }

    #[test]
    fn test_decode_push_obs_st() {
        let events = decode_push(
            &target(),
            r#"{"type":"obs_st","device_id":512,"obs":[[1700000000,0.2,1.5,3.1,250,3,1017.3,21.0,48,12000,2.1,420,0.0,0,0,0,2.68,1]]}"#,
        );
        assert_eq!(events.len(), 1);
        let TransportEvent::Observation { serial, observation } = &events[0] else {
            panic!("expected observation");
        };
        assert_eq!(serial, "ST-00000512");
        assert_eq!(observation.source, ObservationSource::WebSocket);
        assert_eq!(observation.device_id, 512);
    }

    #[test]
    fn test_decode_push_rapid_wind() {
        let events = decode_push(
            &target(),
            r#"{"type":"rapid_wind","device_id":512,"ob":[1700000003,2.3,128]}"#,
        );
        assert!(matches!(&events[0], TransportEvent::RapidWind { .. }));
    }

    #[test]
    fn test_decode_push_ack_is_silent() {
        assert!(decode_push(&target(), r#"{"type":"ack","id":"obs"}"#).is_empty());
        assert!(decode_push(&target(), "garbage").is_empty());
    }

    #[tokio::test]
    async fn test_start_with_bad_url_is_config_error() {
        let (tx, _rx) = crate::events::transport_channel();
        let adapter = WebSocketAdapter::new(
            WebSocketConfig {
                url: "not a url".to_string(),
                token: "t".to_string(),
            },
            tx,
        );
        assert!(matches!(
            adapter.start(target()).await,
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (tx, _rx) = crate::events::transport_channel();
        let adapter = WebSocketAdapter::new(WebSocketConfig::new("t"), tx);
        adapter.stop().await;
        adapter.stop().await;
        assert_eq!(adapter.state(), LinkState::Disconnected);
    }
}
