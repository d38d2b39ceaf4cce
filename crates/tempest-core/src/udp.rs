//! The local-network broadcast listener.
//!
//! Stations broadcast JSON datagrams on the local network (port 50222 by
//! default). The adapter binds with address reuse enabled (several
//! consumers on the same host or LAN segment may listen to the same
//! broadcast) plus broadcast reception, and feeds every datagram through
//! the wire decoder.
//!
//! Binding can fail (typically a port conflict with another listener that
//! bound exclusively); that is user-actionable, so it lands in
//! [`LinkState::Error`] with the bind error recorded and is retryable via
//! [`UdpAdapter::restart`].

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tempest_types::ObservationSource;

use crate::error::{Error, Result};
use crate::events::{LinkState, TransportEvent, TransportSender};
use crate::wire::{WireDecoder, WireMessage};

/// Default broadcast port.
pub const DEFAULT_UDP_PORT: u16 = 50222;

/// Receive buffer size. Broadcast datagrams are well under 1 KiB; leave
/// headroom for firmware additions.
const RECV_BUFFER_SIZE: usize = 2048;

/// Configuration for the broadcast listener.
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Port to bind on.
    pub port: u16,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_UDP_PORT,
        }
    }
}

/// Bind-and-listen adapter for the broadcast transport.
pub struct UdpAdapter {
    config: UdpConfig,
    events: TransportSender,
    state: Arc<RwLock<LinkState>>,
    running: tokio::sync::Mutex<Option<(CancellationToken, tokio::task::JoinHandle<()>)>>,
}

impl UdpAdapter {
    /// Create an adapter. Nothing binds until [`start`](Self::start).
    pub fn new(config: UdpConfig, events: TransportSender) -> Self {
        Self {
            config,
            events,
            state: Arc::new(RwLock::new(LinkState::Disconnected)),
            running: tokio::sync::Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LinkState {
        self.state.read().expect("udp state poisoned").clone()
    }

    /// Bind the socket and start the receive loop.
    ///
    /// The decoder carries the station's device allow-list and serial→id
    /// mapping; it is applied before any callback fires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] when the bind fails; the adapter is
    /// left in [`LinkState::Error`] and can be retried with
    /// [`restart`](Self::restart).
    pub async fn start(&self, decoder: WireDecoder) -> Result<()> {
        self.stop().await;

        self.set_state(LinkState::Connecting);

        let socket = match bind_broadcast_socket(self.config.port) {
            Ok(socket) => socket,
            Err(e) => {
                let reason = e.to_string();
                self.set_state(LinkState::Error(reason.clone()));
                return Err(Error::transport("udp", reason));
            }
        };

        info!(port = self.config.port, "udp listener bound");
        self.set_state(LinkState::Connected);
        let _ = self.events.send(TransportEvent::UdpListening);

        let cancel = CancellationToken::new();
        let events = self.events.clone();
        let state = Arc::clone(&self.state);
        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            receive_loop(socket, decoder, events.clone(), loop_cancel).await;
            *state.write().expect("udp state poisoned") = LinkState::Disconnected;
            let _ = events.send(TransportEvent::UdpStopped);
        });
        *self.running.lock().await = Some((cancel, handle));

        Ok(())
    }

    /// Stop listening. Idempotent and safe to call when never started.
    /// Waits for the receive loop to exit, so cancellation never races an
    /// in-flight receive on a dropped socket and the stop event is ordered
    /// before any subsequent start's events.
    pub async fn stop(&self) {
        if let Some((cancel, handle)) = self.running.lock().await.take() {
            cancel.cancel();
            let _ = handle.await;
        }
    }

    /// Stop and start again, typically after a station switch changed the
    /// allow-list, or to retry a failed bind.
    pub async fn restart(&self, decoder: WireDecoder) -> Result<()> {
        self.stop().await;
        self.start(decoder).await
    }

    fn set_state(&self, state: LinkState) {
        *self.state.write().expect("udp state poisoned") = state;
    }
}

/// Build the reusable broadcast socket and hand it to tokio.
fn bind_broadcast_socket(port: u16) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;

    let addr: SocketAddr = SocketAddr::from(([0, 0, 0, 0], port));
    socket.bind(&addr.into())?;

    UdpSocket::from_std(socket.into())
}

async fn receive_loop(
    socket: UdpSocket,
    decoder: WireDecoder,
    events: TransportSender,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("udp receive loop cancelled");
                break;
            }
            result = socket.recv_from(&mut buf) => {
                let (len, peer) = match result {
                    Ok(ok) => ok,
                    Err(e) => {
                        warn!(error = %e, "udp receive failed");
                        continue;
                    }
                };

                let text = String::from_utf8_lossy(&buf[..len]);
                for frame in decoder.decode(&text, ObservationSource::Udp) {
                    debug!(%peer, serial = %frame.serial, "udp frame decoded");
                    let event = match frame.message {
                        WireMessage::Observation(observation) => TransportEvent::Observation {
                            serial: frame.serial,
                            observation,
                        },
                        WireMessage::RapidWind(rapid) => TransportEvent::RapidWind {
                            serial: frame.serial,
                            rapid,
                        },
                        WireMessage::Strike(strike) => TransportEvent::Strike {
                            serial: frame.serial,
                            strike,
                        },
                        WireMessage::RainStart(event) => TransportEvent::RainStart {
                            serial: frame.serial,
                            event,
                        },
                        WireMessage::HubStatus(status) => TransportEvent::HubStatus { status },
                        WireMessage::DeviceStatus(status) => {
                            TransportEvent::DeviceStatus { status }
                        }
                    };
                    if events.send(event).is_err() {
                        // Orchestrator gone; no point listening on.
                        return;
                    }
                }
            }
        }
    }
}
