//! Frame decoding for the broadcast/push wire protocol.
//!
//! Datagrams are small JSON documents with a `type` tag, a serial number
//! and one or more positional arrays. The schemas are positional rather
//! than self-describing, so each message type gets an explicit decoder that
//! validates the array length before touching any element (the positional
//! decoders themselves live in `tempest-types`, next to the model).
//!
//! This module performs no network I/O. Failure semantics: a malformed
//! frame, or a malformed element of an `obs` batch, is logged and dropped;
//! decoding never fails the caller and never aborts the remaining elements
//! of a batch.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use tempest_types::{
    LightningStrike, Observation, ObservationSource, RainStartEvent, RapidWind,
};

use crate::device_id::DeviceIdResolver;

/// Hub status metadata, passed through opaquely (never an observation).
#[derive(Debug, Clone, PartialEq)]
pub struct HubStatus {
    /// Hub serial number.
    pub serial_number: String,
    /// Firmware revision as reported.
    pub firmware_revision: Option<String>,
    /// Uptime in seconds.
    pub uptime: Option<u64>,
    /// Wi-Fi RSSI in dB.
    pub rssi: Option<f64>,
}

/// Sensor-unit status metadata, passed through opaquely.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    /// Device serial number.
    pub serial_number: String,
    /// Serial of the hub relaying this device.
    pub hub_serial: Option<String>,
    /// Uptime in seconds.
    pub uptime: Option<u64>,
    /// Battery voltage.
    pub voltage: Option<f64>,
    /// Radio RSSI in dB.
    pub rssi: Option<f64>,
    /// Raw sensor status bitfield.
    pub sensor_status: Option<u64>,
}

/// One decoded wire message.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// A full observation.
    Observation(Observation),
    /// A rapid-wind sample.
    RapidWind(RapidWind),
    /// A lightning strike.
    Strike(LightningStrike),
    /// A rain-start event.
    RainStart(RainStartEvent),
    /// Hub status metadata.
    HubStatus(HubStatus),
    /// Sensor-unit status metadata.
    DeviceStatus(DeviceStatus),
}

/// A decoded message plus the serial it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Serial number of the reporting device.
    pub serial: String,
    /// The decoded message.
    pub message: WireMessage,
}

/// The raw frame envelope. Only the fields the decoder dispatches on are
/// typed; positional payloads stay as raw JSON values.
#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    serial_number: Option<String>,
    hub_sn: Option<String>,
    obs: Option<Vec<Vec<Value>>>,
    ob: Option<Vec<Value>>,
    evt: Option<Vec<Value>>,
    firmware_revision: Option<Value>,
    uptime: Option<u64>,
    rssi: Option<f64>,
    hub_rssi: Option<f64>,
    voltage: Option<f64>,
    sensor_status: Option<u64>,
}

/// Decoder for wire frames: device-id resolution plus an optional
/// serial-number allow-list.
///
/// When the allow-list is non-empty, frames from unlisted serials are
/// discarded before decoding, except `hub_status`, which is always
/// accepted for hub metadata.
#[derive(Debug, Clone, Default)]
pub struct WireDecoder {
    resolver: DeviceIdResolver,
    allowed: HashSet<String>,
}

impl WireDecoder {
    /// Create a decoder that accepts every serial.
    pub fn new(resolver: DeviceIdResolver) -> Self {
        Self {
            resolver,
            allowed: HashSet::new(),
        }
    }

    /// Create a decoder restricted to an allow-list of serials.
    pub fn with_allow_list<I, S>(resolver: DeviceIdResolver, serials: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resolver,
            allowed: serials.into_iter().map(Into::into).collect(),
        }
    }

    /// Decode one datagram body.
    ///
    /// Returns every message the frame yielded; malformed frames or
    /// elements are logged and dropped, so the returned list may be empty.
    pub fn decode(&self, text: &str, source: ObservationSource) -> Vec<DecodedFrame> {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                return Vec::new();
            }
        };

        let serial = match frame.serial_number.clone() {
            Some(serial) => serial,
            None => {
                warn!(kind = %frame.kind, "dropping frame without serial_number");
                return Vec::new();
            }
        };

        if !self.is_allowed(&serial, &frame.kind) {
            debug!(%serial, kind = %frame.kind, "dropping frame from unlisted serial");
            return Vec::new();
        }

        let device_id = self.resolver.resolve(&serial);

        match frame.kind.as_str() {
            "obs_st" | "obs_air" | "obs_sky" => {
                self.decode_obs_batch(&frame, &serial, device_id, source)
            }
            "rapid_wind" => one(
                &serial,
                frame
                    .ob
                    .as_deref()
                    .ok_or(())
                    .and_then(|ob| RapidWind::from_ob(device_id, ob).map_err(log_drop(&frame.kind)))
                    .map(WireMessage::RapidWind),
            ),
            "evt_strike" => one(
                &serial,
                frame
                    .evt
                    .as_deref()
                    .ok_or(())
                    .and_then(|evt| {
                        LightningStrike::from_evt(device_id, evt).map_err(log_drop(&frame.kind))
                    })
                    .map(WireMessage::Strike),
            ),
            "evt_precip" => one(
                &serial,
                frame
                    .evt
                    .as_deref()
                    .ok_or(())
                    .and_then(|evt| {
                        RainStartEvent::from_evt(device_id, evt).map_err(log_drop(&frame.kind))
                    })
                    .map(WireMessage::RainStart),
            ),
            "hub_status" => one(
                &serial,
                Ok(WireMessage::HubStatus(HubStatus {
                    serial_number: serial.clone(),
                    firmware_revision: frame.firmware_revision.as_ref().map(value_to_string),
                    uptime: frame.uptime,
                    rssi: frame.rssi,
                })),
            ),
            "device_status" => one(
                &serial,
                Ok(WireMessage::DeviceStatus(DeviceStatus {
                    serial_number: serial.clone(),
                    hub_serial: frame.hub_sn.clone(),
                    uptime: frame.uptime,
                    voltage: frame.voltage,
                    rssi: frame.rssi.or(frame.hub_rssi),
                    sensor_status: frame.sensor_status,
                })),
            ),
            other => {
                debug!(kind = %other, "ignoring unknown frame type");
                Vec::new()
            }
        }
    }

    /// Decode each element of an `obs` batch independently: a malformed
    /// element is dropped without affecting its siblings.
    fn decode_obs_batch(
        &self,
        frame: &Frame,
        serial: &str,
        device_id: i64,
        source: ObservationSource,
    ) -> Vec<DecodedFrame> {
        let Some(batch) = frame.obs.as_ref() else {
            warn!(kind = %frame.kind, %serial, "dropping obs frame without obs array");
            return Vec::new();
        };

        batch
            .iter()
            .filter_map(|values| {
                let decoded = match frame.kind.as_str() {
                    "obs_st" => Observation::from_obs_st(device_id, source, values),
                    "obs_air" => Observation::from_obs_air(device_id, source, values),
                    _ => Observation::from_obs_sky(device_id, source, values),
                };
                match decoded {
                    Ok(observation) => Some(DecodedFrame {
                        serial: serial.to_string(),
                        message: WireMessage::Observation(observation),
                    }),
                    Err(e) => {
                        warn!(kind = %frame.kind, %serial, error = %e, "dropping malformed observation");
                        None
                    }
                }
            })
            .collect()
    }

    fn is_allowed(&self, serial: &str, kind: &str) -> bool {
        self.allowed.is_empty() || kind == "hub_status" || self.allowed.contains(serial)
    }
}

fn one(serial: &str, message: Result<WireMessage, ()>) -> Vec<DecodedFrame> {
    match message {
        Ok(message) => vec![DecodedFrame {
            serial: serial.to_string(),
            message,
        }],
        Err(()) => Vec::new(),
    }
}

fn log_drop(kind: &str) -> impl Fn(tempest_types::ParseError) + '_ {
    move |e| warn!(%kind, error = %e, "dropping malformed event payload")
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
