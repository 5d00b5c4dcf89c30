//! Live fix ingestion from a WebSocket vehicle feed
//!
//! The feed broadcasts `vehicles_info` envelopes carrying every vehicle in
//! the network. The loop filters for one configured vehicle, applies
//! change detection, and hands each resulting navigation state to a sink.
//! Transport failures end the loop in the `Reconnecting` state for the
//! caller to re-establish the connection; per-message decode failures are
//! skipped in place.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Deserializer};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::core::error::{Error, Result};
use crate::core::tracker::{Fix, NavigationState, Tracker};

/// Envelope topic carrying vehicle positions
pub const VEHICLES_TOPIC: &str = "vehicles_info";

/// Lifecycle of the ingestion loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Connecting,
    Connected,
    Streaming,
    Reconnecting,
    Stopped,
}

/// Per-vehicle record inside a `vehicles_info` envelope.
///
/// The feed is loose about types: `veh_number`, `line` and `brigade` may be
/// JSON strings or numbers.
#[derive(Debug, Clone, Deserialize)]
pub struct VehicleRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub veh_number: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub line: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub brigade: Option<String>,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

impl VehicleRecord {
    pub fn into_fix(self) -> Fix {
        Fix {
            latitude: self.latitude,
            longitude: self.longitude,
            heading: self.heading,
            speed: self.speed,
            timestamp: self.timestamp,
            line: self.line,
            brigade: self.brigade,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn opt_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected string, number or null, got {}",
            other
        ))),
    }
}

/// What a single feed message meant for us
#[derive(Debug)]
pub enum MessageDisposition {
    /// Envelope with some other topic
    Ignored,
    /// Our topic, but the configured vehicle is not in this batch
    VehicleAbsent,
    /// A position fix for the configured vehicle
    Fix(Box<Fix>),
}

/// Decodes one feed message and picks out the configured vehicle.
///
/// Fails with `MalformedEnvelope` when the message is not JSON or the
/// `vehicles_info` envelope lacks a `data` array. Records that fail to
/// decode individually are skipped.
pub fn select_vehicle(message: &str, vehicle_id: &str) -> Result<MessageDisposition> {
    let value: serde_json::Value = serde_json::from_str(message)
        .map_err(|e| Error::MalformedEnvelope(format!("invalid JSON: {}", e)))?;

    let topic = value.get("topic").and_then(|t| t.as_str());
    if topic != Some(VEHICLES_TOPIC) {
        return Ok(MessageDisposition::Ignored);
    }

    let records = value
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::MalformedEnvelope("missing data array".to_string()))?;

    for raw in records {
        let record: VehicleRecord = match serde_json::from_value(raw.clone()) {
            Ok(record) => record,
            Err(e) => {
                log::debug!("skipping undecodable vehicle record: {}", e);
                continue;
            }
        };
        if record.veh_number == vehicle_id {
            return Ok(MessageDisposition::Fix(Box::new(record.into_fix())));
        }
    }

    Ok(MessageDisposition::VehicleAbsent)
}

/// A source of feed messages: the live WebSocket, or a canned replay.
pub enum FixStream {
    WebSocket(Box<WebSocketStream<MaybeTlsStream<TcpStream>>>),
    Replay(VecDeque<String>),
}

impl FixStream {
    /// Opens the WebSocket transport.
    pub async fn connect(url: &str) -> Result<FixStream> {
        let (socket, _response) = connect_async(url).await?;
        log::info!("connected to fix feed at {}", url);
        Ok(FixStream::WebSocket(Box::new(socket)))
    }

    /// A stream that yields canned messages and then closes.
    pub fn replay(messages: Vec<String>) -> FixStream {
        FixStream::Replay(messages.into())
    }

    /// Next text message, or `None` once the transport is closed.
    pub async fn recv(&mut self) -> Result<Option<String>> {
        match self {
            FixStream::Replay(queue) => Ok(queue.pop_front()),
            FixStream::WebSocket(socket) => loop {
                match socket.next().await {
                    None => return Ok(None),
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(Message::Text(text))) => return Ok(Some(text.to_string())),
                    Some(Ok(Message::Close(_))) => return Ok(None),
                    Some(Ok(_)) => continue,
                }
            },
        }
    }
}

/// Configuration for the ingestion loop
#[derive(Debug, Clone)]
pub struct FixLoopConfig {
    /// `veh_number` of the vehicle to follow
    pub vehicle_id: String,
    /// Re-evaluate an unchanged position after this long
    pub update_interval: Duration,
}

/// Drives a `Tracker` from a `FixStream`.
pub struct FixLoop<'a> {
    tracker: Tracker<'a>,
    config: FixLoopConfig,
    state: LoopState,
    last_coords: Option<(f64, f64)>,
    last_update: Option<Instant>,
}

impl<'a> FixLoop<'a> {
    pub fn new(tracker: Tracker<'a>, config: FixLoopConfig) -> FixLoop<'a> {
        FixLoop {
            tracker,
            config,
            state: LoopState::Connecting,
            last_coords: None,
            last_update: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Consumes messages until the transport ends or cancellation fires.
    ///
    /// Returns `Reconnecting` when the transport closed or failed (the
    /// caller decides whether to reconnect) and `Stopped` on cancellation.
    pub async fn run<F>(
        &mut self,
        stream: &mut FixStream,
        cancel: &CancellationToken,
        sink: &mut F,
    ) -> Result<LoopState>
    where
        F: FnMut(&NavigationState),
    {
        self.state = LoopState::Connected;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    log::info!("fix loop cancelled");
                    self.state = LoopState::Stopped;
                    return Ok(LoopState::Stopped);
                }

                received = stream.recv() => {
                    match received {
                        Ok(Some(message)) => self.handle_message(&message, sink),
                        Ok(None) => {
                            log::warn!("fix feed closed");
                            self.state = LoopState::Reconnecting;
                            return Ok(LoopState::Reconnecting);
                        }
                        Err(e) => {
                            log::warn!("fix feed error: {}", e);
                            self.state = LoopState::Reconnecting;
                            return Ok(LoopState::Reconnecting);
                        }
                    }
                }
            }
        }
    }

    fn handle_message<F>(&mut self, message: &str, sink: &mut F)
    where
        F: FnMut(&NavigationState),
    {
        let fix = match select_vehicle(message, &self.config.vehicle_id) {
            Ok(MessageDisposition::Fix(fix)) => {
                self.state = LoopState::Streaming;
                *fix
            }
            Ok(MessageDisposition::VehicleAbsent) => {
                self.state = LoopState::Streaming;
                log::debug!("vehicle {} not in this batch", self.config.vehicle_id);
                return;
            }
            Ok(MessageDisposition::Ignored) => {
                log::debug!("ignoring envelope with foreign topic");
                return;
            }
            Err(e) => {
                log::debug!("skipping malformed message: {}", e);
                return;
            }
        };

        let moved = self
            .last_coords
            .map(|(lat, lon)| lat != fix.latitude || lon != fix.longitude)
            .unwrap_or(true);
        let due = self
            .last_update
            .map(|at| at.elapsed() >= self.config.update_interval)
            .unwrap_or(true);
        if !moved && !due {
            return;
        }

        let coords = (fix.latitude, fix.longitude);
        match self.tracker.update(fix) {
            Ok(state) => {
                sink(&state);
                self.last_coords = Some(coords);
                self.last_update = Some(Instant::now());
            }
            Err(Error::BadCoordinate(msg)) => {
                log::debug!("skipping fix with bad coordinates: {}", msg);
            }
            Err(e) => {
                log::warn!("fix processing failed: {}", e);
            }
        }
    }
}
