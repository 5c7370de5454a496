//! Newline-delimited JSON over TCP.
//!
//! ## Protocol
//!
//! After connecting, the client sends a hello and the server must answer with
//! its own hello, optionally listing the topics it publishes:
//!
//! ```text
//! -> {"op":"hello","version":1}
//! <- {"op":"hello","version":1,"topics":["imu","gps"]}
//! -> {"op":"subscribe","pattern":"**"}
//! <- {"topic":"imu","timestamp_ms":1703160000000,"payload":{"ax":0.1}}
//! <- {"topic":"gps","payload":"raw text"}
//! ```
//!
//! Events without `timestamp_ms` are stamped with the local receive time.
//! A subscribe may carry `"every_n":N` to ask the upstream for only every
//! N-th event per topic; it is omitted when N is 1.
//!
//! A line that is not UTF-8 or not a valid event is reported as malformed
//! and the link stays up. Only I/O errors and end of stream close it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use topicwatch_types::{unix_millis, TopicEvent};

use crate::error::{ConnectionError, MalformedEventError, TransportError};
use crate::pattern::{matches_any, TopicPattern};
use crate::transport::{PayloadFormat, Transport};

/// Protocol version spoken by this transport.
pub const PROTOCOL_VERSION: u32 = 1;

/// Control messages exchanged before and alongside events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ControlMessage {
    Hello {
        version: u32,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        topics: Vec<String>,
    },
    Subscribe {
        pattern: String,
        #[serde(default = "every_event", skip_serializing_if = "is_every_event")]
        every_n: u32,
    },
}

fn every_event() -> u32 {
    1
}

fn is_every_event(n: &u32) -> bool {
    *n <= 1
}

/// One event line as sent by the upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug)]
struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Connection {
    async fn send(&mut self, message: &ControlMessage) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        self.writer.write_all(&line).await
    }

    /// Next line as raw bytes, without its line ending. `None` at end of stream.
    async fn read_frame(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        let mut frame = Vec::new();
        if self.reader.read_until(b'\n', &mut frame).await? == 0 {
            return Ok(None);
        }
        if frame.last() == Some(&b'\n') {
            frame.pop();
            if frame.last() == Some(&b'\r') {
                frame.pop();
            }
        }
        Ok(Some(frame))
    }
}

/// Best-effort topic name from an event line that failed to decode.
fn salvage_topic(line: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|v| v.get("topic")?.as_str().map(str::to_string))
}

/// Transport for upstreams speaking the NDJSON protocol above.
#[derive(Debug)]
pub struct TcpTransport {
    endpoint: String,
    payload: PayloadFormat,
    every_n: u32,
    patterns: Vec<TopicPattern>,
    topics: Vec<String>,
    connection: Option<Connection>,
}

impl TcpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            payload: PayloadFormat::default(),
            every_n: 1,
            patterns: Vec::new(),
            topics: Vec::new(),
            connection: None,
        }
    }

    pub fn with_payload_format(mut self, payload: PayloadFormat) -> Self {
        self.payload = payload;
        self
    }

    /// Ask the upstream for only every `n`-th event per topic.
    pub fn with_every_n(mut self, n: u32) -> Self {
        self.every_n = n.max(1);
        self
    }

    fn closed(&self, reason: impl ToString) -> ConnectionError {
        ConnectionError::Closed(format!("{}: {}", self.endpoint, reason.to_string()))
    }

    fn decode(&self, line: &str) -> Result<TopicEvent, MalformedEventError> {
        let wire: WireEvent = serde_json::from_str(line)
            .map_err(|e| MalformedEventError::new(salvage_topic(line), e))?;

        if wire.topic.is_empty() {
            return Err(MalformedEventError::new(None, "empty topic"));
        }

        Ok(TopicEvent {
            payload: self.payload.decode_value(wire.payload),
            timestamp_ms: wire.timestamp_ms.unwrap_or_else(unix_millis),
            topic: wire.topic,
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn describe(&self) -> String {
        format!("tcp://{}", self.endpoint)
    }

    async fn connect(&mut self) -> Result<(), ConnectionError> {
        self.connection = None;
        self.patterns.clear();

        let stream = TcpStream::connect(&self.endpoint)
            .await
            .map_err(|e| ConnectionError::unreachable(&self.endpoint, e))?;
        let (reader, writer) = stream.into_split();
        let mut connection = Connection {
            reader: BufReader::new(reader),
            writer,
        };

        connection
            .send(&ControlMessage::Hello {
                version: PROTOCOL_VERSION,
                topics: Vec::new(),
            })
            .await
            .map_err(|e| ConnectionError::handshake(&self.endpoint, e))?;

        let reply = connection
            .read_frame()
            .await
            .map_err(|e| ConnectionError::handshake(&self.endpoint, e))?
            .ok_or_else(|| ConnectionError::handshake(&self.endpoint, "closed during hello"))?;

        match serde_json::from_slice::<ControlMessage>(&reply) {
            Ok(ControlMessage::Hello { version, topics }) if version == PROTOCOL_VERSION => {
                self.topics = topics;
            }
            Ok(ControlMessage::Hello { version, .. }) => {
                return Err(ConnectionError::handshake(
                    &self.endpoint,
                    format!("unsupported protocol version {version}"),
                ));
            }
            Ok(other) => {
                return Err(ConnectionError::handshake(
                    &self.endpoint,
                    format!("expected hello, got {other:?}"),
                ));
            }
            Err(e) => return Err(ConnectionError::handshake(&self.endpoint, e)),
        }

        self.connection = Some(connection);
        Ok(())
    }

    async fn subscribe(&mut self, pattern: &TopicPattern) -> Result<(), ConnectionError> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(self.closed("not connected"));
        };

        let sent = connection
            .send(&ControlMessage::Subscribe {
                pattern: pattern.to_string(),
                every_n: self.every_n,
            })
            .await;
        if let Err(e) = sent {
            return Err(self.closed(e));
        }

        self.patterns.push(pattern.clone());
        Ok(())
    }

    async fn recv(&mut self) -> Result<TopicEvent, TransportError> {
        loop {
            let Some(connection) = self.connection.as_mut() else {
                return Err(self.closed("not connected").into());
            };

            let frame = match connection.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Err(self.closed("connection closed by upstream").into()),
                Err(e) => return Err(self.closed(e).into()),
            };

            let line = match String::from_utf8(frame) {
                Ok(line) => line,
                Err(e) => {
                    let topic = salvage_topic(&String::from_utf8_lossy(e.as_bytes()));
                    return Err(MalformedEventError::new(topic, e.utf8_error()).into());
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            let event = self.decode(&line)?;
            if matches_any(&self.patterns, &event.topic) {
                return Ok(event);
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            let _ = connection.writer.shutdown().await;
        }
    }

    fn known_topics(&self) -> Vec<String> {
        self.topics.clone()
    }
}
