//! Events delivered by a transport.

use alloc::string::String;
use alloc::vec::Vec;

/// The last value carried by a topic.
///
/// Text payloads (typically JSON documents) are kept as-is so display
/// surfaces can render them; anything that is not valid UTF-8 is kept as
/// opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub enum Payload {
    #[cfg_attr(feature = "minicbor", n(0))]
    Text(#[cfg_attr(feature = "minicbor", n(0))] String),
    #[cfg_attr(feature = "minicbor", n(1))]
    Binary(#[cfg_attr(feature = "minicbor", n(0))] Vec<u8>),
}

impl Payload {
    pub fn text(s: impl Into<String>) -> Self {
        Payload::Text(s.into())
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Payload::Binary(bytes.into())
    }

    /// Classify raw bytes: valid UTF-8 becomes `Text`, anything else `Binary`.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Payload::Text(text),
            Err(err) => Payload::Binary(err.into_bytes()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            Payload::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(s) => s.as_bytes(),
            Payload::Binary(b) => b,
        }
    }

    /// Size of the payload in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single `(topic, payload, timestamp)` event as delivered by a transport.
///
/// `timestamp_ms` is milliseconds since the Unix epoch. Transports use the
/// upstream's own timestamp when the wire format carries one and the local
/// receive time otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct TopicEvent {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub topic: String,

    #[cfg_attr(feature = "minicbor", n(1))]
    pub payload: Payload,

    #[cfg_attr(feature = "minicbor", n(2))]
    pub timestamp_ms: u64,
}

impl TopicEvent {
    pub fn new(topic: impl Into<String>, payload: Payload, timestamp_ms: u64) -> Self {
        Self {
            topic: topic.into(),
            payload,
            timestamp_ms,
        }
    }

    /// Create an event stamped with the current wall-clock time.
    #[cfg(feature = "std")]
    pub fn now(topic: impl Into<String>, payload: Payload) -> Self {
        Self::new(topic, payload, unix_millis())
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
#[cfg(feature = "std")]
pub fn unix_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
