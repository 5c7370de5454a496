//! The seam between the monitor and an upstream pub/sub system.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use topicwatch_types::{Payload, TopicEvent};

use crate::error::{ConnectionError, MalformedEventError, TransportError};
use crate::pattern::TopicPattern;

/// A connection to one upstream that delivers `(topic, payload, timestamp)`
/// events.
///
/// Transports are driven by a [`LinkSupervisor`](crate::LinkSupervisor),
/// which owns reconnection: an implementation only needs to report failures,
/// never retry on its own.
#[async_trait]
pub trait Transport: Send {
    /// Human-readable endpoint, for logs.
    fn describe(&self) -> String;

    /// Establish the link. Any previous subscriptions are forgotten.
    async fn connect(&mut self) -> Result<(), ConnectionError>;

    /// Request delivery of topics matching `pattern`.
    async fn subscribe(&mut self, pattern: &TopicPattern) -> Result<(), ConnectionError>;

    /// Wait for the next event.
    ///
    /// A [`TransportError::Malformed`] drops one event and leaves the link
    /// usable; a [`TransportError::Connection`] means the link is gone.
    async fn recv(&mut self) -> Result<TopicEvent, TransportError>;

    /// Tear the link down. Safe to call when not connected.
    async fn disconnect(&mut self);

    /// Topics the upstream advertised during the last connect.
    fn known_topics(&self) -> Vec<String> {
        Vec::new()
    }
}

/// How event payloads are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// Payloads must be JSON documents; anything else is malformed.
    #[default]
    Json,
    /// Payloads are kept as delivered.
    Raw,
}

impl PayloadFormat {
    /// Turn raw payload bytes into a [`Payload`].
    pub fn decode(&self, topic: &str, bytes: Vec<u8>) -> Result<Payload, MalformedEventError> {
        if *self == PayloadFormat::Json {
            serde_json::from_slice::<serde_json::Value>(&bytes)
                .map_err(|e| MalformedEventError::new(Some(topic.to_string()), e))?;
        }
        Ok(Payload::from_bytes(bytes))
    }

    /// Turn an already-parsed JSON payload into a [`Payload`].
    ///
    /// In raw mode a JSON string is unwrapped to its contents.
    pub fn decode_value(&self, value: serde_json::Value) -> Payload {
        match (self, value) {
            (PayloadFormat::Raw, serde_json::Value::String(text)) => Payload::Text(text),
            (_, value) => Payload::Text(value.to_string()),
        }
    }
}

/// Client-side decimation for upstreams that cannot thin a stream
/// themselves: admits the first of every `n` events per topic.
#[derive(Debug, Clone)]
pub struct Decimator {
    n: u32,
    seen: HashMap<String, u64>,
}

impl Decimator {
    pub fn new(n: u32) -> Self {
        Self {
            n: n.max(1),
            seen: HashMap::new(),
        }
    }

    pub fn every(&self) -> u32 {
        self.n
    }

    pub fn admit(&mut self, topic: &str) -> bool {
        if self.n == 1 {
            return true;
        }
        match self.seen.get_mut(topic) {
            Some(seen) => {
                let admit = *seen % u64::from(self.n) == 0;
                *seen += 1;
                admit
            }
            None => {
                self.seen.insert(topic.to_string(), 1);
                true
            }
        }
    }

    /// Forget per-topic counts, e.g. after a reconnect.
    pub fn reset(&mut self) {
        self.seen.clear();
    }
}
