//! NATS transport.
//!
//! Subjects map to topics by swapping `.` for `/`, so the subject
//! `robot.imu.raw` is tracked as the topic `robot/imu/raw`. Patterns are
//! translated the other way, with `**` becoming `>`. NATS messages carry no
//! publish time, so events are stamped with the local receive time. Core
//! NATS cannot thin a stream, so `every_n` is applied on receipt.
//!
//! ## Example
//!
//! ```rust,no_run
//! use topicwatch_adapters::nats::NatsTransport;
//! use topicwatch_adapters::{Transport, TopicPattern};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut transport = NatsTransport::new("nats://localhost:4222");
//!     transport.connect().await?;
//!     transport.subscribe(&TopicPattern::all()).await?;
//!
//!     let event = transport.recv().await?;
//!     println!("{} at {}", event.topic, event.timestamp_ms);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use futures_util::stream::SelectAll;
use futures_util::StreamExt;
use topicwatch_types::{unix_millis, TopicEvent};

use crate::error::{ConnectionError, TransportError};
use crate::pattern::TopicPattern;
use crate::transport::{Decimator, PayloadFormat, Transport};

/// Transport that subscribes to NATS subjects.
pub struct NatsTransport {
    url: String,
    payload: PayloadFormat,
    decimator: Decimator,
    client: Option<async_nats::Client>,
    subscriptions: SelectAll<async_nats::Subscriber>,
}

impl NatsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            payload: PayloadFormat::default(),
            decimator: Decimator::new(1),
            client: None,
            subscriptions: SelectAll::new(),
        }
    }

    pub fn with_payload_format(mut self, payload: PayloadFormat) -> Self {
        self.payload = payload;
        self
    }

    /// Deliver only every `n`-th message per subject.
    pub fn with_every_n(mut self, n: u32) -> Self {
        self.decimator = Decimator::new(n);
        self
    }
}

/// Topic name for a NATS subject.
pub fn subject_to_topic(subject: &str) -> String {
    subject.replace('.', "/")
}

#[async_trait]
impl Transport for NatsTransport {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn connect(&mut self) -> Result<(), ConnectionError> {
        self.subscriptions = SelectAll::new();
        self.decimator.reset();
        let client = async_nats::connect(&self.url)
            .await
            .map_err(|e| ConnectionError::unreachable(&self.url, e))?;
        self.client = Some(client);
        Ok(())
    }

    async fn subscribe(&mut self, pattern: &TopicPattern) -> Result<(), ConnectionError> {
        let Some(client) = self.client.as_ref() else {
            return Err(ConnectionError::Closed(format!("{}: not connected", self.url)));
        };

        let subscriber = client
            .subscribe(pattern.to_subject())
            .await
            .map_err(|e| ConnectionError::Closed(format!("{}: {}", self.url, e)))?;
        self.subscriptions.push(subscriber);
        Ok(())
    }

    async fn recv(&mut self) -> Result<TopicEvent, TransportError> {
        loop {
            let Some(message) = self.subscriptions.next().await else {
                return Err(
                    ConnectionError::Closed(format!("{}: subscriptions ended", self.url)).into(),
                );
            };

            let topic = subject_to_topic(&message.subject);
            if !self.decimator.admit(&topic) {
                continue;
            }
            let payload = self.payload.decode(&topic, message.payload.to_vec())?;
            return Ok(TopicEvent::new(topic, payload, unix_millis()));
        }
    }

    async fn disconnect(&mut self) {
        self.subscriptions = SelectAll::new();
        if let Some(client) = self.client.take() {
            let _ = client.flush().await;
        }
    }
}

impl std::fmt::Debug for NatsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsTransport")
            .field("url", &self.url)
            .field("payload", &self.payload)
            .field("every_n", &self.decimator.every())
            .field("connected", &self.client.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_become_slash_topics() {
        assert_eq!(subject_to_topic("robot.imu.raw"), "robot/imu/raw");
        assert_eq!(subject_to_topic("gps"), "gps");
    }

    #[test]
    fn patterns_become_subject_filters() {
        let pattern: TopicPattern = "robot/**".parse().unwrap();
        assert_eq!(pattern.to_subject(), "robot.>");
    }

    #[tokio::test]
    async fn not_connected_until_connect() {
        let mut transport = NatsTransport::new("nats://localhost:4222");
        assert!(transport.subscribe(&TopicPattern::all()).await.is_err());
        assert!(matches!(
            transport.recv().await,
            Err(TransportError::Connection(_))
        ));
    }
}
