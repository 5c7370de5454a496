//! In-memory transport for tests and demos.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use topicwatch_types::TopicEvent;

use crate::error::{ConnectionError, MalformedEventError, TransportError};
use crate::pattern::{matches_any, TopicPattern};
use crate::transport::Transport;

#[derive(Debug)]
enum Frame {
    Event(TopicEvent),
    Malformed(Option<String>),
    Drop,
}

#[derive(Debug, Default)]
struct Script {
    connected: bool,
    unreachable: bool,
    hang_connects: bool,
    failing_connects: u32,
    connects: u32,
    subscriptions: Vec<String>,
    active: Vec<TopicPattern>,
    known_topics: Vec<String>,
    history: VecDeque<String>,
}

/// A scripted [`Transport`] driven through a [`FakeControl`].
#[derive(Debug)]
pub struct FakeTransport {
    name: String,
    script: Arc<Mutex<Script>>,
    frames: mpsc::UnboundedReceiver<Frame>,
}

/// Test-side handle of a [`FakeTransport`].
#[derive(Debug, Clone)]
pub struct FakeControl {
    script: Arc<Mutex<Script>>,
    frames: mpsc::UnboundedSender<Frame>,
}

impl FakeTransport {
    pub fn new(name: impl Into<String>) -> (Self, FakeControl) {
        let (tx, rx) = mpsc::unbounded_channel();
        let script = Arc::new(Mutex::new(Script::default()));
        let transport = Self {
            name: name.into(),
            script: script.clone(),
            frames: rx,
        };
        (transport, FakeControl { script, frames: tx })
    }
}

impl FakeControl {
    /// Deliver an event (only if it matches an active subscription).
    pub fn send(&self, event: TopicEvent) {
        let _ = self.frames.send(Frame::Event(event));
    }

    /// Deliver an undecodable frame.
    pub fn send_malformed(&self, topic: Option<&str>) {
        let _ = self.frames.send(Frame::Malformed(topic.map(str::to_string)));
    }

    /// Break the current link, as a network failure would.
    pub fn drop_link(&self) {
        let _ = self.frames.send(Frame::Drop);
    }

    /// Make every connect attempt fail until reset.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.script.lock().unreachable = unreachable;
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.script.lock().failing_connects = n;
    }

    /// Make connect attempts never complete.
    pub fn hang_connects(&self, hang: bool) {
        self.script.lock().hang_connects = hang;
    }

    pub fn set_known_topics(&self, topics: &[&str]) {
        self.script.lock().known_topics = topics.iter().map(|t| t.to_string()).collect();
    }

    pub fn is_connected(&self) -> bool {
        self.script.lock().connected
    }

    /// Successful connects so far.
    pub fn connects(&self) -> u32 {
        self.script.lock().connects
    }

    /// Every pattern ever subscribed, in order, across reconnects.
    pub fn subscriptions(&self) -> Vec<String> {
        self.script.lock().subscriptions.clone()
    }

    /// Connect, subscribe and disconnect calls, in order.
    pub fn history(&self) -> Vec<String> {
        self.script.lock().history.iter().cloned().collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn describe(&self) -> String {
        format!("fake:{}", self.name)
    }

    async fn connect(&mut self) -> Result<(), ConnectionError> {
        let hang = {
            let mut script = self.script.lock();
            script.history.push_back("connect".to_string());
            script.hang_connects
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut script = self.script.lock();
        if script.unreachable {
            return Err(ConnectionError::unreachable(self.describe(), "scripted"));
        }
        if script.failing_connects > 0 {
            script.failing_connects -= 1;
            return Err(ConnectionError::unreachable(self.describe(), "scripted"));
        }

        // Frames queued while down are lost with the old link
        while self.frames.try_recv().is_ok() {}

        script.connected = true;
        script.connects += 1;
        script.active.clear();
        Ok(())
    }

    async fn subscribe(&mut self, pattern: &TopicPattern) -> Result<(), ConnectionError> {
        let mut script = self.script.lock();
        if !script.connected {
            return Err(ConnectionError::Closed("not connected".into()));
        }
        script.history.push_back(format!("subscribe {pattern}"));
        script.subscriptions.push(pattern.to_string());
        script.active.push(pattern.clone());
        Ok(())
    }

    async fn recv(&mut self) -> Result<TopicEvent, TransportError> {
        loop {
            if !self.script.lock().connected {
                return Err(ConnectionError::Closed("not connected".into()).into());
            }

            // Every control handle is gone: nothing will ever arrive
            let Some(frame) = self.frames.recv().await else {
                return std::future::pending().await;
            };

            let mut script = self.script.lock();
            match frame {
                Frame::Event(event) => {
                    if matches_any(&script.active, &event.topic) {
                        return Ok(event);
                    }
                }
                Frame::Malformed(topic) => {
                    return Err(MalformedEventError::new(topic, "scripted").into());
                }
                Frame::Drop => {
                    script.connected = false;
                    return Err(ConnectionError::Closed("scripted drop".into()).into());
                }
            }
        }
    }

    async fn disconnect(&mut self) {
        let mut script = self.script.lock();
        script.history.push_back("disconnect".to_string());
        script.connected = false;
    }

    fn known_topics(&self) -> Vec<String> {
        self.script.lock().known_topics.clone()
    }
}
