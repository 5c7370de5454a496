//! # topicwatch-adapters
//!
//! Transports that feed upstream pub/sub topics into a topicwatch registry.
//!
//! A [`Transport`] turns one upstream into a stream of
//! `(topic, payload, timestamp)` events. A [`LinkSupervisor`] keeps it
//! connected, reconnecting with exponential [`Backoff`] and re-sending its
//! subscriptions, and pushes events into any
//! [`EventSink`](topicwatch_core::EventSink).
//!
//! ## Supported Upstreams
//!
//! - **TCP** - newline-delimited JSON, see [`tcp`]
//! - **NATS** (`nats` feature) - core NATS subjects
//! - **Fake** - scripted in-memory transport for tests and demos
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use topicwatch_adapters::{LinkConfig, LinkSupervisor, TcpTransport};
//! use topicwatch_core::Monitor;
//!
//! #[tokio::main]
//! async fn main() {
//!     let monitor = Monitor::new();
//!     let mut handle = monitor.start();
//!
//!     let link = LinkSupervisor::new(
//!         LinkConfig::new("oak0"),
//!         TcpTransport::new("127.0.0.1:5001"),
//!         monitor.sink(),
//!     );
//!     handle.attach(link.spawn(handle.signal()));
//!
//!     tokio::signal::ctrl_c().await.unwrap();
//!     handle.shutdown().await;
//! }
//! ```

pub mod backoff;
pub mod error;
pub mod fake;
pub mod pattern;
pub mod supervisor;
pub mod tcp;
pub mod transport;

#[cfg(feature = "nats")]
pub mod nats;

pub use backoff::Backoff;
pub use error::{ConnectionError, MalformedEventError, PatternError, TransportError};
pub use fake::{FakeControl, FakeTransport};
pub use pattern::TopicPattern;
pub use supervisor::{LinkConfig, LinkSupervisor};
pub use tcp::TcpTransport;
pub use transport::{Decimator, PayloadFormat, Transport};

#[cfg(feature = "nats")]
pub use nats::NatsTransport;
