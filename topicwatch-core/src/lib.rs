//! # topicwatch-core
//!
//! Topic registry, staleness evaluation and snapshot publishing.
//!
//! Transports push `(topic, payload, timestamp)` events into a [`Registry`]
//! through the [`EventSink`] callback. A [`StalenessEvaluator`] sweeps the
//! registry on a fixed interval and a [`SnapshotPublisher`] hands immutable
//! [`Snapshot`]s to display surfaces, either on demand or pushed as the
//! registry changes.
//!
//! ## Quick Start
//!
//! ```rust
//! use topicwatch_core::Monitor;
//! use topicwatch_types::{Health, Payload, TopicEvent};
//!
//! let monitor = Monitor::new();
//! monitor.announce("imu");
//! monitor.sink().ingest(TopicEvent::new("gps", Payload::text("fix"), 1_000));
//!
//! let snapshot = monitor.snapshot();
//! assert_eq!(snapshot.get("gps").unwrap().health, Health::Live);
//! assert_eq!(snapshot.get("imu").unwrap().health, Health::Unknown);
//! ```
//!
//! ## Guarantees
//!
//! - A topic's last-seen timestamp never moves backwards
//! - Snapshots never mix fields from two updates of the same topic
//! - Slow snapshot consumers never block ingest

mod clock;
mod config;
mod evaluator;
mod monitor;
mod output;
mod publisher;
mod rate;
mod registry;
mod shutdown;

pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};
pub use config::{ConfigError, MonitorConfig};
pub use evaluator::StalenessEvaluator;
pub use monitor::{Monitor, MonitorBuilder, MonitorHandle};
pub use output::Output;
pub use publisher::{SnapshotPublisher, SnapshotPublisherBuilder};
pub use rate::RateEstimator;
pub use registry::{EventSink, IngestOutcome, Registry};
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};

// Re-export types for convenience
pub use topicwatch_types::{
    Health, IngestStats, LinkState, Payload, Snapshot, SnapshotDiff, TopicEvent, TopicRecord,
};
