//! # topicwatch
//!
//! A liveness monitor for robot telemetry topics.
//!
//! topicwatch connects to one or more upstream pub/sub links, tracks the last
//! time each topic was seen, marks topics stale when they go quiet and keeps
//! a current health snapshot available for display clients.
//!
//! ```text
//!  upstream links          registry            publisher
//! ┌──────────────┐      ┌────────────┐      ┌────────────┐
//! │ tcp / nats   │─────▶│  topics    │─────▶│  snapshot  │──▶ serve / outputs
//! │ (supervised) │      │  + links   │      │  (latest)  │
//! └──────────────┘      └─────▲──────┘      └────────────┘
//!                             │
//!                        evaluator (sweep)
//! ```
//!
//! The building blocks live in the workspace crates:
//!
//! - `topicwatch-types`: the snapshot schema
//! - `topicwatch-core`: registry, staleness evaluator and snapshot publisher
//! - `topicwatch-adapters`: transports and the reconnecting link supervisor
//!
//! This crate adds the configuration layer, the snapshot server and the
//! binary that wires them together.
//!
//! ## Usage
//!
//! ```bash
//! # Run with a settings file, serving snapshots on 127.0.0.1:8042
//! topicwatch --config topicwatch.toml --listen 127.0.0.1:8042
//!
//! # Collect for ten seconds and write one snapshot
//! topicwatch --config topicwatch.toml --export snapshot.json --window 10s
//! ```

pub mod daemon;
pub mod duration;
pub mod serve;
pub mod settings;

pub use settings::Settings;
