//! # topicwatch-types
//!
//! Schema types shared by every topicwatch crate: the events a transport
//! delivers, the per-topic records a registry keeps, and the snapshots handed
//! to display surfaces.
//!
//! ## Features
//!
//! - `std` (default): Standard library support (wall-clock timestamps)
//! - `serde`: JSON/etc. serialization via serde
//! - `minicbor`: Compact binary serialization via CBOR
//! - `all`: Enable all serialization formats
//!
//! ## Example
//!
//! ```rust
//! use topicwatch_types::{Health, Payload, Snapshot};
//!
//! let snapshot = Snapshot::builder()
//!     .timestamp_ms(10_000)
//!     .topic("oak0/gps", |t| {
//!         t.value(Payload::text(r#"{"lat":51.5}"#))
//!          .last_seen_ms(9_500)
//!          .rate(10.0)
//!          .health(Health::Live)
//!     })
//!     .topic("oak0/imu", |t| t)
//!     .build();
//!
//! assert_eq!(snapshot.len(), 2);
//! assert_eq!(snapshot.get("oak0/imu").unwrap().health, Health::Unknown);
//! ```
//!
//! ## Schema Version
//!
//! The current schema version is **1**.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod event;
mod health;
mod link;
mod record;
mod snapshot;
mod version;

pub use event::*;
pub use health::*;
pub use link::*;
pub use record::*;
pub use snapshot::*;
pub use version::*;

/// Current schema version.
///
/// Increment this when making breaking changes to the snapshot format.
pub const SCHEMA_VERSION: u32 = 1;
