//! Snapshot - a point-in-time view of every tracked topic.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::{Health, LinkState, SchemaVersion, TopicRecord, TopicRecordBuilder};

/// Registry-wide ingest counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct IngestStats {
    /// Events that updated a topic.
    #[cfg_attr(feature = "minicbor", n(0))]
    pub accepted: u64,

    /// Events discarded because they were older than the stored value.
    #[cfg_attr(feature = "minicbor", n(1))]
    pub out_of_order: u64,

    /// Events dropped because they could not be decoded.
    #[cfg_attr(feature = "minicbor", n(2))]
    pub malformed: u64,
}

/// An immutable, internally consistent view of all tracked topics.
///
/// Topics are keyed by name, so iteration is lexicographic and stable
/// between snapshots.
///
/// # Example
///
/// ```rust
/// use topicwatch_types::{Health, LinkState, Snapshot};
///
/// let snapshot = Snapshot::builder()
///     .topic("lidar/scan", |t| t.last_seen_ms(100).health(Health::Live))
///     .link("lidar", LinkState::Connected)
///     .build();
///
/// assert_eq!(snapshot.count_by_health(Health::Live), 1);
/// assert!(!snapshot.is_degraded());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct Snapshot {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub version: SchemaVersion,

    /// Unix timestamp in milliseconds when this snapshot was taken.
    #[cfg_attr(feature = "minicbor", n(1))]
    pub timestamp_ms: u64,

    #[cfg_attr(feature = "minicbor", n(2))]
    pub topics: BTreeMap<String, TopicRecord>,

    /// Status of each upstream link, keyed by link name.
    #[cfg_attr(feature = "serde", serde(default))]
    #[cfg_attr(feature = "minicbor", n(3))]
    pub links: BTreeMap<String, LinkState>,

    #[cfg_attr(feature = "serde", serde(default))]
    #[cfg_attr(feature = "minicbor", n(4))]
    pub stats: IngestStats,
}

impl Snapshot {
    /// Create an empty snapshot with the current timestamp.
    #[cfg(feature = "std")]
    pub fn new() -> Self {
        Self::with_timestamp(crate::unix_millis())
    }

    /// Create an empty snapshot with a specific timestamp.
    pub fn with_timestamp(timestamp_ms: u64) -> Self {
        Self {
            version: SchemaVersion::current(),
            timestamp_ms,
            topics: BTreeMap::new(),
            links: BTreeMap::new(),
            stats: IngestStats::default(),
        }
    }

    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Number of topics in the snapshot.
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn get(&self, topic: &str) -> Option<&TopicRecord> {
        self.topics.get(topic)
    }

    /// Iterate over topics in name order.
    pub fn iter(&self) -> impl Iterator<Item = &TopicRecord> {
        self.topics.values()
    }

    pub fn count_by_health(&self, health: Health) -> usize {
        self.topics.values().filter(|t| t.health == health).count()
    }

    /// True when any upstream link gave up reconnecting.
    ///
    /// In that state silence on a topic may be caused by the monitor's own
    /// disconnection rather than by the robot.
    pub fn is_degraded(&self) -> bool {
        self.links.values().any(LinkState::is_degraded)
    }

    /// Topics and links that differ from `previous`, plus topics that
    /// disappeared.
    ///
    /// Applying the diff to `previous` with [`Snapshot::apply`] yields this
    /// snapshot's topics and links.
    pub fn diff(&self, previous: &Snapshot) -> SnapshotDiff {
        let changed = self
            .topics
            .values()
            .filter(|record| previous.topics.get(&record.name) != Some(*record))
            .cloned()
            .collect();

        let removed = previous
            .topics
            .keys()
            .filter(|name| !self.topics.contains_key(*name))
            .cloned()
            .collect();

        let links = self
            .links
            .iter()
            .filter(|(name, state)| previous.links.get(*name) != Some(*state))
            .map(|(name, state)| (name.clone(), *state))
            .collect();

        SnapshotDiff {
            timestamp_ms: self.timestamp_ms,
            changed,
            removed,
            links,
            stats: self.stats,
        }
    }

    /// Bring this snapshot forward by one diff.
    pub fn apply(&mut self, diff: &SnapshotDiff) {
        self.timestamp_ms = diff.timestamp_ms;
        for name in &diff.removed {
            self.topics.remove(name);
        }
        for record in &diff.changed {
            self.topics.insert(record.name.clone(), record.clone());
        }
        for (name, state) in &diff.links {
            self.links.insert(name.clone(), *state);
        }
        self.stats = diff.stats;
    }
}

#[cfg(feature = "std")]
impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// The difference between two consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct SnapshotDiff {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub timestamp_ms: u64,

    /// New or modified topic records, in name order.
    #[cfg_attr(feature = "minicbor", n(1))]
    pub changed: Vec<TopicRecord>,

    /// Names of topics that were removed.
    #[cfg_attr(feature = "minicbor", n(2))]
    pub removed: Vec<String>,

    /// Links whose state changed.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "BTreeMap::is_empty"))]
    #[cfg_attr(feature = "minicbor", n(3))]
    pub links: BTreeMap<String, LinkState>,

    /// Ingest counters as of the newer snapshot.
    #[cfg_attr(feature = "serde", serde(default))]
    #[cfg_attr(feature = "minicbor", n(4))]
    pub stats: IngestStats,
}

impl SnapshotDiff {
    /// True when no topic or link changed.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty() && self.links.is_empty()
    }
}

/// Builder for constructing `Snapshot` instances.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    timestamp_ms: Option<u64>,
    topics: BTreeMap<String, TopicRecord>,
    links: BTreeMap<String, LinkState>,
    stats: IngestStats,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a specific timestamp (milliseconds since Unix epoch).
    pub fn timestamp_ms(mut self, ts: u64) -> Self {
        self.timestamp_ms = Some(ts);
        self
    }

    /// Add a topic built using a closure.
    pub fn topic<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(TopicRecordBuilder) -> TopicRecordBuilder,
    {
        let name = name.into();
        let record = f(TopicRecordBuilder::new(name.clone())).build();
        self.topics.insert(name, record);
        self
    }

    /// Add a pre-built record.
    pub fn record(mut self, record: TopicRecord) -> Self {
        self.topics.insert(record.name.clone(), record);
        self
    }

    pub fn link(mut self, name: impl Into<String>, state: LinkState) -> Self {
        self.links.insert(name.into(), state);
        self
    }

    pub fn stats(mut self, stats: IngestStats) -> Self {
        self.stats = stats;
        self
    }

    #[cfg(feature = "std")]
    pub fn build(self) -> Snapshot {
        let timestamp_ms = self.timestamp_ms.unwrap_or_else(crate::unix_millis);
        self.build_at(timestamp_ms)
    }

    /// Build the snapshot with a specific timestamp (for no_std).
    #[cfg(not(feature = "std"))]
    pub fn build(self) -> Snapshot {
        let timestamp_ms = self.timestamp_ms.unwrap_or(0);
        self.build_at(timestamp_ms)
    }

    fn build_at(self, timestamp_ms: u64) -> Snapshot {
        Snapshot {
            version: SchemaVersion::current(),
            timestamp_ms,
            topics: self.topics,
            links: self.links,
            stats: self.stats,
        }
    }
}
