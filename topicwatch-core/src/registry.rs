//! The topic registry: authoritative per-topic state.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use topicwatch_types::{
    Health, IngestStats, LinkState, Payload, Snapshot, SchemaVersion, TopicEvent, TopicRecord,
};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::rate::RateEstimator;

/// What an ingest call did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// First event for a topic nobody had announced.
    Created,
    /// A live topic received a newer value.
    Updated,
    /// A stale or announced-but-silent topic became live.
    Revived { from: Health },
    /// The event was older than the stored value and was discarded.
    OutOfOrder,
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, IngestOutcome::OutOfOrder)
    }
}

/// Mutable fields of one topic. Always updated together under the slot lock.
#[derive(Debug, Default)]
struct TopicState {
    last_value: Option<Payload>,
    last_seen_ms: Option<u64>,
    received_ms: Option<u64>,
    rate: RateEstimator,
    health: Health,
    count: u64,
    malformed: u64,
}

/// One registry entry. The name never changes once the slot exists.
#[derive(Debug)]
struct TopicSlot {
    name: String,
    state: Mutex<TopicState>,
}

impl TopicSlot {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(TopicState::default()),
        }
    }

    fn record(&self) -> TopicRecord {
        let state = self.state.lock();
        TopicRecord {
            name: self.name.clone(),
            last_value: state.last_value.clone(),
            last_seen_ms: state.last_seen_ms,
            received_ms: state.received_ms,
            rate: state.rate.rate(),
            health: state.health,
            count: state.count,
            malformed: state.malformed,
        }
    }
}

/// In-memory map of topic name to topic state.
///
/// Each topic's fields live behind their own mutex, so a reader always sees
/// a topic's payload, timestamp and health from the same update. Writers
/// hold the name map's read lock while they update a slot, which keeps
/// `remove` from detaching a slot mid-update; readers only hold the map lock
/// long enough to clone the slot handles.
///
/// Two timelines are kept per topic. `last_seen_ms` is the upstream's own
/// event timestamp and orders events. `received_ms` is the registry clock at
/// ingest and is what staleness is judged against, so an upstream whose
/// clock is skewed from ours still goes stale after the same silence.
///
/// # Example
///
/// ```rust
/// use topicwatch_core::{IngestOutcome, Registry};
/// use topicwatch_types::{Health, Payload, TopicEvent};
///
/// let registry = Registry::new();
/// registry.announce("imu");
///
/// let outcome = registry.ingest(TopicEvent::new("lidar", Payload::text("scan"), 100));
/// assert_eq!(outcome, IngestOutcome::Created);
///
/// let outcome = registry.ingest(TopicEvent::new("lidar", Payload::text("older"), 90));
/// assert_eq!(outcome, IngestOutcome::OutOfOrder);
///
/// let snapshot = registry.snapshot();
/// assert_eq!(snapshot.get("lidar").unwrap().last_seen_ms, Some(100));
/// assert_eq!(snapshot.get("imu").unwrap().health, Health::Unknown);
/// ```
#[derive(Debug)]
pub struct Registry {
    topics: RwLock<BTreeMap<String, Arc<TopicSlot>>>,
    links: RwLock<BTreeMap<String, LinkState>>,
    accepted: AtomicU64,
    out_of_order: AtomicU64,
    malformed: AtomicU64,
    changes: watch::Sender<u64>,
    clock: Arc<dyn Clock>,
}

impl Registry {
    /// Create an empty registry stamped by the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty registry that stamps snapshots with `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            topics: RwLock::new(BTreeMap::new()),
            links: RwLock::new(BTreeMap::new()),
            accepted: AtomicU64::new(0),
            out_of_order: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            changes,
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run `f` on a topic's slot, creating the slot first if needed.
    ///
    /// The name map stays locked while `f` runs, so the slot cannot be
    /// removed underneath it. `f` also learns whether the slot was created.
    fn with_slot<R>(&self, name: &str, f: impl FnOnce(&TopicSlot, bool) -> R) -> R {
        // Fast path: check if it exists
        {
            let topics = self.topics.read();
            if let Some(slot) = topics.get(name) {
                return f(slot.as_ref(), false);
            }
        }

        // Slow path: another writer may have inserted it meanwhile
        let mut topics = self.topics.write();
        let mut created = false;
        let slot = topics.entry(name.to_string()).or_insert_with(|| {
            created = true;
            Arc::new(TopicSlot::new(name))
        });
        f(slot.as_ref(), created)
    }

    fn slot(&self, name: &str) -> Option<Arc<TopicSlot>> {
        self.topics.read().get(name).cloned()
    }

    fn notify(&self) {
        self.changes.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    /// Apply one event.
    ///
    /// An event older than the stored last-seen timestamp is discarded, so a
    /// topic's last-seen time never moves backwards. An event with the same
    /// timestamp is accepted. Accepted events are stamped with the registry
    /// clock as their receive time.
    pub fn ingest(&self, event: TopicEvent) -> IngestOutcome {
        let TopicEvent {
            topic,
            payload,
            timestamp_ms,
        } = event;
        let received_ms = self.clock.now_ms();

        let outcome = self.with_slot(&topic, |slot, created| {
            let mut state = slot.state.lock();
            match state.last_seen_ms {
                Some(seen) if timestamp_ms < seen => IngestOutcome::OutOfOrder,
                _ => {
                    let previous = state.health;
                    state.rate.observe(timestamp_ms);
                    state.last_value = Some(payload);
                    state.last_seen_ms = Some(timestamp_ms);
                    state.received_ms = Some(received_ms);
                    state.health = Health::Live;
                    state.count += 1;

                    if created {
                        IngestOutcome::Created
                    } else if previous != Health::Live {
                        IngestOutcome::Revived { from: previous }
                    } else {
                        IngestOutcome::Updated
                    }
                }
            }
        });

        match outcome {
            IngestOutcome::OutOfOrder => {
                self.out_of_order.fetch_add(1, Ordering::Relaxed);
                debug!(topic = %topic, timestamp_ms, "discarded out-of-order event");
            }
            IngestOutcome::Revived { from } => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                info!(topic = %topic, from = %from, "topic is live again");
            }
            IngestOutcome::Created => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                debug!(topic = %topic, "new topic");
            }
            IngestOutcome::Updated => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
            }
        }

        if outcome.is_accepted() {
            self.notify();
        }
        outcome
    }

    /// Pre-register a topic that is expected but has not delivered yet.
    ///
    /// Returns `true` if the topic was new. Announcing an existing topic does
    /// not touch its state.
    pub fn announce(&self, name: &str) -> bool {
        let created = self.with_slot(name, |_, created| created);
        if created {
            debug!(topic = %name, "announced topic");
            self.notify();
        }
        created
    }

    /// Remove a topic. This is an operator action; nothing removes topics
    /// automatically.
    ///
    /// Returns `true` if the topic was found and removed.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.topics.write().remove(name).is_some();
        if removed {
            info!(topic = %name, "topic removed");
            self.notify();
        }
        removed
    }

    /// Count an event that was dropped because it could not be decoded.
    ///
    /// The per-topic counter is only bumped for topics that already exist; a
    /// malformed event never creates, revives or otherwise changes a topic.
    pub fn record_malformed(&self, topic: Option<&str>) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
        if let Some(name) = topic {
            if let Some(slot) = self.topics.read().get(name) {
                slot.state.lock().malformed += 1;
            }
        }
        self.notify();
    }

    /// Record the status of an upstream link.
    pub fn set_link_state(&self, link: &str, state: LinkState) {
        let changed = {
            let mut links = self.links.write();
            links.insert(link.to_string(), state) != Some(state)
        };
        if changed {
            self.notify();
        }
    }

    pub fn link_state(&self, link: &str) -> Option<LinkState> {
        self.links.read().get(link).copied()
    }

    /// Mark every live topic silent for longer than `threshold_ms` as stale.
    ///
    /// Silence is measured from the local receive time, never from the
    /// upstream timestamp. Only health changes. Topics that never delivered
    /// stay `Unknown`.
    /// Returns the names that transitioned, in name order.
    pub fn mark_stale(&self, now_ms: u64, threshold_ms: u64) -> Vec<String> {
        let slots: Vec<Arc<TopicSlot>> = self.topics.read().values().cloned().collect();

        let mut transitioned = Vec::new();
        for slot in slots {
            let mut state = slot.state.lock();
            if state.health != Health::Live {
                continue;
            }
            let Some(received) = state.received_ms else {
                continue;
            };
            if now_ms.saturating_sub(received) > threshold_ms {
                state.health = Health::Stale;
                transitioned.push(slot.name.clone());
            }
        }

        if !transitioned.is_empty() {
            self.notify();
        }
        transitioned
    }

    /// Current state of a single topic.
    pub fn get(&self, name: &str) -> Option<TopicRecord> {
        self.slot(name).map(|slot| slot.record())
    }

    /// Number of tracked topics.
    pub fn len(&self) -> usize {
        self.topics.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.read().is_empty()
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            out_of_order: self.out_of_order.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }

    /// Copy the state of every topic into an immutable snapshot.
    ///
    /// The name map is only held long enough to clone the slot handles; each
    /// topic is then copied under its own lock, so no record is ever torn.
    pub fn snapshot(&self) -> Snapshot {
        let slots: Vec<Arc<TopicSlot>> = self.topics.read().values().cloned().collect();

        let topics = slots
            .iter()
            .map(|slot| (slot.name.clone(), slot.record()))
            .collect();

        Snapshot {
            version: SchemaVersion::current(),
            timestamp_ms: self.clock.now_ms(),
            topics,
            links: self.links.read().clone(),
            stats: self.stats(),
        }
    }

    /// Subscribe to a generation counter bumped on every state change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// The ingest callback a transport pushes into.
pub trait EventSink: Send + Sync {
    /// Deliver one decoded event.
    fn ingest(&self, event: TopicEvent);

    /// The upstream advertised a topic that may not be delivering yet.
    fn announce(&self, topic: &str);

    /// An event was dropped as undecodable.
    fn malformed(&self, topic: Option<&str>);

    /// The link's connection status changed.
    fn link_state(&self, link: &str, state: LinkState);
}

impl EventSink for Registry {
    fn ingest(&self, event: TopicEvent) {
        Registry::ingest(self, event);
    }

    fn announce(&self, topic: &str) {
        Registry::announce(self, topic);
    }

    fn malformed(&self, topic: Option<&str>) {
        self.record_malformed(topic);
    }

    fn link_state(&self, link: &str, state: LinkState) {
        self.set_link_state(link, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn event(topic: &str, value: &str, ts: u64) -> TopicEvent {
        TopicEvent::new(topic, Payload::text(value), ts)
    }

    /// A registry whose receive clock is pinned at zero.
    fn registry_at_zero() -> Registry {
        Registry::with_clock(Arc::new(ManualClock::new(0)))
    }

    #[test]
    fn first_event_creates_live_topic() {
        let registry = Registry::new();
        assert_eq!(registry.ingest(event("gps", "a", 10)), IngestOutcome::Created);

        let record = registry.get("gps").unwrap();
        assert_eq!(record.health, Health::Live);
        assert_eq!(record.last_seen_ms, Some(10));
        assert_eq!(record.last_value, Some(Payload::text("a")));
        assert_eq!(record.count, 1);
        assert_eq!(record.rate, None);
    }

    #[test]
    fn older_event_is_discarded() {
        let registry = Registry::new();
        registry.ingest(event("lidar", "new", 100));
        assert_eq!(registry.ingest(event("lidar", "old", 90)), IngestOutcome::OutOfOrder);

        let record = registry.get("lidar").unwrap();
        assert_eq!(record.last_seen_ms, Some(100));
        assert_eq!(record.last_value, Some(Payload::text("new")));
        assert_eq!(record.count, 1);
        assert_eq!(registry.stats().out_of_order, 1);
        assert_eq!(registry.stats().accepted, 1);
    }

    #[test]
    fn equal_timestamp_is_accepted() {
        let registry = Registry::new();
        registry.ingest(event("imu", "a", 50));
        assert_eq!(registry.ingest(event("imu", "b", 50)), IngestOutcome::Updated);
        assert_eq!(registry.get("imu").unwrap().last_value, Some(Payload::text("b")));
    }

    #[test]
    fn last_seen_is_monotonic_under_any_order() {
        let registry = Registry::new();
        let order = [5u64, 3, 9, 1, 9, 7, 12, 2, 11];
        let mut max_seen = 0;
        for ts in order {
            registry.ingest(event("odom", &ts.to_string(), ts));
            let seen = registry.get("odom").unwrap().last_seen_ms.unwrap();
            assert!(seen >= max_seen);
            max_seen = seen;
        }
        assert_eq!(max_seen, 12);
        assert_eq!(registry.get("odom").unwrap().last_value, Some(Payload::text("12")));
    }

    #[test]
    fn announce_registers_unknown_topic() {
        let registry = Registry::new();
        assert!(registry.announce("imu"));
        assert!(!registry.announce("imu"));

        let record = registry.get("imu").unwrap();
        assert_eq!(record.health, Health::Unknown);
        assert!(record.last_seen_ms.is_none());
    }

    #[test]
    fn announce_does_not_reset_existing_topic() {
        let registry = Registry::new();
        registry.ingest(event("gps", "a", 10));
        assert!(!registry.announce("gps"));
        assert_eq!(registry.get("gps").unwrap().health, Health::Live);
    }

    #[test]
    fn announced_topic_revives_on_first_event() {
        let registry = Registry::new();
        registry.announce("imu");
        assert_eq!(
            registry.ingest(event("imu", "a", 1)),
            IngestOutcome::Revived {
                from: Health::Unknown
            }
        );
    }

    #[test]
    fn mark_stale_uses_strict_threshold() {
        let registry = registry_at_zero();
        registry.ingest(event("gps", "a", 0));

        assert!(registry.mark_stale(5_000, 5_000).is_empty());
        assert_eq!(registry.get("gps").unwrap().health, Health::Live);

        assert_eq!(registry.mark_stale(5_001, 5_000), ["gps"]);
        assert_eq!(registry.get("gps").unwrap().health, Health::Stale);

        // Already stale topics are not reported twice
        assert!(registry.mark_stale(9_000, 5_000).is_empty());
    }

    #[test]
    fn mark_stale_leaves_unknown_topics_alone() {
        let registry = Registry::new();
        registry.announce("imu");
        assert!(registry.mark_stale(u64::MAX, 0).is_empty());
        assert_eq!(registry.get("imu").unwrap().health, Health::Unknown);
    }

    #[test]
    fn mark_stale_only_changes_health() {
        let registry = registry_at_zero();
        registry.ingest(event("gps", "a", 0));
        registry.ingest(event("gps", "b", 100));
        let before = registry.get("gps").unwrap();

        registry.mark_stale(10_000, 5_000);
        let after = registry.get("gps").unwrap();

        assert_eq!(after.health, Health::Stale);
        assert_eq!(after.last_value, before.last_value);
        assert_eq!(after.last_seen_ms, before.last_seen_ms);
        assert_eq!(after.received_ms, before.received_ms);
        assert_eq!(after.rate, before.rate);
        assert_eq!(after.count, before.count);
    }

    #[test]
    fn stale_topic_revives_on_ingest() {
        let registry = registry_at_zero();
        registry.ingest(event("gps", "a", 0));
        registry.mark_stale(6_000, 5_000);

        assert_eq!(
            registry.ingest(event("gps", "b", 7_000)),
            IngestOutcome::Revived { from: Health::Stale }
        );
        assert_eq!(registry.get("gps").unwrap().health, Health::Live);
    }

    #[test]
    fn remove_drops_topic() {
        let registry = Registry::new();
        registry.ingest(event("gps", "a", 0));
        assert!(registry.remove("gps"));
        assert!(!registry.remove("gps"));
        assert!(registry.get("gps").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn malformed_events_are_counted_without_touching_state() {
        let registry = registry_at_zero();
        registry.ingest(event("gps", "a", 10));
        registry.mark_stale(100_000, 5_000);

        registry.record_malformed(Some("gps"));
        registry.record_malformed(Some("never-seen"));
        registry.record_malformed(None);

        let gps = registry.get("gps").unwrap();
        assert_eq!(gps.malformed, 1);
        assert_eq!(gps.health, Health::Stale);
        assert_eq!(gps.last_value, Some(Payload::text("a")));
        assert!(registry.get("never-seen").is_none());
        assert_eq!(registry.stats().malformed, 3);
    }

    #[test]
    fn rate_estimate_follows_event_spacing() {
        let registry = Registry::new();
        for i in 0..10u64 {
            registry.ingest(event("imu", "x", i * 10));
        }
        let rate = registry.get("imu").unwrap().rate.unwrap();
        assert!((rate - 100.0).abs() < 1e-9);
    }

    #[test]
    fn snapshot_is_sorted_and_stamped_by_clock() {
        let clock = Arc::new(ManualClock::new(42_000));
        let registry = Registry::with_clock(clock);
        registry.ingest(event("zeta", "z", 1));
        registry.ingest(event("alpha", "a", 1));
        registry.announce("mid");
        registry.set_link_state("oak0", LinkState::Connected);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.timestamp_ms, 42_000);
        let names: Vec<&str> = snapshot.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["alpha", "mid", "zeta"]);
        assert_eq!(snapshot.links.get("oak0"), Some(&LinkState::Connected));
        assert_eq!(snapshot.stats.accepted, 2);
    }

    #[test]
    fn changes_bump_on_state_change_only() {
        let registry = Registry::new();
        let mut changes = registry.changes();
        assert!(!changes.has_changed().unwrap());

        registry.ingest(event("gps", "a", 10));
        assert!(changes.has_changed().unwrap());
        changes.borrow_and_update();

        // Out-of-order and repeated link states are not changes
        registry.ingest(event("gps", "old", 5));
        registry.set_link_state("oak0", LinkState::Connected);
        changes.borrow_and_update();
        registry.set_link_state("oak0", LinkState::Connected);
        assert!(!changes.has_changed().unwrap());
    }

    #[test]
    fn with_slot_creates_once() {
        let registry = Registry::new();
        let (a, created_a) = registry.with_slot("topic", |slot, created| (slot as *const TopicSlot, created));
        let (b, created_b) = registry.with_slot("topic", |slot, created| (slot as *const TopicSlot, created));
        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a, b);
    }

    #[test]
    fn staleness_follows_receive_time_not_upstream_clock() {
        let clock = Arc::new(ManualClock::new(100_000));
        let registry = Registry::with_clock(clock.clone());

        // Upstream clock runs 10s behind ours while streaming at 50 Hz
        for i in 0..50u64 {
            clock.set(100_000 + i * 20);
            registry.ingest(event("imu", "x", 90_000 + i * 20));
        }
        let now = clock.now_ms();
        assert!(registry.mark_stale(now, 5_000).is_empty());

        let imu = registry.get("imu").unwrap();
        assert_eq!(imu.health, Health::Live);
        assert_eq!(imu.last_seen_ms, Some(90_980));
        assert_eq!(imu.received_ms, Some(100_980));

        // Upstream clock runs ahead: silence still counts from receipt
        registry.ingest(event("gps", "fix", now + 60_000));
        assert_eq!(registry.mark_stale(now + 5_001, 5_000), ["gps", "imu"]);
    }

    #[test]
    fn remove_never_races_an_update() {
        use std::sync::atomic::AtomicBool;
        use std::thread;

        let registry = Arc::new(Registry::new());
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let registry = registry.clone();
            let done = done.clone();
            thread::spawn(move || {
                for ts in 0..20_000u64 {
                    registry.ingest(event("gps", "x", ts));
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        // Detach slots the way `remove` does, noting each count at removal
        let mut removed = Vec::new();
        while !done.load(Ordering::SeqCst) {
            let mut topics = registry.topics.write();
            if let Some(slot) = topics.remove("gps") {
                let count = slot.state.lock().count;
                removed.push((slot, count));
            }
        }
        writer.join().unwrap();

        // No update may land in a slot after it left the map
        for (slot, count_at_removal) in &removed {
            assert_eq!(slot.state.lock().count, *count_at_removal);
        }
        let remaining = registry.get("gps").map_or(0, |t| t.count);
        let total: u64 = removed.iter().map(|(_, count)| count).sum::<u64>() + remaining;
        assert_eq!(total, registry.stats().accepted);
    }

    #[test]
    fn concurrent_ingest_and_snapshot_never_tear() {
        use std::thread;

        let registry = Arc::new(Registry::new());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for i in 0..2_000u64 {
                        let ts = i * 4 + w;
                        // Payload encodes its own timestamp
                        registry.ingest(event("shared", &ts.to_string(), ts));
                        registry.ingest(event(&format!("own-{w}"), &ts.to_string(), ts));
                    }
                })
            })
            .collect();

        let reader = {
            let registry = registry.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    for record in registry.snapshot().iter() {
                        let value = record.last_value.as_ref().and_then(|p| p.as_text());
                        let seen = record.last_seen_ms.map(|ts| ts.to_string());
                        assert_eq!(value, seen.as_deref(), "torn record for {}", record.name);
                    }
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();

        assert_eq!(registry.len(), 5);
    }
}
