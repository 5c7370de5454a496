//! Per-topic state as seen by display consumers.

use alloc::string::String;

use crate::{Health, Payload};

/// Point-in-time state of a single topic.
///
/// Only the most recent payload and timestamp are kept; there is no history.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct TopicRecord {
    /// Topic name, immutable once the topic exists.
    #[cfg_attr(feature = "minicbor", n(0))]
    pub name: String,

    /// Most recent payload, `None` until the first event.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none", default))]
    #[cfg_attr(feature = "minicbor", n(1))]
    pub last_value: Option<Payload>,

    /// Upstream timestamp (ms since Unix epoch) of the most recent event.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none", default))]
    #[cfg_attr(feature = "minicbor", n(2))]
    pub last_seen_ms: Option<u64>,

    /// Estimated messages per second.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none", default))]
    #[cfg_attr(feature = "minicbor", n(3))]
    pub rate: Option<f64>,

    #[cfg_attr(feature = "minicbor", n(4))]
    pub health: Health,

    /// Number of accepted events.
    #[cfg_attr(feature = "serde", serde(default))]
    #[cfg_attr(feature = "minicbor", n(5))]
    pub count: u64,

    /// Number of events for this topic dropped as undecodable.
    #[cfg_attr(feature = "serde", serde(default))]
    #[cfg_attr(feature = "minicbor", n(6))]
    pub malformed: u64,

    /// Monitor clock reading when the most recent event was accepted.
    /// Staleness and age are measured from here.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none", default))]
    #[cfg_attr(feature = "minicbor", n(7))]
    pub received_ms: Option<u64>,
}

impl TopicRecord {
    /// A record for a topic that has not delivered anything yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn builder(name: impl Into<String>) -> TopicRecordBuilder {
        TopicRecordBuilder::new(name)
    }

    /// Milliseconds since the last event, relative to `now_ms` on the
    /// monitor's clock. Falls back to the upstream timestamp for records
    /// built without a receive time.
    pub fn age_ms(&self, now_ms: u64) -> Option<u64> {
        self.received_ms
            .or(self.last_seen_ms)
            .map(|seen| now_ms.saturating_sub(seen))
    }
}

/// Builder for `TopicRecord`.
#[derive(Debug)]
pub struct TopicRecordBuilder {
    record: TopicRecord,
}

impl TopicRecordBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            record: TopicRecord::new(name),
        }
    }

    pub fn value(mut self, payload: Payload) -> Self {
        self.record.last_value = Some(payload);
        self
    }

    pub fn last_seen_ms(mut self, ts: u64) -> Self {
        self.record.last_seen_ms = Some(ts);
        self
    }

    pub fn received_ms(mut self, ts: u64) -> Self {
        self.record.received_ms = Some(ts);
        self
    }

    pub fn rate(mut self, rate: f64) -> Self {
        self.record.rate = Some(rate);
        self
    }

    pub fn health(mut self, health: Health) -> Self {
        self.record.health = health;
        self
    }

    pub fn count(mut self, count: u64) -> Self {
        self.record.count = count;
        self
    }

    pub fn malformed(mut self, malformed: u64) -> Self {
        self.record.malformed = malformed;
        self
    }

    pub fn build(self) -> TopicRecord {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_is_unknown_and_empty() {
        let record = TopicRecord::new("imu");
        assert_eq!(record.health, Health::Unknown);
        assert!(record.last_value.is_none());
        assert!(record.last_seen_ms.is_none());
        assert_eq!(record.count, 0);
    }

    #[test]
    fn age_is_relative_to_now() {
        let record = TopicRecord::builder("gps").last_seen_ms(1_000).build();
        assert_eq!(record.age_ms(4_500), Some(3_500));
        // A clock behind the event does not underflow
        assert_eq!(record.age_ms(500), Some(0));
        assert_eq!(TopicRecord::new("imu").age_ms(4_500), None);
    }

    #[test]
    fn age_prefers_receive_time() {
        // Upstream clock an hour behind the monitor
        let record = TopicRecord::builder("gps")
            .last_seen_ms(1_000)
            .received_ms(3_601_000)
            .build();
        assert_eq!(record.age_ms(3_602_000), Some(1_000));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn unset_optionals_are_omitted() {
        let json = serde_json::to_string(&TopicRecord::new("imu")).unwrap();
        assert!(!json.contains("last_value"));
        assert!(!json.contains("rate"));
        assert!(json.contains("\"health\":\"unknown\""));
    }
}
