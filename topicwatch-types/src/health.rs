//! Topic health classification.

/// Liveness of a single topic.
///
/// - `Unknown`: the topic is expected (announced) but has never delivered.
/// - `Live`: set on every accepted event.
/// - `Stale`: set by the staleness evaluator once a live topic falls silent.
///
/// `Unknown` and `Stale` are deliberately distinct: a topic that never
/// arrived is not the same condition as one that stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
#[cfg_attr(feature = "minicbor", cbor(index_only))]
pub enum Health {
    #[default]
    #[cfg_attr(feature = "minicbor", n(0))]
    Unknown,
    #[cfg_attr(feature = "minicbor", n(1))]
    Live,
    #[cfg_attr(feature = "minicbor", n(2))]
    Stale,
}

impl Health {
    /// Short label for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            Health::Unknown => "UNKNOWN",
            Health::Live => "LIVE",
            Health::Stale => "STALE",
        }
    }

    /// True once the topic has delivered at least one event.
    pub fn has_delivered(&self) -> bool {
        !matches!(self, Health::Unknown)
    }
}

impl core::fmt::Display for Health {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Health::Unknown => "unknown",
            Health::Live => "live",
            Health::Stale => "stale",
        })
    }
}
