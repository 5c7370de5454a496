//! Upstream connection status.

/// Status of one supervised connection to an upstream telemetry source.
///
/// The supervisor walks `Disconnected -> Connecting -> Connected ->
/// Disconnected`. A `Disconnected` link with no scheduled retry has exhausted
/// its reconnect budget and stays that way; display surfaces should treat it
/// as degraded rather than merely quiet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "state", rename_all = "snake_case"))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub enum LinkState {
    /// Not connected.
    #[cfg_attr(feature = "minicbor", n(0))]
    Disconnected {
        /// Consecutive failed connection attempts.
        #[cfg_attr(feature = "minicbor", n(0))]
        failures: u32,
        /// Delay before the next attempt, `None` once the supervisor gave up.
        #[cfg_attr(feature = "minicbor", n(1))]
        retry_in_ms: Option<u64>,
    },
    /// A connection attempt is in flight.
    #[cfg_attr(feature = "minicbor", n(1))]
    Connecting {
        #[cfg_attr(feature = "minicbor", n(0))]
        attempt: u32,
    },
    /// Connected and subscribed.
    #[cfg_attr(feature = "minicbor", n(2))]
    Connected,
}

impl LinkState {
    /// Initial state of a link that has not tried to connect yet.
    pub const fn idle() -> Self {
        LinkState::Disconnected {
            failures: 0,
            retry_in_ms: Some(0),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected)
    }

    /// True when the link gave up reconnecting.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            LinkState::Disconnected {
                retry_in_ms: None,
                ..
            }
        )
    }

    /// Short label for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            LinkState::Connected => "UP",
            LinkState::Connecting { .. } => "CONNECTING",
            LinkState::Disconnected {
                retry_in_ms: None, ..
            } => "DOWN",
            LinkState::Disconnected { .. } => "RETRYING",
        }
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::idle()
    }
}
