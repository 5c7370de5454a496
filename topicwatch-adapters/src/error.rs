//! Error types for transports.

use thiserror::Error;

/// Failure to establish or keep a link to an upstream.
///
/// Always recoverable: the supervisor reconnects with backoff.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Endpoint could not be reached.
    #[error("upstream {endpoint} unreachable: {reason}")]
    Unreachable { endpoint: String, reason: String },

    /// Connected, but the upstream did not speak the expected protocol.
    #[error("handshake with {endpoint} failed: {reason}")]
    Handshake { endpoint: String, reason: String },

    /// The connect attempt took longer than the configured timeout.
    #[error("connecting to {endpoint} timed out")]
    Timeout { endpoint: String },

    /// An established link was closed by the upstream or the network.
    #[error("link closed: {0}")]
    Closed(String),
}

impl ConnectionError {
    pub fn unreachable(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        ConnectionError::Unreachable {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn handshake(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        ConnectionError::Handshake {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }
}

/// An event that arrived but could not be decoded.
///
/// The event is dropped and counted; the link stays up.
#[derive(Debug, Error)]
#[error("malformed event{}: {reason}", on_topic(.topic))]
pub struct MalformedEventError {
    /// Topic the event claimed to belong to, when that much could be decoded.
    pub topic: Option<String>,
    pub reason: String,
}

impl MalformedEventError {
    pub fn new(topic: Option<String>, reason: impl ToString) -> Self {
        Self {
            topic,
            reason: reason.to_string(),
        }
    }
}

fn on_topic(topic: &Option<String>) -> String {
    topic.as_deref().map(|t| format!(" on {t}")).unwrap_or_default()
}

/// Anything a transport can report while receiving.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Malformed(#[from] MalformedEventError),
}

/// A topic pattern that cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,

    #[error("pattern {0:?} has an empty segment")]
    EmptySegment(String),

    #[error("`**` must be the last segment in {0:?}")]
    MisplacedRecursive(String),
}
