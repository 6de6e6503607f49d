//! Errors of the publish/subscribe layer and of verdict correlation.

use std::time::Duration;

use tapgate_protocol::ProtocolError;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Publish/subscribe transport failures.
///
/// Reconnect policy belongs to whoever owns the transport; these are only
/// reported upward.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Operation attempted before `connect` or after `disconnect`.
    #[error("Not connected to broker")]
    NotConnected,

    /// Connection attempt failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The broker went away during an operation.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// A topic filter the broker cannot accept.
    #[error("Invalid topic filter: {0}")]
    InvalidTopic(String),

    /// A payload could not be encoded for publishing.
    #[error("Payload error: {0}")]
    Payload(#[from] ProtocolError),
}

/// Why `request_and_wait` returned without a verdict.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerdictError {
    /// Another request is still awaiting its verdict.
    #[error("A check request is already awaiting a verdict")]
    RequestOutstanding,

    /// No matching verdict arrived in time.
    #[error("No verdict within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// A message arrived on the verdict feed but is not a valid verdict.
    #[error("Malformed verdict: {0}")]
    Malformed(ProtocolError),

    /// The check request could not be published.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The channel was torn down while waiting.
    #[error("Verdict channel closed")]
    Closed,
}

impl VerdictError {
    pub(crate) fn timeout(timeout: Duration) -> Self {
        Self::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
