//! Publish/subscribe transport abstraction.
//!
//! The transport only moves bytes: it connects, subscribes, publishes, and
//! drains whatever arrived since the last call. Dispatching inbound messages
//! to handlers is the [`MessagePump`](crate::MessagePump)'s job.
//!
//! Method futures are declared `Send` so the pump can own the transport from
//! a spawned task.

use std::future::Future;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// Delivery guarantee requested for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QoS {
    #[default]
    AtMostOnce,
    AtLeastOnce,
}

/// A message drained from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }
}

/// Connection to a publish/subscribe broker.
pub trait PubSubTransport: Send + 'static {
    /// Open the connection.
    fn connect(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Start receiving messages matching `filter`.
    fn subscribe(&mut self, filter: &str, qos: QoS) -> impl Future<Output = Result<()>> + Send;

    /// Publish one message.
    fn publish(&mut self, topic: &str, payload: Bytes) -> impl Future<Output = Result<()>> + Send;

    /// Service the connection once and return everything that arrived.
    ///
    /// Must not block waiting for new messages.
    fn poll_once(&mut self) -> impl Future<Output = Result<Vec<InboundMessage>>> + Send;

    /// Close the connection.
    fn disconnect(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn is_connected(&self) -> bool;
}

/// MQTT-style topic filter matching with `+` (one level) and `#` (rest).
///
/// ```
/// use tapgate_network::transport::topic_matches;
///
/// assert!(topic_matches("acme/feeds/#", "acme/feeds/lock.open"));
/// assert!(topic_matches("+/feeds/lock.open", "acme/feeds/lock.open"));
/// assert!(!topic_matches("acme/feeds/lock.open", "acme/feeds/lock.status"));
/// ```
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Whether `filter` is a well-formed topic filter.
pub fn is_valid_filter(filter: &str) -> bool {
    if filter.is_empty() {
        return false;
    }
    let levels: Vec<&str> = filter.split('/').collect();
    levels.iter().enumerate().all(|(i, level)| match *level {
        "#" => i == levels.len() - 1,
        "+" => true,
        other => !other.contains('#') && !other.contains('+'),
    })
}
