//! Shared handle over one transport connection.
//!
//! ```text
//! AccessSessionController ──publish──┐
//! VerdictChannel ─────────publish──┐ │
//!                                  ▼ ▼
//!                           PubSubClient ─── PubSubTransport ─── broker
//!                                  ▲
//! MessagePump ──poll_once/dispatch─┘
//! ```
//!
//! The pump and the session loop both hold clones; the transport itself sits
//! behind an async mutex so a publish never interleaves with a poll.

use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::router::{MessageHandler, MessageRouter};
use crate::transport::{PubSubTransport, QoS};

pub struct PubSubClient<T> {
    transport: Arc<Mutex<T>>,
    router: Arc<RwLock<MessageRouter>>,
}

impl<T> Clone for PubSubClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            router: Arc::clone(&self.router),
        }
    }
}

impl<T: PubSubTransport> PubSubClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(Mutex::new(transport)),
            router: Arc::new(RwLock::new(MessageRouter::new())),
        }
    }

    pub async fn connect(&self) -> Result<()> {
        self.transport.lock().await.connect().await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.transport.lock().await.disconnect().await
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.lock().await.is_connected()
    }

    /// Subscribe to `filter` and route matching messages to `handler`.
    ///
    /// The route is registered before the broker subscription so nothing that
    /// arrives in between is dropped.
    pub async fn subscribe(
        &self,
        filter: &str,
        qos: QoS,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        self.router
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add_route(filter, handler);
        self.transport.lock().await.subscribe(filter, qos).await
    }

    pub async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        debug!(topic, bytes = payload.len(), "Publishing");
        self.transport.lock().await.publish(topic, payload).await
    }

    /// Poll the transport once and dispatch what arrived.
    ///
    /// Returns the number of messages drained.
    pub async fn pump_once(&self) -> Result<usize> {
        let inbound = self.transport.lock().await.poll_once().await?;
        let router = self.router.read().unwrap_or_else(PoisonError::into_inner);
        for message in &inbound {
            router.dispatch(message);
        }
        Ok(inbound.len())
    }
}

impl<T> std::fmt::Debug for PubSubClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSubClient").finish_non_exhaustive()
    }
}
