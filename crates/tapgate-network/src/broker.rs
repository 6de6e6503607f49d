//! In-process broker.
//!
//! Stands in for the hosted broker in tests and in the emulator binary. Each
//! [`LocalTransport`] gets its own mailbox; a publish is copied into the
//! mailbox of every connected transport with a matching subscription,
//! including the publisher's own.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::transport::{InboundMessage, PubSubTransport, QoS, is_valid_filter, topic_matches};

/// Published messages kept for inspection; older ones are dropped.
pub const HISTORY_LIMIT: usize = 1024;

#[derive(Debug)]
struct Mailbox {
    client_id: String,
    filters: Vec<String>,
    tx: mpsc::UnboundedSender<InboundMessage>,
}

#[derive(Debug, Default)]
struct BrokerState {
    mailboxes: Vec<Mailbox>,
    published: VecDeque<InboundMessage>,
}

/// Shared in-memory broker.
#[derive(Debug, Clone, Default)]
pub struct LocalBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a disconnected client transport.
    pub fn transport(&self, client_id: impl Into<String>) -> LocalTransport {
        LocalTransport {
            broker: self.clone(),
            client_id: client_id.into(),
            rx: None,
        }
    }

    /// Publish as an outside party.
    pub fn inject(&self, topic: &str, payload: impl Into<Bytes>) {
        self.route(InboundMessage::new(topic, payload));
    }

    /// The last [`HISTORY_LIMIT`] published messages, oldest first.
    pub fn published(&self) -> Vec<InboundMessage> {
        self.lock().published.iter().cloned().collect()
    }

    /// Messages published on exactly `topic`.
    pub fn published_on(&self, topic: &str) -> Vec<InboundMessage> {
        self.lock()
            .published
            .iter()
            .filter(|message| message.topic == topic)
            .cloned()
            .collect()
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.lock().mailboxes.len()
    }

    fn route(&self, message: InboundMessage) {
        let mut state = self.lock();
        state.mailboxes.retain(|mailbox| !mailbox.tx.is_closed());

        let mut delivered = 0usize;
        for mailbox in &state.mailboxes {
            if mailbox
                .filters
                .iter()
                .any(|filter| topic_matches(filter, &message.topic))
                && mailbox.tx.send(message.clone()).is_ok()
            {
                delivered += 1;
            }
        }
        trace!(topic = %message.topic, delivered, "Routed message");
        if state.published.len() == HISTORY_LIMIT {
            state.published.pop_front();
        }
        state.published.push_back(message);
    }
}

/// One client's connection to a [`LocalBroker`].
#[derive(Debug)]
pub struct LocalTransport {
    broker: LocalBroker,
    client_id: String,
    rx: Option<mpsc::UnboundedReceiver<InboundMessage>>,
}

impl LocalTransport {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn require_connected(&self) -> Result<()> {
        if self.rx.is_some() {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

impl PubSubTransport for LocalTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.rx.is_some() {
            return Ok(());
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.broker.lock().mailboxes.push(Mailbox {
            client_id: self.client_id.clone(),
            filters: Vec::new(),
            tx,
        });
        self.rx = Some(rx);
        debug!(client_id = %self.client_id, "Connected to local broker");
        Ok(())
    }

    async fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<()> {
        self.require_connected()?;
        if !is_valid_filter(filter) {
            return Err(TransportError::InvalidTopic(filter.to_string()));
        }

        let mut state = self.broker.lock();
        let mailbox = state
            .mailboxes
            .iter_mut()
            .find(|mailbox| mailbox.client_id == self.client_id && !mailbox.tx.is_closed())
            .ok_or_else(|| TransportError::ConnectionLost(self.client_id.clone()))?;
        if !mailbox.filters.iter().any(|existing| existing == filter) {
            mailbox.filters.push(filter.to_string());
        }
        debug!(client_id = %self.client_id, filter, ?qos, "Subscribed");
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Bytes) -> Result<()> {
        self.require_connected()?;
        self.broker.route(InboundMessage::new(topic, payload));
        Ok(())
    }

    async fn poll_once(&mut self) -> Result<Vec<InboundMessage>> {
        let rx = self.rx.as_mut().ok_or(TransportError::NotConnected)?;
        let mut drained = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(message) => drained.push(message),
                Err(mpsc::error::TryRecvError::Empty) => return Ok(drained),
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    return Err(TransportError::ConnectionLost(self.client_id.clone()));
                }
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            let client_id = self.client_id.clone();
            self.broker
                .lock()
                .mailboxes
                .retain(|mailbox| mailbox.client_id != client_id);
            debug!(client_id = %self.client_id, "Disconnected from local broker");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.rx.is_some()
    }
}
