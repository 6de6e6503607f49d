//! Topic-filter dispatch of inbound messages.

use std::sync::Arc;

use tracing::trace;

use crate::transport::{InboundMessage, topic_matches};

/// Receives messages for the topics it was registered under.
///
/// Handlers run on the pump task and must return promptly; anything
/// long-running is handed off through a channel.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, message: &InboundMessage);
}

impl<F> MessageHandler for F
where
    F: Fn(&InboundMessage) + Send + Sync,
{
    fn on_message(&self, message: &InboundMessage) {
        self(message)
    }
}

/// Ordered list of `(filter, handler)` routes.
#[derive(Default)]
pub struct MessageRouter {
    routes: Vec<(String, Arc<dyn MessageHandler>)>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_route(&mut self, filter: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        self.routes.push((filter.into(), handler));
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Hand `message` to every matching handler. Returns how many ran.
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        let mut handled = 0;
        for (filter, handler) in &self.routes {
            if topic_matches(filter, &message.topic) {
                handler.on_message(message);
                handled += 1;
            }
        }
        if handled == 0 {
            trace!(topic = %message.topic, "No route for message");
        }
        handled
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field(
                "filters",
                &self.routes.iter().map(|(filter, _)| filter).collect::<Vec<_>>(),
            )
            .finish()
    }
}
