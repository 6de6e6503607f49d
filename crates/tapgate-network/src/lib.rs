//! Publish/subscribe plumbing for tapgate endpoints.
//!
//! - [`PubSubTransport`]: the broker connection (connect, subscribe,
//!   publish, drain)
//! - [`LocalBroker`]: in-process broker used by tests and the emulator
//! - [`PubSubClient`]: cloneable handle shared by the pump and the session loop
//! - [`MessagePump`]: background task that polls the transport and dispatches
//! - [`VerdictChannel`]: request/verdict correlation, one request at a time

pub mod broker;
pub mod client;
pub mod error;
pub mod pump;
pub mod router;
pub mod transport;
pub mod verdict;

pub use broker::{HISTORY_LIMIT, LocalBroker, LocalTransport};
pub use client::PubSubClient;
pub use error::{Result, TransportError, VerdictError};
pub use pump::{MessagePump, PumpTermination, drain};
pub use router::{MessageHandler, MessageRouter};
pub use transport::{InboundMessage, PubSubTransport, QoS};
pub use verdict::{ChannelState, VerdictChannel};
