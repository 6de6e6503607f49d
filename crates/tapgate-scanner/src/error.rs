//! Scanner-level errors.

use tapgate_network::TransportError;
use tapgate_rfid::{PassError, ProtocolFailure};

/// Failures that end the session loop.
///
/// Everything that can go wrong inside one access cycle is reported as a
/// [`CycleOutcome`](crate::CycleOutcome) instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Core(#[from] tapgate_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Why provisioning a card failed. No step is retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Config(#[from] tapgate_core::Error),

    #[error("Card reader unavailable: {0}")]
    Reader(ProtocolFailure),

    #[error("No card presented")]
    NoCard,

    #[error("Trailer rotation failed: {0}")]
    Trailer(ProtocolFailure),

    #[error("Writing the pass failed: {0}")]
    WritePass(PassError),

    #[error("Reading the pass back failed: {0}")]
    ReadBack(PassError),

    #[error("Pass read back does not match the pass written")]
    Mismatch,

    #[error("Publishing the registration failed: {0}")]
    Publish(#[from] TransportError),
}

/// Why card info could not be read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InspectError {
    #[error(transparent)]
    Config(#[from] tapgate_core::Error),

    #[error("Card reader unavailable: {0}")]
    Reader(ProtocolFailure),

    #[error("No card presented")]
    NoCard,

    #[error(transparent)]
    Pass(#[from] PassError),
}
