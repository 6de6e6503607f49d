//! Feed topics and JSON payload schema shared by scanners, doors and the
//! authorization service.

pub mod error;
pub mod message;
pub mod topics;

pub use error::{ProtocolError, Result};
pub use message::{
    ActionMessage, CardRegistration, CheckRequest, DoorState, DoorStatus, LockOpen, UserRef,
    Verdict,
};
pub use topics::Topics;
