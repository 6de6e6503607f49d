//! MIFARE Classic credential protocol.
//!
//! The layers stack bottom-up, each owning or borrowing the one below:
//!
//! ```text
//! CardTransceiver      poll for a card, yield between attempts
//!   └─ SectorAuthenticator   re-select + authenticate, once per block command
//!        └─ BlockStore           read with key A / write with key B
//!             ├─ TrailerManager      rotate sector keys
//!             └─ CardPassCodec       pass text <-> pass block
//! ```
//!
//! Every operation returns a tagged result. Wrong keys, absent cards and
//! failed block commands are [`ProtocolFailure`] values for the caller to
//! inspect; nothing in this crate panics on a card that misbehaves.

pub mod authenticator;
pub mod error;
pub mod pass;
pub mod store;
pub mod trailer;
pub mod transceiver;

pub use authenticator::{AuthOutcome, SectorAuthenticator};
pub use error::{ProtocolFailure, Result};
pub use pass::{CardPassCodec, PassError, decode_pass};
pub use store::BlockStore;
pub use trailer::TrailerManager;
pub use transceiver::CardTransceiver;
