//! Tagged failures of the card protocol.
//!
//! A rejected key or a card that left the field is part of normal operation,
//! so none of these are panics and none are logged as errors by the layer
//! that produces them. The session loop inspects the variant and decides
//! what feedback to give.

use tapgate_core::KeySlot;
use tapgate_hardware::HardwareError;

/// Result type alias for card protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolFailure>;

/// Why a card operation did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolFailure {
    /// The card refused the key for this block.
    #[error("Authentication rejected for block {block} with key {slot}")]
    AuthenticationRejected { block: u8, slot: KeySlot },

    /// No card answered the re-selection before authentication.
    #[error("No card in the reader field")]
    CardAbsent,

    /// A different card answered the re-selection.
    #[error("Card in the field changed during the operation")]
    CardChanged,

    /// The reader itself could not be reached.
    #[error("Reader unavailable: {message}")]
    ReaderUnavailable { message: String },

    /// Authentication succeeded but the block read did not.
    #[error("Read of block {block} failed: {message}")]
    ReadFailed { block: u8, message: String },

    /// Authentication succeeded but the block write did not reach the card.
    #[error("Write of block {block} failed: {message}")]
    WriteFailed { block: u8, message: String },

    /// The card acknowledged the frame but refused the write.
    #[error("Card refused write to block {block}")]
    WriteRejected { block: u8 },
}

impl ProtocolFailure {
    /// Whether the failure points at the reader rather than the card.
    pub fn is_reader_fault(&self) -> bool {
        matches!(self, Self::ReaderUnavailable { .. })
    }

    pub(crate) fn from_read(block: u8, error: HardwareError) -> Self {
        if error.is_device_fault() {
            Self::ReaderUnavailable {
                message: error.to_string(),
            }
        } else {
            Self::ReadFailed {
                block,
                message: error.to_string(),
            }
        }
    }

    pub(crate) fn from_write(block: u8, error: HardwareError) -> Self {
        if error.is_device_fault() {
            Self::ReaderUnavailable {
                message: error.to_string(),
            }
        } else {
            Self::WriteFailed {
                block,
                message: error.to_string(),
            }
        }
    }
}

impl From<HardwareError> for ProtocolFailure {
    fn from(error: HardwareError) -> Self {
        Self::ReaderUnavailable {
            message: error.to_string(),
        }
    }
}
