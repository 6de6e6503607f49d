//! Error types for hardware operations.
//!
//! These cover failures of the device itself (unreachable reader, bus
//! errors, rejected frames). A card that is absent or a key that does not
//! match is not a hardware error; the traits report those as ordinary
//! return values.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Reader, display and actuator failures.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The reader (or another peripheral) stopped answering on its bus.
    #[error("{device} is offline")]
    Offline { device: String },

    #[error("No answer within {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Framing or checksum trouble between host and peripheral.
    #[error("Bus error: {message}")]
    Bus { message: String },

    /// A peripheral was handed (or returned) data it cannot represent.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// The card did not answer a block read.
    #[error("Card read failed: {message}")]
    CardRead { message: String },

    /// The card did not acknowledge a block write.
    #[error("Card write failed: {message}")]
    CardWrite { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Offline {
            device: device.into(),
        }
    }

    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    pub fn communication(message: impl Into<String>) -> Self {
        Self::Bus {
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn card_read(message: impl Into<String>) -> Self {
        Self::CardRead {
            message: message.into(),
        }
    }

    pub fn card_write(message: impl Into<String>) -> Self {
        Self::CardWrite {
            message: message.into(),
        }
    }

    /// Whether the reader itself is gone, as opposed to one failed card
    /// exchange. Card-level failures clear once the card is re-presented.
    pub fn is_device_fault(&self) -> bool {
        matches!(self, Self::Offline { .. } | Self::Bus { .. } | Self::Io(_))
    }
}

impl From<tapgate_core::Error> for HardwareError {
    fn from(error: tapgate_core::Error) -> Self {
        Self::invalid_data(error.to_string())
    }
}
