use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Card format errors
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid access bits length: expected {expected} bytes, got {actual}")]
    InvalidAccessBitsLength { expected: usize, actual: usize },

    #[error("Invalid trailer length: expected {expected} bytes, got {actual}")]
    InvalidTrailerLength { expected: usize, actual: usize },

    #[error("Invalid block length: expected {expected} bytes, got {actual}")]
    InvalidBlockLength { expected: usize, actual: usize },

    #[error("Invalid card UID: {0}")]
    InvalidUid(String),

    #[error("Invalid sector: {0}")]
    InvalidSector(String),

    #[error("Block {block} is reserved: {reason}")]
    ReservedBlock { block: u8, reason: String },

    // Card pass errors
    #[error("Card pass is {actual} bytes, maximum is {max}")]
    PassTooLong { max: usize, actual: usize },

    #[error("Card pass contains a fill (NUL) byte")]
    PassContainsFill,

    #[error("Card pass is empty")]
    EmptyPass,

    // Data errors
    #[error("Invalid hex data: {0}")]
    InvalidHex(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    // State errors
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration key: {0}")]
    MissingConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
