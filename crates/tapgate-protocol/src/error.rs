/// Result type alias for payload encoding and decoding.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Payload errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A payload could not be serialized.
    #[error("Cannot encode payload: {0}")]
    Encode(String),

    /// A payload is not in any accepted shape.
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// A verdict carries an action code outside 0-2.
    #[error("Unknown action code: {0}")]
    UnknownAction(i64),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(error: serde_json::Error) -> Self {
        Self::Malformed(error.to_string())
    }
}
