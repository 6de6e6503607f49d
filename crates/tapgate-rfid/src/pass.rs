//! Card pass storage.
//!
//! The pass is text zero-padded into one data block. Decoding goes through
//! the hex form (see [`tapgate_core::codec`]), so a block that decodes to
//! nothing or to non-text is reported as "no pass" rather than as a fault.

use tapgate_core::{CardPass, CardUid, KeyMaterial, KeySlot, PassBlock, codec};
use tapgate_hardware::CardReader;
use tracing::{debug, warn};

use crate::error::ProtocolFailure;
use crate::store::BlockStore;

/// Why no usable pass came off the card.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PassError {
    /// The block could not be read or written.
    #[error(transparent)]
    Protocol(#[from] ProtocolFailure),

    /// The block holds only fill bytes.
    #[error("No pass stored on card")]
    Empty,

    /// The block holds something that is not a valid pass.
    #[error("Malformed pass block: {0}")]
    Malformed(String),
}

impl PassError {
    /// Whether this is a data problem ("no pass found") as opposed to a
    /// protocol failure.
    pub fn is_no_pass(&self) -> bool {
        matches!(self, Self::Empty | Self::Malformed(_))
    }
}

/// Reads and writes the card pass through a [`BlockStore`].
#[derive(Debug)]
pub struct CardPassCodec<'a, R> {
    store: &'a mut BlockStore<R>,
}

impl<'a, R: CardReader> CardPassCodec<'a, R> {
    pub fn new(store: &'a mut BlockStore<R>) -> Self {
        Self { store }
    }

    /// Read the pass with key A.
    ///
    /// # Errors
    ///
    /// See [`PassError`].
    pub async fn read_pass(
        &mut self,
        uid: &CardUid,
        block: PassBlock,
        key_a: &KeyMaterial,
    ) -> Result<CardPass, PassError> {
        self.read_pass_with(uid, block, KeySlot::A, key_a).await
    }

    /// Read the pass authenticating with an arbitrary slot.
    ///
    /// # Errors
    ///
    /// See [`PassError`].
    pub async fn read_pass_with(
        &mut self,
        uid: &CardUid,
        block: PassBlock,
        slot: KeySlot,
        key: &KeyMaterial,
    ) -> Result<CardPass, PassError> {
        let raw = self
            .store
            .read_block_with(uid, block.index(), slot, key)
            .await?;
        decode_pass(&raw)
    }

    /// Store `pass` with key B.
    ///
    /// # Errors
    ///
    /// Returns [`PassError::Protocol`] if the write fails.
    pub async fn write_pass(
        &mut self,
        uid: &CardUid,
        block: PassBlock,
        key_b: &KeyMaterial,
        pass: &CardPass,
    ) -> Result<(), PassError> {
        self.store
            .write_block(uid, block.index(), key_b, &pass.to_block())
            .await?;
        debug!(uid = %uid, block = block.index(), "Card pass written");
        Ok(())
    }
}

/// Decode a raw pass block.
///
/// # Errors
///
/// [`PassError::Empty`] for an all-fill block, [`PassError::Malformed`] for
/// anything that is not a valid pass.
pub fn decode_pass(raw: &[u8]) -> Result<CardPass, PassError> {
    let text = codec::hex_to_text(&codec::bytes_to_hex(raw)).map_err(|e| {
        warn!(error = %e, "Pass block is not text");
        PassError::Malformed(e.to_string())
    })?;
    if text.is_empty() {
        return Err(PassError::Empty);
    }
    CardPass::new(text).map_err(|e| {
        warn!(error = %e, "Pass block holds an invalid pass");
        PassError::Malformed(e.to_string())
    })
}
