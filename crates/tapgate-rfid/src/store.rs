//! Authenticated block reads and writes.

use tapgate_core::{CardBlock, CardUid, KeyMaterial, KeySlot};
use tapgate_hardware::CardReader;
use tracing::{debug, warn};

use crate::authenticator::SectorAuthenticator;
use crate::error::{ProtocolFailure, Result};
use crate::transceiver::CardTransceiver;

/// Reads and writes single 16-byte blocks, authenticating before each one.
///
/// By convention reads use key A and writes use key B; the `*_with` variants
/// exist for the admin paths that read with key B.
#[derive(Debug)]
pub struct BlockStore<R> {
    authenticator: SectorAuthenticator<R>,
}

impl<R: CardReader> BlockStore<R> {
    pub fn new(authenticator: SectorAuthenticator<R>) -> Self {
        Self { authenticator }
    }

    /// Build the full stack over a transceiver.
    pub fn over(transceiver: CardTransceiver<R>) -> Self {
        Self::new(SectorAuthenticator::new(transceiver))
    }

    /// Read `block` after authenticating with key A.
    ///
    /// # Errors
    ///
    /// Returns a tagged [`ProtocolFailure`]; an authentication failure is
    /// distinct from a read that failed after authentication.
    pub async fn read_block(
        &mut self,
        uid: &CardUid,
        block: u8,
        key_a: &KeyMaterial,
    ) -> Result<CardBlock> {
        self.read_block_with(uid, block, KeySlot::A, key_a).await
    }

    /// Read `block` after authenticating with `key` in `slot`.
    ///
    /// # Errors
    ///
    /// Same as [`read_block`](Self::read_block).
    pub async fn read_block_with(
        &mut self,
        uid: &CardUid,
        block: u8,
        slot: KeySlot,
        key: &KeyMaterial,
    ) -> Result<CardBlock> {
        self.authenticator
            .authenticate(uid, block, key, slot)
            .await
            .into_result(block, slot)?;

        let data = self
            .reader()
            .read_block(block)
            .await
            .map_err(|e| ProtocolFailure::from_read(block, e))?;
        debug!(block, slot = %slot, "Block read");
        Ok(data)
    }

    /// Write `data` to `block` after authenticating with key B.
    ///
    /// # Errors
    ///
    /// Returns a tagged [`ProtocolFailure`]. Nothing is written unless the
    /// authentication succeeded.
    pub async fn write_block(
        &mut self,
        uid: &CardUid,
        block: u8,
        key_b: &KeyMaterial,
        data: &CardBlock,
    ) -> Result<()> {
        self.authenticator
            .authenticate(uid, block, key_b, KeySlot::B)
            .await
            .into_result(block, KeySlot::B)?;

        match self.reader().write_block(block, data).await {
            Ok(true) => {
                debug!(block, "Block written");
                Ok(())
            }
            Ok(false) => {
                warn!(block, "Card refused block write");
                Err(ProtocolFailure::WriteRejected { block })
            }
            Err(e) => Err(ProtocolFailure::from_write(block, e)),
        }
    }

    pub fn transceiver_mut(&mut self) -> &mut CardTransceiver<R> {
        self.authenticator.transceiver_mut()
    }

    fn reader(&mut self) -> &mut R {
        self.authenticator.transceiver_mut().reader_mut()
    }
}
