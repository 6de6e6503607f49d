//! Mock MIFARE Classic reader for testing and development.
//!
//! The reader owns a simulated card that tests place into and remove from the
//! field through a [`MockCardReaderHandle`]. Card memory, sector keys and the
//! access rules are modelled closely enough to exercise the credential
//! protocol end to end:
//!
//! - an authentication is consumed by the next block command
//! - on a factory-blank sector either key may read and write everything
//! - on a provisioned sector key A may only read data blocks while key B may
//!   read and write data blocks and rewrite the trailer
//! - block 0 is never writable

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tapgate_core::constants::{BLOCK_SIZE, CLASSIC_1K_BLOCKS, KEY_SIZE, MANUFACTURER_BLOCK};
use tapgate_core::{
    AccessBits, CardBlock, CardUid, KeyMaterial, KeySlot, Sector, SectorTrailer, is_trailer_block,
};
use tokio::sync::Notify;

use crate::{
    HardwareError, Result,
    traits::{CardReader, DetectedCard},
    types::ReaderInfo,
};

/// In-memory image of a MIFARE Classic 1K card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedCard {
    uid: CardUid,
    blocks: Vec<CardBlock>,
}

impl SimulatedCard {
    /// A factory-blank card: zeroed data, factory keys and access bits.
    pub fn blank(uid: CardUid) -> Self {
        let mut blocks = vec![[0u8; BLOCK_SIZE]; CLASSIC_1K_BLOCKS as usize];

        let manufacturer = &mut blocks[MANUFACTURER_BLOCK as usize];
        let len = uid.as_bytes().len().min(BLOCK_SIZE);
        manufacturer[..len].copy_from_slice(&uid.as_bytes()[..len]);

        let factory = SectorTrailer::compose(
            &KeyMaterial::factory_default(),
            &AccessBits::factory(),
            &KeyMaterial::factory_default(),
        );
        for (index, block) in blocks.iter_mut().enumerate() {
            if is_trailer_block(index as u8) {
                *block = *factory.as_block();
            }
        }

        Self { uid, blocks }
    }

    /// Replace the trailer of `sector`.
    pub fn with_trailer(
        mut self,
        sector: Sector,
        key_a: &KeyMaterial,
        access_bits: &AccessBits,
        key_b: &KeyMaterial,
    ) -> Self {
        let trailer = SectorTrailer::compose(key_a, access_bits, key_b);
        self.blocks[sector.trailer_block() as usize] = *trailer.as_block();
        self
    }

    /// Replace the contents of one block.
    pub fn with_block(mut self, block: u8, data: CardBlock) -> Self {
        if let Some(slot) = self.blocks.get_mut(block as usize) {
            *slot = data;
        }
        self
    }

    pub fn uid(&self) -> &CardUid {
        &self.uid
    }

    /// Raw contents of `block`, or `None` past the end of the card.
    pub fn block(&self, block: u8) -> Option<CardBlock> {
        self.blocks.get(block as usize).copied()
    }

    /// Trailer of `sector` as stored on the card.
    pub fn trailer(&self, sector: Sector) -> SectorTrailer {
        SectorTrailer::from_block(self.blocks[sector.trailer_block() as usize])
    }

    fn sector_of(block: u8) -> Option<Sector> {
        Sector::of_block(block).ok()
    }

    fn is_factory_sector(&self, sector: Sector) -> bool {
        self.trailer(sector).access_bits() == AccessBits::factory()
    }
}

/// One block write that reached the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockWrite {
    pub block: u8,
    pub data: CardBlock,
}

/// One authentication attempt seen by the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthAttempt {
    pub block: u8,
    pub slot: KeySlot,
    pub accepted: bool,
}

#[derive(Debug, Default)]
struct ReaderState {
    card: Option<SimulatedCard>,
    session: Option<(Sector, KeySlot)>,
    offline: bool,
    offline_after_selection: bool,
    read_failures: usize,
    write_failures: usize,
    writes: Vec<BlockWrite>,
    auth_attempts: Vec<AuthAttempt>,
    selections: usize,
}

impl ReaderState {
    fn record_selection(&mut self) {
        self.selections += 1;
        if self.offline_after_selection {
            self.offline_after_selection = false;
            self.offline = true;
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<ReaderState>,
    presented: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ReaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Mock card reader for testing and development.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tapgate_core::CardUid;
/// use tapgate_hardware::mock::{MockCardReader, SimulatedCard};
/// use tapgate_hardware::traits::CardReader;
///
/// #[tokio::main]
/// async fn main() -> tapgate_hardware::Result<()> {
///     let (mut reader, handle) = MockCardReader::new();
///
///     let uid = CardUid::new(vec![0x04, 0xAB, 0xCD, 0xEF]).unwrap();
///     handle.present_card(SimulatedCard::blank(uid));
///
///     let card = reader.read_passive_target(Duration::from_millis(500)).await?;
///     assert_eq!(card.unwrap().uid.to_hex(), "04ABCDEF");
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockCardReader {
    shared: Arc<Shared>,
    name: String,
}

impl MockCardReader {
    /// Create a reader with an empty field.
    ///
    /// Returns the reader and a handle used to present cards and inspect
    /// what the reader did.
    pub fn new() -> (Self, MockCardReaderHandle) {
        Self::with_name("Mock PN532")
    }

    pub fn with_name(name: impl Into<String>) -> (Self, MockCardReaderHandle) {
        let shared = Arc::new(Shared::default());
        let reader = Self {
            shared: Arc::clone(&shared),
            name: name.into(),
        };
        (reader, MockCardReaderHandle { shared })
    }
}

impl CardReader for MockCardReader {
    async fn read_passive_target(&mut self, timeout: Duration) -> Result<Option<DetectedCard>> {
        {
            let mut state = self.shared.lock();
            if state.offline {
                return Err(HardwareError::disconnected(self.name.clone()));
            }
            state.session = None;
            if let Some(card) = &state.card {
                let uid = card.uid.clone();
                state.record_selection();
                return Ok(Some(DetectedCard::new(uid)));
            }
        }

        // A card presented while nobody waits leaves a permit behind, so this
        // cannot miss a presentation that races with the check above.
        if tokio::time::timeout(timeout, self.shared.presented.notified())
            .await
            .is_err()
        {
            return Ok(None);
        }

        let mut state = self.shared.lock();
        let uid = state.card.as_ref().map(|card| card.uid.clone());
        if uid.is_some() {
            state.record_selection();
        }
        Ok(uid.map(DetectedCard::new))
    }

    async fn authenticate_block(
        &mut self,
        uid: &CardUid,
        block: u8,
        slot: KeySlot,
        key: &KeyMaterial,
    ) -> Result<bool> {
        let mut state = self.shared.lock();
        if state.offline {
            return Err(HardwareError::disconnected(self.name.clone()));
        }
        state.session = None;

        let accepted = match (state.card.as_ref(), SimulatedCard::sector_of(block)) {
            (Some(card), Some(sector)) if card.uid == *uid => {
                let trailer = card.trailer(sector);
                let stored = match slot {
                    KeySlot::A => trailer.key_a(),
                    KeySlot::B => trailer.key_b(),
                };
                stored == *key
            }
            _ => false,
        };

        state.auth_attempts.push(AuthAttempt {
            block,
            slot,
            accepted,
        });
        if accepted {
            if let Some(sector) = SimulatedCard::sector_of(block) {
                state.session = Some((sector, slot));
            }
        }
        Ok(accepted)
    }

    async fn read_block(&mut self, block: u8) -> Result<CardBlock> {
        let mut state = self.shared.lock();
        if state.offline {
            return Err(HardwareError::disconnected(self.name.clone()));
        }
        let session = state.session.take();
        if state.read_failures > 0 {
            state.read_failures -= 1;
            return Err(HardwareError::card_read("no response from card"));
        }

        let Some(card) = state.card.as_ref() else {
            return Err(HardwareError::card_read("no card in field"));
        };
        let Some((sector, slot)) = session.filter(|(sector, _)| sector.contains(block)) else {
            return Err(HardwareError::card_read(format!(
                "block {block} read without authentication"
            )));
        };
        let Some(mut data) = card.block(block) else {
            return Err(HardwareError::card_read(format!("block {block} out of range")));
        };

        if is_trailer_block(block) {
            if slot == KeySlot::A && !card.is_factory_sector(sector) {
                return Err(HardwareError::card_read(format!(
                    "trailer {block} not readable with key A"
                )));
            }
            // Key A is never readable back from a trailer.
            data[..KEY_SIZE].fill(0);
        }

        Ok(data)
    }

    async fn write_block(&mut self, block: u8, data: &CardBlock) -> Result<bool> {
        let mut state = self.shared.lock();
        if state.offline {
            return Err(HardwareError::disconnected(self.name.clone()));
        }
        let session = state.session.take();
        if state.write_failures > 0 {
            state.write_failures -= 1;
            return Err(HardwareError::card_write("no response from card"));
        }

        let Some((sector, slot)) = session.filter(|(sector, _)| sector.contains(block)) else {
            return Ok(false);
        };
        if block == MANUFACTURER_BLOCK {
            return Ok(false);
        }

        let Some(card) = state.card.as_mut() else {
            return Ok(false);
        };
        let allowed = card.is_factory_sector(sector) || slot == KeySlot::B;
        if !allowed {
            return Ok(false);
        }

        card.blocks[block as usize] = *data;
        state.writes.push(BlockWrite {
            block,
            data: *data,
        });
        Ok(true)
    }

    async fn get_reader_info(&self) -> Result<ReaderInfo> {
        if self.shared.lock().offline {
            return Err(HardwareError::disconnected(self.name.clone()));
        }
        Ok(ReaderInfo::new(self.name.clone(), vec!["ISO14443A".to_string()]).with_firmware(1, 6))
    }
}

/// Handle for controlling a [`MockCardReader`] from test code.
#[derive(Debug, Clone)]
pub struct MockCardReaderHandle {
    shared: Arc<Shared>,
}

impl MockCardReaderHandle {
    /// Place `card` in the field, replacing any card already there.
    pub fn present_card(&self, card: SimulatedCard) {
        self.shared.lock().card = Some(card);
        self.shared.presented.notify_one();
    }

    /// Take the card out of the field and return its final memory image.
    pub fn remove_card(&self) -> Option<SimulatedCard> {
        let mut state = self.shared.lock();
        state.session = None;
        state.card.take()
    }

    /// Snapshot of the card currently in the field.
    pub fn card(&self) -> Option<SimulatedCard> {
        self.shared.lock().card.clone()
    }

    /// Simulate the reader dropping off the bus.
    pub fn set_offline(&self, offline: bool) {
        self.shared.lock().offline = offline;
    }

    /// Let the next selection succeed, then drop off the bus.
    pub fn go_offline_after_next_selection(&self) {
        self.shared.lock().offline_after_selection = true;
    }

    /// Make the next block read fail with a card error.
    pub fn fail_next_read(&self) {
        self.shared.lock().read_failures += 1;
    }

    /// Make the next block write fail with a card error.
    pub fn fail_next_write(&self) {
        self.shared.lock().write_failures += 1;
    }

    /// Every block write that reached the card, in order.
    pub fn writes(&self) -> Vec<BlockWrite> {
        self.shared.lock().writes.clone()
    }

    /// Every authentication attempt, in order.
    pub fn auth_attempts(&self) -> Vec<AuthAttempt> {
        self.shared.lock().auth_attempts.clone()
    }

    /// Number of successful target selections.
    pub fn selections(&self) -> usize {
        self.shared.lock().selections
    }
}

/// Data blocks of `sector` that may hold application data.
pub fn sector_data_blocks(sector: Sector) -> impl Iterator<Item = u8> {
    (sector.first_block()..sector.trailer_block()).filter(|b| *b != MANUFACTURER_BLOCK)
}
