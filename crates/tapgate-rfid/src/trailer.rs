//! Sector trailer rotation.

use tapgate_core::{AccessBits, CardUid, KeyMaterial, Sector, SectorTrailer};
use tapgate_hardware::CardReader;
use tracing::info;

use crate::error::Result;
use crate::store::BlockStore;

/// The only writer of sector trailers.
///
/// A trailer write changes who may read and write the whole sector, so it is
/// done in one block write with the sector's current key B and never retried
/// or split.
#[derive(Debug)]
pub struct TrailerManager<'a, R> {
    store: &'a mut BlockStore<R>,
}

impl<'a, R: CardReader> TrailerManager<'a, R> {
    pub fn new(store: &'a mut BlockStore<R>) -> Self {
        Self { store }
    }

    /// Replace the trailer of `sector` with `new_key_a ++ access_bits ++ new_key_b`.
    ///
    /// `old_key_b` is the sector's current key B; the card will not accept
    /// the write otherwise.
    ///
    /// # Errors
    ///
    /// Returns the [`ProtocolFailure`](crate::ProtocolFailure) of the
    /// authentication or the write. The sector keeps its old trailer.
    pub async fn write_trailer(
        &mut self,
        uid: &CardUid,
        sector: Sector,
        old_key_b: &KeyMaterial,
        new_key_a: &KeyMaterial,
        new_key_b: &KeyMaterial,
        access_bits: &AccessBits,
    ) -> Result<SectorTrailer> {
        let trailer = SectorTrailer::compose(new_key_a, access_bits, new_key_b);
        let block = sector.trailer_block();

        self.store
            .write_block(uid, block, old_key_b, trailer.as_block())
            .await?;

        info!(uid = %uid, sector = %sector, block, "Sector trailer rotated");
        Ok(trailer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolFailure;
    use crate::transceiver::CardTransceiver;
    use std::time::Duration;
    use tapgate_core::{KeySlot, constants::BLOCK_SIZE};
    use tapgate_hardware::mock::{MockCardReader, MockCardReaderHandle, SimulatedCard};

    fn uid() -> CardUid {
        CardUid::new(vec![1, 2, 3, 4]).unwrap()
    }

    fn setup() -> (BlockStore<MockCardReader>, MockCardReaderHandle) {
        let (reader, handle) = MockCardReader::new();
        handle.present_card(SimulatedCard::blank(uid()));
        let store = BlockStore::over(CardTransceiver::new(reader, Duration::from_millis(10)));
        (store, handle)
    }

    #[tokio::test]
    async fn test_rotate_blank_sector() {
        let (mut store, handle) = setup();
        let sector = Sector::new(5).unwrap();
        let new_a = KeyMaterial::from_text("ReadKy").unwrap();
        let new_b = KeyMaterial::from_text("WriteK").unwrap();

        let trailer = TrailerManager::new(&mut store)
            .write_trailer(
                &uid(),
                sector,
                &KeyMaterial::factory_default(),
                &new_a,
                &new_b,
                &AccessBits::default(),
            )
            .await
            .unwrap();

        let writes = handle.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].block, 19);
        assert_eq!(writes[0].data.len(), BLOCK_SIZE);
        assert_eq!(&writes[0].data, trailer.as_block());
        assert_eq!(&writes[0].data[..6], b"ReadKy");
        assert_eq!(&writes[0].data[6..10], &[8, 119, 143, 255]);
        assert_eq!(&writes[0].data[10..], b"WriteK");

        let stored = handle.card().unwrap().trailer(sector);
        assert_eq!(stored.key_b(), new_b);
    }

    #[tokio::test]
    async fn test_rotation_needs_current_key_b() {
        let (mut store, handle) = setup();
        let wrong = KeyMaterial::from_text("guess").unwrap();

        let result = TrailerManager::new(&mut store)
            .write_trailer(
                &uid(),
                Sector::new(5).unwrap(),
                &wrong,
                &wrong,
                &wrong,
                &AccessBits::default(),
            )
            .await;

        assert_eq!(
            result.unwrap_err(),
            ProtocolFailure::AuthenticationRejected {
                block: 19,
                slot: KeySlot::B
            }
        );
        assert!(handle.writes().is_empty());
    }

    #[tokio::test]
    async fn test_first_sector_trailer_is_block_3() {
        let (mut store, handle) = setup();
        let factory = KeyMaterial::factory_default();

        TrailerManager::new(&mut store)
            .write_trailer(
                &uid(),
                Sector::new(1).unwrap(),
                &factory,
                &factory,
                &factory,
                &AccessBits::factory(),
            )
            .await
            .unwrap();

        assert_eq!(handle.writes()[0].block, 3);
    }
}
