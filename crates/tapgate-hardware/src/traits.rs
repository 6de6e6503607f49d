//! Hardware device trait definitions.
//!
//! These traits are the boundary between the credential protocol and the
//! physical peripherals of a tapgate endpoint: the contactless card reader,
//! the character display, the buzzer, and on the door side the lock actuator
//! and the door contact.
//!
//! All traits use native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT),
//! eliminating the need for the `async_trait` macro.

#![allow(async_fn_in_trait)]

use std::time::Duration;

use tapgate_core::{CardBlock, CardUid, KeyMaterial, KeySlot};

use crate::error::Result;
use crate::types::{ReaderInfo, Tone};

/// A card detected in the reader field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedCard {
    /// Card unique identifier.
    pub uid: CardUid,

    /// When the card was selected.
    pub detected_at: chrono::DateTime<chrono::Utc>,
}

impl DetectedCard {
    /// Create a detection record stamped with the current time.
    pub fn new(uid: CardUid) -> Self {
        Self {
            uid,
            detected_at: chrono::Utc::now(),
        }
    }
}

/// Contactless card reader speaking the MIFARE Classic command set.
///
/// The reader drops any sector authentication after a block command or a
/// new target selection, so every block operation must be preceded by its
/// own `authenticate_block` call.
///
/// # Object Safety
///
/// **NOTE**: This trait is NOT object-safe because `async fn` methods return
/// `impl Future`. Use generic type parameters:
///
/// ```no_run
/// use std::time::Duration;
/// use tapgate_hardware::traits::CardReader;
/// use tapgate_hardware::error::Result;
///
/// async fn wait_for_uid<R: CardReader>(reader: &mut R) -> Result<String> {
///     loop {
///         if let Some(card) = reader.read_passive_target(Duration::from_millis(500)).await? {
///             return Ok(card.uid.to_dotted());
///         }
///     }
/// }
/// ```
pub trait CardReader: Send + Sync {
    /// Wait up to `timeout` for a card to enter the field and select it.
    ///
    /// Returns `Ok(None)` when no card showed up in time.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader cannot be reached.
    async fn read_passive_target(&mut self, timeout: Duration) -> Result<Option<DetectedCard>>;

    /// Authenticate `block`'s sector with `key` in `slot`.
    ///
    /// Returns `Ok(false)` for a wrong key or a card that left the field.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader cannot be reached.
    async fn authenticate_block(
        &mut self,
        uid: &CardUid,
        block: u8,
        slot: KeySlot,
        key: &KeyMaterial,
    ) -> Result<bool>;

    /// Read one 16-byte block from the authenticated sector.
    ///
    /// # Errors
    ///
    /// Returns an error if the card does not answer or the frame is invalid.
    async fn read_block(&mut self, block: u8) -> Result<CardBlock>;

    /// Write one 16-byte block to the authenticated sector.
    ///
    /// Returns `Ok(false)` if the card refused the write.
    ///
    /// # Errors
    ///
    /// Returns an error if the card does not answer or the frame is invalid.
    async fn write_block(&mut self, block: u8, data: &CardBlock) -> Result<bool>;

    /// Get reader information.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader cannot be reached.
    async fn get_reader_info(&self) -> Result<ReaderInfo>;
}

/// Two-line character display.
pub trait DisplaySink: Send + Sync {
    /// Replace the display contents with two lines of text.
    ///
    /// # Errors
    ///
    /// Returns an error if the display cannot be driven.
    async fn show(&mut self, line1: &str, line2: &str) -> Result<()>;

    /// Blank the display.
    ///
    /// # Errors
    ///
    /// Returns an error if the display cannot be driven.
    async fn clear(&mut self) -> Result<()>;
}

/// Piezo buzzer for audible feedback.
pub trait Buzzer: Send + Sync {
    /// Play `tone` to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the PWM output cannot be driven.
    async fn play(&mut self, tone: Tone) -> Result<()>;
}

/// Solenoid or motor lock plus its indicator lamp.
pub trait LockActuator: Send + Sync {
    /// Release (`true`) or engage (`false`) the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be driven.
    async fn set_released(&mut self, released: bool) -> Result<()>;
}

/// Door contact (reed) sensor.
pub trait DoorSensor: Send + Sync {
    /// Returns `true` while the door stands open.
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be read.
    async fn is_open(&self) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detected_card_new() {
        let uid = CardUid::new(vec![1, 2, 3, 4]).unwrap();
        let before = chrono::Utc::now();
        let card = DetectedCard::new(uid.clone());

        assert_eq!(card.uid, uid);
        assert!(card.detected_at >= before);
    }
}
