//! Card-format and timing constants for the tapgate access endpoint.
//!
//! The card-format constants describe MIFARE Classic memory as the scanner
//! sees it: 16-byte blocks grouped into 4-block sectors, where the last block
//! of each sector is the trailer holding `KeyA ++ AccessBits ++ KeyB`.
//!
//! ```text
//! sector 1: block 0 (manufacturer) | block 1 | block 2 | block 3 (trailer)
//! sector 2: block 4                | block 5 | block 6 | block 7 (trailer)
//! ...
//! ```
//!
//! # Usage
//!
//! ```
//! use tapgate_core::constants::*;
//!
//! assert_eq!(KEY_SIZE + ACCESS_BITS_SIZE + KEY_SIZE, BLOCK_SIZE);
//! assert_eq!(BLOCKS_PER_SECTOR, 4);
//! ```

// ============================================================================
// Card Memory Layout
// ============================================================================

/// Size of one card memory block in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Size of one sector key (key A or key B) in bytes.
pub const KEY_SIZE: usize = 6;

/// Size of the access-bits field of a sector trailer in bytes.
pub const ACCESS_BITS_SIZE: usize = 4;

/// Number of blocks in one sector (the last one is the trailer).
pub const BLOCKS_PER_SECTOR: u8 = 4;

/// Total number of blocks on a MIFARE Classic 1K card.
pub const CLASSIC_1K_BLOCKS: u8 = 64;

/// Block 0 holds the manufacturer data and is never writable.
pub const MANUFACTURER_BLOCK: u8 = 0;

/// Maximum encoded length of a card pass in bytes (one block).
pub const MAX_PASS_LENGTH: usize = BLOCK_SIZE;

/// Fill byte used to pad pass text up to a full block.
pub const FILL_BYTE: u8 = 0x00;

// ============================================================================
// Card UID
// ============================================================================

/// Minimum UID length in bytes (ISO 14443 single-size UID).
pub const MIN_UID_LENGTH: usize = 4;

/// Maximum UID length in bytes (ISO 14443 triple-size UID).
pub const MAX_UID_LENGTH: usize = 10;

// ============================================================================
// Key Material Defaults
// ============================================================================

/// Factory default key shipped on blank cards (`FF FF FF FF FF FF`).
pub const FACTORY_KEY: [u8; KEY_SIZE] = [0xFF; KEY_SIZE];

/// Factory default access bits of a blank card (`FF 07 80 69`).
pub const FACTORY_ACCESS_BITS: [u8; ACCESS_BITS_SIZE] = [0xFF, 0x07, 0x80, 0x69];

/// Access bits written by the provisioning station unless overridden.
///
/// Key A may read data blocks, key B may read and write data blocks and
/// rewrite the trailer.
pub const DEFAULT_ACCESS_BITS: [u8; ACCESS_BITS_SIZE] = [8, 119, 143, 255];

/// Block that carries the card pass unless configured otherwise.
pub const DEFAULT_PASS_BLOCK: u8 = 16;

// ============================================================================
// Timing
// ============================================================================

/// Default time to wait for a verdict after publishing a check request (ms).
pub const DEFAULT_VERDICT_TIMEOUT_MS: u64 = 5_000;

/// Default interval between message pump iterations (ms).
///
/// Must stay below [`MAX_PUMP_INTERVAL_MS`] so verdict latency stays low.
pub const DEFAULT_PUMP_INTERVAL_MS: u64 = 10;

/// Upper bound (exclusive) for the message pump interval (ms).
pub const MAX_PUMP_INTERVAL_MS: u64 = 100;

/// Default per-attempt passive target timeout while polling for a card (ms).
pub const DEFAULT_CARD_POLL_TIMEOUT_MS: u64 = 500;

/// Default pause after a verdict has been acted on (ms).
pub const DEFAULT_POST_VERDICT_DELAY_MS: u64 = 2_000;

/// Number of passive-target attempts used to reselect a card before an
/// authentication command.
pub const DEFAULT_RESELECT_ATTEMPTS: u32 = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailer_layout_fills_one_block() {
        assert_eq!(KEY_SIZE * 2 + ACCESS_BITS_SIZE, BLOCK_SIZE);
    }

    #[test]
    fn test_default_pass_block_is_data_block() {
        assert_ne!(DEFAULT_PASS_BLOCK, MANUFACTURER_BLOCK);
        assert_ne!(DEFAULT_PASS_BLOCK % BLOCKS_PER_SECTOR, BLOCKS_PER_SECTOR - 1);
    }

    #[test]
    fn test_pump_interval_default_within_bound() {
        assert!(DEFAULT_PUMP_INTERVAL_MS < MAX_PUMP_INTERVAL_MS);
    }
}
