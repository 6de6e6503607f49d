//! Pure byte conversions used by the card-pass pipeline.
//!
//! The card pass travels through three representations:
//!
//! ```text
//! text  ──pad──►  16-byte block  ──hex──►  "6162630000..."  ──decode──►  text
//! ```
//!
//! Every byte is encoded as exactly two lowercase hex digits. Decoding is
//! lenient about one thing: a hex string of odd length is completed with a
//! trailing `0` nibble instead of being rejected, because a truncated read
//! still carries a usable prefix. This masks the loss of the final nibble;
//! callers that need to detect truncation must check the length themselves.

use crate::{
    Result,
    constants::{BLOCK_SIZE, FILL_BYTE},
    error::Error,
    types::CardBlock,
};

/// Copy `bytes` into an `N`-byte array, padding the tail with fill bytes.
///
/// # Errors
/// Returns `Error::InvalidBlockLength` if `bytes` is longer than `N`.
pub fn pad_to<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    if bytes.len() > N {
        return Err(Error::InvalidBlockLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut out = [FILL_BYTE; N];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

/// Encode text into a zero-padded 16-byte block.
///
/// ```
/// use tapgate_core::codec::text_to_block;
///
/// let block = text_to_block("abc").unwrap();
/// assert_eq!(&block[..4], b"abc\0");
/// assert!(text_to_block("seventeen bytes!!").is_err());
/// ```
///
/// # Errors
/// Returns `Error::PassTooLong` if the text is longer than one block.
pub fn text_to_block(text: &str) -> Result<CardBlock> {
    pad_to::<BLOCK_SIZE>(text.as_bytes()).map_err(|_| Error::PassTooLong {
        max: BLOCK_SIZE,
        actual: text.len(),
    })
}

/// Encode bytes as lowercase hex digit pairs.
#[must_use]
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a hex string into bytes.
///
/// An odd-length input is padded with a single trailing `0` nibble.
///
/// ```
/// use tapgate_core::codec::hex_to_bytes;
///
/// assert_eq!(hex_to_bytes("6162").unwrap(), b"ab");
/// assert_eq!(hex_to_bytes("616").unwrap(), vec![0x61, 0x60]);
/// assert!(hex_to_bytes("zz").is_err());
/// ```
///
/// # Errors
/// Returns `Error::InvalidHex` if the input contains non-hex characters.
pub fn hex_to_bytes(hex_text: &str) -> Result<Vec<u8>> {
    let decoded = if hex_text.len() % 2 == 1 {
        hex::decode(format!("{hex_text}0"))
    } else {
        hex::decode(hex_text)
    };
    decoded.map_err(|e| Error::InvalidHex(e.to_string()))
}

/// Strip trailing fill bytes.
#[must_use]
pub fn strip_fill(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| *b != FILL_BYTE)
        .map_or(0, |i| i + 1);
    &bytes[..end]
}

/// Decode a hex string back to text, dropping trailing fill bytes.
///
/// # Errors
/// Returns `Error::InvalidHex` for malformed hex and `Error::InvalidData`
/// if the bytes are not UTF-8 text.
pub fn hex_to_text(hex_text: &str) -> Result<String> {
    let bytes = hex_to_bytes(hex_text)?;
    String::from_utf8(strip_fill(&bytes).to_vec())
        .map_err(|e| Error::InvalidData(format!("block is not text: {e}")))
}

/// Decode a raw block to text via its hex form.
///
/// # Errors
/// Same as [`hex_to_text`].
pub fn block_to_text(block: &[u8]) -> Result<String> {
    hex_to_text(&bytes_to_hex(block))
}

/// Parse comma-separated decimal byte values such as `"8,119,143,255"`.
///
/// # Errors
/// Returns `Error::InvalidData` if any entry is not an integer 0-255.
pub fn parse_decimal_list(list: &str) -> Result<Vec<u8>> {
    list.split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<u8>()
                .map_err(|_| Error::InvalidData(format!("'{part}' is not a byte value (0-255)")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn test_text_to_block_pads_with_zeros() {
        let block = text_to_block("DevKey").unwrap();
        assert_eq!(&block[..6], b"DevKey");
        assert_eq!(&block[6..], &[0u8; 10]);
    }

    #[test]
    fn test_text_to_block_exact_length() {
        let block = text_to_block("0123456789abcdef").unwrap();
        assert_eq!(&block, b"0123456789abcdef");
    }

    #[test]
    fn test_text_to_block_too_long() {
        assert_eq!(
            text_to_block("0123456789abcdefX"),
            Err(Error::PassTooLong {
                max: 16,
                actual: 17
            })
        );
    }

    #[test]
    fn test_hex_is_two_digits_per_byte() {
        assert_eq!(bytes_to_hex(&[0x00, 0x05, 0xAB]), "0005ab");
    }

    #[rstest]
    #[case("", vec![])]
    #[case("61", vec![0x61])]
    #[case("6", vec![0x60])]
    #[case("616", vec![0x61, 0x60])]
    #[case("ABcd", vec![0xAB, 0xCD])]
    fn test_hex_to_bytes(#[case] input: &str, #[case] expected: Vec<u8>) {
        assert_eq!(hex_to_bytes(input).unwrap(), expected);
    }

    #[test]
    fn test_hex_to_bytes_rejects_non_hex() {
        assert!(matches!(hex_to_bytes("6g"), Err(Error::InvalidHex(_))));
    }

    #[test]
    fn test_odd_length_pad_masks_truncation() {
        // "ab" truncated by one nibble decodes to "a`" rather than failing.
        assert_eq!(hex_to_text("616").unwrap(), "a`");
    }

    #[test]
    fn test_all_zero_block_decodes_to_empty() {
        assert_eq!(block_to_text(&[0u8; 16]).unwrap(), "");
    }

    #[test]
    fn test_non_text_block_is_data_error() {
        let mut block = [0u8; 16];
        block[0] = 0xFF;
        block[1] = 0xFE;
        assert!(matches!(block_to_text(&block), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_strip_fill_only_trailing() {
        assert_eq!(strip_fill(b"a\0b\0\0"), b"a\0b");
        assert_eq!(strip_fill(b"\0\0"), b"");
    }

    #[test]
    fn test_parse_decimal_list() {
        assert_eq!(parse_decimal_list("8,119, 143,255").unwrap(), vec![8, 119, 143, 255]);
        assert!(parse_decimal_list("8,,1").is_err());
        assert!(parse_decimal_list("300").is_err());
    }

    proptest! {
        #[test]
        fn prop_text_roundtrips_through_block(text in "[\\x01-\\x7F]{0,16}") {
            let block = text_to_block(&text).unwrap();
            prop_assert_eq!(block_to_text(&block).unwrap(), text);
        }

        #[test]
        fn prop_hex_roundtrips_block(block in proptest::array::uniform16(any::<u8>())) {
            prop_assert_eq!(hex_to_bytes(&bytes_to_hex(&block)).unwrap(), block.to_vec());
        }
    }
}
