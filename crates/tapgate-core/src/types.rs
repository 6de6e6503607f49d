use crate::{
    Result,
    codec,
    constants::{
        ACCESS_BITS_SIZE, BLOCK_SIZE, BLOCKS_PER_SECTOR, CLASSIC_1K_BLOCKS, DEFAULT_ACCESS_BITS,
        FACTORY_ACCESS_BITS, FACTORY_KEY, FILL_BYTE, KEY_SIZE, MANUFACTURER_BLOCK, MAX_PASS_LENGTH,
        MAX_UID_LENGTH, MIN_UID_LENGTH,
    },
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// One 16-byte unit of card memory.
pub type CardBlock = [u8; BLOCK_SIZE];

/// Key slot used when authenticating a sector.
///
/// Read keys and write keys are independent: the scanner reads with key A,
/// provisioning writes with key B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeySlot {
    A,
    B,
}

impl KeySlot {
    /// MIFARE Classic authentication command byte for this slot.
    #[must_use]
    pub fn auth_command(&self) -> u8 {
        match self {
            KeySlot::A => 0x60,
            KeySlot::B => 0x61,
        }
    }
}

impl fmt::Display for KeySlot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KeySlot::A => write!(f, "A"),
            KeySlot::B => write!(f, "B"),
        }
    }
}

/// Card unique identifier (4-10 bytes).
///
/// Only meaningful while the card stays in the reader field; it is read
/// fresh on every session cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardUid(Vec<u8>);

impl CardUid {
    /// Create a UID with length validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidUid` if the length is outside 4-10 bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        let len = bytes.len();
        if !(MIN_UID_LENGTH..=MAX_UID_LENGTH).contains(&len) {
            return Err(Error::InvalidUid(format!(
                "UID must be {MIN_UID_LENGTH}-{MAX_UID_LENGTH} bytes, got {len}"
            )));
        }
        Ok(CardUid(bytes))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decimal bytes joined with `.`, the form sent in check requests.
    ///
    /// ```
    /// use tapgate_core::CardUid;
    ///
    /// let uid = CardUid::new(vec![1, 2, 3, 4]).unwrap();
    /// assert_eq!(uid.to_dotted(), "1.2.3.4");
    /// ```
    #[must_use]
    pub fn to_dotted(&self) -> String {
        self.join_decimal(".")
    }

    /// Decimal bytes joined with `,`, the form shown to operators.
    #[must_use]
    pub fn to_comma_list(&self) -> String {
        self.join_decimal(",")
    }

    /// Uppercase hex without separators.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.0)
    }

    fn join_decimal(&self, separator: &str) -> String {
        self.0
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(separator)
    }
}

impl fmt::Display for CardUid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}]", self.to_comma_list())
    }
}

/// Six bytes of sector key material (key A or key B).
///
/// # Security
/// `Debug` never prints the key bytes and equality is constant-time.
#[derive(Clone, Copy, Eq)]
pub struct KeyMaterial([u8; KEY_SIZE]);

impl KeyMaterial {
    #[must_use]
    pub const fn new(bytes: [u8; KEY_SIZE]) -> Self {
        KeyMaterial(bytes)
    }

    /// The factory default key of blank cards.
    #[must_use]
    pub const fn factory_default() -> Self {
        KeyMaterial(FACTORY_KEY)
    }

    /// Create a key from exactly six bytes.
    ///
    /// # Errors
    /// Returns `Error::InvalidKeyLength` for any other length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| Error::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(KeyMaterial(array))
    }

    /// Create a key from text, zero-padded to six bytes.
    ///
    /// ```
    /// use tapgate_core::KeyMaterial;
    ///
    /// let key = KeyMaterial::from_text("DevKey").unwrap();
    /// assert_eq!(key.as_bytes(), b"DevKey");
    ///
    /// let short = KeyMaterial::from_text("abc").unwrap();
    /// assert_eq!(short.as_bytes(), &[b'a', b'b', b'c', 0, 0, 0]);
    ///
    /// assert!(KeyMaterial::from_text("toolongkey").is_err());
    /// ```
    ///
    /// # Errors
    /// Returns `Error::InvalidKeyLength` if the text is longer than six bytes.
    pub fn from_text(text: &str) -> Result<Self> {
        let bytes = codec::pad_to::<KEY_SIZE>(text.as_bytes()).map_err(|_| {
            Error::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: text.len(),
            }
        })?;
        Ok(KeyMaterial(bytes))
    }

    /// Create a key from six comma-separated decimal bytes (`"255,255,..."`).
    ///
    /// # Errors
    /// Returns an error if a value is not 0-255 or the count is not six.
    pub fn from_decimal_list(list: &str) -> Result<Self> {
        Self::from_slice(&codec::parse_decimal_list(list)?)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl PartialEq for KeyMaterial {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial(******)")
    }
}

/// Four bytes of per-sector access policy.
///
/// Opaque to tapgate: copied verbatim into the sector trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessBits([u8; ACCESS_BITS_SIZE]);

impl AccessBits {
    #[must_use]
    pub const fn new(bytes: [u8; ACCESS_BITS_SIZE]) -> Self {
        AccessBits(bytes)
    }

    /// Access bits of a factory blank card.
    #[must_use]
    pub const fn factory() -> Self {
        AccessBits(FACTORY_ACCESS_BITS)
    }

    /// # Errors
    /// Returns `Error::InvalidAccessBitsLength` unless exactly four bytes are given.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; ACCESS_BITS_SIZE] =
            bytes
                .try_into()
                .map_err(|_| Error::InvalidAccessBitsLength {
                    expected: ACCESS_BITS_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(AccessBits(array))
    }

    /// Parse four comma-separated decimal bytes, e.g. `"8,119,143,255"`.
    ///
    /// # Errors
    /// Returns an error if a value is not 0-255 or the count is not four.
    pub fn from_decimal_list(list: &str) -> Result<Self> {
        Self::from_slice(&codec::parse_decimal_list(list)?)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ACCESS_BITS_SIZE] {
        &self.0
    }
}

impl Default for AccessBits {
    fn default() -> Self {
        AccessBits(DEFAULT_ACCESS_BITS)
    }
}

/// Returns `true` if `block` is the trailer of its sector (index ≡ 3 mod 4).
#[must_use]
pub fn is_trailer_block(block: u8) -> bool {
    block % BLOCKS_PER_SECTOR == BLOCKS_PER_SECTOR - 1
}

/// A 1-based sector number.
///
/// Sector 1 occupies blocks 0-3 and its trailer is block 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sector(u8);

impl Sector {
    /// Number of sectors on a MIFARE Classic 1K card.
    pub const COUNT: u8 = CLASSIC_1K_BLOCKS / BLOCKS_PER_SECTOR;

    /// # Errors
    /// Returns `Error::InvalidSector` if `number` is 0 or past the last sector.
    pub fn new(number: u8) -> Result<Self> {
        if !(1..=Self::COUNT).contains(&number) {
            return Err(Error::InvalidSector(format!(
                "Sector must be 1-{}, got {number}",
                Self::COUNT
            )));
        }
        Ok(Sector(number))
    }

    /// The sector containing `block`: `floor(block / 4) + 1`.
    ///
    /// ```
    /// use tapgate_core::Sector;
    ///
    /// assert_eq!(Sector::of_block(16).unwrap().number(), 5);
    /// assert_eq!(Sector::of_block(3).unwrap().number(), 1);
    /// ```
    ///
    /// # Errors
    /// Returns `Error::InvalidSector` if the block is past the end of the card.
    pub fn of_block(block: u8) -> Result<Self> {
        Self::new(block / BLOCKS_PER_SECTOR + 1)
    }

    #[must_use]
    pub fn number(&self) -> u8 {
        self.0
    }

    /// Trailer block of this sector: `4 * sector - 1`.
    #[must_use]
    pub fn trailer_block(&self) -> u8 {
        BLOCKS_PER_SECTOR * self.0 - 1
    }

    /// First block of this sector.
    #[must_use]
    pub fn first_block(&self) -> u8 {
        BLOCKS_PER_SECTOR * (self.0 - 1)
    }

    #[must_use]
    pub fn contains(&self, block: u8) -> bool {
        (self.first_block()..=self.trailer_block()).contains(&block)
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A block that may legally hold the card pass.
///
/// Block 0 (manufacturer data) and trailer blocks are reserved by the card
/// format and rejected here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PassBlock(u8);

impl PassBlock {
    /// # Errors
    /// Returns `Error::ReservedBlock` for block 0 or a trailer block and
    /// `Error::InvalidSector` for a block past the end of the card.
    pub fn new(block: u8) -> Result<Self> {
        if block == MANUFACTURER_BLOCK {
            return Err(Error::ReservedBlock {
                block,
                reason: "manufacturer block".to_string(),
            });
        }
        if is_trailer_block(block) {
            return Err(Error::ReservedBlock {
                block,
                reason: "sector trailer".to_string(),
            });
        }
        Sector::of_block(block)?;
        Ok(PassBlock(block))
    }

    #[must_use]
    pub fn index(&self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn sector(&self) -> Sector {
        Sector(self.0 / BLOCKS_PER_SECTOR + 1)
    }
}

impl fmt::Display for PassBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The 16-byte sector trailer: `KeyA ++ AccessBits ++ KeyB`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SectorTrailer(CardBlock);

impl SectorTrailer {
    /// Compose a trailer in the fixed order key A, access bits, key B.
    #[must_use]
    pub fn compose(key_a: &KeyMaterial, access_bits: &AccessBits, key_b: &KeyMaterial) -> Self {
        let mut block = [FILL_BYTE; BLOCK_SIZE];
        block[..KEY_SIZE].copy_from_slice(key_a.as_bytes());
        block[KEY_SIZE..KEY_SIZE + ACCESS_BITS_SIZE].copy_from_slice(access_bits.as_bytes());
        block[KEY_SIZE + ACCESS_BITS_SIZE..].copy_from_slice(key_b.as_bytes());
        SectorTrailer(block)
    }

    /// Wrap a raw block read back from the card.
    #[must_use]
    pub const fn from_block(block: CardBlock) -> Self {
        SectorTrailer(block)
    }

    /// Build a trailer from raw bytes.
    ///
    /// # Errors
    /// Returns `Error::InvalidTrailerLength` unless exactly 16 bytes are given.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let block: CardBlock = bytes
            .try_into()
            .map_err(|_| Error::InvalidTrailerLength {
                expected: BLOCK_SIZE,
                actual: bytes.len(),
            })?;
        Ok(SectorTrailer(block))
    }

    #[must_use]
    pub fn key_a(&self) -> KeyMaterial {
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&self.0[..KEY_SIZE]);
        KeyMaterial(key)
    }

    #[must_use]
    pub fn access_bits(&self) -> AccessBits {
        let mut bits = [0u8; ACCESS_BITS_SIZE];
        bits.copy_from_slice(&self.0[KEY_SIZE..KEY_SIZE + ACCESS_BITS_SIZE]);
        AccessBits(bits)
    }

    #[must_use]
    pub fn key_b(&self) -> KeyMaterial {
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&self.0[KEY_SIZE + ACCESS_BITS_SIZE..]);
        KeyMaterial(key)
    }

    #[must_use]
    pub fn as_block(&self) -> &CardBlock {
        &self.0
    }
}

impl fmt::Debug for SectorTrailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectorTrailer")
            .field("key_a", &self.key_a())
            .field("access_bits", &self.access_bits())
            .field("key_b", &self.key_b())
            .finish()
    }
}

/// Application-level secret stored in one data block of the card.
///
/// At most 16 bytes once encoded, never empty, never containing the NUL
/// fill byte.
///
/// # Security
/// Equality is constant-time.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CardPass(String);

impl CardPass {
    /// # Errors
    /// Returns `Error::EmptyPass`, `Error::PassTooLong` or
    /// `Error::PassContainsFill` for text that cannot be stored in a block.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.is_empty() {
            return Err(Error::EmptyPass);
        }
        if text.len() > MAX_PASS_LENGTH {
            return Err(Error::PassTooLong {
                max: MAX_PASS_LENGTH,
                actual: text.len(),
            });
        }
        if text.as_bytes().contains(&FILL_BYTE) {
            return Err(Error::PassContainsFill);
        }
        Ok(CardPass(text))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Zero-padded block representation.
    #[must_use]
    pub fn to_block(&self) -> CardBlock {
        let mut block = [FILL_BYTE; BLOCK_SIZE];
        block[..self.0.len()].copy_from_slice(self.0.as_bytes());
        block
    }
}

impl PartialEq for CardPass {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl fmt::Display for CardPass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for CardPass {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        CardPass::new(value)
    }
}

impl From<CardPass> for String {
    fn from(pass: CardPass) -> Self {
        pass.0
    }
}

impl std::str::FromStr for CardPass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CardPass::new(s)
    }
}
