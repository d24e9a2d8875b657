//! Tag identifiers and card types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a physical tag, stable for one session
///
/// This is the correlation key for keys saved against a card.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(#[serde(with = "crate::serde_hex")] Vec<u8>);

impl TagId {
    /// Create a tag identifier from raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse a tag identifier from a hex string
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(s).map(Self)
    }

    /// Raw identifier bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex rendering of the identifier
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Whether the identifier is empty (some readers cannot report a UID)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[u8]> for TagId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for TagId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for TagId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagId({})", self.to_hex())
    }
}

/// Chip family of a scanned card
///
/// Each variant selects one technology capability and one reader, and maps
/// one-to-one onto a [`RawCard`](crate::RawCard) variant.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
pub enum CardType {
    /// MIFARE Classic 1K/4K/Mini
    #[display("MIFARE Classic")]
    MifareClassic,
    /// MIFARE Ultralight, Ultralight C, Ultralight EV1 and NTAG21x
    #[display("MIFARE Ultralight")]
    MifareUltralight,
    /// MIFARE DESFire
    #[display("MIFARE DESFire")]
    MifareDesfire,
    /// Sony FeliCa
    #[display("FeliCa")]
    Felica,
    /// Generic ISO 7816-4 application card (KSX6924, China transit)
    #[display("ISO 7816")]
    Iso7816,
    /// Singapore CEPAS
    #[display("CEPAS")]
    Cepas,
    /// ISO 15693 vicinity card
    #[display("Vicinity")]
    Vicinity,
}

impl CardType {
    /// All card types, in declaration order
    pub const ALL: [Self; 7] = [
        Self::MifareClassic,
        Self::MifareUltralight,
        Self::MifareDesfire,
        Self::Felica,
        Self::Iso7816,
        Self::Cepas,
        Self::Vicinity,
    ];
}
