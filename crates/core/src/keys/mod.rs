//! MIFARE Classic key material
//!
//! Keys come from two places: keys saved against one tag, and a global
//! dictionary of community-known keys. Both are read through a [`KeyStore`]
//! and handed to the Classic reader as [`ClassicKeyMaterial`]. The reader
//! never writes to the store; it reports what worked inside the raw card.

mod candidates;
pub mod dictionary;
mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use candidates::{ClassicKeyMaterial, KeyCandidate};
pub use store::{FileKeyStore, KeyStore, MemoryKeyStore, SavedKeys};

use crate::{Error, Result};

/// Length of a MIFARE Classic key in bytes
pub const CLASSIC_KEY_LEN: usize = 6;

/// Role a key plays when authenticating a sector
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
pub enum KeyType {
    /// Key A
    #[display("A")]
    A,
    /// Key B
    #[display("B")]
    B,
}

/// A 6-byte MIFARE Classic key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassicKey(#[serde(with = "crate::serde_hex::array")] [u8; CLASSIC_KEY_LEN]);

impl ClassicKey {
    /// Factory default key (FF FF FF FF FF FF)
    pub const DEFAULT: Self = Self([0xFF; CLASSIC_KEY_LEN]);
    /// All-zero key, also used on sector 0 of some preamble layouts
    pub const ZERO: Self = Self([0x00; CLASSIC_KEY_LEN]);
    /// MIFARE Application Directory key A
    pub const MAD: Self = Self([0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]);
    /// NFC Forum (NDEF) key A
    pub const NFC_FORUM: Self = Self([0xD3, 0xF7, 0xD3, 0xF7, 0xD3, 0xF7]);

    /// Create a key from its bytes
    pub const fn new(bytes: [u8; CLASSIC_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Create a key from a slice, which must be exactly six bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        <[u8; CLASSIC_KEY_LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| Error::message(format!("key must be 6 bytes, got {}", bytes.len())))
    }

    /// Parse a key from 12 hex characters
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| Error::message(format!("invalid key {s:?}: {e}")))?;
        Self::from_slice(&bytes)
    }

    /// Key bytes
    pub const fn as_bytes(&self) -> &[u8; CLASSIC_KEY_LEN] {
        &self.0
    }
}

impl fmt::Display for ClassicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for ClassicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassicKey({self})")
    }
}

/// The A and B keys of one sector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassicSectorKey {
    /// Key A
    pub key_a: ClassicKey,
    /// Key B
    pub key_b: ClassicKey,
}

impl ClassicSectorKey {
    /// Create a sector key pair
    pub const fn new(key_a: ClassicKey, key_b: ClassicKey) -> Self {
        Self { key_a, key_b }
    }

    /// Key for the given role
    pub const fn key(&self, key_type: KeyType) -> ClassicKey {
        match key_type {
            KeyType::A => self.key_a,
            KeyType::B => self.key_b,
        }
    }
}

/// Keys saved for one card, indexed by sector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassicCardKeys {
    keys: Vec<ClassicSectorKey>,
}

impl ClassicCardKeys {
    /// Create a key set from per-sector keys
    pub const fn new(keys: Vec<ClassicSectorKey>) -> Self {
        Self { keys }
    }

    /// A key set with the factory default key in both roles for every sector
    pub fn default_for_sector_count(sector_count: usize) -> Self {
        Self::new(vec![
            ClassicSectorKey::new(ClassicKey::DEFAULT, ClassicKey::DEFAULT);
            sector_count
        ])
    }

    /// Parse a Proxmark3 binary key dump
    ///
    /// The dump holds every sector's key A followed by every sector's key B.
    pub fn from_proxmark3(dump: &[u8]) -> Result<Self> {
        let pair_len = CLASSIC_KEY_LEN * 2;
        if dump.is_empty() || dump.len() % pair_len != 0 {
            return Err(Error::message(format!(
                "Proxmark3 key dump must be a non-empty multiple of {pair_len} bytes, got {}",
                dump.len()
            )));
        }

        let sector_count = dump.len() / pair_len;
        let (a_keys, b_keys) = dump.split_at(sector_count * CLASSIC_KEY_LEN);
        let keys = a_keys
            .chunks_exact(CLASSIC_KEY_LEN)
            .zip(b_keys.chunks_exact(CLASSIC_KEY_LEN))
            .map(|(a, b)| Ok(ClassicSectorKey::new(ClassicKey::from_slice(a)?, ClassicKey::from_slice(b)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(keys))
    }

    /// Build a key set from keys recovered during a read
    ///
    /// A sector whose only known key is one role uses that key for both roles.
    /// Sectors without any recovered key get the factory default.
    pub fn from_recovered(sector_count: usize, recovered: &[RecoveredKey]) -> Self {
        let mut keys = Self::default_for_sector_count(sector_count).keys;
        let mut seen_a = vec![false; sector_count];
        let mut seen_b = vec![false; sector_count];

        for found in recovered.iter().filter(|k| k.sector < sector_count) {
            let slot = &mut keys[found.sector];
            match found.key_type {
                KeyType::A => {
                    slot.key_a = found.key;
                    seen_a[found.sector] = true;
                    if !seen_b[found.sector] {
                        slot.key_b = found.key;
                    }
                }
                KeyType::B => {
                    slot.key_b = found.key;
                    seen_b[found.sector] = true;
                    if !seen_a[found.sector] {
                        slot.key_a = found.key;
                    }
                }
            }
        }

        Self::new(keys)
    }

    /// Fold keys recovered by a later read into this set
    ///
    /// Only the roles that authenticated are overwritten, so sectors the read
    /// did not reach and the other role of a re-read sector keep their saved
    /// keys. The set grows to `sector_count` sectors when the read covered
    /// more than it holds, filling the new sectors like [`Self::from_recovered`].
    /// Returns whether anything changed.
    pub fn merge_recovered(&mut self, sector_count: usize, recovered: &[RecoveredKey]) -> bool {
        let known = self.keys.len();
        let mut changed = false;

        if sector_count > known {
            let grown = Self::from_recovered(sector_count, recovered);
            self.keys.extend_from_slice(&grown.keys[known..]);
            changed = true;
        }

        for found in recovered.iter().filter(|k| k.sector < known) {
            let slot = &mut self.keys[found.sector];
            let role = match found.key_type {
                KeyType::A => &mut slot.key_a,
                KeyType::B => &mut slot.key_b,
            };
            if *role != found.key {
                *role = found.key;
                changed = true;
            }
        }

        changed
    }

    /// Key pair for a sector, if the set covers it
    pub fn key_for_sector(&self, sector: usize) -> Option<&ClassicSectorKey> {
        self.keys.get(sector)
    }

    /// All sector keys in sector order
    pub fn keys(&self) -> &[ClassicSectorKey] {
        &self.keys
    }

    /// Number of sectors covered
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// A key that unlocked a sector during a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveredKey {
    /// Sector index
    pub sector: usize,
    /// The key
    pub key: ClassicKey,
    /// Role the key authenticated as
    pub key_type: KeyType,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> ClassicKey {
        ClassicKey::from_hex(s).unwrap()
    }

    #[test]
    fn test_static_keys() {
        assert_eq!(ClassicKey::DEFAULT.to_string(), "FFFFFFFFFFFF");
        assert_eq!(ClassicKey::ZERO.as_bytes(), &[0u8; 6]);
        assert_eq!(ClassicKey::MAD, key("A0A1A2A3A4A5"));
        assert_eq!(ClassicKey::NFC_FORUM, key("d3f7d3f7d3f7"));
    }

    #[test]
    fn test_key_length_checked() {
        assert!(ClassicKey::from_hex("FFFF").is_err());
        assert!(ClassicKey::from_slice(&[0; 7]).is_err());
    }

    #[test]
    fn test_default_keys_for_sector_count() {
        let keys = ClassicCardKeys::default_for_sector_count(16);
        assert_eq!(keys.len(), 16);
        for sector in 0..16 {
            let pair = keys.key_for_sector(sector).unwrap();
            assert_eq!(pair.key_a, ClassicKey::DEFAULT);
            assert_eq!(pair.key_b, ClassicKey::DEFAULT);
        }
        assert!(keys.key_for_sector(16).is_none());
        assert!(keys.key_for_sector(100).is_none());
    }

    #[test]
    fn test_from_proxmark3() {
        let a = ["000000000000", "FFFFFFFFFFFF", "A0A1A2A3A4A5", "D3F7D3F7D3F7"];
        let b = ["112233445566", "AABBCCDDEEFF", "010203040506", "FEFDFCFBFAF9"];
        let dump: Vec<u8> = a
            .iter()
            .chain(b.iter())
            .flat_map(|k| hex::decode(k).unwrap())
            .collect();

        let keys = ClassicCardKeys::from_proxmark3(&dump).unwrap();
        assert_eq!(keys.len(), 4);
        for sector in 0..4 {
            let pair = keys.key_for_sector(sector).unwrap();
            assert_eq!(pair.key_a, key(a[sector]));
            assert_eq!(pair.key_b, key(b[sector]));
        }
    }

    #[test]
    fn test_from_proxmark3_rejects_odd_length() {
        assert!(ClassicCardKeys::from_proxmark3(&[0u8; 18]).is_err());
        assert!(ClassicCardKeys::from_proxmark3(&[]).is_err());
    }

    #[test]
    fn test_from_recovered_fills_missing_role() {
        let secret = key("010203040506");
        let other = key("0A0B0C0D0E0F");
        let recovered = [
            RecoveredKey { sector: 1, key: secret, key_type: KeyType::B },
            RecoveredKey { sector: 2, key: secret, key_type: KeyType::A },
            RecoveredKey { sector: 2, key: other, key_type: KeyType::B },
        ];

        let keys = ClassicCardKeys::from_recovered(3, &recovered);
        assert_eq!(keys.key_for_sector(0).unwrap().key_a, ClassicKey::DEFAULT);
        assert_eq!(keys.key_for_sector(1).unwrap().key_a, secret);
        assert_eq!(keys.key_for_sector(1).unwrap().key_b, secret);
        assert_eq!(keys.key_for_sector(2).unwrap().key_a, secret);
        assert_eq!(keys.key_for_sector(2).unwrap().key_b, other);
    }

    #[test]
    fn test_merge_recovered_keeps_unread_sectors() {
        let saved_a = key("A1B2C3D4E5F6");
        let saved_b = key("B0B1B2B3B4B5");
        let mut keys = ClassicCardKeys::new(vec![ClassicSectorKey::new(saved_a, saved_b); 16]);

        // Tag lost after sector 3, every sector unlocked with key A
        let recovered: Vec<_> = (0..4)
            .map(|sector| RecoveredKey { sector, key: saved_a, key_type: KeyType::A })
            .collect();
        assert!(!keys.merge_recovered(4, &recovered));
        assert_eq!(keys.len(), 16);
        for sector in 0..16 {
            assert_eq!(keys.key_for_sector(sector), Some(&ClassicSectorKey::new(saved_a, saved_b)));
        }

        let fresh = key("010203040506");
        let recovered = [RecoveredKey { sector: 5, key: fresh, key_type: KeyType::B }];
        assert!(keys.merge_recovered(16, &recovered));
        assert_eq!(keys.key_for_sector(5), Some(&ClassicSectorKey::new(saved_a, fresh)));
    }

    #[test]
    fn test_merge_recovered_grows_short_set() {
        let saved = key("A1B2C3D4E5F6");
        let found = key("0A0B0C0D0E0F");
        let mut keys = ClassicCardKeys::new(vec![ClassicSectorKey::new(saved, saved); 4]);

        let recovered = [
            RecoveredKey { sector: 0, key: found, key_type: KeyType::A },
            RecoveredKey { sector: 6, key: found, key_type: KeyType::A },
        ];
        assert!(keys.merge_recovered(16, &recovered));
        assert_eq!(keys.len(), 16);
        assert_eq!(keys.key_for_sector(0), Some(&ClassicSectorKey::new(found, saved)));
        assert_eq!(keys.key_for_sector(6), Some(&ClassicSectorKey::new(found, found)));
        assert_eq!(keys.key_for_sector(5).unwrap().key_a, ClassicKey::DEFAULT);
    }
}
