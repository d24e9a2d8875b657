use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BlockKind, ClassicBlock, ClassicCard, ClassicSector, block_count_in_sector, sector_to_block};
use crate::{
    CardType, TagId,
    card::ParseError,
    keys::{ClassicKey, KeyCandidate, KeyType, RecoveredKey},
};

/// Outcome of reading one sector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawClassicSector {
    /// Sector authenticated and every block was read
    Data {
        /// Sector index
        index: usize,
        /// Block contents in block order
        #[serde(with = "crate::serde_hex::list")]
        blocks: Vec<Vec<u8>>,
        /// Key A, when it was the key that unlocked the sector
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key_a: Option<ClassicKey>,
        /// Key B, when it was the key that unlocked the sector
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key_b: Option<ClassicKey>,
    },
    /// No candidate key authenticated
    Unauthorized {
        /// Sector index
        index: usize,
    },
    /// Authentication succeeded but reading failed
    Invalid {
        /// Sector index
        index: usize,
        /// What went wrong
        error: String,
    },
}

impl RawClassicSector {
    /// A read sector, recording the key that unlocked it
    pub fn data(index: usize, blocks: Vec<Vec<u8>>, key: KeyCandidate) -> Self {
        let (key_a, key_b) = match key.key_type {
            KeyType::A => (Some(key.key), None),
            KeyType::B => (None, Some(key.key)),
        };
        Self::Data {
            index,
            blocks,
            key_a,
            key_b,
        }
    }

    /// A sector that failed after authentication
    pub fn invalid(index: usize, error: impl Into<String>) -> Self {
        Self::Invalid {
            index,
            error: error.into(),
        }
    }

    /// Sector index
    pub const fn index(&self) -> usize {
        match self {
            Self::Data { index, .. } | Self::Unauthorized { index } | Self::Invalid { index, .. } => *index,
        }
    }

    /// Whether no key unlocked this sector
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Everything read from a MIFARE Classic card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawClassicCard {
    /// Tag identifier (UID)
    pub tag_id: TagId,
    /// When the scan finished
    pub scanned_at: DateTime<Utc>,
    /// One entry per sector read, in sector order
    pub sectors: Vec<RawClassicSector>,
    /// The tag left the field before every sector was read
    #[serde(default)]
    pub is_partial_read: bool,
}

impl RawClassicCard {
    /// Create a raw card
    pub const fn new(
        tag_id: TagId,
        scanned_at: DateTime<Utc>,
        sectors: Vec<RawClassicSector>,
        is_partial_read: bool,
    ) -> Self {
        Self {
            tag_id,
            scanned_at,
            sectors,
            is_partial_read,
        }
    }

    /// Always [`CardType::MifareClassic`]
    pub const fn card_type(&self) -> CardType {
        CardType::MifareClassic
    }

    /// Whether every sector was locked
    pub fn is_unauthorized(&self) -> bool {
        !self.sectors.is_empty() && self.sectors.iter().all(RawClassicSector::is_unauthorized)
    }

    /// Keys that unlocked sectors during this read, for the caller to save
    pub fn recovered_keys(&self) -> Vec<RecoveredKey> {
        self.sectors
            .iter()
            .filter_map(|sector| match sector {
                RawClassicSector::Data {
                    index,
                    key_a,
                    key_b,
                    ..
                } => key_a
                    .map(|key| (key, KeyType::A))
                    .or_else(|| key_b.map(|key| (key, KeyType::B)))
                    .map(|(key, key_type)| RecoveredKey {
                        sector: *index,
                        key,
                        key_type,
                    }),
                _ => None,
            })
            .collect()
    }

    /// Project into a typed card
    ///
    /// Fails when sectors are out of order or a data sector does not hold
    /// the number of blocks its position requires.
    pub fn parse(&self) -> Result<ClassicCard, ParseError> {
        let mut sectors = Vec::with_capacity(self.sectors.len());

        for (position, sector) in self.sectors.iter().enumerate() {
            if sector.index() != position {
                return Err(ParseError::malformed(
                    CardType::MifareClassic,
                    format!("sector {} found at position {position}", sector.index()),
                ));
            }

            sectors.push(match sector {
                RawClassicSector::Data {
                    index,
                    blocks,
                    key_a,
                    key_b,
                } => {
                    let expected = block_count_in_sector(*index);
                    if blocks.len() != expected {
                        return Err(ParseError::unit(
                            CardType::MifareClassic,
                            *index,
                            format!("expected {expected} blocks, got {}", blocks.len()),
                        ));
                    }
                    let first = sector_to_block(*index);
                    ClassicSector::Data {
                        index: *index,
                        blocks: blocks
                            .iter()
                            .enumerate()
                            .map(|(offset, data)| {
                                let kind = BlockKind::classify(first + offset, offset + 1 == expected, data);
                                ClassicBlock::new(first + offset, kind, data.clone())
                            })
                            .collect(),
                        key_a: *key_a,
                        key_b: *key_b,
                    }
                }
                RawClassicSector::Unauthorized { index } => ClassicSector::Unauthorized { index: *index },
                RawClassicSector::Invalid { index, error } => ClassicSector::Invalid {
                    index: *index,
                    error: error.clone(),
                },
            });
        }

        Ok(ClassicCard {
            tag_id: self.tag_id.clone(),
            scanned_at: self.scanned_at,
            sectors,
            is_partial_read: self.is_partial_read,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(sectors: Vec<RawClassicSector>) -> RawClassicCard {
        RawClassicCard::new(TagId::new(vec![0xAA, 0xBB]), Utc::now(), sectors, false)
    }

    #[test]
    fn test_is_unauthorized() {
        assert!(!card(vec![]).is_unauthorized());
        assert!(
            card(vec![
                RawClassicSector::Unauthorized { index: 0 },
                RawClassicSector::Unauthorized { index: 1 },
            ])
            .is_unauthorized()
        );
        assert!(
            !card(vec![
                RawClassicSector::Unauthorized { index: 0 },
                RawClassicSector::invalid(1, "boom"),
            ])
            .is_unauthorized()
        );
    }

    #[test]
    fn test_recovered_keys() {
        let raw = card(vec![
            RawClassicSector::data(
                0,
                vec![vec![0; 16]; 4],
                KeyCandidate::new(ClassicKey::MAD, KeyType::A),
            ),
            RawClassicSector::Unauthorized { index: 1 },
            RawClassicSector::data(
                2,
                vec![vec![0; 16]; 4],
                KeyCandidate::new(ClassicKey::ZERO, KeyType::B),
            ),
        ]);

        assert_eq!(
            raw.recovered_keys(),
            vec![
                RecoveredKey {
                    sector: 0,
                    key: ClassicKey::MAD,
                    key_type: KeyType::A
                },
                RecoveredKey {
                    sector: 2,
                    key: ClassicKey::ZERO,
                    key_type: KeyType::B
                },
            ]
        );
    }

    #[test]
    fn test_parse_rejects_short_sector() {
        let raw = card(vec![RawClassicSector::data(
            0,
            vec![vec![0; 16]; 3],
            KeyCandidate::new(ClassicKey::DEFAULT, KeyType::A),
        )]);
        let err = raw.parse().unwrap_err();
        assert!(err.to_string().contains("expected 4 blocks"));
    }

    #[test]
    fn test_parse_rejects_out_of_order() {
        let raw = card(vec![RawClassicSector::Unauthorized { index: 1 }]);
        assert!(raw.parse().is_err());
    }

    #[test]
    fn test_serde_shape() {
        let raw = card(vec![
            RawClassicSector::data(
                0,
                vec![vec![0xAB; 16]; 4],
                KeyCandidate::new(ClassicKey::DEFAULT, KeyType::A),
            ),
            RawClassicSector::Unauthorized { index: 1 },
        ]);
        let json = serde_json::to_value(&raw).unwrap();

        assert_eq!(json["tag_id"], "aabb");
        assert_eq!(json["sectors"][0]["type"], "data");
        assert_eq!(json["sectors"][0]["key_a"], "ffffffffffff");
        assert!(json["sectors"][0].get("key_b").is_none());
        assert_eq!(json["sectors"][0]["blocks"][0], "ab".repeat(16));
        assert_eq!(json["sectors"][1]["type"], "unauthorized");

        let back: RawClassicCard = serde_json::from_value(json).unwrap();
        assert_eq!(back, raw);
    }
}
