use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{TagId, keys::ClassicKey};

/// Role a block plays in the sector layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Block 0: UID and manufacturer data
    #[display("manufacturer")]
    Manufacturer,
    /// Last block of a sector: keys and access bits
    #[display("trailer")]
    Trailer,
    /// Data block in the value block format
    #[display("value")]
    Value,
    /// Plain data block
    #[display("data")]
    Data,
}

impl BlockKind {
    /// Classify a block from its position and contents
    pub fn classify(block: usize, is_trailer: bool, data: &[u8]) -> Self {
        if block == 0 {
            Self::Manufacturer
        } else if is_trailer {
            Self::Trailer
        } else if is_value_block(data) {
            Self::Value
        } else {
            Self::Data
        }
    }
}

/// Value blocks store the value, its complement and the value again,
/// followed by an address byte pattern with the same redundancy.
fn is_value_block(data: &[u8]) -> bool {
    if data.len() != super::BLOCK_SIZE {
        return false;
    }
    let value = &data[0..4];
    let inverted = &data[4..8];
    let repeated = &data[8..12];
    value.iter().zip(inverted).all(|(v, i)| *v == !*i) &&
        value == repeated &&
        data[12] == !data[13] &&
        data[12] == data[14] &&
        data[13] == data[15]
}

/// One block of a parsed sector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassicBlock {
    /// Absolute block index
    pub index: usize,
    /// Role of the block
    pub kind: BlockKind,
    /// Block contents
    #[serde(with = "crate::serde_hex")]
    pub data: Vec<u8>,
}

impl ClassicBlock {
    /// Create a block
    pub const fn new(index: usize, kind: BlockKind, data: Vec<u8>) -> Self {
        Self { index, kind, data }
    }

    /// Signed value of a value block
    pub fn value(&self) -> Option<i32> {
        match self.kind {
            BlockKind::Value => Some(i32::from_le_bytes([
                self.data[0],
                self.data[1],
                self.data[2],
                self.data[3],
            ])),
            _ => None,
        }
    }
}

/// Parsed sector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClassicSector {
    /// Readable sector
    Data {
        /// Sector index
        index: usize,
        /// Blocks in order
        blocks: Vec<ClassicBlock>,
        /// Key A, if it unlocked the sector
        key_a: Option<ClassicKey>,
        /// Key B, if it unlocked the sector
        key_b: Option<ClassicKey>,
    },
    /// Locked sector
    Unauthorized {
        /// Sector index
        index: usize,
    },
    /// Sector that failed to read
    Invalid {
        /// Sector index
        index: usize,
        /// What went wrong
        error: String,
    },
}

impl ClassicSector {
    /// Sector index
    pub const fn index(&self) -> usize {
        match self {
            Self::Data { index, .. } | Self::Unauthorized { index } | Self::Invalid { index, .. } => *index,
        }
    }

    /// Blocks of a readable sector
    pub fn blocks(&self) -> Option<&[ClassicBlock]> {
        match self {
            Self::Data { blocks, .. } => Some(blocks),
            _ => None,
        }
    }

    /// Contents of a sector's data blocks concatenated, trailer excluded
    pub fn data(&self) -> Option<Vec<u8>> {
        self.blocks().map(|blocks| {
            blocks
                .iter()
                .filter(|block| block.kind != BlockKind::Trailer)
                .flat_map(|block| block.data.iter().copied())
                .collect()
        })
    }
}

/// Parsed MIFARE Classic card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassicCard {
    /// Tag identifier (UID)
    pub tag_id: TagId,
    /// When the scan finished
    pub scanned_at: DateTime<Utc>,
    /// Sectors in order
    pub sectors: Vec<ClassicSector>,
    /// Not every sector was reached
    pub is_partial_read: bool,
}

impl ClassicCard {
    /// Look up a sector by index
    pub fn sector(&self, index: usize) -> Option<&ClassicSector> {
        self.sectors.get(index)
    }

    /// Block 0, when sector 0 was readable
    pub fn manufacturer_block(&self) -> Option<&ClassicBlock> {
        self.sector(0)?.blocks()?.first()
    }

    /// Number of sectors that could be read
    pub fn readable_sector_count(&self) -> usize {
        self.sectors
            .iter()
            .filter(|sector| matches!(sector, ClassicSector::Data { .. }))
            .count()
    }
}
