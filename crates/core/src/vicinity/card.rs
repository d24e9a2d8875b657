use chrono::{DateTime, Utc};
use serde::Serialize;

use super::VicinityPage;
use crate::TagId;

const UID_LEN: usize = 8;

/// Decoded GET SYSTEM INFORMATION answer
///
/// The info flags byte says which optional fields follow the UID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    /// Data storage format identifier
    pub dsfid: Option<u8>,
    /// Application family identifier
    pub afi: Option<u8>,
    /// Number of blocks on the tag
    pub block_count: Option<usize>,
    /// Block size in bytes
    pub block_size: Option<usize>,
    /// IC reference
    pub ic_reference: Option<u8>,
}

impl SystemInfo {
    /// Decode the answer, flags byte already stripped
    pub fn parse(data: &[u8]) -> Result<Self, String> {
        let (&info_flags, rest) = data
            .split_first()
            .ok_or_else(|| "empty system information".to_string())?;
        let mut fields = rest
            .get(UID_LEN..)
            .ok_or_else(|| format!("system information too short: {}", hex::encode(data)))?
            .iter()
            .copied();
        let mut next = |flag: u8, name: &str| -> Result<Option<u8>, String> {
            if info_flags & flag == 0 {
                return Ok(None);
            }
            fields
                .next()
                .map(Some)
                .ok_or_else(|| format!("system information is missing {name}"))
        };

        let dsfid = next(0x01, "DSFID")?;
        let afi = next(0x02, "AFI")?;
        let (block_count, block_size) = match next(0x04, "memory size")? {
            Some(count) => {
                let size = next(0x04, "block size")?.unwrap_or(0);
                (Some(count as usize + 1), Some((size & 0x1F) as usize + 1))
            }
            None => (None, None),
        };
        let ic_reference = next(0x08, "IC reference")?;

        Ok(Self {
            dsfid,
            afi,
            block_count,
            block_size,
            ic_reference,
        })
    }
}

/// Parsed ISO 15693 tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VicinityCard {
    /// Tag identifier (UID)
    pub tag_id: TagId,
    /// When the scan finished
    pub scanned_at: DateTime<Utc>,
    /// Decoded system information, when the tag answered
    pub system_info: Option<SystemInfo>,
    /// Blocks from 0, contiguous and equally sized
    pub pages: Vec<VicinityPage>,
    /// Not every block was reached
    pub is_partial_read: bool,
}

impl VicinityCard {
    /// All block contents concatenated
    pub fn data(&self) -> Vec<u8> {
        self.pages.iter().flat_map(|page| page.data.iter().copied()).collect()
    }

    /// `len` bytes from byte offset `offset`, `None` when out of range
    pub fn read_bytes(&self, offset: usize, len: usize) -> Option<Vec<u8>> {
        self.data().get(offset..offset.checked_add(len)?).map(<[u8]>::to_vec)
    }
}
