use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{SystemInfo, VicinityCard};
use crate::{CardType, TagId, card::ParseError};

/// One block read from the tag
///
/// The read stops at the first block that fails, so every recorded block
/// holds data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VicinityPage {
    /// Block index
    pub index: usize,
    /// Block contents
    #[serde(with = "crate::serde_hex")]
    pub data: Vec<u8>,
}

impl VicinityPage {
    /// Create a page
    pub const fn new(index: usize, data: Vec<u8>) -> Self {
        Self { index, data }
    }
}

/// Everything read from an ISO 15693 tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawVicinityCard {
    /// Tag identifier (UID)
    pub tag_id: TagId,
    /// When the scan finished
    pub scanned_at: DateTime<Utc>,
    /// GET SYSTEM INFORMATION answer without the flags byte
    #[serde(with = "crate::serde_hex::option", default)]
    pub system_info: Option<Vec<u8>>,
    /// Blocks from 0 upward
    pub pages: Vec<VicinityPage>,
    /// A transceive failed before the end of memory was reached
    #[serde(default)]
    pub is_partial_read: bool,
}

impl RawVicinityCard {
    /// Always [`CardType::Vicinity`]
    pub const fn card_type(&self) -> CardType {
        CardType::Vicinity
    }

    /// Vicinity blocks carry no access control the reader can observe
    pub const fn is_unauthorized(&self) -> bool {
        false
    }

    /// Project into a typed card
    ///
    /// Fails when the blocks are not contiguous from 0, differ in size, or
    /// the system information is present but truncated.
    pub fn parse(&self) -> Result<VicinityCard, ParseError> {
        const CT: CardType = CardType::Vicinity;

        let block_size = self.pages.first().map(|page| page.data.len());
        for (position, page) in self.pages.iter().enumerate() {
            if page.index != position {
                return Err(ParseError::malformed(
                    CT,
                    format!("block {} found at position {position}", page.index),
                ));
            }
            if Some(page.data.len()) != block_size {
                return Err(ParseError::unit(
                    CT,
                    position,
                    format!("block holds {} bytes, expected {}", page.data.len(), block_size.unwrap_or(0)),
                ));
            }
        }

        let system_info = self
            .system_info
            .as_deref()
            .map(SystemInfo::parse)
            .transpose()
            .map_err(|reason| ParseError::malformed(CT, reason))?;

        Ok(VicinityCard {
            tag_id: self.tag_id.clone(),
            scanned_at: self.scanned_at,
            system_info,
            pages: self.pages.clone(),
            is_partial_read: self.is_partial_read,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pages: Vec<VicinityPage>, system_info: Option<Vec<u8>>) -> RawVicinityCard {
        RawVicinityCard {
            tag_id: TagId::new(vec![0xE0]),
            scanned_at: Utc::now(),
            system_info,
            pages,
            is_partial_read: false,
        }
    }

    #[test]
    fn test_parse_checks_block_sizes() {
        let ok = raw(vec![VicinityPage::new(0, vec![0; 4]), VicinityPage::new(1, vec![1; 4])], None);
        assert_eq!(ok.parse().unwrap().pages.len(), 2);

        let ragged = raw(vec![VicinityPage::new(0, vec![0; 4]), VicinityPage::new(1, vec![1; 8])], None);
        assert!(ragged.parse().is_err());

        let gap = raw(vec![VicinityPage::new(0, vec![0; 4]), VicinityPage::new(2, vec![1; 4])], None);
        assert!(gap.parse().is_err());
    }

    #[test]
    fn test_parse_rejects_truncated_system_info() {
        assert!(raw(vec![], Some(vec![0x0F, 0x01])).parse().is_err());
    }
}
