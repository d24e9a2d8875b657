use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PAGE_SIZE, UltralightCard, UltralightType};
use crate::{CardType, TagId, card::ParseError};

/// Outcome of reading one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UltralightPage {
    /// Page contents
    Data {
        /// Page index
        index: usize,
        /// Four bytes of page data
        #[serde(with = "crate::serde_hex")]
        data: Vec<u8>,
    },
    /// Page is password protected
    Unauthorized {
        /// Page index
        index: usize,
    },
    /// Page could not be read
    Invalid {
        /// Page index
        index: usize,
        /// What went wrong
        error: String,
    },
}

impl UltralightPage {
    pub(crate) fn invalid(index: usize, error: impl Into<String>) -> Self {
        Self::Invalid {
            index,
            error: error.into(),
        }
    }

    /// Page index
    pub const fn index(&self) -> usize {
        match self {
            Self::Data { index, .. } | Self::Unauthorized { index } | Self::Invalid { index, .. } => *index,
        }
    }

    /// Page contents, when readable
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Data { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Whether the page is protected
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Everything read from an Ultralight or NTAG tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawUltralightCard {
    /// Tag identifier (UID)
    pub tag_id: TagId,
    /// When the scan finished
    pub scanned_at: DateTime<Utc>,
    /// Detected sub-type
    pub ultralight_type: UltralightType,
    /// One entry per page, in order
    pub pages: Vec<UltralightPage>,
    /// The tag left the field before every page was read
    #[serde(default)]
    pub is_partial_read: bool,
}

impl RawUltralightCard {
    /// Always [`CardType::MifareUltralight`]
    pub const fn card_type(&self) -> CardType {
        CardType::MifareUltralight
    }

    /// Whether every page was protected
    pub fn is_unauthorized(&self) -> bool {
        !self.pages.is_empty() && self.pages.iter().all(UltralightPage::is_unauthorized)
    }

    /// Project into a typed card
    ///
    /// The header pages 0-3 carry the serial number, lock bits and OTP area;
    /// a card without all four readable cannot be interpreted.
    pub fn parse(&self) -> Result<UltralightCard, ParseError> {
        const CT: CardType = CardType::MifareUltralight;

        for (position, page) in self.pages.iter().enumerate() {
            if page.index() != position {
                return Err(ParseError::malformed(
                    CT,
                    format!("page {} found at position {position}", page.index()),
                ));
            }
            if let Some(data) = page.data() &&
                data.len() != PAGE_SIZE
            {
                return Err(ParseError::unit(
                    CT,
                    position,
                    format!("page holds {} bytes", data.len()),
                ));
            }
        }

        for index in 0..4 {
            match self.pages.get(index) {
                Some(UltralightPage::Data { .. }) => {}
                Some(_) => return Err(ParseError::unit(CT, index, "header page is not readable")),
                None => return Err(ParseError::malformed(CT, format!("only {} pages", self.pages.len()))),
            }
        }

        Ok(UltralightCard {
            tag_id: self.tag_id.clone(),
            scanned_at: self.scanned_at,
            ultralight_type: self.ultralight_type,
            pages: self.pages.clone(),
            is_partial_read: self.is_partial_read,
        })
    }
}
