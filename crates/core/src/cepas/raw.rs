use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CepasCard, CepasPurse, PURSE_COUNT, card::parse_history};
use crate::{CardType, TagId, card::ParseError};

/// Outcome of READ PURSE for one purse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawCepasPurse {
    /// Purse record
    Data {
        /// Purse number
        id: u8,
        /// READ PURSE answer
        #[serde(with = "crate::serde_hex")]
        data: Vec<u8>,
    },
    /// The card refused the purse
    Unauthorized {
        /// Purse number
        id: u8,
    },
    /// No usable purse
    Invalid {
        /// Purse number
        id: u8,
        /// Card message
        error: String,
    },
}

impl RawCepasPurse {
    /// Purse number
    pub const fn id(&self) -> u8 {
        match self {
            Self::Data { id, .. } | Self::Unauthorized { id } | Self::Invalid { id, .. } => *id,
        }
    }

    /// Log entry count from a readable purse
    pub fn log_record_count(&self) -> Option<u8> {
        match self {
            Self::Data { data, .. } => data.get(40).copied(),
            _ => None,
        }
    }

    /// Whether the card refused access
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Transaction log of one purse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawCepasHistory {
    /// Concatenated 16-byte entries
    Data {
        /// Purse number
        id: u8,
        /// Log entries
        #[serde(with = "crate::serde_hex")]
        data: Vec<u8>,
    },
    /// No log could be read
    Invalid {
        /// Purse number
        id: u8,
        /// Why
        error: String,
    },
}

impl RawCepasHistory {
    /// Purse number
    pub const fn id(&self) -> u8 {
        match self {
            Self::Data { id, .. } | Self::Invalid { id, .. } => *id,
        }
    }
}

/// Everything read from a CEPAS card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCepasCard {
    /// Tag identifier (UID)
    pub tag_id: TagId,
    /// When the scan finished
    pub scanned_at: DateTime<Utc>,
    /// One entry per purse, in purse order
    pub purses: Vec<RawCepasPurse>,
    /// One entry per purse, in purse order
    pub histories: Vec<RawCepasHistory>,
}

impl RawCepasCard {
    /// Always [`CardType::Cepas`]
    pub const fn card_type(&self) -> CardType {
        CardType::Cepas
    }

    /// Whether every purse was refused
    pub fn is_unauthorized(&self) -> bool {
        !self.purses.is_empty() && self.purses.iter().all(RawCepasPurse::is_unauthorized)
    }

    /// Project into a typed card
    ///
    /// Needs all sixteen purses in order; a readable purse or log that does
    /// not decode fails the parse.
    pub fn parse(&self) -> Result<CepasCard, ParseError> {
        const CT: CardType = CardType::Cepas;

        if self.purses.len() != PURSE_COUNT {
            return Err(ParseError::malformed(CT, format!("{} purses", self.purses.len())));
        }

        let mut purses = BTreeMap::new();
        for (index, raw) in self.purses.iter().enumerate() {
            if raw.id() as usize != index {
                return Err(ParseError::unit(CT, index, format!("purse {} out of order", raw.id())));
            }
            if let RawCepasPurse::Data { id, data } = raw {
                let purse = CepasPurse::parse(*id, data).map_err(|reason| ParseError::unit(CT, index, reason))?;
                purses.insert(*id, purse);
            }
        }

        let mut histories = BTreeMap::new();
        for history in &self.histories {
            if let RawCepasHistory::Data { id, data } = history {
                let transactions = parse_history(data)
                    .map_err(|reason| ParseError::unit(CT, *id as usize, reason))?;
                histories.insert(*id, transactions);
            }
        }

        Ok(CepasCard {
            tag_id: self.tag_id.clone(),
            scanned_at: self.scanned_at,
            purses,
            histories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(purses: Vec<RawCepasPurse>) -> RawCepasCard {
        RawCepasCard {
            tag_id: TagId::new(vec![0x11, 0x22, 0x33, 0x44]),
            scanned_at: Utc::now(),
            purses,
            histories: vec![RawCepasHistory::Invalid {
                id: 0,
                error: "Invalid Purse".into(),
            }],
        }
    }

    #[test]
    fn test_is_unauthorized() {
        let locked: Vec<_> = (0..16).map(|id| RawCepasPurse::Unauthorized { id }).collect();
        assert!(card(locked.clone()).is_unauthorized());
        assert!(!card(vec![]).is_unauthorized());

        let mut mixed = locked;
        mixed[3] = RawCepasPurse::Invalid {
            id: 3,
            error: "File 3 was an invalid file.".into(),
        };
        assert!(!card(mixed).is_unauthorized());
    }

    #[test]
    fn test_parse_requires_sixteen_purses() {
        let purses: Vec<_> = (0..15)
            .map(|id| RawCepasPurse::Invalid {
                id,
                error: "x".into(),
            })
            .collect();
        assert!(card(purses).parse().is_err());
    }

    #[test]
    fn test_serde_shape() {
        let raw = card(vec![RawCepasPurse::Data {
            id: 3,
            data: vec![0x01, 0x02],
        }]);
        let json = serde_json::to_value(&raw).unwrap();
        assert_eq!(json["purses"][0]["type"], "data");
        assert_eq!(json["purses"][0]["data"], "0102");
        assert_eq!(json["histories"][0]["error"], "Invalid Purse");
        let back: RawCepasCard = serde_json::from_value(json).unwrap();
        assert_eq!(back, raw);
    }
}
