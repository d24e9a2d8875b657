//! Raw and parsed cards across every chip family
//!
//! A [`RawCard`] is exactly what a reader produced and is what gets saved
//! and exported. [`RawCard::parse`] projects it into a [`Card`] whose units
//! are typed for the chip format; decoders work on the parsed form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    CardType, TagId,
    cepas::{CepasCard, RawCepasCard},
    classic::{ClassicCard, RawClassicCard},
    desfire::{DesfireCard, RawDesfireCard},
    felica::{FelicaCard, RawFelicaCard},
    iso7816::{Iso7816Card, RawIso7816Card},
    ultralight::{RawUltralightCard, UltralightCard},
    vicinity::{RawVicinityCard, VicinityCard},
};

/// Why a raw card could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// One sector, page, file or application is unusable
    #[error("{card_type} unit {index} is unusable: {reason}")]
    Unit {
        /// Family of the card
        card_type: CardType,
        /// Index of the unit
        index: usize,
        /// What is wrong with it
        reason: String,
    },

    /// The card as a whole does not have the expected shape
    #[error("Malformed {card_type} card: {reason}")]
    Malformed {
        /// Family of the card
        card_type: CardType,
        /// What is wrong with it
        reason: String,
    },
}

impl ParseError {
    /// An unusable unit
    pub fn unit(card_type: CardType, index: usize, reason: impl Into<String>) -> Self {
        Self::Unit {
            card_type,
            index,
            reason: reason.into(),
        }
    }

    /// A card of the wrong shape
    pub fn malformed(card_type: CardType, reason: impl Into<String>) -> Self {
        Self::Malformed {
            card_type,
            reason: reason.into(),
        }
    }

    /// Family of the card that failed to parse
    pub const fn card_type(&self) -> CardType {
        match self {
            Self::Unit { card_type, .. } | Self::Malformed { card_type, .. } => *card_type,
        }
    }
}

/// Snapshot of one scan, one variant per chip family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "card_type", content = "card")]
pub enum RawCard {
    /// MIFARE Classic sectors
    MifareClassic(RawClassicCard),
    /// MIFARE Ultralight pages
    MifareUltralight(RawUltralightCard),
    /// DESFire applications and files
    MifareDesfire(RawDesfireCard),
    /// FeliCa systems, services and blocks
    Felica(RawFelicaCard),
    /// ISO 7816 applications
    Iso7816(RawIso7816Card),
    /// CEPAS purses and histories
    Cepas(RawCepasCard),
    /// ISO 15693 blocks
    Vicinity(RawVicinityCard),
}

impl RawCard {
    /// Chip family
    pub const fn card_type(&self) -> CardType {
        match self {
            Self::MifareClassic(_) => CardType::MifareClassic,
            Self::MifareUltralight(_) => CardType::MifareUltralight,
            Self::MifareDesfire(_) => CardType::MifareDesfire,
            Self::Felica(_) => CardType::Felica,
            Self::Iso7816(_) => CardType::Iso7816,
            Self::Cepas(_) => CardType::Cepas,
            Self::Vicinity(_) => CardType::Vicinity,
        }
    }

    /// Tag identifier
    pub const fn tag_id(&self) -> &TagId {
        match self {
            Self::MifareClassic(card) => &card.tag_id,
            Self::MifareUltralight(card) => &card.tag_id,
            Self::MifareDesfire(card) => &card.tag_id,
            Self::Felica(card) => &card.tag_id,
            Self::Iso7816(card) => &card.tag_id,
            Self::Cepas(card) => &card.tag_id,
            Self::Vicinity(card) => &card.tag_id,
        }
    }

    /// When the scan finished
    pub const fn scanned_at(&self) -> DateTime<Utc> {
        match self {
            Self::MifareClassic(card) => card.scanned_at,
            Self::MifareUltralight(card) => card.scanned_at,
            Self::MifareDesfire(card) => card.scanned_at,
            Self::Felica(card) => card.scanned_at,
            Self::Iso7816(card) => card.scanned_at,
            Self::Cepas(card) => card.scanned_at,
            Self::Vicinity(card) => card.scanned_at,
        }
    }

    /// Whether the card holds at least one unit and every unit was refused
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::MifareClassic(card) => card.is_unauthorized(),
            Self::MifareUltralight(card) => card.is_unauthorized(),
            Self::MifareDesfire(card) => card.is_unauthorized(),
            Self::Felica(card) => card.is_unauthorized(),
            Self::Iso7816(card) => card.is_unauthorized(),
            Self::Cepas(card) => card.is_unauthorized(),
            Self::Vicinity(card) => card.is_unauthorized(),
        }
    }

    /// Whether the tag left the field before every unit was read
    pub const fn is_partial_read(&self) -> bool {
        match self {
            Self::MifareClassic(card) => card.is_partial_read,
            Self::MifareUltralight(card) => card.is_partial_read,
            Self::Vicinity(card) => card.is_partial_read,
            _ => false,
        }
    }

    /// Project into a typed card
    pub fn parse(&self) -> Result<Card, ParseError> {
        Ok(match self {
            Self::MifareClassic(card) => Card::MifareClassic(card.parse()?),
            Self::MifareUltralight(card) => Card::MifareUltralight(card.parse()?),
            Self::MifareDesfire(card) => Card::MifareDesfire(card.parse()?),
            Self::Felica(card) => Card::Felica(card.parse()?),
            Self::Iso7816(card) => Card::Iso7816(card.parse()?),
            Self::Cepas(card) => Card::Cepas(card.parse()?),
            Self::Vicinity(card) => Card::Vicinity(card.parse()?),
        })
    }
}

/// A parsed card, one variant per chip family
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "card_type", content = "card")]
pub enum Card {
    /// MIFARE Classic
    MifareClassic(ClassicCard),
    /// MIFARE Ultralight
    MifareUltralight(UltralightCard),
    /// DESFire
    MifareDesfire(DesfireCard),
    /// FeliCa
    Felica(FelicaCard),
    /// ISO 7816
    Iso7816(Iso7816Card),
    /// CEPAS
    Cepas(CepasCard),
    /// ISO 15693
    Vicinity(VicinityCard),
}

impl Card {
    /// Chip family
    pub const fn card_type(&self) -> CardType {
        match self {
            Self::MifareClassic(_) => CardType::MifareClassic,
            Self::MifareUltralight(_) => CardType::MifareUltralight,
            Self::MifareDesfire(_) => CardType::MifareDesfire,
            Self::Felica(_) => CardType::Felica,
            Self::Iso7816(_) => CardType::Iso7816,
            Self::Cepas(_) => CardType::Cepas,
            Self::Vicinity(_) => CardType::Vicinity,
        }
    }

    /// Tag identifier
    pub const fn tag_id(&self) -> &TagId {
        match self {
            Self::MifareClassic(card) => &card.tag_id,
            Self::MifareUltralight(card) => &card.tag_id,
            Self::MifareDesfire(card) => &card.tag_id,
            Self::Felica(card) => &card.tag_id,
            Self::Iso7816(card) => &card.tag_id,
            Self::Cepas(card) => &card.tag_id,
            Self::Vicinity(card) => &card.tag_id,
        }
    }
}

macro_rules! impl_from_raw {
    ($($raw:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$raw> for RawCard {
                fn from(card: $raw) -> Self {
                    Self::$variant(card)
                }
            }
        )*
    };
}

impl_from_raw! {
    RawClassicCard => MifareClassic,
    RawUltralightCard => MifareUltralight,
    RawDesfireCard => MifareDesfire,
    RawFelicaCard => Felica,
    RawIso7816Card => Iso7816,
    RawCepasCard => Cepas,
    RawVicinityCard => Vicinity,
}
