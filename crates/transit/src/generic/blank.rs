use tapread_core::{
    Card, CardType,
    classic::{BlockKind, ClassicSector},
    ultralight::{UltralightCard, UltralightType},
};

use super::is_erased;
use crate::{Result, TransitFactory, TransitIdentity, factory::wrong_family};

fn blank_identity(name: &str, card: &Card) -> TransitIdentity {
    TransitIdentity::new(name, Some(card.tag_id().to_hex()))
}

/// Classic card with every sector readable and no data written
#[derive(Debug, Clone, Copy, Default)]
pub struct BlankClassic;

impl TransitFactory for BlankClassic {
    fn name(&self) -> &str {
        "blank-classic"
    }

    fn check(&self, card: &Card) -> Result<bool> {
        let Card::MifareClassic(card) = card else {
            return Err(wrong_family(CardType::MifareClassic, card));
        };
        Ok(!card.sectors.is_empty() &&
            card.sectors.iter().all(|sector| match sector {
                ClassicSector::Data { blocks, .. } => blocks
                    .iter()
                    .filter(|block| block.kind != BlockKind::Manufacturer && block.kind != BlockKind::Trailer)
                    .all(|block| is_erased(&block.data)),
                _ => false,
            }))
    }

    fn parse_identity(&self, card: &Card) -> Result<TransitIdentity> {
        Ok(blank_identity("Blank MIFARE Classic card", card))
    }
}

/// Ultralight or NTAG tag holding only factory data
#[derive(Debug, Clone, Copy, Default)]
pub struct BlankUltralight;

impl BlankUltralight {
    /// Capability container and NDEF TLV written at the factory
    fn is_factory_page(kind: UltralightType, index: usize, data: &[u8]) -> bool {
        match (kind, index) {
            (UltralightType::Ntag213, 3) => data == [0xE1, 0x10, 0x12, 0x00],
            (UltralightType::Ntag213, 4) => data == [0x01, 0x03, 0xA0, 0x0C],
            (UltralightType::Ntag213, 5) => data == [0x34, 0x03, 0x00, 0xFE],
            (UltralightType::Ntag215, 3) => data == [0xE1, 0x10, 0x3E, 0x00],
            (UltralightType::Ntag216, 3) => data == [0xE1, 0x10, 0x6D, 0x00],
            (UltralightType::Ntag215 | UltralightType::Ntag216, 4) => data == [0x03, 0x00, 0xFE, 0x00],
            _ => false,
        }
    }

    /// Default configuration pages at the end of memory
    fn is_default_config(card: &UltralightCard, index: usize, data: &[u8]) -> bool {
        let count = card.pages.len();
        if card.ultralight_type.is_ntag() {
            return match count.checked_sub(index) {
                // LOCK / RFUI, the last byte is reserved
                Some(5) => data.get(..3) == Some(&[0, 0, 0][..]),
                // MIRROR / RFUI / MIRROR_PAGE / AUTH0
                Some(4) => data == [0x04, 0x00, 0x00, 0xFF],
                // ACCESS
                Some(3) => data.first() == Some(&0),
                // PWD reads back masked
                Some(2) => true,
                _ => false,
            };
        }
        // EV1 MF0UL11 configuration
        count == 0x14 &&
            matches!((index, data), (0x10, [0x00, 0x00, 0x00, 0xFF]) | (0x11, [0x00, 0x05, 0x00, 0x00]))
    }
}

impl TransitFactory for BlankUltralight {
    fn name(&self) -> &str {
        "blank-ultralight"
    }

    fn check(&self, card: &Card) -> Result<bool> {
        let Card::MifareUltralight(card) = card else {
            return Err(wrong_family(CardType::MifareUltralight, card));
        };

        // Pages 0-2 hold the serial number, internal and lock bytes
        for page in card.pages.iter().skip(3) {
            let Some(data) = page.data() else {
                return Ok(false);
            };
            let index = page.index();
            if Self::is_factory_page(card.ultralight_type, index, data) ||
                Self::is_default_config(card, index, data)
            {
                continue;
            }
            if data.iter().any(|b| *b != 0) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn parse_identity(&self, card: &Card) -> Result<TransitIdentity> {
        Ok(blank_identity("Blank MIFARE Ultralight card", card))
    }
}

/// ISO 15693 tag whose blocks are all erased
#[derive(Debug, Clone, Copy, Default)]
pub struct BlankVicinity;

impl TransitFactory for BlankVicinity {
    fn name(&self) -> &str {
        "blank-vicinity"
    }

    fn check(&self, card: &Card) -> Result<bool> {
        let Card::Vicinity(card) = card else {
            return Err(wrong_family(CardType::Vicinity, card));
        };
        Ok(!card.pages.is_empty() && card.pages.iter().all(|page| is_erased(&page.data)))
    }

    fn parse_identity(&self, card: &Card) -> Result<TransitIdentity> {
        Ok(blank_identity("Blank ISO 15693 tag", card))
    }
}

/// DESFire card without applications
#[derive(Debug, Clone, Copy, Default)]
pub struct BlankDesfire;

impl TransitFactory for BlankDesfire {
    fn name(&self) -> &str {
        "blank-desfire"
    }

    fn check(&self, card: &Card) -> Result<bool> {
        let Card::MifareDesfire(card) = card else {
            return Err(wrong_family(CardType::MifareDesfire, card));
        };
        Ok(card.applications.is_empty() && !card.app_list_locked)
    }

    fn parse_identity(&self, card: &Card) -> Result<TransitIdentity> {
        Ok(blank_identity("Blank MIFARE DESFire card", card))
    }
}
