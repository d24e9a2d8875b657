//! Card family detection from the ATR a contactless reader synthesises
//!
//! Readers following PC/SC Part 3 put the registered application provider
//! id `A0 00 00 03 06` in the historical bytes of storage cards, followed
//! by the standard byte (SS) and a two-byte card name (NN NN). ISO-DEP
//! cards carry their own historical bytes instead and have no such marker.

use tapread_core::CardType;

/// PC/SC registered application provider id
const PCSC_RID: [u8; 5] = [0xA0, 0x00, 0x00, 0x03, 0x06];

/// ISO 14443 A, part 3
const SS_ISO14443A_3: u8 = 0x03;
/// ISO 15693 parts, as reported by different reader vendors
const SS_ISO15693: std::ops::RangeInclusive<u8> = 0x07..=0x0C;
/// FeliCa
const SS_FELICA: u8 = 0x11;
/// FeliCa at 424 kbit/s
const SS_FELICA_424: u8 = 0x12;

const NN_CLASSIC_1K: u16 = 0x0001;
const NN_CLASSIC_4K: u16 = 0x0002;
const NN_ULTRALIGHT: u16 = 0x0003;
const NN_CLASSIC_MINI: u16 = 0x0026;
const NN_ULTRALIGHT_C: u16 = 0x003A;
const NN_FELICA_212: u16 = 0xF011;
const NN_FELICA_424: u16 = 0xF012;

/// What the ATR says about the card in the field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtrInfo {
    /// Chip family to read the card as
    pub card_type: CardType,
    /// Sector count, for MIFARE Classic
    pub classic_sectors: Option<usize>,
    /// Card name from the ATR, when the reader reported one
    pub card_name: Option<u16>,
}

impl AtrInfo {
    const fn new(card_type: CardType) -> Self {
        Self {
            card_type,
            classic_sectors: None,
            card_name: None,
        }
    }

    const fn classic(sectors: usize, card_name: u16) -> Self {
        Self {
            card_type: CardType::MifareClassic,
            classic_sectors: Some(sectors),
            card_name: Some(card_name),
        }
    }

    /// Identify the card family behind `atr`
    ///
    /// Anything without the PC/SC storage card marker is assumed to speak
    /// ISO-DEP, which covers DESFire, ISO 7816 applications and CEPAS.
    pub fn from_atr(atr: &[u8]) -> Self {
        let Some(historical) = historical_bytes(atr) else {
            return Self::new(CardType::Iso7816);
        };
        let Some(start) = historical.windows(PCSC_RID.len()).position(|w| w == PCSC_RID) else {
            return Self::new(CardType::Iso7816);
        };

        let rest = &historical[start + PCSC_RID.len()..];
        let Some(&standard) = rest.first() else {
            return Self::new(CardType::Iso7816);
        };
        let card_name = match rest.get(1..3) {
            Some(&[hi, lo]) => u16::from_be_bytes([hi, lo]),
            _ => 0,
        };

        let mut info = match (standard, card_name) {
            (_, NN_CLASSIC_1K) => Self::classic(16, card_name),
            (_, NN_CLASSIC_4K) => Self::classic(40, card_name),
            (_, NN_CLASSIC_MINI) => Self::classic(5, card_name),
            (_, NN_ULTRALIGHT | NN_ULTRALIGHT_C) => Self::new(CardType::MifareUltralight),
            (SS_FELICA | SS_FELICA_424, _) | (_, NN_FELICA_212 | NN_FELICA_424) => Self::new(CardType::Felica),
            (ss, _) if SS_ISO15693.contains(&ss) => Self::new(CardType::Vicinity),
            // Storage cards the reader could not name are most often NTAGs
            (SS_ISO14443A_3, _) => Self::new(CardType::MifareUltralight),
            _ => Self::new(CardType::Iso7816),
        };
        if card_name != 0 {
            info.card_name = Some(card_name);
        }
        info
    }
}

/// Historical bytes of an ATR, `None` when the interface bytes run past its end
pub fn historical_bytes(atr: &[u8]) -> Option<&[u8]> {
    let t0 = *atr.get(1)?;
    let count = (t0 & 0x0F) as usize;

    // Walk TA/TB/TC/TD groups; each TD announces the next group
    let mut offset = 2;
    let mut indicator = t0;
    loop {
        offset += (indicator & 0x70).count_ones() as usize;
        if indicator & 0x80 == 0 {
            break;
        }
        indicator = *atr.get(offset)?;
        offset += 1;
    }
    atr.get(offset..offset + count)
}
