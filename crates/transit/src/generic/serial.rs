use tapread_core::{Card, CardType, cepas::CepasCard, felica::FelicaCard};

use crate::{
    CardInfo, DecoderError, InfoField, Result, TransitBalance, TransitFactory, TransitIdentity, TransitInfo,
    factory::wrong_family,
};

/// DESFire card recognised by one of its application ids
///
/// Only the identity is decoded; the tag UID stands in for the serial
/// number.
#[derive(Debug, Clone, Copy)]
pub struct DesfireSerialOnly {
    name: &'static str,
    app_ids: &'static [u32],
    location: &'static str,
}

impl DesfireSerialOnly {
    /// Recognise cards carrying any of `app_ids`
    pub const fn new(name: &'static str, app_ids: &'static [u32], location: &'static str) -> Self {
        Self {
            name,
            app_ids,
            location,
        }
    }

    /// Clipper, San Francisco Bay Area
    pub const fn clipper() -> Self {
        Self::new("Clipper", &[0x9011F2], "San Francisco, CA, USA")
    }

    /// HSL, both card generations
    pub const fn hsl() -> Self {
        Self::new("HSL", &[0x1120EF, 0x1420EF], "Helsinki, Finland")
    }

    /// Leap, Ireland
    pub const fn leap() -> Self {
        Self::new("Leap", &[0xAF1122], "Dublin, Ireland")
    }
}

impl TransitFactory for DesfireSerialOnly {
    fn name(&self) -> &str {
        self.name
    }

    fn all_cards(&self) -> Vec<CardInfo> {
        vec![CardInfo::new(self.name, CardType::MifareDesfire, self.location)]
    }

    fn check(&self, card: &Card) -> Result<bool> {
        let Card::MifareDesfire(card) = card else {
            return Err(wrong_family(CardType::MifareDesfire, card));
        };
        Ok(self.app_ids.iter().any(|id| card.application(*id).is_some()))
    }

    fn parse_identity(&self, card: &Card) -> Result<TransitIdentity> {
        Ok(TransitIdentity::new(self.name, Some(card.tag_id().to_hex())))
    }
}

/// FeliCa card recognised by a system code, identified by its IDm
#[derive(Debug, Clone, Copy)]
pub struct FelicaSystemDecoder {
    name: &'static str,
    system_code: u16,
    location: &'static str,
}

impl FelicaSystemDecoder {
    /// Recognise cards exposing `system_code`
    pub const fn new(name: &'static str, system_code: u16, location: &'static str) -> Self {
        Self {
            name,
            system_code,
            location,
        }
    }

    /// Octopus, Hong Kong
    pub const fn octopus() -> Self {
        Self::new("Octopus", tapread_core::felica::SYSTEM_CODE_OCTOPUS, "Hong Kong")
    }

    /// Shenzhen Tong
    pub const fn shenzhen_tong() -> Self {
        Self::new("Shenzhen Tong", tapread_core::felica::SYSTEM_CODE_SZT, "Shenzhen, China")
    }

    /// Japanese transit IC cards sharing the Suica system
    pub const fn japan_ic() -> Self {
        Self::new("Japan IC", 0x0003, "Japan")
    }

    fn felica<'a>(&self, card: &'a Card) -> Result<&'a FelicaCard> {
        match card {
            Card::Felica(card) => Ok(card),
            _ => Err(wrong_family(CardType::Felica, card)),
        }
    }
}

impl TransitFactory for FelicaSystemDecoder {
    fn name(&self) -> &str {
        self.name
    }

    fn all_cards(&self) -> Vec<CardInfo> {
        vec![CardInfo::new(self.name, CardType::Felica, self.location)]
    }

    fn check(&self, card: &Card) -> Result<bool> {
        Ok(self.felica(card)?.system(self.system_code).is_some())
    }

    fn parse_identity(&self, card: &Card) -> Result<TransitIdentity> {
        let card = self.felica(card)?;
        Ok(TransitIdentity::new(self.name, Some(hex::encode_upper(card.idm.as_bytes()))))
    }

    fn parse_info(&self, card: &Card) -> Result<TransitInfo> {
        let identity = self.parse_identity(card)?;
        let card = self.felica(card)?;
        let system = card
            .system(self.system_code)
            .ok_or_else(|| DecoderError::missing(format!("system {:04x}", self.system_code)))?;
        Ok(TransitInfo::new(identity)
            .with_field(InfoField::new("System", format!("{:04X}", system.code)))
            .with_field(InfoField::new("Readable services", system.services.len())))
    }
}

/// Balance of a KSX6924 or China transit application
#[derive(Debug, Clone, Copy)]
pub struct Iso7816Balance {
    name: &'static str,
    app_type: &'static str,
    currency: &'static str,
    decimals: u8,
    location: &'static str,
}

impl Iso7816Balance {
    /// T-money and other KSX6924 cards, balance in won
    pub const fn tmoney() -> Self {
        Self {
            name: "T-money",
            app_type: "ksx6924",
            currency: "KRW",
            decimals: 0,
            location: "Seoul, South Korea",
        }
    }

    /// China transit cards, balance in fen
    pub const fn china() -> Self {
        Self {
            name: "China transit card",
            app_type: "china",
            currency: "CNY",
            decimals: 2,
            location: "China",
        }
    }
}

impl TransitFactory for Iso7816Balance {
    fn name(&self) -> &str {
        self.name
    }

    fn all_cards(&self) -> Vec<CardInfo> {
        vec![CardInfo::new(self.name, CardType::Iso7816, self.location)]
    }

    fn check(&self, card: &Card) -> Result<bool> {
        let Card::Iso7816(card) = card else {
            return Err(wrong_family(CardType::Iso7816, card));
        };
        Ok(card.application(self.app_type).is_some())
    }

    fn parse_identity(&self, card: &Card) -> Result<TransitIdentity> {
        Ok(TransitIdentity::new(self.name, Some(card.tag_id().to_hex())))
    }

    fn parse_info(&self, card: &Card) -> Result<TransitInfo> {
        let identity = self.parse_identity(card)?;
        let Card::Iso7816(card) = card else {
            return Err(wrong_family(CardType::Iso7816, card));
        };
        let app = card
            .application(self.app_type)
            .ok_or_else(|| DecoderError::missing(format!("{} application", self.app_type)))?;
        let balance = app
            .balance(0)
            .ok_or_else(|| DecoderError::missing("balance"))?;
        Ok(TransitInfo::new(identity)
            .with_balance(TransitBalance::new(i64::from(balance), self.currency, self.decimals))
            .with_field(InfoField::new("Application", hex::encode_upper(&app.app_name))))
    }
}

/// CEPAS purse 3, used by EZ-Link and NETS FlashPay
#[derive(Debug, Clone, Copy, Default)]
pub struct CepasPurseDecoder;

impl CepasPurseDecoder {
    const PURSE: u8 = 3;

    fn cepas(card: &Card) -> Result<&CepasCard> {
        match card {
            Card::Cepas(card) => Ok(card),
            _ => Err(wrong_family(CardType::Cepas, card)),
        }
    }
}

impl TransitFactory for CepasPurseDecoder {
    fn name(&self) -> &str {
        "cepas"
    }

    fn all_cards(&self) -> Vec<CardInfo> {
        vec![CardInfo::new("EZ-Link", CardType::Cepas, "Singapore")]
    }

    fn check(&self, card: &Card) -> Result<bool> {
        Ok(Self::cepas(card)?.purse(Self::PURSE).is_some())
    }

    fn parse_identity(&self, card: &Card) -> Result<TransitIdentity> {
        let purse = Self::cepas(card)?
            .purse(Self::PURSE)
            .ok_or_else(|| DecoderError::missing("purse 3"))?;
        Ok(TransitIdentity::new("EZ-Link", Some(hex::encode(&purse.can))))
    }

    fn parse_info(&self, card: &Card) -> Result<TransitInfo> {
        let identity = self.parse_identity(card)?;
        let cepas = Self::cepas(card)?;
        let purse = cepas
            .purse(Self::PURSE)
            .ok_or_else(|| DecoderError::missing("purse 3"))?;

        let mut info = TransitInfo::new(identity)
            .with_balance(TransitBalance::new(i64::from(purse.balance), "SGD", 2))
            .with_field(InfoField::new("Transactions", cepas.history(Self::PURSE).map_or(0, <[_]>::len)));
        if let Some(expiry) = purse.expiry_date {
            info = info.with_field(InfoField::new("Expiry", expiry.date_naive()));
        }
        Ok(info)
    }
}

/// Any ISO 15693 tag, as a last resort
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownVicinity;

impl TransitFactory for UnknownVicinity {
    fn name(&self) -> &str {
        "unknown-vicinity"
    }

    fn check(&self, card: &Card) -> Result<bool> {
        Ok(matches!(card, Card::Vicinity(_)))
    }

    fn parse_identity(&self, card: &Card) -> Result<TransitIdentity> {
        Ok(TransitIdentity::new("Unknown ISO 15693 tag", Some(card.tag_id().to_hex())))
    }

    fn parse_info(&self, card: &Card) -> Result<TransitInfo> {
        let identity = self.parse_identity(card)?;
        let Card::Vicinity(vicinity) = card else {
            return Err(wrong_family(CardType::Vicinity, card));
        };
        Ok(TransitInfo::new(identity).with_field(InfoField::new("Blocks", vicinity.pages.len())))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use tapread_core::{
        felica::{FelicaIdm, FelicaPmm, FelicaSystem},
        iso7816::{Iso7816Application, Iso7816Card},
    };

    use super::*;
    use crate::generic::fixtures::tag;

    fn felica(system_code: u16) -> Card {
        Card::Felica(FelicaCard {
            tag_id: tag(),
            scanned_at: Utc::now(),
            idm: FelicaIdm::new([0x01, 0x2E, 0x4C, 0xD1, 0x11, 0x22, 0x33, 0x44]),
            pmm: FelicaPmm::new([0x10; 8]),
            systems: vec![FelicaSystem {
                code: system_code,
                service_codes: vec![0x090F],
                services: BTreeMap::from([(0x090F, vec![vec![0; 16]])]),
                skipped: false,
            }],
        })
    }

    #[test]
    fn test_felica_system() {
        let octopus = FelicaSystemDecoder::octopus();
        assert!(octopus.check(&felica(0x8008)).unwrap());
        assert!(!octopus.check(&felica(0x0003)).unwrap());

        let identity = octopus.parse_identity(&felica(0x8008)).unwrap();
        assert_eq!(identity.serial_number.as_deref(), Some("012E4CD111223344"));

        let info = octopus.parse_info(&felica(0x8008)).unwrap();
        assert_eq!(info.fields[1].value, "1");
    }

    #[test]
    fn test_iso7816_balance() {
        let app = Iso7816Application {
            app_type: "ksx6924".into(),
            app_name: vec![0xD4, 0x10, 0x00, 0x00, 0x03, 0x00, 0x01],
            fci: vec![],
            balances: BTreeMap::from([(0, 15_000)]),
            files: BTreeMap::new(),
            sfi_files: BTreeMap::new(),
        };
        let card = Card::Iso7816(Iso7816Card {
            tag_id: tag(),
            scanned_at: Utc::now(),
            applications: vec![app],
        });

        let tmoney = Iso7816Balance::tmoney();
        assert!(tmoney.check(&card).unwrap());
        assert!(!Iso7816Balance::china().check(&card).unwrap());

        let info = tmoney.parse_info(&card).unwrap();
        assert_eq!(info.balances[0].to_string(), "KRW 15000");
    }

    #[test]
    fn test_unknown_vicinity_rejects_other_families() {
        assert!(!UnknownVicinity.check(&felica(0x0003)).unwrap());
    }
}
