use tapread_core::{
    Card, CardType,
    classic::ClassicSector,
    desfire::{DesfireApplication, DesfireFile},
};

use crate::{Result, TransitFactory, TransitIdentity, factory::wrong_family};

fn locked_identity(name: &str, card: &Card) -> TransitIdentity {
    TransitIdentity::new(name, Some(card.tag_id().to_hex()))
}

/// Classic card where no key opened anything past sector 0
///
/// Sector 0 often carries a readable application directory even on
/// otherwise locked cards.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockedClassic;

impl TransitFactory for LockedClassic {
    fn name(&self) -> &str {
        "locked-classic"
    }

    fn check(&self, card: &Card) -> Result<bool> {
        let Card::MifareClassic(card) = card else {
            return Err(wrong_family(CardType::MifareClassic, card));
        };
        let mut rest = card.sectors.iter().skip(1).peekable();
        Ok(rest.peek().is_some() && rest.all(|sector| matches!(sector, ClassicSector::Unauthorized { .. })))
    }

    fn parse_identity(&self, card: &Card) -> Result<TransitIdentity> {
        Ok(locked_identity("Locked MIFARE Classic card", card))
    }
}

/// Ultralight C or EV1 with password protected pages
#[derive(Debug, Clone, Copy, Default)]
pub struct LockedUltralight;

impl TransitFactory for LockedUltralight {
    fn name(&self) -> &str {
        "locked-ultralight"
    }

    fn check(&self, card: &Card) -> Result<bool> {
        let Card::MifareUltralight(card) = card else {
            return Err(wrong_family(CardType::MifareUltralight, card));
        };
        Ok(card.pages.iter().any(|page| page.is_unauthorized()))
    }

    fn parse_identity(&self, card: &Card) -> Result<TransitIdentity> {
        Ok(locked_identity("Locked MIFARE Ultralight card", card))
    }
}

/// DESFire card that refused its application list or every file
#[derive(Debug, Clone, Copy, Default)]
pub struct LockedDesfire;

impl LockedDesfire {
    fn is_locked(app: &DesfireApplication) -> bool {
        app.dir_list_locked ||
            (!app.files.is_empty() &&
                app.files
                    .iter()
                    .all(|file| matches!(file, DesfireFile::Unauthorized { .. })))
    }
}

impl TransitFactory for LockedDesfire {
    fn name(&self) -> &str {
        "locked-desfire"
    }

    fn check(&self, card: &Card) -> Result<bool> {
        let Card::MifareDesfire(card) = card else {
            return Err(wrong_family(CardType::MifareDesfire, card));
        };
        Ok(card.app_list_locked ||
            (!card.applications.is_empty() && card.applications.iter().all(Self::is_locked)))
    }

    fn parse_identity(&self, card: &Card) -> Result<TransitIdentity> {
        Ok(locked_identity("Locked MIFARE DESFire card", card))
    }
}

#[cfg(test)]
mod tests {
    use tapread_core::ultralight::UltralightPage;

    use super::*;
    use crate::generic::fixtures::{classic, classic_sector, ultralight, user_page};

    #[test]
    fn test_locked_classic() {
        let mut sectors = vec![classic_sector(0, 0x00)];
        sectors.extend((1..16).map(|index| ClassicSector::Unauthorized { index }));
        assert!(LockedClassic.check(&Card::MifareClassic(classic(sectors.clone()))).unwrap());

        sectors[4] = classic_sector(4, 0x00);
        assert!(!LockedClassic.check(&Card::MifareClassic(classic(sectors))).unwrap());

        let only_zero = classic(vec![classic_sector(0, 0x00)]);
        assert!(!LockedClassic.check(&Card::MifareClassic(only_zero)).unwrap());
    }

    #[test]
    fn test_locked_ultralight() {
        let open = ultralight((4..16).map(|i| user_page(i, [0; 4])).collect());
        assert!(!LockedUltralight.check(&Card::MifareUltralight(open)).unwrap());

        let mut user: Vec<_> = (4..8).map(|i| user_page(i, [0; 4])).collect();
        user.extend((8..16).map(|index| UltralightPage::Unauthorized { index }));
        let locked = ultralight(user);
        assert!(LockedUltralight.check(&Card::MifareUltralight(locked)).unwrap());
    }
}
