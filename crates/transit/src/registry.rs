use std::{
    any::Any,
    collections::{BTreeMap, BTreeSet},
    fmt,
    panic::{self, AssertUnwindSafe},
};

use tapread_core::{Card, CardType};
use tracing::{debug, warn};

use crate::{
    CardInfo, Result, TransitFactory, TransitIdentity, TransitInfo,
    generic::{
        BlankClassic, BlankDesfire, BlankUltralight, BlankVicinity, CepasPurseDecoder, DesfireSerialOnly,
        FelicaSystemDecoder, Iso7816Balance, LockedClassic, LockedDesfire, LockedUltralight, UnknownVicinity,
    },
};

/// Decoders by chip family, tried in registration order
///
/// Every call into a decoder runs behind a failure boundary: an error or a
/// panic is logged and counts as "does not apply", so one broken decoder
/// never hides the ones registered after it.
#[derive(Default)]
pub struct TransitRegistry {
    factories: BTreeMap<CardType, Vec<Box<dyn TransitFactory>>>,
}

impl TransitRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in generic decoders
    ///
    /// Within each family, decoders recognising a specific card come
    /// before the blank and locked fall-backs.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry
            .register(CardType::MifareClassic, BlankClassic)
            .register(CardType::MifareClassic, LockedClassic);

        registry
            .register(CardType::MifareUltralight, BlankUltralight)
            .register(CardType::MifareUltralight, LockedUltralight);

        registry
            .register(CardType::MifareDesfire, DesfireSerialOnly::clipper())
            .register(CardType::MifareDesfire, DesfireSerialOnly::hsl())
            .register(CardType::MifareDesfire, DesfireSerialOnly::leap())
            .register(CardType::MifareDesfire, BlankDesfire)
            .register(CardType::MifareDesfire, LockedDesfire);

        registry
            .register(CardType::Felica, FelicaSystemDecoder::octopus())
            .register(CardType::Felica, FelicaSystemDecoder::shenzhen_tong())
            .register(CardType::Felica, FelicaSystemDecoder::japan_ic());

        registry
            .register(CardType::Iso7816, Iso7816Balance::tmoney())
            .register(CardType::Iso7816, Iso7816Balance::china());

        registry.register(CardType::Cepas, CepasPurseDecoder);

        registry
            .register(CardType::Vicinity, BlankVicinity)
            .register(CardType::Vicinity, UnknownVicinity);

        registry
    }

    /// Append a decoder for a chip family
    pub fn register<F>(&mut self, card_type: CardType, factory: F) -> &mut Self
    where
        F: TransitFactory + 'static,
    {
        self.factories
            .entry(card_type)
            .or_default()
            .push(Box::new(factory));
        self
    }

    /// Decoders registered for a family, in order
    pub fn factories(&self, card_type: CardType) -> impl Iterator<Item = &dyn TransitFactory> {
        self.factories
            .get(&card_type)
            .into_iter()
            .flatten()
            .map(Box::as_ref)
    }

    /// Total number of registered decoders
    pub fn len(&self) -> usize {
        self.factories.values().map(Vec::len).sum()
    }

    /// Whether no decoder is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First decoder of the card's family that claims it
    pub fn resolve(&self, card: &Card) -> Option<&dyn TransitFactory> {
        let found = self
            .factories(card.card_type())
            .find(|factory| isolate(*factory, "check", || factory.check(card)).unwrap_or(false));

        match found {
            Some(factory) => debug!(decoder = factory.name(), tag_id = %card.tag_id(), "Resolved decoder"),
            None => debug!(card_type = %card.card_type(), tag_id = %card.tag_id(), "No decoder claims card"),
        }
        found
    }

    /// Identity from the resolved decoder
    pub fn parse_identity(&self, card: &Card) -> Option<TransitIdentity> {
        let factory = self.resolve(card)?;
        isolate(factory, "parse_identity", || factory.parse_identity(card))
    }

    /// Full information from the resolved decoder
    pub fn parse_info(&self, card: &Card) -> Option<TransitInfo> {
        let factory = self.resolve(card)?;
        isolate(factory, "parse_info", || factory.parse_info(card))
    }

    /// Listing entry of the resolved decoder for this card
    pub fn find_card_info(&self, card: &Card) -> Option<CardInfo> {
        let factory = self.resolve(card)?;
        isolate(factory, "find_card_info", || factory.card_info(card)).flatten()
    }

    /// Every advertised card, first registration wins on duplicate names
    pub fn all_cards(&self) -> Vec<CardInfo> {
        let mut seen = BTreeSet::new();
        self.factories
            .values()
            .flatten()
            .filter_map(|factory| isolate(factory.as_ref(), "all_cards", || Ok(factory.all_cards())))
            .flatten()
            .filter(|info| seen.insert(info.name.clone()))
            .collect()
    }
}

impl fmt::Debug for TransitRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.factories.iter().map(|(card_type, factories)| {
                (card_type, factories.iter().map(|factory| factory.name()).collect::<Vec<_>>())
            }))
            .finish()
    }
}

/// Run one decoder call, turning errors and panics into `None`
fn isolate<T>(factory: &dyn TransitFactory, operation: &'static str, call: impl FnOnce() -> Result<T>) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!(decoder = factory.name(), operation, error = %e, "Decoder failed");
            None
        }
        Err(payload) => {
            warn!(decoder = factory.name(), operation, panic = panic_message(payload.as_ref()), "Decoder panicked");
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
