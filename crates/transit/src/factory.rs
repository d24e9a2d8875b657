use std::fmt;

use serde::Serialize;
use tapread_core::{Card, CardType};

use crate::{DecoderError, Result};

/// Name and serial number shown before a card is fully decoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitIdentity {
    /// Card or operator name
    pub name: String,
    /// Printed or derived serial number
    pub serial_number: Option<String>,
}

impl TransitIdentity {
    /// Create an identity
    pub fn new(name: impl Into<String>, serial_number: Option<String>) -> Self {
        Self {
            name: name.into(),
            serial_number,
        }
    }
}

/// Stored value in minor currency units
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitBalance {
    /// Amount in minor units
    pub amount: i64,
    /// ISO 4217 code
    pub currency: &'static str,
    /// Digits after the decimal point
    pub decimals: u8,
}

impl TransitBalance {
    /// Create a balance
    pub const fn new(amount: i64, currency: &'static str, decimals: u8) -> Self {
        Self {
            amount,
            currency,
            decimals,
        }
    }
}

impl fmt::Display for TransitBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.decimals == 0 {
            return write!(f, "{} {}", self.currency, self.amount);
        }
        let sign = if self.amount < 0 { "-" } else { "" };
        let abs = self.amount.unsigned_abs();
        // Past 10^19 every i64 amount is all fraction
        let (whole, fraction) = match 10u64.checked_pow(u32::from(self.decimals)) {
            Some(scale) => (abs / scale, abs % scale),
            None => (0, abs),
        };
        write!(
            f,
            "{} {sign}{whole}.{fraction:0width$}",
            self.currency,
            width = usize::from(self.decimals)
        )
    }
}

/// One labelled value of decoded card information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, derive_more::Display)]
#[display("{label}: {value}")]
pub struct InfoField {
    /// What the value is
    pub label: String,
    /// Rendered value
    pub value: String,
}

impl InfoField {
    /// Create a field
    pub fn new(label: impl Into<String>, value: impl ToString) -> Self {
        Self {
            label: label.into(),
            value: value.to_string(),
        }
    }
}

/// Decoded card information
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitInfo {
    /// Card identity
    pub identity: TransitIdentity,
    /// Stored value purses
    pub balances: Vec<TransitBalance>,
    /// Anything else worth showing
    pub fields: Vec<InfoField>,
}

impl TransitInfo {
    /// Information holding only an identity
    pub const fn new(identity: TransitIdentity) -> Self {
        Self {
            identity,
            balances: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Add a balance
    pub fn with_balance(mut self, balance: TransitBalance) -> Self {
        self.balances.push(balance);
        self
    }

    /// Add a field
    pub fn with_field(mut self, field: InfoField) -> Self {
        self.fields.push(field);
        self
    }
}

/// A card a decoder supports, for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardInfo {
    /// Card name
    pub name: String,
    /// Chip family
    pub card_type: CardType,
    /// Where the card is used
    pub location: String,
    /// Reading requires keys the user has to supply
    pub keys_required: bool,
}

impl CardInfo {
    /// Create a listing entry
    pub fn new(name: impl Into<String>, card_type: CardType, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            card_type,
            location: location.into(),
            keys_required: false,
        }
    }

    /// Mark the card as needing user supplied keys
    pub const fn with_keys_required(mut self, keys_required: bool) -> Self {
        self.keys_required = keys_required;
        self
    }
}

/// Operator-specific decoder
///
/// Registered per [`CardType`] in a [`TransitRegistry`](crate::TransitRegistry).
/// Every method may fail or even panic without affecting other decoders.
pub trait TransitFactory: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Cards this decoder advertises
    fn all_cards(&self) -> Vec<CardInfo> {
        Vec::new()
    }

    /// Whether this decoder owns the card
    fn check(&self, card: &Card) -> Result<bool>;

    /// Identify the card
    fn parse_identity(&self, card: &Card) -> Result<TransitIdentity>;

    /// Decode the card
    ///
    /// Defaults to the identity alone.
    fn parse_info(&self, card: &Card) -> Result<TransitInfo> {
        self.parse_identity(card).map(TransitInfo::new)
    }

    /// Listing entry describing this particular card
    ///
    /// Defaults to the first advertised entry of the card's family.
    fn card_info(&self, card: &Card) -> Result<Option<CardInfo>> {
        Ok(self
            .all_cards()
            .into_iter()
            .find(|info| info.card_type == card.card_type()))
    }
}

impl fmt::Debug for dyn TransitFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TransitFactory").field(&self.name()).finish()
    }
}

/// Error for a decoder handed a card of another family
pub(crate) fn wrong_family(expected: CardType, card: &Card) -> DecoderError {
    DecoderError::WrongFamily {
        expected,
        actual: card.card_type(),
    }
}
