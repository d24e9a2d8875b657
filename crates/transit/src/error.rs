use tapread_core::{CardType, ParseError};

/// Failure inside one decoder
///
/// Never escapes the registry: it is logged and the decoder is treated as
/// not applying to the card.
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    /// Asked to decode a card of another family
    #[error("Decoder expects a {expected} card, got {actual}")]
    WrongFamily {
        /// Family the decoder handles
        expected: CardType,
        /// Family it was given
        actual: CardType,
    },

    /// A unit the decoder needs is missing or unreadable
    #[error("Missing {0}")]
    Missing(String),

    /// The card content does not have the expected layout
    #[error("Malformed card data: {0}")]
    Malformed(String),

    /// Parse failure of the underlying card
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl DecoderError {
    /// Create a missing-unit error
    pub fn missing<S: Into<String>>(what: S) -> Self {
        Self::Missing(what.into())
    }

    /// Create a malformed-data error
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::Malformed(message.into())
    }
}

/// Result type for decoder operations
pub type Result<T, E = DecoderError> = std::result::Result<T, E>;
