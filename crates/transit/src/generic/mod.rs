//! Decoders that need no operator knowledge
//!
//! Blank and locked detectors are catch-alls and belong at the end of their
//! family's list. Serial-only decoders recognise a card by a fixed
//! application or system and report little more than its number.

mod blank;
mod locked;
mod serial;

pub use blank::{BlankClassic, BlankDesfire, BlankUltralight, BlankVicinity};
pub use locked::{LockedClassic, LockedDesfire, LockedUltralight};
pub use serial::{CepasPurseDecoder, DesfireSerialOnly, FelicaSystemDecoder, Iso7816Balance, UnknownVicinity};

/// Whether every byte is 0x00, or every byte is 0xFF
fn is_erased(data: &[u8]) -> bool {
    data.iter().all(|b| *b == 0x00) || data.iter().all(|b| *b == 0xFF)
}
