//! CEPAS (Singapore EZ-Link, NETS FlashPay)
//!
//! Sixteen purses, each with a transaction log whose length is recorded in
//! the purse itself.

mod card;
mod error;
mod protocol;
mod raw;
mod reader;

pub use card::{CepasCard, CepasPurse, CepasTransaction, CepasTransactionType};
pub use error::CepasError;
pub use protocol::{CepasProtocol, SELECT_PURSE_DF};
pub use raw::{RawCepasCard, RawCepasHistory, RawCepasPurse};
pub use reader::read_card;

/// Purses on every card
pub const PURSE_COUNT: usize = 16;

/// Size of one transaction log entry
pub const TRANSACTION_SIZE: usize = 16;
