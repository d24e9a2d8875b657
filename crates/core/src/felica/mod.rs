//! Sony FeliCa (Suica, Octopus, Shenzhen Tong, ...)
//!
//! Only unencrypted services are read. The card is walked system by
//! system, service by service, block by block until the card refuses.

mod card;
pub mod frame;
mod raw;
mod reader;

pub use card::{FelicaCard, FelicaIdm, FelicaPmm, FelicaSystem};
pub use frame::ID_LEN;
pub use raw::{RawFelicaBlock, RawFelicaCard, RawFelicaService, RawFelicaSystem};
pub use reader::{FelicaReadOptions, read_card};

/// Size of one block
pub const BLOCK_SIZE: usize = 16;

/// Wildcard system code
pub const SYSTEM_CODE_ANY: u16 = 0xFFFF;
/// Octopus, which does not report its system code
pub const SYSTEM_CODE_OCTOPUS: u16 = 0x8008;
/// Shenzhen Tong, which does not report its system code
pub const SYSTEM_CODE_SZT: u16 = 0x8005;

/// The readable Octopus service
pub const SERVICE_OCTOPUS: u16 = 0x0117;
/// The readable Shenzhen Tong service
pub const SERVICE_SZT: u16 = 0x0118;
