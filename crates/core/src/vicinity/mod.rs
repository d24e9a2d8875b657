//! ISO 15693 (NFC-V) "Vicinity" tags
//!
//! Blocks are read one at a time with addressed READ SINGLE BLOCK commands
//! until the tag reports an error or 256 blocks have been read.

mod card;
mod raw;
mod reader;

pub use card::{SystemInfo, VicinityCard};
pub use raw::{RawVicinityCard, VicinityPage};
pub use reader::read_card;

/// Request flags: high data rate, addressed mode
pub const FLAGS_ADDRESSED: u8 = 0x22;

/// READ SINGLE BLOCK
pub const READ_SINGLE_BLOCK: u8 = 0x20;

/// GET SYSTEM INFORMATION
pub const GET_SYSTEM_INFO: u8 = 0x2B;

/// Upper bound on blocks read from one tag
pub const MAX_BLOCKS: usize = 256;
