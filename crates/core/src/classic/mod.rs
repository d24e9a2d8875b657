//! MIFARE Classic: sector key recovery, raw sectors and the parsed card
//!
//! The reader walks every sector, trying candidate keys from
//! [`ClassicKeyMaterial`](crate::keys::ClassicKeyMaterial) until one
//! authenticates, and classifies the sector as data, unauthorized or invalid.
//!
//! When the platform exposes raw frames, [`read_card_with_nested`] goes on
//! to recover the keys of locked sectors from one known key.

pub mod crypto1;

mod card;
mod nested;
mod raw;
mod reader;

pub use card::{BlockKind, ClassicBlock, ClassicCard, ClassicSector};
pub use nested::{NestedAttack, NestedOptions, cipher_uid, read_card_with_nested};
pub use raw::{RawClassicCard, RawClassicSector};
pub use reader::{ClassicReadOptions, read_card, read_card_with_options};

/// Size of a block in bytes
pub const BLOCK_SIZE: usize = 16;

/// Sectors below this index hold 4 blocks, the rest hold 16
pub const SMALL_SECTOR_COUNT: usize = 32;

/// Sector count of a MIFARE Mini
pub const MINI_SECTOR_COUNT: usize = 5;

/// Sector count of a MIFARE Classic 1K
pub const CLASSIC_1K_SECTOR_COUNT: usize = 16;

/// Sector count of a MIFARE Classic 4K
pub const CLASSIC_4K_SECTOR_COUNT: usize = 40;

/// Number of blocks in a sector
pub const fn block_count_in_sector(sector: usize) -> usize {
    if sector < SMALL_SECTOR_COUNT { 4 } else { 16 }
}

/// First block index of a sector
pub const fn sector_to_block(sector: usize) -> usize {
    if sector < SMALL_SECTOR_COUNT {
        sector * 4
    } else {
        SMALL_SECTOR_COUNT * 4 + (sector - SMALL_SECTOR_COUNT) * 16
    }
}
