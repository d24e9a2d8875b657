use async_trait::async_trait;
use bytes::Bytes;

use super::TagTechnology;
use crate::{
    Result,
    classic::{self, crypto1::RawFrame},
    keys::{ClassicKey, KeyType},
};

/// MIFARE Classic capability
///
/// Sector geometry defaults to the standard 1K/4K layout: 32 small sectors
/// of 4 blocks followed by large sectors of 16 blocks.
#[async_trait]
pub trait ClassicTechnology: TagTechnology {
    /// Number of sectors on the card
    fn sector_count(&self) -> usize;

    /// Number of blocks in a sector
    fn block_count_in_sector(&self, sector: usize) -> usize {
        classic::block_count_in_sector(sector)
    }

    /// First block index of a sector
    fn sector_to_block(&self, sector: usize) -> usize {
        classic::sector_to_block(sector)
    }

    /// Authenticate a sector
    ///
    /// Returns `Ok(false)` when the card rejects the key. Errors are reserved
    /// for link failures.
    async fn authenticate(&mut self, sector: usize, key: &ClassicKey, key_type: KeyType)
    -> Result<bool>;

    /// Read one 16-byte block of the authenticated sector
    ///
    /// Some readers answer a single NAK byte instead of failing; the reader
    /// handles that by re-authenticating.
    async fn read_block(&mut self, block: usize) -> Result<Bytes>;
}

/// MIFARE Classic with raw frame access, for nested key recovery
///
/// Frames go out exactly as given, with the parity bits they carry and no
/// CRC added, so Crypto1 can run in software on top of the link.
#[async_trait]
pub trait ClassicRawTechnology: ClassicTechnology {
    /// Send a frame and return the card's answer with its parity bits
    ///
    /// A card that stays silent answers an empty frame. Errors are reserved
    /// for link failures.
    async fn transceive_raw(&mut self, frame: &RawFrame) -> Result<RawFrame>;

    /// Drop any half-finished authentication and select the card again
    ///
    /// The link is back in normal mode afterwards, so the
    /// [`ClassicTechnology`] operations work again.
    async fn reselect(&mut self) -> Result<()>;
}
