use async_trait::async_trait;
use bytes::Bytes;
use tapread_core::{
    Result,
    keys::{ClassicKey, KeyType},
    technology::ClassicTechnology,
};
use tracing::debug;

use super::{impl_tag_technology, read_binary};
use crate::{PcscConnection, PcscError};

/// Volatile key slot used for every authentication
const KEY_SLOT: u8 = 0x00;

/// LOAD KEYS into the reader's volatile slot
fn load_key(key: &ClassicKey) -> [u8; 11] {
    let mut command = [0xFF, 0x82, 0x00, KEY_SLOT, 0x06, 0, 0, 0, 0, 0, 0];
    command[5..].copy_from_slice(key.as_bytes());
    command
}

/// GENERAL AUTHENTICATE against `block` with the loaded key
const fn authenticate(block: u16, key_type: KeyType) -> [u8; 10] {
    let [hi, lo] = block.to_be_bytes();
    let key_type = match key_type {
        KeyType::A => 0x60,
        KeyType::B => 0x61,
    };
    [0xFF, 0x86, 0x00, 0x00, 0x05, 0x01, hi, lo, key_type, KEY_SLOT]
}

/// MIFARE Classic through the reader's storage card commands
#[derive(Debug)]
pub struct PcscClassic {
    connection: PcscConnection,
    sectors: usize,
}

impl PcscClassic {
    /// Wrap an open connection to a card with `sectors` sectors
    pub const fn new(connection: PcscConnection, sectors: usize) -> Self {
        Self { connection, sectors }
    }
}

impl_tag_technology!(PcscClassic);

#[async_trait]
impl ClassicTechnology for PcscClassic {
    fn sector_count(&self) -> usize {
        self.sectors
    }

    async fn authenticate(&mut self, sector: usize, key: &ClassicKey, key_type: KeyType) -> Result<bool> {
        let Ok(block) = u16::try_from(self.sector_to_block(sector)) else {
            return Ok(false);
        };

        match self.connection.command(&load_key(key)) {
            Ok(_) => {}
            Err(PcscError::Status(status)) => {
                debug!(sector, %status, "Reader refused to load key");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        match self.connection.command(&authenticate(block, key_type)) {
            Ok(_) => Ok(true),
            Err(PcscError::Status(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_block(&mut self, block: usize) -> Result<Bytes> {
        let block = u16::try_from(block)
            .map_err(|_| tapread_core::Error::protocol(format!("block {block} out of range")))?;
        Ok(self.connection.command(&read_binary(block, 0x10))?)
    }
}
