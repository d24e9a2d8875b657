use async_trait::async_trait;
use bytes::Bytes;
use tapread_core::{Result, technology::UltralightTechnology};

use super::{impl_tag_technology, read_binary};
use crate::PcscConnection;

/// MIFARE Ultralight and NTAG through READ BINARY
///
/// Raw NFC-A frames need the reader's transparent exchange. Readers without
/// it refuse GET_VERSION, and the tag is then read as a plain MF0ICU1.
#[derive(Debug)]
pub struct PcscUltralight {
    connection: PcscConnection,
}

impl PcscUltralight {
    /// Wrap an open connection
    pub const fn new(connection: PcscConnection) -> Self {
        Self { connection }
    }
}

impl_tag_technology!(PcscUltralight);

#[async_trait]
impl UltralightTechnology for PcscUltralight {
    async fn read_pages(&mut self, page: u8) -> Result<Bytes> {
        Ok(self.connection.command(&read_binary(u16::from(page), 0x10))?)
    }

    async fn do_transceive(&mut self, data: &[u8]) -> Result<Bytes> {
        Ok(self.connection.transceive_frame(data)?)
    }
}
