use async_trait::async_trait;
use bytes::Bytes;
use tapread_core::{Result, technology::CardTransceiver};

use super::impl_tag_technology;
use crate::PcscConnection;

/// ISO-DEP card; APDUs go to the card unchanged
#[derive(Debug)]
pub struct PcscIsoDep {
    connection: PcscConnection,
}

impl PcscIsoDep {
    /// Wrap an open connection
    pub const fn new(connection: PcscConnection) -> Self {
        Self { connection }
    }
}

impl_tag_technology!(PcscIsoDep);

#[async_trait]
impl CardTransceiver for PcscIsoDep {
    async fn do_transceive(&mut self, data: &[u8]) -> Result<Bytes> {
        Ok(self.connection.transmit(data)?)
    }
}
