use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

use super::TagTechnology;
use crate::Result;

/// ISO 15693 (NFC-V) capability
#[async_trait]
pub trait VicinityTechnology: TagTechnology {
    /// Tag UID as used in addressed commands (least significant byte first)
    fn uid(&self) -> &[u8];

    /// Send a raw ISO 15693 request and return the response, flags byte included
    async fn transceive(&mut self, data: &[u8]) -> Result<Bytes> {
        trace!(command = ?hex::encode(data), "Transceiving");
        self.do_transceive(data).await
    }

    /// Internal implementation of transceive
    async fn do_transceive(&mut self, data: &[u8]) -> Result<Bytes>;
}
