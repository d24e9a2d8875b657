use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, trace};

use super::TagTechnology;
use crate::Result;

/// MIFARE Ultralight / NTAG capability
#[async_trait]
pub trait UltralightTechnology: TagTechnology {
    /// Read four pages (16 bytes) starting at `page`
    ///
    /// Reads past the end of memory wrap around on real tags; the reader
    /// never asks for more pages than the detected type holds.
    async fn read_pages(&mut self, page: u8) -> Result<Bytes>;

    /// Send a raw NFC-A frame and return the tag's answer
    async fn transceive(&mut self, data: &[u8]) -> Result<Bytes> {
        trace!(command = ?hex::encode(data), "Transceiving");
        let result = self.do_transceive(data).await;
        if let Err(e) = &result {
            debug!(error = ?e, "Transceive failed");
        }
        result
    }

    /// Internal implementation of transceive
    async fn do_transceive(&mut self, data: &[u8]) -> Result<Bytes>;
}
