use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, trace};

use super::TagTechnology;
use crate::Result;

/// ISO 14443-4 (ISO-DEP) capability exchanging raw APDUs
///
/// Used by the DESFire, ISO 7816 and CEPAS readers.
#[async_trait]
pub trait CardTransceiver: TagTechnology {
    /// Send raw bytes to the card and return its raw response
    async fn transceive(&mut self, data: &[u8]) -> Result<Bytes> {
        trace!(command = ?hex::encode(data), "Transceiving");
        let result = self.do_transceive(data).await;
        match &result {
            Ok(response) => {
                trace!(response = ?hex::encode(response), "Received response");
            }
            Err(e) => {
                debug!(error = ?e, "Transceive failed");
            }
        }
        result
    }

    /// Internal implementation of transceive
    /// This is the method that concrete implementations should override
    async fn do_transceive(&mut self, data: &[u8]) -> Result<Bytes>;
}
