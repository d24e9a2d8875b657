use async_trait::async_trait;
use bytes::Bytes;
use tapread_core::{
    Error, Result,
    felica::{
        SYSTEM_CODE_ANY,
        frame::{self, SearchResult},
    },
    technology::FelicaTechnology,
};
use tracing::debug;

use super::impl_tag_technology;
use crate::{PcscConnection, PcscError};

/// FeliCa through raw NFC-F frames in the transparent exchange
///
/// Commands addressed to a card use the IDm from the most recent poll.
#[derive(Debug)]
pub struct PcscFelica {
    connection: PcscConnection,
    idm: Option<Vec<u8>>,
}

impl PcscFelica {
    /// Wrap an open connection
    pub const fn new(connection: PcscConnection) -> Self {
        Self {
            connection,
            idm: None,
        }
    }

    /// Exchange one frame, `None` when the reader or card gives no answer
    fn exchange(&mut self, request: &[u8]) -> Result<Option<Bytes>> {
        match self.connection.transceive_frame(request) {
            Ok(response) => Ok(Some(response)),
            Err(PcscError::Status(status)) => {
                debug!(command = ?request.get(1), %status, "No FeliCa answer");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn current_idm(&self) -> Result<&[u8]> {
        self.idm
            .as_deref()
            .ok_or_else(|| Error::protocol("FeliCa card not polled yet"))
    }

    /// Poll `system_code`, remembering the IDm that answered
    fn poll(&mut self, system_code: u16) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let Some(response) = self.exchange(&frame::polling(system_code))? else {
            return Ok(None);
        };
        let polled = frame::parse_polling(&response);
        if let Some((idm, _)) = &polled {
            self.idm = Some(idm.clone());
        }
        Ok(polled)
    }
}

impl_tag_technology!(PcscFelica);

#[async_trait]
impl FelicaTechnology for PcscFelica {
    async fn idm(&mut self) -> Result<Bytes> {
        let (idm, _) = self
            .poll(SYSTEM_CODE_ANY)?
            .ok_or_else(|| Error::connection("FeliCa card did not answer polling"))?;
        Ok(idm.into())
    }

    async fn system_codes(&mut self) -> Result<Vec<u16>> {
        let request = frame::request_system_code(self.current_idm()?);
        Ok(self
            .exchange(&request)?
            .map(|response| frame::parse_system_codes(&response))
            .unwrap_or_default())
    }

    async fn select_system(&mut self, system_code: u16) -> Result<Option<Bytes>> {
        Ok(self.poll(system_code)?.map(|(_, pmm)| pmm.into()))
    }

    async fn service_codes(&mut self) -> Result<Vec<u16>> {
        let idm = self.current_idm()?.to_vec();
        let mut codes = Vec::new();

        // Index 0 is the system itself
        for index in 1..=u16::MAX {
            let Some(response) = self.exchange(&frame::search_service_code(&idm, index))? else {
                break;
            };
            match frame::parse_search_service_code(&response) {
                SearchResult::Service(code) => codes.push(code),
                SearchResult::Area => {}
                SearchResult::End => break,
            }
        }
        Ok(codes)
    }

    async fn read_block(&mut self, service_code: u16, block: u8) -> Result<Option<Bytes>> {
        let request = frame::read_without_encryption(self.current_idm()?, service_code, block);
        Ok(self
            .exchange(&request)?
            .and_then(|response| frame::parse_read_block(&response))
            .map(Bytes::from))
    }
}
