use tracing::{debug, trace};

use super::Iso7816Error;
use crate::{
    apdu::{Command, Response},
    technology::CardTransceiver,
};

type Result<T> = std::result::Result<T, Iso7816Error>;

/// Interindustry class
pub const CLASS_ISO7816: u8 = 0x00;
/// Proprietary class used by China transit cards
pub const CLASS_80: u8 = 0x80;
/// Proprietary class used by KSX6924 and CEPAS
pub const CLASS_90: u8 = 0x90;

const INS_SELECT: u8 = 0xA4;
const INS_READ_BINARY: u8 = 0xB0;
const INS_READ_RECORD: u8 = 0xB2;
const INS_GET_RESPONSE: u8 = 0xC0;

const SELECT_BY_NAME: u8 = 0x04;

/// Read-only ISO 7816-4 commands over an APDU transceiver
#[derive(Debug)]
pub struct Iso7816Protocol<'a, T: ?Sized> {
    tech: &'a mut T,
}

impl<'a, T> Iso7816Protocol<'a, T>
where
    T: CardTransceiver + ?Sized,
{
    /// Wrap a connected transceiver
    pub const fn new(tech: &'a mut T) -> Self {
        Self { tech }
    }

    /// Send a command and return the payload of a 90 00 answer
    ///
    /// Le is always sent, 0 meaning "as much as you have". A 6C xx answer is
    /// retried once with the length the card asked for, and 61 xx answers
    /// are drained with GET RESPONSE.
    pub async fn send_request(
        &mut self,
        cla: u8,
        ins: u8,
        p1: u8,
        p2: u8,
        le: u8,
        params: &[u8],
    ) -> Result<Vec<u8>> {
        let mut response = self.exchange(&build(cla, ins, p1, p2, le, params)).await?;

        if let Some(corrected) = response.status().corrected_length() &&
            corrected != le
        {
            debug!(le, corrected, "Wrong length, retrying");
            response = self.exchange(&build(cla, ins, p1, p2, corrected, params)).await?;
        }

        let mut payload = response.payload().to_vec();
        while let Some(remaining) = response.status().remaining_bytes() {
            trace!(remaining, "Fetching remaining bytes");
            response = self
                .exchange(&build(CLASS_ISO7816, INS_GET_RESPONSE, 0x00, 0x00, remaining, &[]))
                .await?;
            payload.extend_from_slice(response.payload());
        }

        if !response.is_success() {
            return Err(Iso7816Error::from_status(response.status()));
        }
        Ok(payload)
    }

    /// SELECT by application name, returning the FCI
    pub async fn select_by_name(&mut self, name: &[u8], next_occurrence: bool) -> Result<Vec<u8>> {
        let p2 = if next_occurrence { 0x02 } else { 0x00 };
        self.send_request(CLASS_ISO7816, INS_SELECT, SELECT_BY_NAME, p2, 0x00, name)
            .await
    }

    /// SELECT by name, `None` on any failure
    pub async fn select_by_name_or_none(&mut self, name: &[u8]) -> Option<Vec<u8>> {
        match self.select_by_name(name, false).await {
            Ok(fci) => Some(fci),
            Err(e) => {
                debug!(name = ?hex::encode(name), error = %e, "Application not selected");
                None
            }
        }
    }

    /// Return to the master file
    pub async fn unselect_file(&mut self) -> Result<()> {
        self.send_request(CLASS_ISO7816, INS_SELECT, 0x00, 0x00, 0x00, &[])
            .await?;
        Ok(())
    }

    /// SELECT by two-byte file id, returning the FCI
    pub async fn select_by_id(&mut self, file_id: u16) -> Result<Vec<u8>> {
        self.send_request(CLASS_ISO7816, INS_SELECT, 0x00, 0x00, 0x00, &file_id.to_be_bytes())
            .await
    }

    /// READ RECORD from the current file
    ///
    /// End of file is an error so callers can stop; other card refusals
    /// are `None`.
    pub async fn read_record(&mut self, record: u8, le: u8) -> Result<Option<Vec<u8>>> {
        let result = self
            .send_request(CLASS_ISO7816, INS_READ_RECORD, record, 0x04, le, &[])
            .await;
        card_errors_as_none(result)
    }

    /// READ RECORD from a file by short file identifier
    pub async fn read_record_sfi(&mut self, sfi: u8, record: u8, le: u8) -> Result<Option<Vec<u8>>> {
        let result = self
            .send_request(CLASS_ISO7816, INS_READ_RECORD, record, (sfi << 3) | 0x04, le, &[])
            .await;
        card_errors_as_none(result)
    }

    /// READ BINARY of the current file
    pub async fn read_binary(&mut self) -> Result<Option<Vec<u8>>> {
        let result = self
            .send_request(CLASS_ISO7816, INS_READ_BINARY, 0x00, 0x00, 0x00, &[])
            .await;
        card_errors_as_none(result)
    }

    /// READ BINARY of a file by short file identifier
    pub async fn read_binary_sfi(&mut self, sfi: u8) -> Result<Option<Vec<u8>>> {
        let result = self
            .send_request(CLASS_ISO7816, INS_READ_BINARY, 0x80 | sfi, 0x00, 0x00, &[])
            .await;
        card_errors_as_none(result)
    }

    async fn exchange(&mut self, apdu: &[u8]) -> Result<Response> {
        let raw = self.tech.transceive(apdu).await?;
        match raw[..] {
            [] => Err(Iso7816Error::EmptyResponse),
            [byte] => Err(Iso7816Error::OneByteResult(byte)),
            _ => Ok(Response::from_bytes(&raw)?),
        }
    }
}

fn build(cla: u8, ins: u8, p1: u8, p2: u8, le: u8, params: &[u8]) -> Vec<u8> {
    let command = if params.is_empty() {
        Command::new_with_le(cla, ins, p1, p2, le)
    } else {
        Command::new_with_data(cla, ins, p1, p2, params.to_vec()).with_le(le)
    };
    command.to_bytes().to_vec()
}

fn card_errors_as_none(result: Result<Vec<u8>>) -> Result<Option<Vec<u8>>> {
    match result {
        Ok(data) => Ok(Some(data)),
        Err(Iso7816Error::EndOfFile) => Err(Iso7816Error::EndOfFile),
        Err(e) if e.is_card_error() => Ok(None),
        Err(e) => Err(e),
    }
}
