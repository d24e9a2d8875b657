//! Card connection through a PC/SC reader

use std::{ffi::CString, fmt};

use bytes::Bytes;
use pcsc::{Card, Context, Disposition, MAX_BUFFER_SIZE_EXTENDED};
use tapread_core::apdu::StatusWord;
use tracing::{debug, trace};

use crate::{config::PcscConfig, error::PcscError, transparent};

/// GET DATA for the card UID, answered by the reader itself
const GET_UID: [u8; 5] = [0xFF, 0xCA, 0x00, 0x00, 0x00];

/// An open link to the card in one reader
///
/// Closing disconnects with a warm reset, so a card that went quiet after
/// an unsupported command answers again on the next connect.
pub struct PcscConnection {
    context: Context,
    card: Option<Card>,
    reader_name: String,
    config: PcscConfig,
    transparent_session: bool,
}

impl fmt::Debug for PcscConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscConnection")
            .field("reader_name", &self.reader_name)
            .field("has_card", &self.card.is_some())
            .field("config", &self.config)
            .field("transparent_session", &self.transparent_session)
            .finish()
    }
}

impl PcscConnection {
    /// Connect to the card in `reader_name`
    pub(crate) fn open(context: Context, reader_name: &str, config: PcscConfig) -> Result<Self, PcscError> {
        let mut connection = Self {
            context,
            card: None,
            reader_name: reader_name.to_string(),
            config,
            transparent_session: false,
        };
        connection.connect()?;
        Ok(connection)
    }

    /// Connect if not already connected
    pub fn connect(&mut self) -> Result<(), PcscError> {
        if self.card.is_some() {
            return Ok(());
        }

        let reader = CString::new(self.reader_name.clone())
            .map_err(|_| PcscError::ReaderNotFound(self.reader_name.clone()))?;

        match self
            .context
            .connect(&reader, self.config.share_mode.into(), self.config.protocols)
        {
            Ok(card) => {
                debug!(reader = %self.reader_name, "Connected to card");
                self.card = Some(card);
                Ok(())
            }
            Err(pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard) => {
                Err(PcscError::NoCard(self.reader_name.clone()))
            }
            Err(pcsc::Error::UnknownReader) => Err(PcscError::ReaderNotFound(self.reader_name.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Disconnect, resetting the card
    ///
    /// An open transparent session is ended first; failing to end it is only
    /// logged.
    pub fn disconnect(&mut self) -> Result<(), PcscError> {
        if self.transparent_session {
            self.transparent_session = false;
            if let Err(e) = transparent::end_session().and_then(|command| self.command(&command)) {
                debug!(error = %e, "Could not end transparent session");
            }
        }
        let Some(card) = self.card.take() else {
            return Ok(());
        };
        card.disconnect(Disposition::ResetCard).map_err(|(_, e)| match e {
            pcsc::Error::RemovedCard | pcsc::Error::NoSmartcard => PcscError::CardRemoved,
            e => e.into(),
        })
    }

    /// Whether a card connection is open
    pub const fn is_connected(&self) -> bool {
        self.card.is_some()
    }

    /// Get the reader name
    pub fn reader_name(&self) -> &str {
        &self.reader_name
    }

    /// Get the ATR of the current card
    pub fn atr(&self) -> Result<Vec<u8>, PcscError> {
        let card = self.card()?;
        Ok(card.get_attribute_owned(pcsc::Attribute::AtrString)?)
    }

    /// Card UID, empty when the reader cannot tell
    pub fn uid(&self) -> Result<Vec<u8>, PcscError> {
        match self.command(&GET_UID) {
            Ok(uid) => Ok(uid.to_vec()),
            Err(PcscError::Status(status)) => {
                debug!(%status, "Reader did not report a UID");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Transmit raw bytes and return the raw response, status word included
    pub fn transmit(&self, command: &[u8]) -> Result<Bytes, PcscError> {
        let card = self.card()?;
        let mut buffer = vec![0u8; MAX_BUFFER_SIZE_EXTENDED];

        trace!(command = %hex::encode(command), "Transmitting");
        match card.transmit(command, &mut buffer) {
            Ok(response) => {
                trace!(response = %hex::encode(response), "Received");
                Ok(Bytes::copy_from_slice(response))
            }
            Err(pcsc::Error::RemovedCard | pcsc::Error::NoSmartcard) => Err(PcscError::CardRemoved),
            Err(pcsc::Error::ResetCard) => Err(PcscError::CardReset),
            Err(e) => Err(e.into()),
        }
    }

    /// Transmit a reader pseudo-APDU, returning its data when it answers `90 00`
    pub fn command(&self, command: &[u8]) -> Result<Bytes, PcscError> {
        let response = self.transmit(command)?;
        split_status(response)
    }

    /// Send a raw contactless frame to the card and return its answer
    ///
    /// The first frame opens a transparent session, which stays open until
    /// [`disconnect`](Self::disconnect). A reader without transparent
    /// sessions refuses with [`PcscError::Status`].
    pub fn transceive_frame(&mut self, frame: &[u8]) -> Result<Bytes, PcscError> {
        if !self.transparent_session {
            transparent::parse_response(&self.command(&transparent::start_session()?)?)?;
            self.transparent_session = true;
            debug!(reader = %self.reader_name, "Transparent session started");
        }
        let response = self.command(&transparent::exchange(frame)?)?;
        transparent::parse_response(&response)
    }

    fn card(&self) -> Result<&Card, PcscError> {
        self.card
            .as_ref()
            .ok_or_else(|| PcscError::NoCard(self.reader_name.clone()))
    }
}

impl Drop for PcscConnection {
    fn drop(&mut self) {
        if let Some(card) = self.card.take() {
            let _ = card.disconnect(Disposition::LeaveCard);
        }
    }
}

/// Strip the status word, failing unless it is `90 00`
pub(crate) fn split_status(mut response: Bytes) -> Result<Bytes, PcscError> {
    if response.len() < 2 {
        return Err(PcscError::Status(StatusWord::new(0x6F, 0x00)));
    }
    let trailer = response.split_off(response.len() - 2);
    let status = StatusWord::new(trailer[0], trailer[1]);
    if status.is_success() { Ok(response) } else { Err(PcscError::Status(status)) }
}
