//! Device manager for PC/SC operations

use std::{ffi::CString, time::Duration};

use pcsc::{Context, ReaderState, Scope, State};
use tracing::debug;

use crate::{
    config::{ConnectStrategy, PcscConfig},
    connection::PcscConnection,
    error::PcscError,
    reader::{PcscReader, is_present},
};

/// Manager for PC/SC device operations
#[allow(missing_debug_implementations)]
pub struct PcscDeviceManager {
    context: Context,
}

impl PcscDeviceManager {
    /// Establish a PC/SC context
    pub fn new() -> Result<Self, PcscError> {
        let context = Context::establish(Scope::User)?;
        Ok(Self { context })
    }

    /// List all available card readers
    pub fn list_readers(&self) -> Result<Vec<PcscReader>, PcscError> {
        let readers = match self.context.list_readers_owned() {
            Ok(readers) => readers,
            Err(pcsc::Error::NoReadersAvailable) => return Err(PcscError::NoReadersAvailable),
            Err(e) => return Err(e.into()),
        };
        if readers.is_empty() {
            return Err(PcscError::NoReadersAvailable);
        }

        let mut states: Vec<_> = readers
            .into_iter()
            .map(|name| ReaderState::new(name, State::UNAWARE))
            .collect();
        if let Err(e) = self.context.get_status_change(None, &mut states) {
            // If we can't get status, assume no card
            debug!(error = %e, "Reader status unavailable");
            return Ok(states
                .iter()
                .map(|state| PcscReader::new(state.name().to_string_lossy().into_owned(), false, None))
                .collect());
        }

        Ok(states.iter().map(PcscReader::from_reader_state).collect())
    }

    /// Pick the reader `strategy` designates among the current readers
    pub fn select_reader(&self, strategy: &ConnectStrategy) -> Result<PcscReader, PcscError> {
        let readers = self.list_readers()?;
        match strategy {
            ConnectStrategy::Reader(wanted) => readers
                .into_iter()
                .find(|reader| reader.matches(wanted))
                .ok_or_else(|| PcscError::ReaderNotFound(wanted.clone())),
            ConnectStrategy::AnyCard => readers
                .into_iter()
                .find(PcscReader::has_card)
                .ok_or_else(|| PcscError::NoCard("any reader".into())),
            ConnectStrategy::FirstAvailable => readers
                .into_iter()
                .next()
                .ok_or(PcscError::NoReadersAvailable),
        }
    }

    /// Block until a card is present in the designated reader, or `timeout` passes
    ///
    /// Returns the reader with the card's ATR.
    pub fn wait_for_card(&self, strategy: &ConnectStrategy, timeout: Duration) -> Result<PcscReader, PcscError> {
        let reader = match self.select_reader(strategy) {
            Ok(reader) => reader,
            // Nothing presented yet; watch every reader
            Err(PcscError::NoCard(_)) if *strategy == ConnectStrategy::AnyCard => {
                return self.wait_any(timeout);
            }
            Err(e) => return Err(e),
        };
        if reader.has_card() {
            return Ok(reader);
        }

        debug!(reader = reader.name(), "Waiting for card");
        let name = CString::new(reader.name()).map_err(|_| PcscError::ReaderNotFound(reader.name().into()))?;
        let mut states = vec![ReaderState::new(name, State::EMPTY)];
        self.await_presence(&mut states, timeout)
    }

    fn wait_any(&self, timeout: Duration) -> Result<PcscReader, PcscError> {
        let mut states: Vec<_> = self
            .context
            .list_readers_owned()?
            .into_iter()
            .map(|name| ReaderState::new(name, State::EMPTY))
            .collect();
        self.await_presence(&mut states, timeout)
    }

    fn await_presence(&self, states: &mut [ReaderState], timeout: Duration) -> Result<PcscReader, PcscError> {
        match self.context.get_status_change(Some(timeout), states) {
            Ok(()) => {}
            Err(pcsc::Error::Timeout) => return Err(PcscError::Timeout),
            Err(e) => return Err(e.into()),
        }
        states
            .iter()
            .find(|state| is_present(state.event_state()))
            .map(PcscReader::from_reader_state)
            .ok_or(PcscError::Timeout)
    }

    /// Open a connection to the card in a reader
    pub fn open(&self, reader: &PcscReader, config: PcscConfig) -> Result<PcscConnection, PcscError> {
        PcscConnection::open(self.context.clone(), reader.name(), config)
    }
}
