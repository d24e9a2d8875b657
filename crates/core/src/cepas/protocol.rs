use tracing::trace;

use super::{CepasError, TRANSACTION_SIZE};
use crate::{apdu::Command, technology::CardTransceiver};

type Result<T> = std::result::Result<T, CepasError>;

const CLA: u8 = 0x90;
const INS_READ_PURSE: u8 = 0x32;

/// Transactions returned by one history request
const RECORDS_PER_REQUEST: u8 = 15;

/// SELECT of the purse DF 4000
pub const SELECT_PURSE_DF: [u8; 7] = [0x00, 0xA4, 0x00, 0x00, 0x02, 0x40, 0x00];

/// CEPAS purse and transaction log commands
#[derive(Debug)]
pub struct CepasProtocol<'a, T: ?Sized> {
    tech: &'a mut T,
}

impl<'a, T> CepasProtocol<'a, T>
where
    T: CardTransceiver + ?Sized,
{
    /// Wrap a connected transceiver
    pub const fn new(tech: &'a mut T) -> Self {
        Self { tech }
    }

    /// Select the purse directory; the answer is not checked
    pub async fn select_purse_df(&mut self) -> Result<()> {
        self.tech.transceive(&SELECT_PURSE_DF).await?;
        Ok(())
    }

    /// READ PURSE
    pub async fn purse(&mut self, purse_id: u8) -> Result<Vec<u8>> {
        self.select_purse_df().await?;
        let command = Command::new_with_data(CLA, INS_READ_PURSE, purse_id, 0x00, vec![0x00]);
        self.send(purse_id, &command).await
    }

    /// Read `record_count` transactions from the purse log
    ///
    /// The log is fetched in two requests above 15 records; a failure of
    /// the second one keeps the first part.
    pub async fn history(&mut self, purse_id: u8, record_count: u8) -> Result<Vec<u8>> {
        let first = record_count.min(RECORDS_PER_REQUEST);
        let mut history = self.history_part(purse_id, 0, first).await?;

        if record_count > RECORDS_PER_REQUEST {
            let rest = (record_count - RECORDS_PER_REQUEST).min(RECORDS_PER_REQUEST);
            match self.history_part(purse_id, RECORDS_PER_REQUEST, rest).await {
                Ok(more) => history.extend(more),
                Err(e) if e.is_tag_lost() => return Err(e),
                Err(e) => trace!(error = %e, "Second history request failed"),
            }
        }
        Ok(history)
    }

    async fn history_part(&mut self, purse_id: u8, offset: u8, count: u8) -> Result<Vec<u8>> {
        let command = Command::new_with_data(CLA, INS_READ_PURSE, purse_id, 0x00, vec![offset])
            .with_le(count * TRANSACTION_SIZE as u8);
        self.send(purse_id, &command).await
    }

    async fn send(&mut self, purse_id: u8, command: &Command) -> Result<Vec<u8>> {
        let raw = self.tech.transceive(&command.to_bytes()).await?;
        let [payload @ .., sw1, sw2] = &raw[..] else {
            return Err(CepasError::InvalidResponse(raw.first().copied().unwrap_or_default()));
        };

        match (*sw1, *sw2) {
            (0x90, 0x00) => Ok(payload.to_vec()),
            (0x90, 0x9D) => Err(CepasError::PermissionDenied),
            (0x90, other) => Err(CepasError::UnknownStatus(other)),
            (0x6B, _) => Err(CepasError::InvalidFile(purse_id)),
            (0x67, _) => Err(CepasError::InvalidFileSize),
            (other, _) => Err(CepasError::InvalidResponse(other)),
        }
    }
}
