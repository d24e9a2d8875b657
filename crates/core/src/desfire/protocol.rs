use tracing::trace;

use super::{DesfireError, MANUFACTURING_DATA_LEN, commands::*, status};
use crate::{apdu::Command, technology::CardTransceiver};

type Result<T> = std::result::Result<T, DesfireError>;

/// Native DESFire commands over an APDU transceiver
#[derive(Debug)]
pub struct DesfireProtocol<'a, T: ?Sized> {
    tech: &'a mut T,
}

impl<'a, T> DesfireProtocol<'a, T>
where
    T: CardTransceiver + ?Sized,
{
    /// Wrap a connected transceiver
    pub const fn new(tech: &'a mut T) -> Self {
        Self { tech }
    }

    /// Hardware, software and production data (GET VERSION)
    pub async fn manufacturing_data(&mut self) -> Result<Vec<u8>> {
        let data = self.send(GET_MANUFACTURING_DATA, &[]).await?;
        if data.len() != MANUFACTURING_DATA_LEN {
            return Err(DesfireError::InvalidResponse(format!(
                "manufacturing data is {} bytes, expected {MANUFACTURING_DATA_LEN}",
                data.len()
            )));
        }
        Ok(data)
    }

    /// Application ids on the card
    pub async fn app_list(&mut self) -> Result<Vec<u32>> {
        let data = self.send(GET_APPLICATION_DIRECTORY, &[]).await?;
        Ok(data
            .chunks_exact(3)
            .map(|id| u32::from_be_bytes([0, id[0], id[1], id[2]]))
            .collect())
    }

    /// Select an application by id
    pub async fn select_app(&mut self, app_id: u32) -> Result<()> {
        let [_, a, b, c] = app_id.to_be_bytes();
        self.send(SELECT_APPLICATION, &[a, b, c]).await?;
        Ok(())
    }

    /// File ids in the selected application
    pub async fn file_list(&mut self) -> Result<Vec<u8>> {
        self.send(GET_FILES, &[]).await
    }

    /// Raw settings record of a file
    pub async fn file_settings(&mut self, file_id: u8) -> Result<Vec<u8>> {
        self.send(GET_FILE_SETTINGS, &[file_id]).await
    }

    /// Whole contents of a standard or backup data file
    pub async fn read_file(&mut self, file_id: u8) -> Result<Vec<u8>> {
        self.send(READ_DATA, &[file_id, 0, 0, 0, 0, 0, 0]).await
    }

    /// Every record of a linear or cyclic record file
    pub async fn read_record(&mut self, file_id: u8) -> Result<Vec<u8>> {
        self.send(READ_RECORD, &[file_id, 0, 0, 0, 0, 0, 0]).await
    }

    /// Current value of a value file
    pub async fn get_value(&mut self, file_id: u8) -> Result<Vec<u8>> {
        self.send(GET_VALUE, &[file_id]).await
    }

    /// Send a command and collect every frame of the answer
    async fn send(&mut self, command: u8, params: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut apdu = wrap(command, params);

        loop {
            let response = self.tech.transceive(&apdu).await?;
            let [payload @ .., sw1, sw2] = &response[..] else {
                return Err(DesfireError::InvalidResponse(format!(
                    "response too short: {}",
                    hex::encode(&response)
                )));
            };
            if *sw1 != 0x91 {
                return Err(DesfireError::InvalidResponse(format!(
                    "unexpected status word {sw1:02X} {sw2:02X}"
                )));
            }
            output.extend_from_slice(payload);

            match *sw2 {
                status::OPERATION_OK => return Ok(output),
                status::ADDITIONAL_FRAME => {
                    trace!(received = output.len(), "Requesting additional frame");
                    apdu = wrap(GET_ADDITIONAL_FRAME, &[]);
                }
                status::PERMISSION_DENIED | status::AUTHENTICATION_ERROR => {
                    return Err(DesfireError::Unauthorized(*sw2));
                }
                status::APPLICATION_NOT_FOUND | status::FILE_NOT_FOUND => {
                    return Err(DesfireError::NotFound(*sw2));
                }
                other => return Err(DesfireError::UnknownStatus(other)),
            }
        }
    }
}

/// Native command in ISO 7816 framing: 90 cmd 00 00 [Lc data] 00
pub(crate) fn wrap(command: u8, params: &[u8]) -> Vec<u8> {
    Command::new_with_data(0x90, command, 0x00, 0x00, params.to_vec())
        .with_le(0x00)
        .to_bytes()
        .to_vec()
}
