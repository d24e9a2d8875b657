use async_trait::async_trait;
use bytes::Bytes;
use tapread_core::{
    Error, Result,
    technology::VicinityTechnology,
    vicinity::{GET_SYSTEM_INFO, READ_SINGLE_BLOCK},
};

use super::{impl_tag_technology, read_binary};
use crate::{PcscConnection, PcscError};

/// Answer flags for "block not available"
const BLOCK_UNAVAILABLE: [u8; 2] = [0x01, 0x10];

/// ISO 15693 tag behind a reader that only offers READ BINARY
///
/// Addressed READ SINGLE BLOCK requests are translated; anything else is
/// refused, so system information stays unknown.
#[derive(Debug)]
pub struct PcscVicinity {
    connection: PcscConnection,
    uid: Vec<u8>,
}

impl PcscVicinity {
    /// Wrap an open connection to the tag with `uid`
    pub const fn new(connection: PcscConnection, uid: Vec<u8>) -> Self {
        Self { connection, uid }
    }
}

impl_tag_technology!(PcscVicinity);

#[async_trait]
impl VicinityTechnology for PcscVicinity {
    fn uid(&self) -> &[u8] {
        &self.uid
    }

    async fn do_transceive(&mut self, data: &[u8]) -> Result<Bytes> {
        match data {
            [_, READ_SINGLE_BLOCK, .., block] => {
                match self.connection.command(&read_binary(u16::from(*block), 0x00)) {
                    Ok(data) => Ok([&[0x00][..], &data[..]].concat().into()),
                    Err(PcscError::Status(_)) => Ok(Bytes::from_static(&BLOCK_UNAVAILABLE)),
                    Err(e) => Err(e.into()),
                }
            }
            [_, GET_SYSTEM_INFO, ..] => Err(Error::unsupported_variant("system information over PC/SC")),
            _ => Err(Error::protocol(format!("request {} has no PC/SC equivalent", hex::encode(data)))),
        }
    }
}
