use async_trait::async_trait;
use bytes::Bytes;

use super::TagTechnology;
use crate::Result;

/// FeliCa (NFC-F) capability
///
/// Higher level than the other technologies: platforms differ in how much
/// of the FeliCa command set they expose, so the reader works in terms of
/// polling, code discovery and unencrypted block reads.
#[async_trait]
pub trait FelicaTechnology: TagTechnology {
    /// Poll the wildcard system and return the 8-byte IDm
    async fn idm(&mut self) -> Result<Bytes>;

    /// System codes reported by the card, possibly empty
    async fn system_codes(&mut self) -> Result<Vec<u16>>;

    /// Poll a system code, returning the card's PMm if it answers
    async fn select_system(&mut self, system_code: u16) -> Result<Option<Bytes>>;

    /// Service codes of the currently selected system
    async fn service_codes(&mut self) -> Result<Vec<u16>>;

    /// Read one 16-byte block without encryption, `None` when the card refuses
    async fn read_block(&mut self, service_code: u16, block: u8) -> Result<Option<Bytes>>;
}
