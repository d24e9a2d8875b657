//! Error types for the PC/SC backend

use iso7816_tlv::TlvError;
use tapread_core::apdu::StatusWord;

/// PC/SC-specific errors
#[derive(Debug, thiserror::Error)]
pub enum PcscError {
    /// PC/SC error
    #[error("PC/SC error: {0}")]
    Pcsc(#[from] pcsc::Error),

    /// No readers available
    #[error("No PC/SC readers found. Is a USB NFC reader connected?")]
    NoReadersAvailable,

    /// Reader not found
    #[error("Reader not found: {0}")]
    ReaderNotFound(String),

    /// No card present in reader
    #[error("No card present in reader: {0}")]
    NoCard(String),

    /// Card was removed
    #[error("Card was removed")]
    CardRemoved,

    /// Card was reset by another application
    #[error("Card was reset")]
    CardReset,

    /// The reader rejected a pseudo-APDU
    #[error("Reader answered {0}")]
    Status(StatusWord),

    /// No card arrived in time
    #[error("Timed out waiting for a card")]
    Timeout,

    /// A raw frame does not fit a short transparent exchange
    #[error("Frame of {0} bytes is too long for the transparent exchange")]
    FrameTooLong(usize),

    /// Malformed data object in a transparent exchange
    #[error("TLV error: {0}")]
    Tlv(TlvError),
}

impl From<TlvError> for PcscError {
    fn from(error: TlvError) -> Self {
        Self::Tlv(error)
    }
}

impl From<PcscError> for tapread_core::Error {
    fn from(e: PcscError) -> Self {
        match e {
            PcscError::CardRemoved | PcscError::Pcsc(pcsc::Error::RemovedCard | pcsc::Error::NoSmartcard) => {
                Self::tag_lost(e.to_string())
            }
            PcscError::NoReadersAvailable |
            PcscError::ReaderNotFound(_) |
            PcscError::NoCard(_) |
            PcscError::Timeout => Self::connection(e.to_string()),
            PcscError::Status(status) => Self::Status { status },
            PcscError::CardReset | PcscError::Pcsc(_) | PcscError::FrameTooLong(_) | PcscError::Tlv(_) => {
                Self::transceive(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_card_is_tag_lost() {
        assert!(tapread_core::Error::from(PcscError::CardRemoved).is_tag_lost());
        assert!(tapread_core::Error::from(PcscError::Pcsc(pcsc::Error::RemovedCard)).is_tag_lost());
        assert!(!tapread_core::Error::from(PcscError::CardReset).is_tag_lost());
    }

    #[test]
    fn test_missing_card_is_connection_error() {
        let e = tapread_core::Error::from(PcscError::NoCard("ACS ACR122U".into()));
        assert!(matches!(e, tapread_core::Error::Connection(_)));
    }
}
