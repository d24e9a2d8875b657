use crate::{Error, apdu::StatusWord};

/// Card-level outcome of an ISO 7816-4 command
#[derive(Debug, thiserror::Error)]
pub enum Iso7816Error {
    /// A lone byte came back instead of data and a status word
    #[error("Got 1-byte result: {0:02X}")]
    OneByteResult(u8),

    /// The card answered nothing at all
    #[error("Empty response")]
    EmptyResponse,

    /// 69 86
    #[error("No current EF")]
    NoCurrentEf,

    /// 69 82
    #[error("Security status not satisfied")]
    SecurityStatusNotSatisfied,

    /// 6A 82
    #[error("File not found")]
    FileNotFound,

    /// 6A 83, the end of a record file
    #[error("Record not found")]
    EndOfFile,

    /// 6D 00
    #[error("Instruction code not supported")]
    InstructionNotSupported,

    /// 6E 00
    #[error("Class not supported")]
    ClassNotSupported,

    /// Any other status word
    #[error("Got unknown result: {0}")]
    Unknown(StatusWord),

    /// The exchange itself failed
    #[error(transparent)]
    Transport(#[from] Error),
}

impl Iso7816Error {
    /// Map a non-success status word
    pub const fn from_status(status: StatusWord) -> Self {
        match (status.sw1, status.sw2) {
            (0x69, 0x86) => Self::NoCurrentEf,
            (0x69, 0x82) => Self::SecurityStatusNotSatisfied,
            (0x6A, 0x82) => Self::FileNotFound,
            (0x6A, 0x83) => Self::EndOfFile,
            (0x6D, 0x00) => Self::InstructionNotSupported,
            (0x6E, 0x00) => Self::ClassNotSupported,
            _ => Self::Unknown(status),
        }
    }

    /// Whether the card answered, as opposed to the link failing
    pub const fn is_card_error(&self) -> bool {
        !matches!(self, Self::Transport(_))
    }
}

impl From<Iso7816Error> for Error {
    fn from(err: Iso7816Error) -> Self {
        match err {
            Iso7816Error::Transport(e) => e,
            Iso7816Error::SecurityStatusNotSatisfied => Self::status(0x69, 0x82),
            Iso7816Error::Unknown(status) => Self::Status { status },
            other => Self::protocol(other.to_string()),
        }
    }
}
