use crate::Error;

/// Card-level outcome of a CEPAS command
#[derive(Debug, thiserror::Error)]
pub enum CepasError {
    /// SW1 = 6B
    #[error("File {0} was an invalid file.")]
    InvalidFile(u8),

    /// SW1 = 67
    #[error("Got invalid file size response.")]
    InvalidFileSize,

    /// Any other SW1
    #[error("Got generic invalid response: {0:x}")]
    InvalidResponse(u8),

    /// SW1 = 90, SW2 = 9D
    #[error("Permission denied")]
    PermissionDenied,

    /// SW1 = 90 with an unexpected SW2
    #[error("Unknown status code: {0:x}")]
    UnknownStatus(u8),

    /// The exchange itself failed
    #[error(transparent)]
    Transport(#[from] Error),
}

impl CepasError {
    /// Whether the card refused access
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::PermissionDenied)
    }

    /// Whether the tag left the field
    pub fn is_tag_lost(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_tag_lost())
    }
}

impl From<CepasError> for Error {
    fn from(err: CepasError) -> Self {
        match err {
            CepasError::Transport(e) => e,
            other => Self::protocol(other.to_string()),
        }
    }
}
