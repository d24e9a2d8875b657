use crate::Error;

/// Card-level outcome of a DESFire command
#[derive(Debug, thiserror::Error)]
pub enum DesfireError {
    /// The card refused the command without authentication
    #[error("Permission denied (status {0:02X})")]
    Unauthorized(u8),

    /// The application or file does not exist
    #[error("Not found (status {0:02X})")]
    NotFound(u8),

    /// Any other DESFire status
    #[error("Unknown DESFire status {0:02X}")]
    UnknownStatus(u8),

    /// The answer does not follow DESFire framing
    #[error("Invalid DESFire response: {0}")]
    InvalidResponse(String),

    /// The exchange itself failed
    #[error(transparent)]
    Transport(#[from] Error),
}

impl DesfireError {
    /// Whether the card refused access
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Whether the target does not exist
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<DesfireError> for Error {
    fn from(err: DesfireError) -> Self {
        match err {
            DesfireError::Transport(e) => e,
            other => Self::protocol(other.to_string()),
        }
    }
}
