//! Core error type for card acquisition
//!
//! Only failures that abort a whole read surface through this type. A sector,
//! page or file that cannot be read is recorded inside the raw card instead.

use crate::apdu::StatusWord;
use crate::card::ParseError;

/// Result alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Core error type that encompasses all possible errors in the crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    //
    // Connection related errors
    //
    /// The technology could not be opened, or the link dropped before the protocol started
    #[error("Connection error: {0}")]
    Connection(String),

    /// The tag left the field while a read was in progress
    #[error("Tag lost: {0}")]
    TagLost(String),

    /// A transceive failed at the transport layer
    #[error("Transceive error: {0}")]
    Transceive(String),

    /// The read was cancelled by the caller
    #[error("Read cancelled")]
    Cancelled,

    //
    // Shape related errors
    //
    /// The chip's sub-type could not be identified
    #[error("Unsupported card variant: {0}")]
    UnsupportedVariant(String),

    /// The card answered in a way the protocol does not allow
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Status word error from an APDU exchange
    #[error("Status error {status}: {}", .status.description())]
    Status {
        /// Status word returned by the card
        status: StatusWord,
    },

    //
    // Model related errors
    //
    /// A raw card could not be projected into a typed card
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// I/O error from a file-backed collaborator
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Serialization error from a file-backed collaborator
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    //
    // General errors
    //
    /// Context error with message and source error
    #[error("{context}: {source}")]
    Context {
        /// Contextual message
        context: String,
        /// Source error
        source: Box<Self>,
    },

    /// Generic dynamic error with string message
    #[error("{0}")]
    Message(String),
}

impl Error {
    /// Create a new error with context information
    pub fn with_context<S: Into<String>>(self, context: S) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a new error with a dynamic message
    pub fn message<S: Into<String>>(message: S) -> Self {
        Self::Message(message.into())
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection(message.into())
    }

    /// Create a new tag lost error
    pub fn tag_lost<S: Into<String>>(message: S) -> Self {
        Self::TagLost(message.into())
    }

    /// Create a new transceive error
    pub fn transceive<S: Into<String>>(message: S) -> Self {
        Self::Transceive(message.into())
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a new unsupported variant error
    pub fn unsupported_variant<S: Into<String>>(message: S) -> Self {
        Self::UnsupportedVariant(message.into())
    }

    /// Create a new status error
    pub const fn status(sw1: u8, sw2: u8) -> Self {
        Self::Status {
            status: StatusWord::new(sw1, sw2),
        }
    }

    /// Whether this error means the tag is gone, looking through any context
    pub fn is_tag_lost(&self) -> bool {
        match self {
            Self::TagLost(_) => true,
            Self::Context { source, .. } => source.is_tag_lost(),
            _ => false,
        }
    }
}

/// Extension trait for Result with core Errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<S: Into<String>>(self, context: S) -> Result<T, Error>;
}

impl<T> ResultExt<T> for Result<T, Error> {
    fn context<S: Into<String>>(self, context: S) -> Self {
        self.map_err(|e| e.with_context(context))
    }
}
