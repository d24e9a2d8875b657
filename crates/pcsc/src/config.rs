//! Configuration options for the PC/SC backend

use std::time::Duration;

use pcsc::{Protocols as PcscProtocols, ShareMode as PcscShareMode};

/// Sharing mode for card connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareMode {
    /// Exclusive access to the card
    Exclusive,
    /// Shared access to the card (default)
    Shared,
}

impl From<ShareMode> for PcscShareMode {
    fn from(mode: ShareMode) -> Self {
        match mode {
            ShareMode::Exclusive => Self::Exclusive,
            ShareMode::Shared => Self::Shared,
        }
    }
}

/// Which reader to take a card from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectStrategy {
    /// A specific reader, by exact name or by a substring of it
    Reader(String),
    /// The first reader currently holding a card
    AnyCard,
    /// The first reader the system lists
    FirstAvailable,
}

/// Configuration options for the PC/SC backend
#[derive(Debug, Clone)]
pub struct PcscConfig {
    /// Sharing mode for card connections
    pub share_mode: ShareMode,

    /// Preferred protocols for card communication
    pub protocols: PcscProtocols,

    /// How long to wait for a card to be presented, `None` waits forever
    pub card_timeout: Option<Duration>,
}

impl Default for PcscConfig {
    fn default() -> Self {
        Self {
            share_mode: ShareMode::Shared,
            protocols: PcscProtocols::ANY,
            card_timeout: None,
        }
    }
}

impl PcscConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sharing mode
    pub const fn with_share_mode(mut self, mode: ShareMode) -> Self {
        self.share_mode = mode;
        self
    }

    /// Set the preferred protocols
    pub const fn with_protocols(mut self, protocols: PcscProtocols) -> Self {
        self.protocols = protocols;
        self
    }

    /// Give up waiting for a card after `timeout`
    pub const fn with_card_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.card_timeout = timeout;
        self
    }
}
