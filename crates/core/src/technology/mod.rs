//! Technology capability traits
//!
//! A platform (PC/SC reader, phone NFC stack, test double) implements one of
//! these traits per chip family it can talk to. A capability instance is an
//! open, stateful connection to one tag for one read, and is exclusively
//! borrowed by the reader for that read.

mod classic;
mod felica;
mod transceiver;
mod ultralight;
mod vicinity;

#[cfg(test)]
pub(crate) mod mock;

use std::fmt;

use async_trait::async_trait;
use tracing::debug;

pub use classic::{ClassicRawTechnology, ClassicTechnology};
pub use felica::FelicaTechnology;
pub use transceiver::CardTransceiver;
pub use ultralight::UltralightTechnology;
pub use vicinity::VicinityTechnology;

use crate::Result;

/// Connection management shared by every technology
#[async_trait]
pub trait TagTechnology: Send + fmt::Debug {
    /// Open the technology-specific channel
    ///
    /// Fails with [`Error::Connection`](crate::Error::Connection) when the
    /// tag does not speak this technology or left the field.
    async fn connect(&mut self) -> Result<()>;

    /// Close the channel
    async fn close(&mut self) -> Result<()>;

    /// Whether the channel is open
    fn is_connected(&self) -> bool;

    /// Drop and re-open the link
    ///
    /// Some chips deliberately go quiet after an unsupported command, so a
    /// failing close is expected here and only logged.
    async fn reconnect(&mut self) -> Result<()> {
        if let Err(e) = self.close().await {
            debug!(error = %e, "Ignoring close error during reconnect");
        }
        self.connect().await
    }
}
