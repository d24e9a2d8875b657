//! Acquisition core for contactless transit cards
//!
//! This crate drives the low-level protocols of the chip families used by
//! transit operators and turns whatever the card gives up into an immutable,
//! serializable [`RawCard`].
//!
//! ## Overview
//!
//! - [`technology`] declares the capability traits a platform implements per chip family
//! - [`lifecycle`] runs one read: connect, protocol, guaranteed disconnect
//! - one module per chip family ([`classic`], [`ultralight`], [`vicinity`],
//!   [`desfire`], [`iso7816`], [`cepas`], [`felica`]) holds its reader, raw units
//!   and parsed card
//! - [`keys`] supplies candidate MIFARE Classic keys from an injected [`keys::KeyStore`]
//! - [`card`] ties the families together as [`RawCard`] and [`Card`]
//!
//! A unit that cannot be read never aborts a scan. It is recorded as
//! unauthorized or invalid inside the raw card, and only a failure to
//! determine the chip's shape escapes a reader as an [`Error`].
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod apdu;
pub mod card;
pub mod cepas;
pub mod classic;
pub mod desfire;
pub mod felica;
pub mod iso7816;
pub mod keys;
pub mod lifecycle;
pub mod serde_hex;
pub mod tag;
pub mod technology;
pub mod ultralight;
pub mod vicinity;

mod error;
pub use error::{Error, Result, ResultExt};

pub use card::{Card, ParseError, RawCard};
pub use lifecycle::{TagReader, read_tag};
pub use tag::{CardType, TagId};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Bytes, Card, CardType, Error, RawCard, Result, ResultExt, TagId,
        keys::{ClassicCardKeys, ClassicKey, ClassicSectorKey, KeyStore, KeyType},
        lifecycle::{TagReader, read_tag},
        technology::{
            CardTransceiver, ClassicRawTechnology, ClassicTechnology, FelicaTechnology,
            TagTechnology, UltralightTechnology, VicinityTechnology,
        },
    };
    pub use tokio_util::sync::CancellationToken;
}
