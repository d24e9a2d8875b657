//! Decoder registry for parsed transit cards
//!
//! A [`TransitFactory`] recognises one operator's cards among the parsed
//! [`Card`](tapread_core::Card)s of one chip family. The [`TransitRegistry`]
//! holds factories per [`CardType`](tapread_core::CardType) and picks the
//! first one that claims a card, shielding callers from decoders that fail
//! or panic.
//!
//! ```no_run
//! use tapread_transit::TransitRegistry;
//! # fn demo(card: &tapread_core::Card) {
//! let registry = TransitRegistry::with_defaults();
//! if let Some(identity) = registry.parse_identity(card) {
//!     println!("{}", identity.name);
//! }
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

mod error;
mod factory;
pub mod generic;
mod registry;

pub use error::{DecoderError, Result};
pub use factory::{CardInfo, InfoField, TransitBalance, TransitFactory, TransitIdentity, TransitInfo};
pub use registry::TransitRegistry;
