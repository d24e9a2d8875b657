//! PC/SC reader backend for tapread
//!
//! This crate implements the technology traits of `tapread-core` on top of
//! a PC/SC contactless reader. The card family is detected from the ATR the
//! reader synthesises, then the matching reader runs through
//! [`read_tag`](tapread_core::read_tag) so the card is always disconnected.
//!
//! # Examples
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use std::time::Duration;
//!
//! use tapread_pcsc::{ConnectStrategy, PcscConfig, PcscDeviceManager, ScanOptions, read_card};
//! use tokio_util::sync::CancellationToken;
//!
//! let manager = PcscDeviceManager::new()?;
//! let reader = manager.wait_for_card(&ConnectStrategy::AnyCard, Duration::from_secs(30))?;
//! println!("Card in {}", reader.name());
//!
//! let connection = manager.open(&reader, PcscConfig::default())?;
//! let raw = read_card(connection, &ScanOptions::default(), &CancellationToken::new()).await?;
//! println!("{}", serde_json::to_string_pretty(&raw)?);
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![warn(missing_docs)]

mod atr;
mod config;
mod connection;
mod error;
mod manager;
mod reader;
mod scan;
pub mod tech;
mod transparent;

pub use atr::{AtrInfo, historical_bytes};
pub use config::{ConnectStrategy, PcscConfig, ShareMode};
pub use connection::PcscConnection;
pub use error::PcscError;
pub use manager::PcscDeviceManager;
pub use reader::PcscReader;
pub use scan::{ScanOptions, read_card};

// Re-export some pcsc types for convenience
pub use pcsc::{Protocol, Protocols};
