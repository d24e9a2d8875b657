//! ISO 7816-4 applications (China transit, KSX6924)
//!
//! The reader selects applications by name from a list of profiles and
//! dumps whatever files they expose, plus a few proprietary balance
//! commands. ISO-DEP tags that answer none of the profiles are handed to
//! the DESFire reader by [`read_iso_dep`].

mod card;
mod config;
mod error;
mod protocol;
mod raw;
mod reader;

pub use card::{Iso7816Application, Iso7816Card};
pub use config::{FileSelector, Iso7816AppConfig, Iso7816Profile, default_app_configs};
pub use error::Iso7816Error;
pub use protocol::Iso7816Protocol;
pub use raw::{Iso7816File, Iso7816Record, RawIso7816Application, RawIso7816Card};
pub use reader::read_card;

use tracing::{debug, instrument};

use crate::{RawCard, Result, TagId, desfire, technology::CardTransceiver};

/// Read an ISO-DEP tag as ISO 7816 if a profile matches, otherwise as DESFire
#[instrument(skip_all, fields(tag_id = %tag_id))]
pub async fn read_iso_dep<T>(tag_id: &TagId, tech: &mut T, configs: &[Iso7816AppConfig]) -> Result<RawCard>
where
    T: CardTransceiver + ?Sized,
{
    match read_card(tag_id, tech, configs).await {
        Ok(Some(card)) => return Ok(RawCard::Iso7816(card)),
        Ok(None) => {}
        Err(e) if e.is_tag_lost() => return Err(e),
        Err(e) => debug!(error = %e, "ISO 7816 read failed, trying DESFire"),
    }
    desfire::read_card(tag_id, tech).await.map(RawCard::MifareDesfire)
}
