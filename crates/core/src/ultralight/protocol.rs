use tracing::{debug, instrument};

use super::UltralightType;
use crate::{Result, technology::UltralightTechnology};

const GET_VERSION: u8 = 0x60;
const AUTH_1: u8 = 0x1A;
const HALT: u8 = 0x50;

/// Probe the tag to find out which Ultralight it is
///
/// EV1 and NTAG parts answer GET_VERSION. Older parts drop the link instead,
/// so the tag is reconnected and probed with the Ultralight C AUTH_1 command.
/// An answer means Ultralight C, which is then halted and reconnected; no
/// answer means the original Ultralight.
#[instrument(skip_all)]
pub async fn detect_type<T>(tech: &mut T) -> Result<UltralightType>
where
    T: UltralightTechnology + ?Sized,
{
    match tech.transceive(&[GET_VERSION]).await {
        Ok(version) => return UltralightType::from_version(&version),
        Err(e) => debug!(error = %e, "GET_VERSION failed, not an EV1"),
    }

    tech.reconnect().await?;

    if let Err(e) = tech.transceive(&[AUTH_1, 0x00]).await {
        debug!(error = %e, "AUTH_1 failed, not an Ultralight C");
        tech.reconnect().await?;
        return Ok(UltralightType::Mf0icu1);
    }

    // Abort the pending authentication; the tag usually errors here
    if let Err(e) = tech.transceive(&[HALT, 0x00]).await {
        debug!(error = %e, "Ignoring HALT error");
    }
    tech.reconnect().await?;

    Ok(UltralightType::Mf0icu2)
}
