use chrono::Utc;
use tracing::{debug, instrument, warn};

use super::{FLAGS_ADDRESSED, GET_SYSTEM_INFO, MAX_BLOCKS, READ_SINGLE_BLOCK, RawVicinityCard, VicinityPage};
use crate::{Result, TagId, technology::VicinityTechnology};

/// Read system information and every block
///
/// The read ends normally on an empty answer or an error flag. A transceive
/// failure also ends it, with the card flagged as a partial read.
#[instrument(skip_all, fields(tag_id = %tag_id))]
pub async fn read_card<T>(tag_id: &TagId, tech: &mut T) -> Result<RawVicinityCard>
where
    T: VicinityTechnology + ?Sized,
{
    let uid = tech.uid().to_vec();
    let system_info = read_system_info(tech, &uid).await;

    let mut pages = Vec::new();
    let mut is_partial_read = false;

    for index in 0..MAX_BLOCKS {
        // MAX_BLOCKS is 256, so every index fits the one-byte address
        let Ok(block) = u8::try_from(index) else { break };
        let command = [&[FLAGS_ADDRESSED, READ_SINGLE_BLOCK][..], uid.as_slice(), &[block]].concat();

        match tech.transceive(&command).await {
            Ok(response) => match response.split_first() {
                None => {
                    debug!(block, "Empty answer, end of memory");
                    break;
                }
                Some((0x00, data)) => pages.push(VicinityPage::new(index, data.to_vec())),
                Some((flags, rest)) => {
                    debug!(block, flags, error = ?hex::encode(rest), "Error flag set, end of memory");
                    break;
                }
            },
            Err(e) => {
                warn!(block, error = %e, "Block read failed, stopping");
                is_partial_read = true;
                break;
            }
        }
    }

    Ok(RawVicinityCard {
        tag_id: tag_id.clone(),
        scanned_at: Utc::now(),
        system_info,
        pages,
        is_partial_read,
    })
}

async fn read_system_info<T>(tech: &mut T, uid: &[u8]) -> Option<Vec<u8>>
where
    T: VicinityTechnology + ?Sized,
{
    let command = [&[FLAGS_ADDRESSED, GET_SYSTEM_INFO][..], uid].concat();
    match tech.transceive(&command).await.as_deref() {
        Ok([0x00, info @ ..]) => Some(info.to_vec()),
        Ok(other) => {
            debug!(response = ?hex::encode(other), "System info refused");
            None
        }
        Err(e) => {
            debug!(error = %e, "System info unavailable");
            None
        }
    }
}
