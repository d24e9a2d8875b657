use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, instrument, warn};

use super::{RawClassicCard, RawClassicSector};
use crate::{
    Result, TagId,
    keys::{ClassicKeyMaterial, KeyCandidate},
    technology::ClassicTechnology,
};

/// Tuning for a Classic read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassicReadOptions {
    /// Re-authentications allowed when a block read answers a single byte
    pub max_nak_retries: u8,
}

impl Default for ClassicReadOptions {
    fn default() -> Self {
        Self { max_nak_retries: 3 }
    }
}

impl ClassicReadOptions {
    /// Set the retry budget for single-byte block answers
    pub const fn with_max_nak_retries(mut self, retries: u8) -> Self {
        self.max_nak_retries = retries;
        self
    }
}

/// Read every sector of a Classic card with the default options
pub async fn read_card<T>(
    tag_id: &TagId,
    tech: &mut T,
    keys: &ClassicKeyMaterial,
) -> Result<RawClassicCard>
where
    T: ClassicTechnology + ?Sized,
{
    read_card_with_options(tag_id, tech, keys, &ClassicReadOptions::default()).await
}

/// Read every sector of a Classic card
///
/// Always yields one unit per sector unless the tag leaves the field, in
/// which case the sector being read is recorded as invalid, the scan stops
/// and the card is flagged as a partial read.
#[instrument(skip_all, fields(tag_id = %tag_id, sectors = tech.sector_count()))]
pub async fn read_card_with_options<T>(
    tag_id: &TagId,
    tech: &mut T,
    keys: &ClassicKeyMaterial,
    options: &ClassicReadOptions,
) -> Result<RawClassicCard>
where
    T: ClassicTechnology + ?Sized,
{
    let sector_count = tech.sector_count();
    let mut sectors = Vec::with_capacity(sector_count);
    let mut is_partial_read = false;

    for index in 0..sector_count {
        match read_sector(tech, index, keys, options).await {
            Ok(sector) => sectors.push(sector),
            Err(e) if e.is_tag_lost() => {
                warn!(sector = index, error = %e, "Tag lost, stopping scan");
                sectors.push(RawClassicSector::invalid(index, e.to_string()));
                is_partial_read = true;
                break;
            }
            Err(e) => {
                debug!(sector = index, error = %e, "Sector read failed");
                sectors.push(RawClassicSector::invalid(index, e.to_string()));
            }
        }
    }

    Ok(RawClassicCard::new(
        tag_id.clone(),
        Utc::now(),
        sectors,
        is_partial_read,
    ))
}

async fn read_sector<T>(
    tech: &mut T,
    index: usize,
    keys: &ClassicKeyMaterial,
    options: &ClassicReadOptions,
) -> Result<RawClassicSector>
where
    T: ClassicTechnology + ?Sized,
{
    let Some(candidate) = find_key(tech, index, keys).await? else {
        debug!(sector = index, "No key authenticated");
        return Ok(RawClassicSector::Unauthorized { index });
    };
    read_unlocked_sector(tech, index, candidate, options).await
}

/// Read every block of a sector `candidate` has just authenticated
pub(super) async fn read_unlocked_sector<T>(
    tech: &mut T,
    index: usize,
    candidate: KeyCandidate,
    options: &ClassicReadOptions,
) -> Result<RawClassicSector>
where
    T: ClassicTechnology + ?Sized,
{
    let first = tech.sector_to_block(index);
    let count = tech.block_count_in_sector(index);
    let mut blocks = Vec::with_capacity(count);
    for block in first..first + count {
        let data = read_block(tech, index, block, candidate, options).await?;
        blocks.push(data.to_vec());
    }

    Ok(RawClassicSector::data(index, blocks, candidate))
}

async fn find_key<T>(
    tech: &mut T,
    sector: usize,
    keys: &ClassicKeyMaterial,
) -> Result<Option<KeyCandidate>>
where
    T: ClassicTechnology + ?Sized,
{
    for candidate in keys.candidates(sector) {
        if tech
            .authenticate(sector, &candidate.key, candidate.key_type)
            .await?
        {
            debug!(sector, key_type = %candidate.key_type, "Authenticated");
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

async fn read_block<T>(
    tech: &mut T,
    sector: usize,
    block: usize,
    candidate: KeyCandidate,
    options: &ClassicReadOptions,
) -> Result<Bytes>
where
    T: ClassicTechnology + ?Sized,
{
    let mut data = tech.read_block(block).await?;
    let mut retries = 0;

    // A lone byte is a NAK; the sector has to be re-authenticated
    while data.len() == 1 && retries < options.max_nak_retries {
        retries += 1;
        debug!(block, retries, "Short block read, re-authenticating");
        tech.authenticate(sector, &candidate.key, candidate.key_type)
            .await?;
        data = tech.read_block(block).await?;
    }

    Ok(data)
}
