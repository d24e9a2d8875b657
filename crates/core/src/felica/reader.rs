use chrono::Utc;
use tracing::{debug, instrument};

use super::{
    RawFelicaBlock, RawFelicaCard, RawFelicaService, RawFelicaSystem, SERVICE_OCTOPUS, SERVICE_SZT,
    SYSTEM_CODE_ANY, SYSTEM_CODE_OCTOPUS, SYSTEM_CODE_SZT,
};
use crate::{Error, Result, TagId, technology::FelicaTechnology};

/// FeliCa read settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FelicaReadOptions {
    /// Read only the first system and record the rest as skipped
    pub only_first: bool,
}

impl FelicaReadOptions {
    /// Set first-system-only mode
    pub const fn with_only_first(mut self, only_first: bool) -> Self {
        self.only_first = only_first;
        self
    }
}

/// Walk every system, service and block the card exposes without keys
///
/// Octopus and Shenzhen Tong cards report no system codes; they are found
/// by polling their well-known codes, and their single service is read
/// without a service search.
#[instrument(skip_all, fields(tag_id = %tag_id))]
pub async fn read_card<T>(tag_id: &TagId, tech: &mut T, options: &FelicaReadOptions) -> Result<RawFelicaCard>
where
    T: FelicaTechnology + ?Sized,
{
    let idm = tech.idm().await?;
    let mut system_codes = tech.system_codes().await?;

    let mut octopus_magic = false;
    let mut szt_magic = false;
    if system_codes.is_empty() {
        if tech.select_system(SYSTEM_CODE_OCTOPUS).await?.is_some() {
            debug!("Found Octopus system by polling");
            system_codes.push(SYSTEM_CODE_OCTOPUS);
            octopus_magic = true;
        }
        if tech.select_system(SYSTEM_CODE_SZT).await?.is_some() {
            debug!("Found Shenzhen Tong system by polling");
            system_codes.push(SYSTEM_CODE_SZT);
            szt_magic = true;
        }
    }

    let first = system_codes.first().copied().unwrap_or(SYSTEM_CODE_ANY);
    let pmm = tech
        .select_system(first)
        .await?
        .ok_or_else(|| Error::protocol("Failed to poll for PMm"))?;

    let mut systems = Vec::with_capacity(system_codes.len());
    for (number, &code) in system_codes.iter().enumerate() {
        if options.only_first && number > 0 {
            systems.push(RawFelicaSystem::Skipped { code });
            continue;
        }

        tech.select_system(code).await?;
        let service_codes = match code {
            SYSTEM_CODE_OCTOPUS if octopus_magic => vec![SERVICE_OCTOPUS],
            SYSTEM_CODE_SZT if szt_magic => vec![SERVICE_SZT],
            _ => tech.service_codes().await?,
        };

        let mut services = Vec::new();
        for &service_code in &service_codes {
            tech.select_system(code).await?;
            let blocks = read_service(tech, service_code).await?;
            if blocks.is_empty() {
                debug!(system = %format_args!("{code:04x}"), service = %format_args!("{service_code:04x}"), "Service not readable");
            } else {
                services.push(RawFelicaService {
                    code: service_code,
                    blocks,
                });
            }
        }

        systems.push(RawFelicaSystem::Data {
            code,
            service_codes,
            services,
        });
    }

    Ok(RawFelicaCard {
        tag_id: tag_id.clone(),
        scanned_at: Utc::now(),
        idm: idm.to_vec(),
        pmm: pmm.to_vec(),
        systems,
    })
}

async fn read_service<T>(tech: &mut T, service_code: u16) -> Result<Vec<RawFelicaBlock>>
where
    T: FelicaTechnology + ?Sized,
{
    let mut blocks = Vec::new();
    for index in 0..=u8::MAX {
        let Some(data) = tech.read_block(service_code, index).await? else {
            break;
        };
        blocks.push(RawFelicaBlock {
            index,
            data: data.to_vec(),
        });
    }
    Ok(blocks)
}
