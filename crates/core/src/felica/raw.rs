use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BLOCK_SIZE, FelicaCard, FelicaIdm, FelicaPmm, FelicaSystem, ID_LEN};
use crate::{CardType, TagId, card::ParseError};

/// One 16-byte block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFelicaBlock {
    /// Block number within the service
    pub index: u8,
    /// Block contents
    #[serde(with = "crate::serde_hex")]
    pub data: Vec<u8>,
}

/// A service with at least one readable block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFelicaService {
    /// Service code
    pub code: u16,
    /// Blocks from 0 up to the first refused read
    pub blocks: Vec<RawFelicaBlock>,
}

/// One system on the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawFelicaSystem {
    /// System that was polled and walked
    Data {
        /// System code
        code: u16,
        /// Every service code the system reported
        service_codes: Vec<u16>,
        /// Services that gave up blocks
        services: Vec<RawFelicaService>,
    },
    /// System left alone in first-system-only mode
    Skipped {
        /// System code
        code: u16,
    },
}

impl RawFelicaSystem {
    /// System code
    pub const fn code(&self) -> u16 {
        match self {
            Self::Data { code, .. } | Self::Skipped { code } => *code,
        }
    }
}

/// Everything read from a FeliCa card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFelicaCard {
    /// Tag identifier (UID)
    pub tag_id: TagId,
    /// When the scan finished
    pub scanned_at: DateTime<Utc>,
    /// Manufacture ID
    #[serde(with = "crate::serde_hex")]
    pub idm: Vec<u8>,
    /// Manufacture parameters
    #[serde(with = "crate::serde_hex")]
    pub pmm: Vec<u8>,
    /// Systems in the order the card reported them
    pub systems: Vec<RawFelicaSystem>,
}

impl RawFelicaCard {
    /// Always [`CardType::Felica`]
    pub const fn card_type(&self) -> CardType {
        CardType::Felica
    }

    /// Whether services were found but none could be read without a key
    pub fn is_unauthorized(&self) -> bool {
        let mut listed = false;
        for system in &self.systems {
            if let RawFelicaSystem::Data {
                service_codes,
                services,
                ..
            } = system
            {
                if !services.is_empty() {
                    return false;
                }
                listed |= !service_codes.is_empty();
            }
        }
        listed
    }

    /// Project into a typed card
    pub fn parse(&self) -> Result<FelicaCard, ParseError> {
        const CT: CardType = CardType::Felica;

        let idm: [u8; ID_LEN] = self
            .idm
            .as_slice()
            .try_into()
            .map_err(|_| ParseError::malformed(CT, format!("IDm is {} bytes", self.idm.len())))?;
        let pmm: [u8; ID_LEN] = self
            .pmm
            .as_slice()
            .try_into()
            .map_err(|_| ParseError::malformed(CT, format!("PMm is {} bytes", self.pmm.len())))?;

        let systems = self
            .systems
            .iter()
            .enumerate()
            .map(|(index, system)| parse_system(system).map_err(|reason| ParseError::unit(CT, index, reason)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FelicaCard {
            tag_id: self.tag_id.clone(),
            scanned_at: self.scanned_at,
            idm: FelicaIdm::new(idm),
            pmm: FelicaPmm::new(pmm),
            systems,
        })
    }
}

fn parse_system(system: &RawFelicaSystem) -> Result<FelicaSystem, String> {
    let RawFelicaSystem::Data {
        code,
        service_codes,
        services,
    } = system
    else {
        return Ok(FelicaSystem::skipped(system.code()));
    };

    let mut parsed = Vec::with_capacity(services.len());
    for service in services {
        let mut blocks = Vec::with_capacity(service.blocks.len());
        for (expected, block) in service.blocks.iter().enumerate() {
            if block.index as usize != expected {
                return Err(format!("service {:04x} block {} out of order", service.code, block.index));
            }
            if block.data.len() != BLOCK_SIZE {
                return Err(format!(
                    "service {:04x} block {} is {} bytes",
                    service.code,
                    block.index,
                    block.data.len()
                ));
            }
            blocks.push(block.data.clone());
        }
        parsed.push((service.code, blocks));
    }

    Ok(FelicaSystem {
        code: *code,
        service_codes: service_codes.clone(),
        services: parsed.into_iter().collect(),
        skipped: false,
    })
}
