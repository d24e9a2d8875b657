use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ID_LEN;
use crate::TagId;

/// Manufacture ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FelicaIdm(#[serde(with = "crate::serde_hex::array")] [u8; ID_LEN]);

impl FelicaIdm {
    /// Wrap raw bytes
    pub const fn new(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Manufacturer code, the first two bytes
    pub const fn manufacturer_code(&self) -> u16 {
        u16::from_be_bytes([self.0[0], self.0[1]])
    }

    /// Card identification number, the last six bytes
    pub fn card_identifier(&self) -> &[u8] {
        &self.0[2..]
    }

    /// Raw bytes
    pub const fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }
}

/// Manufacture parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FelicaPmm(#[serde(with = "crate::serde_hex::array")] [u8; ID_LEN]);

impl FelicaPmm {
    /// Wrap raw bytes
    pub const fn new(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    /// ROM type
    pub const fn rom_type(&self) -> u8 {
        self.0[0]
    }

    /// IC type
    pub const fn ic_type(&self) -> u8 {
        self.0[1]
    }

    /// Maximum response time parameters
    pub fn timeouts(&self) -> &[u8] {
        &self.0[2..]
    }
}

/// A system with its readable services
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FelicaSystem {
    /// System code
    pub code: u16,
    /// Every service code reported
    pub service_codes: Vec<u16>,
    /// Blocks of each readable service
    pub services: BTreeMap<u16, Vec<Vec<u8>>>,
    /// Whether the system was not read
    pub skipped: bool,
}

impl FelicaSystem {
    pub(crate) const fn skipped(code: u16) -> Self {
        Self {
            code,
            service_codes: Vec::new(),
            services: BTreeMap::new(),
            skipped: true,
        }
    }
}

/// A parsed FeliCa card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FelicaCard {
    /// Tag identifier
    pub tag_id: TagId,
    /// When the scan finished
    pub scanned_at: DateTime<Utc>,
    /// Manufacture ID
    pub idm: FelicaIdm,
    /// Manufacture parameters
    pub pmm: FelicaPmm,
    /// Systems in card order
    pub systems: Vec<FelicaSystem>,
}

impl FelicaCard {
    /// System by code
    pub fn system(&self, code: u16) -> Option<&FelicaSystem> {
        self.systems.iter().find(|system| system.code == code)
    }

    /// Blocks of a service
    pub fn service(&self, system_code: u16, service_code: u16) -> Option<&[Vec<u8>]> {
        self.system(system_code)?
            .services
            .get(&service_code)
            .map(Vec::as_slice)
    }
}
