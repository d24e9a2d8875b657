use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Iso7816File, RawIso7816Application};
use crate::TagId;

/// A selected application with its proprietary balances decoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Iso7816Application {
    /// Profile label
    pub app_type: String,
    /// Name the application answered to
    #[serde(with = "crate::serde_hex")]
    pub app_name: Vec<u8>,
    /// FCI returned by SELECT
    #[serde(with = "crate::serde_hex")]
    pub fci: Vec<u8>,
    /// Purse balances by purse number
    pub balances: BTreeMap<u8, i32>,
    /// Files by name
    pub files: BTreeMap<String, Iso7816File>,
    /// Files by short file identifier
    pub sfi_files: BTreeMap<u8, Iso7816File>,
}

impl Iso7816Application {
    pub(crate) fn from_raw(raw: &RawIso7816Application) -> Result<Self, String> {
        if raw.app_name.is_empty() {
            return Err("application name is empty".into());
        }

        let mut balances = BTreeMap::new();
        for (name, file) in &raw.files {
            let Some(purse) = name.strip_prefix("balance/") else {
                continue;
            };
            let purse: u8 = purse
                .parse()
                .map_err(|_| format!("{name} is not a purse number"))?;
            let bytes: [u8; 4] = file
                .binary
                .as_deref()
                .and_then(|data| data.try_into().ok())
                .ok_or_else(|| format!("{name} is not a 4-byte balance"))?;
            balances.insert(purse, i32::from_be_bytes(bytes));
        }

        Ok(Self {
            app_type: raw.app_type.clone(),
            app_name: raw.app_name.clone(),
            fci: raw.fci.clone(),
            balances,
            files: raw.files.clone(),
            sfi_files: raw.sfi_files.clone(),
        })
    }

    /// Balance of a purse
    pub fn balance(&self, purse: u8) -> Option<i32> {
        self.balances.get(&purse).copied()
    }

    /// File by name, e.g. `1001/4` or `extra/0`
    pub fn file(&self, name: &str) -> Option<&Iso7816File> {
        self.files.get(name)
    }

    /// File found by SFI scan
    pub fn sfi_file(&self, sfi: u8) -> Option<&Iso7816File> {
        self.sfi_files.get(&sfi)
    }

    /// KSX6924 proprietary records in order
    pub fn extra_records(&self) -> impl Iterator<Item = &[u8]> {
        (0..=0x0F_u8).map_while(|i| {
            self.file(&format!("extra/{i}"))
                .and_then(|file| file.binary.as_deref())
        })
    }
}

/// A parsed ISO 7816 card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Iso7816Card {
    /// Tag identifier
    pub tag_id: TagId,
    /// When the scan finished
    pub scanned_at: DateTime<Utc>,
    /// Applications in selection order
    pub applications: Vec<Iso7816Application>,
}

impl Iso7816Card {
    /// First application of a profile
    pub fn application(&self, app_type: &str) -> Option<&Iso7816Application> {
        self.applications.iter().find(|app| app.app_type == app_type)
    }
}
