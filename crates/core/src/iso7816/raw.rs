use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Iso7816Application, Iso7816Card};
use crate::{CardType, TagId, card::ParseError};

/// One record returned by READ RECORD
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iso7816Record {
    /// Record number, from 1
    pub index: u8,
    /// Record contents
    #[serde(with = "crate::serde_hex")]
    pub data: Vec<u8>,
}

/// Whatever could be read from one elementary file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iso7816File {
    /// READ BINARY answer
    #[serde(with = "crate::serde_hex::option", default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<Vec<u8>>,
    /// Records in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub records: Vec<Iso7816Record>,
    /// FCI returned when the file was selected
    #[serde(with = "crate::serde_hex::option", default, skip_serializing_if = "Option::is_none")]
    pub fci: Option<Vec<u8>>,
}

impl Iso7816File {
    /// A file holding only binary data
    pub const fn binary(data: Vec<u8>) -> Self {
        Self {
            binary: Some(data),
            records: Vec::new(),
            fci: None,
        }
    }

    /// Whether nothing was read
    pub fn is_empty(&self) -> bool {
        self.binary.is_none() && self.records.is_empty()
    }

    /// Record by number
    pub fn record(&self, index: u8) -> Option<&[u8]> {
        self.records
            .iter()
            .find(|record| record.index == index)
            .map(|record| record.data.as_slice())
    }
}

/// One selected application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawIso7816Application {
    /// Profile label
    pub app_type: String,
    /// Name the application answered to
    #[serde(with = "crate::serde_hex")]
    pub app_name: Vec<u8>,
    /// FCI returned by SELECT
    #[serde(with = "crate::serde_hex")]
    pub fci: Vec<u8>,
    /// Files read by id, proprietary balances (`balance/N`) and records
    /// (`extra/N`), keyed by name
    #[serde(default)]
    pub files: BTreeMap<String, Iso7816File>,
    /// Files found by SFI scan
    #[serde(default)]
    pub sfi_files: BTreeMap<u8, Iso7816File>,
}

/// Everything read from an ISO 7816 card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawIso7816Card {
    /// Tag identifier (UID)
    pub tag_id: TagId,
    /// When the scan finished
    pub scanned_at: DateTime<Utc>,
    /// Applications that answered SELECT
    pub applications: Vec<RawIso7816Application>,
}

impl RawIso7816Card {
    /// Always [`CardType::Iso7816`]
    pub const fn card_type(&self) -> CardType {
        CardType::Iso7816
    }

    /// Always false; applications are never locked as a whole
    pub const fn is_unauthorized(&self) -> bool {
        false
    }

    /// Project into a typed card
    pub fn parse(&self) -> Result<Iso7816Card, ParseError> {
        const CT: CardType = CardType::Iso7816;

        if self.applications.is_empty() {
            return Err(ParseError::malformed(CT, "no application was selected"));
        }

        let applications = self
            .applications
            .iter()
            .enumerate()
            .map(|(index, app)| {
                Iso7816Application::from_raw(app).map_err(|reason| ParseError::unit(CT, index, reason))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Iso7816Card {
            tag_id: self.tag_id.clone(),
            scanned_at: self.scanned_at,
            applications,
        })
    }
}
