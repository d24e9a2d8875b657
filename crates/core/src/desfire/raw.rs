use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    DesfireApplication, DesfireCard, DesfireFile, DesfireFileSettings, MANUFACTURING_DATA_LEN,
    ManufacturingData,
};
use crate::{CardType, TagId, card::ParseError};

/// Outcome of reading one file
///
/// Settings are kept raw whenever the card gave them up, including for
/// files whose contents could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawDesfireFile {
    /// File contents were read
    Data {
        /// File number
        file_id: u8,
        /// GET FILE SETTINGS answer
        #[serde(with = "crate::serde_hex::option", default)]
        settings: Option<Vec<u8>>,
        /// File contents
        #[serde(with = "crate::serde_hex")]
        data: Vec<u8>,
    },
    /// The card refused to read the file
    Unauthorized {
        /// File number
        file_id: u8,
        /// GET FILE SETTINGS answer
        #[serde(with = "crate::serde_hex::option", default)]
        settings: Option<Vec<u8>>,
        /// Card message
        error: String,
    },
    /// Reading failed for another reason
    Invalid {
        /// File number
        file_id: u8,
        /// GET FILE SETTINGS answer
        #[serde(with = "crate::serde_hex::option", default)]
        settings: Option<Vec<u8>>,
        /// What went wrong
        error: String,
    },
}

impl RawDesfireFile {
    /// File number
    pub const fn file_id(&self) -> u8 {
        match self {
            Self::Data { file_id, .. } | Self::Unauthorized { file_id, .. } | Self::Invalid { file_id, .. } => {
                *file_id
            }
        }
    }

    /// Raw settings, when known
    pub fn settings(&self) -> Option<&[u8]> {
        match self {
            Self::Data { settings, .. } | Self::Unauthorized { settings, .. } | Self::Invalid { settings, .. } => {
                settings.as_deref()
            }
        }
    }

    /// Whether the card refused access
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    fn parse(&self) -> Result<DesfireFile, String> {
        let settings = self.settings().map(DesfireFileSettings::parse).transpose()?;
        let file_id = self.file_id();

        Ok(match self {
            Self::Data { data, .. } => DesfireFile::from_data(file_id, settings, data.clone()),
            Self::Unauthorized { error, .. } => DesfireFile::Unauthorized {
                file_id,
                settings,
                error: error.clone(),
            },
            Self::Invalid { error, .. } => DesfireFile::Invalid {
                file_id,
                settings,
                error: error.clone(),
            },
        })
    }
}

/// One application and its files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDesfireApplication {
    /// Application id
    pub app_id: u32,
    /// Files in the order they were read
    pub files: Vec<RawDesfireFile>,
    /// The file directory was refused, so ids 0-31 were probed instead
    #[serde(default)]
    pub dir_list_locked: bool,
}

/// Everything read from a DESFire card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDesfireCard {
    /// Tag identifier (UID)
    pub tag_id: TagId,
    /// When the scan finished
    pub scanned_at: DateTime<Utc>,
    /// GET VERSION answer
    #[serde(with = "crate::serde_hex")]
    pub manufacturing_data: Vec<u8>,
    /// Applications that could be selected
    pub applications: Vec<RawDesfireApplication>,
    /// The application directory was refused
    #[serde(default)]
    pub app_list_locked: bool,
}

impl RawDesfireCard {
    /// Always [`CardType::MifareDesfire`]
    pub const fn card_type(&self) -> CardType {
        CardType::MifareDesfire
    }

    /// Whether every file on the card was refused
    pub fn is_unauthorized(&self) -> bool {
        let mut files = self.applications.iter().flat_map(|app| &app.files).peekable();
        files.peek().is_some() && files.all(RawDesfireFile::is_unauthorized)
    }

    /// Project into a typed card
    ///
    /// Fails on manufacturing data of the wrong length or a settings record
    /// that does not decode.
    pub fn parse(&self) -> Result<DesfireCard, ParseError> {
        const CT: CardType = CardType::MifareDesfire;

        if self.manufacturing_data.len() != MANUFACTURING_DATA_LEN {
            return Err(ParseError::malformed(
                CT,
                format!("manufacturing data is {} bytes", self.manufacturing_data.len()),
            ));
        }
        let manufacturing_data = ManufacturingData::parse(&self.manufacturing_data);

        let applications = self
            .applications
            .iter()
            .map(|app| {
                let files = app
                    .files
                    .iter()
                    .map(|file| {
                        file.parse().map_err(|reason| {
                            ParseError::unit(
                                CT,
                                file.file_id() as usize,
                                format!("application {:06x}: {reason}", app.app_id),
                            )
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(DesfireApplication {
                    app_id: app.app_id,
                    files,
                    dir_list_locked: app.dir_list_locked,
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        Ok(DesfireCard {
            tag_id: self.tag_id.clone(),
            scanned_at: self.scanned_at,
            manufacturing_data,
            applications,
            app_list_locked: self.app_list_locked,
        })
    }
}
