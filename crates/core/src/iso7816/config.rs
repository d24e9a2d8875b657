use std::{fmt, ops::RangeInclusive};

use serde::{Deserialize, Serialize};

/// Proprietary commands issued after an application is selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Iso7816Profile {
    /// Only standard ISO 7816-4 reads
    #[default]
    Standard,
    /// China transit: four GET BALANCE (80 5C) purses
    China,
    /// KSX6924 (T-money and friends): GET BALANCE (90 4C) and the
    /// proprietary record file (90 78)
    Ksx6924,
}

/// A file addressed by id, optionally below a dedicated file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSelector {
    /// DF selected before the file
    pub parent_df: Option<u16>,
    /// EF id
    pub file_id: u16,
}

impl FileSelector {
    /// A file selected from the application root
    pub const fn new(file_id: u16) -> Self {
        Self {
            parent_df: None,
            file_id,
        }
    }

    /// A file selected below `parent_df`
    pub const fn under(parent_df: u16, file_id: u16) -> Self {
        Self {
            parent_df: Some(parent_df),
            file_id,
        }
    }
}

/// Renders as the key the file is stored under, `1001/4` or `4`
impl fmt::Display for FileSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent_df {
            Some(parent) => write!(f, "{parent:x}/{:x}", self.file_id),
            None => write!(f, "{:x}", self.file_id),
        }
    }
}

/// One application profile the ISO 7816 reader looks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iso7816AppConfig {
    /// Candidate application names (AIDs); the first that selects wins
    pub app_names: Vec<Vec<u8>>,
    /// Label stored on the application, e.g. `china`
    pub app_type: String,
    /// Short file identifiers scanned for records and binary data
    pub sfi_range: RangeInclusive<u8>,
    /// Files read by id after the SFI scan
    pub file_selectors: Vec<FileSelector>,
    /// Proprietary commands
    pub profile: Iso7816Profile,
}

impl Iso7816AppConfig {
    /// A profile with no extra files and the full SFI range
    pub fn new(app_type: impl Into<String>, app_names: Vec<Vec<u8>>) -> Self {
        Self {
            app_names,
            app_type: app_type.into(),
            sfi_range: 1..=31,
            file_selectors: Vec::new(),
            profile: Iso7816Profile::Standard,
        }
    }

    /// Set the SFI range
    pub fn with_sfi_range(mut self, sfi_range: RangeInclusive<u8>) -> Self {
        self.sfi_range = sfi_range;
        self
    }

    /// Set the files read by id
    pub fn with_file_selectors(mut self, file_selectors: Vec<FileSelector>) -> Self {
        self.file_selectors = file_selectors;
        self
    }

    /// Set the proprietary command profile
    pub const fn with_profile(mut self, profile: Iso7816Profile) -> Self {
        self.profile = profile;
        self
    }

    /// China transit applications (City Union, T-Union, Shenzhen Tong)
    pub fn china() -> Self {
        let app_names = vec![
            hex_aid("A00000000386980701"),
            hex_aid("A000000632010105"),
            b"PAY.SZT".to_vec(),
        ];
        let file_selectors = [4, 5, 8, 9, 10, 21, 24, 25]
            .into_iter()
            .flat_map(|id| [FileSelector::new(id), FileSelector::under(0x1001, id)])
            .collect();

        Self::new("china", app_names)
            .with_file_selectors(file_selectors)
            .with_profile(Iso7816Profile::China)
    }

    /// Korean KSX6924 applications
    pub fn ksx6924() -> Self {
        let app_names = vec![
            hex_aid("D4100000030001"),
            hex_aid("D4100000140001"),
            hex_aid("D4100000300001"),
            hex_aid("D4106509900020"),
        ];
        let file_selectors = (1..=5).map(FileSelector::new).collect();

        Self::new("ksx6924", app_names)
            .with_file_selectors(file_selectors)
            .with_profile(Iso7816Profile::Ksx6924)
    }
}

/// Profiles tried when the caller does not supply any
pub fn default_app_configs() -> Vec<Iso7816AppConfig> {
    vec![Iso7816AppConfig::china(), Iso7816AppConfig::ksx6924()]
}

fn hex_aid(aid: &str) -> Vec<u8> {
    hex::decode(aid).unwrap_or_default()
}
