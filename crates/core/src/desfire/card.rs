use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::TagId;

/// DESFire file kinds, numbered as on the card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum DesfireFileType {
    /// Plain data file
    #[display("standard")]
    Standard,
    /// Data file with transactional backup
    #[display("backup")]
    Backup,
    /// 32-bit signed value
    #[display("value")]
    Value,
    /// Append-only records
    #[display("linear record")]
    LinearRecord,
    /// Ring buffer of records
    #[display("cyclic record")]
    CyclicRecord,
}

impl DesfireFileType {
    /// Map the on-card type byte
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Standard),
            0x01 => Some(Self::Backup),
            0x02 => Some(Self::Value),
            0x03 => Some(Self::LinearRecord),
            0x04 => Some(Self::CyclicRecord),
            _ => None,
        }
    }
}

/// Decoded GET FILE SETTINGS answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DesfireFileSettings {
    /// Standard or backup data file
    Standard {
        /// Standard or backup
        file_type: DesfireFileType,
        /// Communication setting byte
        comm_setting: u8,
        /// Access rights, two bytes
        access_rights: [u8; 2],
        /// File size in bytes
        file_size: u32,
    },
    /// Linear or cyclic record file
    Record {
        /// Linear or cyclic
        file_type: DesfireFileType,
        /// Communication setting byte
        comm_setting: u8,
        /// Access rights, two bytes
        access_rights: [u8; 2],
        /// Size of one record
        record_size: u32,
        /// Capacity in records
        max_records: u32,
        /// Records currently stored
        current_records: u32,
    },
    /// Value file
    Value {
        /// Communication setting byte
        comm_setting: u8,
        /// Access rights, two bytes
        access_rights: [u8; 2],
        /// Lowest allowed value
        lower_limit: i32,
        /// Highest allowed value
        upper_limit: i32,
        /// Limited credit amount
        limited_credit_value: i32,
        /// Whether limited credit is enabled
        limited_credit_enabled: bool,
    },
}

impl DesfireFileSettings {
    /// Decode a settings record: type, comm setting, access rights, then
    /// type-specific little-endian fields
    pub fn parse(data: &[u8]) -> Result<Self, String> {
        let [file_type, comm_setting, access_a, access_b, rest @ ..] = data else {
            return Err(format!("settings too short: {}", hex::encode(data)));
        };
        let access_rights = [*access_a, *access_b];
        let file_type = DesfireFileType::from_byte(*file_type)
            .ok_or_else(|| format!("unknown file type {file_type:x}"))?;

        let u24 = |at: usize| -> Result<u32, String> {
            rest.get(at..at + 3)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], 0]))
                .ok_or_else(|| format!("{file_type} settings truncated: {}", hex::encode(data)))
        };
        let i32_at = |at: usize| -> Result<i32, String> {
            rest.get(at..at + 4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .ok_or_else(|| format!("{file_type} settings truncated: {}", hex::encode(data)))
        };

        Ok(match file_type {
            DesfireFileType::Standard | DesfireFileType::Backup => Self::Standard {
                file_type,
                comm_setting: *comm_setting,
                access_rights,
                file_size: u24(0)?,
            },
            DesfireFileType::LinearRecord | DesfireFileType::CyclicRecord => Self::Record {
                file_type,
                comm_setting: *comm_setting,
                access_rights,
                record_size: u24(0)?,
                max_records: u24(3)?,
                current_records: u24(6)?,
            },
            DesfireFileType::Value => Self::Value {
                comm_setting: *comm_setting,
                access_rights,
                lower_limit: i32_at(0)?,
                upper_limit: i32_at(4)?,
                limited_credit_value: i32_at(8)?,
                limited_credit_enabled: rest.get(12).is_some_and(|b| *b != 0),
            },
        })
    }

    /// File kind
    pub const fn file_type(&self) -> DesfireFileType {
        match self {
            Self::Standard { file_type, .. } | Self::Record { file_type, .. } => *file_type,
            Self::Value { .. } => DesfireFileType::Value,
        }
    }
}

/// Parsed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DesfireFile {
    /// Data file contents, or any file read without settings
    Standard {
        /// File number
        file_id: u8,
        /// Settings, if readable
        settings: Option<DesfireFileSettings>,
        /// Contents
        #[serde(with = "crate::serde_hex")]
        data: Vec<u8>,
    },
    /// Record file split into records
    Record {
        /// File number
        file_id: u8,
        /// Settings
        settings: DesfireFileSettings,
        /// Records, most recent first as returned by the card
        #[serde(with = "crate::serde_hex::list")]
        records: Vec<Vec<u8>>,
    },
    /// Value file
    Value {
        /// File number
        file_id: u8,
        /// Settings
        settings: DesfireFileSettings,
        /// Current value
        value: i32,
    },
    /// Access refused
    Unauthorized {
        /// File number
        file_id: u8,
        /// Settings, if readable
        settings: Option<DesfireFileSettings>,
        /// Card message
        error: String,
    },
    /// Read failed
    Invalid {
        /// File number
        file_id: u8,
        /// Settings, if readable
        settings: Option<DesfireFileSettings>,
        /// What went wrong
        error: String,
    },
}

impl DesfireFile {
    pub(crate) fn from_data(file_id: u8, settings: Option<DesfireFileSettings>, data: Vec<u8>) -> Self {
        match settings {
            Some(settings @ DesfireFileSettings::Record { record_size, .. }) if record_size > 0 => Self::Record {
                file_id,
                records: data.chunks(record_size as usize).map(<[u8]>::to_vec).collect(),
                settings,
            },
            Some(settings @ DesfireFileSettings::Value { .. }) if data.len() == 4 => Self::Value {
                file_id,
                settings,
                value: i32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            },
            settings => Self::Standard {
                file_id,
                settings,
                data,
            },
        }
    }

    /// File number
    pub const fn file_id(&self) -> u8 {
        match self {
            Self::Standard { file_id, .. } |
            Self::Record { file_id, .. } |
            Self::Value { file_id, .. } |
            Self::Unauthorized { file_id, .. } |
            Self::Invalid { file_id, .. } => *file_id,
        }
    }

    /// Contents of a standard file
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Standard { data, .. } => Some(data),
            _ => None,
        }
    }
}

/// Decoded GET VERSION answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManufacturingData {
    /// Hardware vendor, 0x04 for NXP
    pub hw_vendor_id: u8,
    /// Hardware type
    pub hw_type: u8,
    /// Hardware subtype
    pub hw_sub_type: u8,
    /// Hardware major version
    pub hw_major_version: u8,
    /// Hardware minor version
    pub hw_minor_version: u8,
    /// Hardware storage size code
    pub hw_storage_size: u8,
    /// Hardware protocol
    pub hw_protocol: u8,
    /// Software vendor
    pub sw_vendor_id: u8,
    /// Software type
    pub sw_type: u8,
    /// Software subtype
    pub sw_sub_type: u8,
    /// Software major version
    pub sw_major_version: u8,
    /// Software minor version
    pub sw_minor_version: u8,
    /// Software storage size code
    pub sw_storage_size: u8,
    /// Software protocol
    pub sw_protocol: u8,
    /// Seven byte UID
    #[serde(with = "crate::serde_hex")]
    pub uid: Vec<u8>,
    /// Five byte production batch number
    #[serde(with = "crate::serde_hex")]
    pub batch_no: Vec<u8>,
    /// Week of production, BCD
    pub week_prod: u8,
    /// Year of production, BCD
    pub year_prod: u8,
}

impl ManufacturingData {
    /// Decode 28 bytes of GET VERSION data; callers check the length
    pub(crate) fn parse(data: &[u8]) -> Self {
        Self {
            hw_vendor_id: data[0],
            hw_type: data[1],
            hw_sub_type: data[2],
            hw_major_version: data[3],
            hw_minor_version: data[4],
            hw_storage_size: data[5],
            hw_protocol: data[6],
            sw_vendor_id: data[7],
            sw_type: data[8],
            sw_sub_type: data[9],
            sw_major_version: data[10],
            sw_minor_version: data[11],
            sw_storage_size: data[12],
            sw_protocol: data[13],
            uid: data[14..21].to_vec(),
            batch_no: data[21..26].to_vec(),
            week_prod: data[26],
            year_prod: data[27],
        }
    }
}

/// Parsed application
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesfireApplication {
    /// Application id
    pub app_id: u32,
    /// Files
    pub files: Vec<DesfireFile>,
    /// The file directory was refused
    pub dir_list_locked: bool,
}

impl DesfireApplication {
    /// Look up a file by number
    pub fn file(&self, file_id: u8) -> Option<&DesfireFile> {
        self.files.iter().find(|file| file.file_id() == file_id)
    }
}

/// Parsed DESFire card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesfireCard {
    /// Tag identifier (UID)
    pub tag_id: TagId,
    /// When the scan finished
    pub scanned_at: DateTime<Utc>,
    /// Decoded GET VERSION data
    pub manufacturing_data: ManufacturingData,
    /// Applications
    pub applications: Vec<DesfireApplication>,
    /// The application directory was refused
    pub app_list_locked: bool,
}

impl DesfireCard {
    /// Look up an application by id
    pub fn application(&self, app_id: u32) -> Option<&DesfireApplication> {
        self.applications.iter().find(|app| app.app_id == app_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_standard_settings() {
        let settings = DesfireFileSettings::parse(&[0x01, 0x03, 0x10, 0xEE, 0x20, 0x01, 0x00]).unwrap();
        assert_eq!(
            settings,
            DesfireFileSettings::Standard {
                file_type: DesfireFileType::Backup,
                comm_setting: 0x03,
                access_rights: [0x10, 0xEE],
                file_size: 0x120,
            }
        );
    }

    #[test]
    fn test_parse_record_settings() {
        let settings = DesfireFileSettings::parse(&[
            0x04, 0x00, 0x12, 0xE0, 0x10, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x03, 0x00, 0x00,
        ])
        .unwrap();
        assert!(matches!(
            settings,
            DesfireFileSettings::Record {
                file_type: DesfireFileType::CyclicRecord,
                record_size: 16,
                max_records: 10,
                current_records: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_truncated_settings() {
        assert!(DesfireFileSettings::parse(&[0x00, 0x00]).is_err());
        assert!(DesfireFileSettings::parse(&[0x03, 0x00, 0x00, 0x00, 0x10]).is_err());
    }

    #[test]
    fn test_records_are_split() {
        let settings = DesfireFileSettings::parse(&[
            0x03, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x08, 0x00, 0x00, 0x02, 0x00, 0x00,
        ])
        .unwrap();
        let file = DesfireFile::from_data(3, Some(settings), vec![1, 1, 1, 1, 2, 2, 2, 2]);
        let DesfireFile::Record { records, .. } = file else {
            panic!("not a record file");
        };
        assert_eq!(records, vec![vec![1; 4], vec![2; 4]]);
    }

    #[test]
    fn test_manufacturing_data() {
        let data: Vec<u8> = (0..28).collect();
        let parsed = ManufacturingData::parse(&data);
        assert_eq!(parsed.hw_vendor_id, 0);
        assert_eq!(parsed.sw_protocol, 13);
        assert_eq!(parsed.uid, (14..21).collect::<Vec<u8>>());
        assert_eq!(parsed.year_prod, 27);
    }
}
