//! MIFARE DESFire
//!
//! Native DESFire commands wrapped in ISO 7816 APDUs (CLA 0x90). The reader
//! walks the application directory and reads each file by its type. Nothing
//! is authenticated; files the card refuses are recorded as unauthorized.

mod card;
mod error;
mod protocol;
mod raw;
mod reader;

pub use card::{
    DesfireApplication, DesfireCard, DesfireFile, DesfireFileSettings, DesfireFileType,
    ManufacturingData,
};
pub use error::DesfireError;
pub use protocol::DesfireProtocol;
pub use raw::{RawDesfireApplication, RawDesfireCard, RawDesfireFile};
pub use reader::read_card;

/// Length of the GET VERSION answer once all frames are collected
pub const MANUFACTURING_DATA_LEN: usize = 28;

/// Command codes
pub mod commands {
    /// GET VERSION
    pub const GET_MANUFACTURING_DATA: u8 = 0x60;
    /// GET APPLICATION IDS
    pub const GET_APPLICATION_DIRECTORY: u8 = 0x6A;
    /// Continue a chained answer
    pub const GET_ADDITIONAL_FRAME: u8 = 0xAF;
    /// SELECT APPLICATION
    pub const SELECT_APPLICATION: u8 = 0x5A;
    /// READ DATA
    pub const READ_DATA: u8 = 0xBD;
    /// READ RECORDS
    pub const READ_RECORD: u8 = 0xBB;
    /// GET VALUE
    pub const GET_VALUE: u8 = 0x6C;
    /// GET FILE IDS
    pub const GET_FILES: u8 = 0x6F;
    /// GET FILE SETTINGS
    pub const GET_FILE_SETTINGS: u8 = 0xF5;
}

/// Status codes carried in SW2 after SW1 = 0x91
pub mod status {
    /// Operation OK
    pub const OPERATION_OK: u8 = 0x00;
    /// More frames follow
    pub const ADDITIONAL_FRAME: u8 = 0xAF;
    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 0x9D;
    /// Authentication error
    pub const AUTHENTICATION_ERROR: u8 = 0xAE;
    /// Application not found
    pub const APPLICATION_NOT_FOUND: u8 = 0xA0;
    /// File not found
    pub const FILE_NOT_FOUND: u8 = 0xF0;
}
