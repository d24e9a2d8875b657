//! Status word definitions for APDU responses

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::Level;

/// Status Word (SW1-SW2) from an APDU response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusWord {
    /// First status byte (SW1)
    pub sw1: u8,
    /// Second status byte (SW2)
    pub sw2: u8,
}

impl StatusWord {
    /// Create a new status word
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Convert to a u16 value (SW1 | SW2)
    pub const fn to_u16(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Check if this status word indicates success (90 00)
    pub const fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }

    /// Number of bytes waiting for GET RESPONSE when SW1 = 61
    pub const fn remaining_bytes(&self) -> Option<u8> {
        if self.sw1 == 0x61 {
            Some(self.sw2)
        } else {
            None
        }
    }

    /// Exact Le the card asks for when SW1 = 6C
    pub const fn corrected_length(&self) -> Option<u8> {
        if self.sw1 == 0x6C {
            Some(self.sw2)
        } else {
            None
        }
    }

    /// Check if this status word indicates a security condition not satisfied (69 82)
    pub const fn is_security_condition_not_satisfied(&self) -> bool {
        self.sw1 == 0x69 && self.sw2 == 0x82
    }

    /// Check if this status word indicates there is no current EF (69 86)
    pub const fn is_no_current_ef(&self) -> bool {
        self.sw1 == 0x69 && self.sw2 == 0x86
    }

    /// Check if this status word indicates a file not found (6A 82)
    pub const fn is_file_not_found(&self) -> bool {
        self.sw1 == 0x6A && self.sw2 == 0x82
    }

    /// Check if this status word indicates a record not found (6A 83)
    pub const fn is_record_not_found(&self) -> bool {
        self.sw1 == 0x6A && self.sw2 == 0x83
    }

    /// Get the appropriate tracing level for this status word
    pub const fn tracing_level(&self) -> Level {
        if self.is_success() || self.sw1 == 0x61 {
            Level::DEBUG
        } else if self.sw1 == 0x62 || self.sw1 == 0x63 {
            // Warnings
            Level::INFO
        } else {
            // Errors
            Level::WARN
        }
    }

    /// Get a description of this status word
    pub const fn description(&self) -> &'static str {
        match (self.sw1, self.sw2) {
            (0x90, 0x00) => "Success",
            (0x61, _) => "More data available",
            (0x62, 0x82) => "End of file/record reached before reading Le bytes",
            (0x63, 0x00) => "Authentication failed",
            (0x67, 0x00) => "Wrong length",
            (0x69, 0x81) => "Command incompatible with file structure",
            (0x69, 0x82) => "Security status not satisfied",
            (0x69, 0x83) => "Authentication method blocked",
            (0x69, 0x86) => "Command not allowed (no current EF)",
            (0x6A, 0x81) => "Function not supported",
            (0x6A, 0x82) => "File not found",
            (0x6A, 0x83) => "Record not found",
            (0x6A, 0x86) => "Incorrect parameters P1-P2",
            (0x6B, 0x00) => "Wrong parameters P1-P2",
            (0x6C, _) => "Wrong Le field",
            (0x6D, 0x00) => "Instruction code not supported or invalid",
            (0x6E, 0x00) => "Class not supported",
            (0x6F, 0x00) => "No precise diagnosis",
            (0x91, 0x00) => "DESFire operation OK",
            (0x91, 0xAF) => "DESFire additional frame",
            (0x91, 0x9D) => "DESFire permission denied",
            (0x91, 0xAE) => "DESFire authentication error",
            (0x91, 0xA0) => "DESFire application not found",
            (0x91, 0xF0) => "DESFire file not found",
            _ => "Unknown status word",
        }
    }
}

impl From<(u8, u8)> for StatusWord {
    fn from(tuple: (u8, u8)) -> Self {
        Self::new(tuple.0, tuple.1)
    }
}

impl From<StatusWord> for u16 {
    fn from(status: StatusWord) -> Self {
        status.to_u16()
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X} {:02X}", self.sw1, self.sw2)
    }
}

/// Common status words
pub mod common {
    use super::StatusWord;

    /// Success (90 00)
    pub const SUCCESS: StatusWord = StatusWord::new(0x90, 0x00);

    /// Security condition not satisfied (69 82)
    pub const SECURITY_CONDITION_NOT_SATISFIED: StatusWord = StatusWord::new(0x69, 0x82);

    /// File not found (6A 82)
    pub const FILE_NOT_FOUND: StatusWord = StatusWord::new(0x6A, 0x82);

    /// Record not found (6A 83)
    pub const RECORD_NOT_FOUND: StatusWord = StatusWord::new(0x6A, 0x83);

    /// Instruction not supported (6D 00)
    pub const INS_NOT_SUPPORTED: StatusWord = StatusWord::new(0x6D, 0x00);

    /// Class not supported (6E 00)
    pub const CLA_NOT_SUPPORTED: StatusWord = StatusWord::new(0x6E, 0x00);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_word_predicates() {
        assert!(common::SUCCESS.is_success());
        assert!(common::FILE_NOT_FOUND.is_file_not_found());
        assert!(common::RECORD_NOT_FOUND.is_record_not_found());
        assert_eq!(StatusWord::new(0x6C, 0x10).corrected_length(), Some(0x10));
        assert_eq!(StatusWord::new(0x61, 0x08).remaining_bytes(), Some(0x08));
        assert_eq!(StatusWord::new(0x6A, 0x82).to_u16(), 0x6A82);
        assert_eq!(StatusWord::new(0x91, 0xAF).to_string(), "91 AF");
    }
}
