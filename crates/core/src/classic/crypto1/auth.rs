//! Three-pass authentication and frame encryption on the reader side

use super::{Crypto1, prng_successor};
use crate::keys::ClassicKey;

/// Reader nonce sent during software authentication
pub const READER_NONCE: u32 = 0x0102_0304;

/// Bytes on the air with one parity bit per byte
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFrame {
    /// Frame bytes, CRC included when the command carries one
    pub data: Vec<u8>,
    /// Parity bit of each byte, in the low bit
    pub parity: Vec<u8>,
}

impl RawFrame {
    /// A plaintext frame with standard odd parity
    pub fn plain(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let parity = data.iter().map(|&b| odd_parity(b)).collect();
        Self { data, parity }
    }

    /// The first four bytes as a big-endian word
    pub fn word(&self) -> Option<u32> {
        let bytes = self.data.get(..4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// ISO 14443-A odd parity bit of a byte
pub const fn odd_parity(b: u8) -> u8 {
    (b.count_ones() as u8 & 1) ^ 1
}

/// ISO 14443-A CRC, least significant byte first
pub fn crc_a(data: &[u8]) -> [u8; 2] {
    let mut crc: u16 = 0x6363;
    for &byte in data {
        let mut b = byte ^ (crc as u8);
        b ^= b << 4;
        let b = u16::from(b);
        crc = (crc >> 8) ^ (b << 8) ^ (b << 3) ^ (b >> 4);
    }
    crc.to_le_bytes()
}

/// `data` followed by its CRC
pub fn with_crc(data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(data.len() + 2);
    frame.extend_from_slice(data);
    frame.extend_from_slice(&crc_a(data));
    frame
}

impl Crypto1 {
    /// State after the card's nonce has been mixed in, ready for the reader answer
    pub fn for_session(key: &ClassicKey, uid: u32, nt: u32) -> Self {
        let mut state = Self::new(key);
        state.word(uid ^ nt, false);
        state
    }

    /// Encrypted `{nR}{aR}`, where `aR` is the card nonce 64 steps on
    pub fn reader_answer(&mut self, nr: u32, nt: u32) -> RawFrame {
        let mut frame = RawFrame::default();
        self.encrypt_into(&mut frame, &nr.to_be_bytes(), true);
        self.encrypt_into(&mut frame, &prng_successor(nt, 64).to_be_bytes(), false);
        frame
    }

    /// Whether the card's encrypted `aT` is the card nonce 96 steps on
    pub fn verify_card_answer(&mut self, at: u32, nt: u32) -> bool {
        at ^ self.word(0, false) == prng_successor(nt, 96)
    }

    /// Encrypt a command for the card
    pub fn encrypt(&mut self, data: &[u8]) -> RawFrame {
        let mut frame = RawFrame::default();
        self.encrypt_into(&mut frame, data, false);
        frame
    }

    /// Decrypt bytes from the card
    pub fn decrypt(&mut self, data: &[u8]) -> Vec<u8> {
        data.iter().map(|&b| b ^ self.byte(0, false)).collect()
    }

    // The parity bit shares the keystream bit of the next data bit
    fn encrypt_into(&mut self, frame: &mut RawFrame, data: &[u8], feed: bool) {
        for &b in data {
            let keystream = self.byte(if feed { b } else { 0 }, false);
            frame.data.push(b ^ keystream);
            frame.parity.push(self.peek() ^ odd_parity(b));
        }
    }
}
