//! Crypto1, the stream cipher of MIFARE Classic
//!
//! The 48-bit LFSR is kept as two halves holding its odd and even bits,
//! which is the layout key recovery works on. Words cross the air interface
//! with their bytes big-endian and the bits of each byte least significant
//! first, so word operations walk bits in that order.

mod auth;
mod recovery;

pub use auth::{READER_NONCE, RawFrame, crc_a, odd_parity, with_crc};
pub use recovery::{lfsr_recovery32, nonce_distance, recover_keys};

use crate::keys::ClassicKey;

const LF_POLY_ODD: u32 = 0x29CE5C;
const LF_POLY_EVEN: u32 = 0x87_0804;

/// Nonlinear filter over the 20 odd bits feeding the keystream
pub const fn filter(x: u32) -> u32 {
    let mut f: u32 = (0xf22c0 >> (x & 0xf)) & 16;
    f |= (0x6c9c0 >> ((x >> 4) & 0xf)) & 8;
    f |= (0x3c8b0 >> ((x >> 8) & 0xf)) & 4;
    f |= (0x1e458 >> ((x >> 12) & 0xf)) & 2;
    f |= (0x0d938 >> ((x >> 16) & 0xf)) & 1;
    (0xEC57_E80A >> f) & 1
}

/// Even parity bit of `x` (1 when an odd number of bits are set)
pub const fn parity(x: u32) -> u32 {
    x.count_ones() & 1
}

/// The card's 16-bit nonce PRNG advanced `n` steps from `x`
pub const fn prng_successor(x: u32, n: u32) -> u32 {
    let mut x = x.swap_bytes();
    let mut n = n;
    while n > 0 {
        x = (x >> 1) | (((x >> 16) ^ (x >> 18) ^ (x >> 19) ^ (x >> 21)) << 31);
        n -= 1;
    }
    x.swap_bytes()
}

const fn bit(x: u32, n: u32) -> u32 {
    (x >> n) & 1
}

/// Bit `n` of a word in air order
const fn bebit(x: u32, n: u32) -> u32 {
    bit(x, n ^ 24)
}

/// Cipher state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Crypto1 {
    odd: u32,
    even: u32,
}

impl Crypto1 {
    /// Load a key into a fresh state
    pub fn new(key: &ClassicKey) -> Self {
        let mut bytes = [0u8; 8];
        bytes[2..].copy_from_slice(key.as_bytes());
        let key = u64::from_be_bytes(bytes);

        let mut state = Self::default();
        for i in (1..48).step_by(2).rev() {
            state.odd = (state.odd << 1) | ((key >> ((i - 1) ^ 7)) & 1) as u32;
            state.even = (state.even << 1) | ((key >> (i ^ 7)) & 1) as u32;
        }
        state
    }

    pub(crate) const fn from_halves(odd: u32, even: u32) -> Self {
        Self { odd, even }
    }

    /// The odd and even halves
    pub const fn halves(&self) -> (u32, u32) {
        (self.odd, self.even)
    }

    /// Keystream bit the next step will produce
    pub const fn peek(&self) -> u8 {
        filter(self.odd) as u8
    }

    /// Clock one bit, feeding `input`, and return the keystream bit
    ///
    /// With `encrypted` the input is ciphertext and is decrypted by the
    /// keystream bit before it is fed back.
    pub fn bit(&mut self, input: bool, encrypted: bool) -> u8 {
        let out = filter(self.odd);
        let mut feed = out & u32::from(encrypted);
        feed ^= u32::from(input);
        feed ^= LF_POLY_ODD & self.odd;
        feed ^= LF_POLY_EVEN & self.even;
        self.even = (self.even << 1) | parity(feed);
        std::mem::swap(&mut self.odd, &mut self.even);
        out as u8
    }

    /// Clock eight bits, least significant first
    pub fn byte(&mut self, input: u8, encrypted: bool) -> u8 {
        let mut out = 0;
        for i in 0..8 {
            out |= self.bit((input >> i) & 1 == 1, encrypted) << i;
        }
        out
    }

    /// Clock a word in air order
    pub fn word(&mut self, input: u32, encrypted: bool) -> u32 {
        let mut out = 0;
        for i in 0..32 {
            out |= u32::from(self.bit(bebit(input, i) == 1, encrypted)) << (i ^ 24);
        }
        out
    }

    /// Undo one [`bit`](Self::bit) that fed `input`
    pub fn rollback_bit(&mut self, input: bool, encrypted: bool) -> u8 {
        self.odd &= 0xFF_FFFF;
        std::mem::swap(&mut self.odd, &mut self.even);

        let mut feed = self.even & 1;
        self.even >>= 1;
        feed ^= LF_POLY_EVEN & self.even;
        feed ^= LF_POLY_ODD & self.odd;
        feed ^= u32::from(input);

        let out = filter(self.odd);
        feed ^= out & u32::from(encrypted);
        self.even |= parity(feed) << 23;
        out as u8
    }

    /// Undo one [`word`](Self::word) that fed `input`
    pub fn rollback_word(&mut self, input: u32, encrypted: bool) -> u32 {
        let mut out = 0;
        for i in (0..32).rev() {
            out |= u32::from(self.rollback_bit(bebit(input, i) == 1, encrypted)) << (i ^ 24);
        }
        out
    }

    /// The 48 LFSR bits read back as a key
    ///
    /// Only a state rolled back to the point the key was loaded yields the key.
    pub fn key(&self) -> ClassicKey {
        let mut lfsr = 0u64;
        for i in (0..24).rev() {
            lfsr = (lfsr << 1) | u64::from(bit(self.odd, i ^ 3));
            lfsr = (lfsr << 1) | u64::from(bit(self.even, i ^ 3));
        }
        let b = lfsr.to_be_bytes();
        ClassicKey::new([b[2], b[3], b[4], b[5], b[6], b[7]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: ClassicKey = ClassicKey::MAD;

    #[test]
    fn test_filter() {
        assert_eq!(filter(0x00000), 0);
        assert_eq!(filter(0x00001), 0);
        assert_eq!(filter(0x00002), 1);
        assert_eq!(filter(0x00005), 1);
        assert_eq!(filter(0x10000), 0);
        assert_eq!(filter(0xFFFFF), 1);
        assert_eq!(filter(0x12345), 1);
        assert_eq!(filter(0xABCDE), 1);
    }

    #[test]
    fn test_parity() {
        assert_eq!(parity(0), 0);
        assert_eq!(parity(0x80), 1);
        assert_eq!(parity(0xFFFF_FFFF), 0);
        assert_eq!(parity(0x7FFF_FFFF), 1);
        assert_eq!(parity(0x1234_5678), 1);
    }

    #[test]
    fn test_prng_successor() {
        assert_eq!(prng_successor(0, 1), 0);
        assert_eq!(prng_successor(0xAABB_CCDD, 0), 0xAABB_CCDD);
        assert_eq!(prng_successor(0x1234_5678, 32), 0x8b92_ec40);
        assert_eq!(prng_successor(0x1234_5678, 64), 0xcdd2_b112);
        assert_eq!(prng_successor(prng_successor(0x1234_5678, 32), 32), 0xcdd2_b112);
        assert_eq!(prng_successor(0xDEAD_BEEF, 96), 0xe63e_7417);
    }

    #[test]
    fn test_key_load_and_read_back() {
        let state = Crypto1::new(&KEY);
        assert_eq!(state.halves(), (0x33BB33, 0x08084C));
        assert_eq!(state.key(), KEY);

        assert_eq!(Crypto1::new(&ClassicKey::DEFAULT).halves(), (0xFFFFFF, 0xFFFFFF));
        let alternating = ClassicKey::new([0xAA; 6]);
        assert_eq!(Crypto1::new(&alternating).halves(), (0xFFFFFF, 0));
        assert_eq!(Crypto1::new(&alternating).key(), alternating);
    }

    #[test]
    fn test_keystream() {
        let mut state = Crypto1::new(&KEY);
        assert_eq!(state.byte(0x5A, false), 0x30);

        let mut state = Crypto1::new(&KEY);
        assert_eq!(state.word(0x1234_5678, false), 0x3079_4609);

        // Default key keeps the odd half all ones
        let mut state = Crypto1::new(&ClassicKey::DEFAULT);
        assert_eq!(state.peek(), 1);
        assert_eq!(state.bit(false, false), 1);
    }

    #[test]
    fn test_rollback_restores_state() {
        let loaded = Crypto1::new(&KEY);

        let mut state = loaded;
        state.bit(true, false);
        state.rollback_bit(true, false);
        assert_eq!(state, loaded);

        let mut state = loaded;
        let out = state.word(0x1234_5678, false);
        assert_eq!(state.rollback_word(0x1234_5678, false), out);
        assert_eq!(state, loaded);
    }

    #[test]
    fn test_encrypted_feedback_feeds_plaintext() {
        let uid = 0x0102_0304;
        let nonce = 0xCAFE_BABE;

        // Card side: plain nonce fed, nonce sent encrypted
        let mut card = Crypto1::new(&KEY);
        let encrypted = nonce ^ card.word(uid ^ nonce, false);

        // Reader side: only the ciphertext is known
        let mut reader = Crypto1::new(&KEY);
        let keystream = reader.word(uid ^ encrypted, true);
        assert_eq!(encrypted ^ keystream, nonce);
        assert_eq!(reader, card);
    }
}
